// src/config/stripe.rs

use once_cell::sync::Lazy;
use std::env;
use stripe::Client;

pub static STRIPE_CLIENT: Lazy<Client> = Lazy::new(|| {
    let secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_else(|_| {
        tracing::warn!("STRIPE_SECRET_KEY not set, using empty key for development");
        String::new()
    });

    Client::new(secret_key)
});

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub publishable_key: String,
    pub webhook_secret: String,
    pub basic_price_id: String,
    pub premium_price_id: String,
    pub elite_price_id: String,
}

impl StripeConfig {
    /// 環境変数から読み込む。欠落・不正な値はプロセス起動時に致命的エラーとする
    pub fn from_env() -> Self {
        let config = Self {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            publishable_key: env::var("STRIPE_PUBLISHABLE_KEY")
                .expect("STRIPE_PUBLISHABLE_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            basic_price_id: env::var("STRIPE_BASIC_PRICE_ID")
                .expect("STRIPE_BASIC_PRICE_ID must be set"),
            premium_price_id: env::var("STRIPE_PREMIUM_PRICE_ID")
                .expect("STRIPE_PREMIUM_PRICE_ID must be set"),
            elite_price_id: env::var("STRIPE_ELITE_PRICE_ID")
                .expect("STRIPE_ELITE_PRICE_ID must be set"),
        };

        if let Err(message) = config.validate() {
            panic!("Invalid Stripe configuration: {}", message);
        }

        config
    }

    /// キーと価格IDの形式を検証する
    pub fn validate(&self) -> Result<(), String> {
        if !self.secret_key.starts_with("sk_") {
            return Err("STRIPE_SECRET_KEY must start with 'sk_'".to_string());
        }
        if !self.publishable_key.starts_with("pk_") {
            return Err("STRIPE_PUBLISHABLE_KEY must start with 'pk_'".to_string());
        }
        if !self.webhook_secret.starts_with("whsec_") {
            return Err("STRIPE_WEBHOOK_SECRET must start with 'whsec_'".to_string());
        }

        for (name, price_id) in [
            ("STRIPE_BASIC_PRICE_ID", &self.basic_price_id),
            ("STRIPE_PREMIUM_PRICE_ID", &self.premium_price_id),
            ("STRIPE_ELITE_PRICE_ID", &self.elite_price_id),
        ] {
            // price_ではなくprod_が設定されるミスが多いため明示的に弾く
            if price_id.starts_with("prod_") {
                return Err(format!(
                    "{} is a product ID, but it should be a price ID (starting with 'price_')",
                    name
                ));
            }
            if !price_id.starts_with("price_") {
                return Err(format!("{} must start with 'price_'", name));
            }
        }

        Ok(())
    }

    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    pub fn get_price_id(&self, plan: &str) -> Option<&str> {
        match plan.to_lowercase().as_str() {
            "basic" => Some(&self.basic_price_id),
            "premium" => Some(&self.premium_price_id),
            "elite" => Some(&self.elite_price_id),
            _ => None,
        }
    }
}
