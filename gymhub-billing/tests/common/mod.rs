// tests/common/mod.rs
#![allow(dead_code)]

pub mod stripe_helper;

use gymhub_billing::api::AppState;
use gymhub_billing::config::stripe::StripeConfig;
use gymhub_billing::config::AppConfig;
use gymhub_billing::middleware::auth::AccessTokenClaims;
use gymhub_billing::service::payment_service::PaymentService;
use gymhub_billing::service::webhook_service::WebhookService;
use jsonwebtoken::{encode, EncodingKey, Header};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

/// テスト用のStripe設定。環境変数には依存しない
pub fn test_stripe_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_123".to_string(),
        publishable_key: "pk_test_123".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        basic_price_id: "price_basic123".to_string(),
        premium_price_id: "price_premium123".to_string(),
        elite_price_id: "price_elite123".to_string(),
    }
}

pub fn test_app_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        server_addr: "127.0.0.1:0".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        frontend_url: "http://localhost:5173".to_string(),
    }
}

/// モック接続の上にアプリケーション状態を構築する
pub fn test_app_state(db: DatabaseConnection) -> AppState {
    AppState {
        payment_service: Arc::new(PaymentService::new(db.clone(), test_stripe_config())),
        webhook_service: Arc::new(WebhookService::new(db, TEST_WEBHOOK_SECRET.to_string())),
        config: Arc::new(test_app_config()),
    }
}

/// 検証可能なアクセストークンを発行する
pub fn auth_token(user_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = AccessTokenClaims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 3600,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to encode test token")
}

/// テスト用ユーザーレコード
pub fn test_user(user_id: Uuid, stripe_customer_id: Option<&str>) -> gymhub_billing::domain::user_model::Model {
    let now = chrono::Utc::now();
    gymhub_billing::domain::user_model::Model {
        id: user_id,
        email: format!("user_{}@example.com", user_id.simple()),
        username: format!("user_{}", user_id.simple()),
        password_hash: "$argon2id$test".to_string(),
        is_active: true,
        stripe_customer_id: stripe_customer_id.map(str::to_owned),
        created_at: now,
        updated_at: now,
    }
}

/// テスト用サブスクリプションレコード
pub fn test_subscription(
    user_id: Uuid,
    stripe_subscription_id: &str,
    status: &str,
) -> gymhub_billing::domain::subscription_model::Model {
    let now = chrono::Utc::now();
    gymhub_billing::domain::subscription_model::Model {
        id: Uuid::new_v4(),
        user_id,
        stripe_subscription_id: stripe_subscription_id.to_string(),
        stripe_customer_id: "cus_test_123".to_string(),
        stripe_price_id: "price_premium123".to_string(),
        status: status.to_string(),
        current_period_start: now,
        current_period_end: now + chrono::Duration::days(30),
        cancel_at_period_end: false,
        canceled_at: None,
        trial_start: None,
        trial_end: None,
        metadata: None,
        created_at: now,
        updated_at: now,
    }
}
