// src/utils/validation.rs

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use validator::{ValidationError, ValidationErrors};

/// Stripe価格IDの形式（price_で始まる英数字）
static PRICE_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^price_[a-zA-Z0-9]+$").expect("Invalid price ID regex"));

/// 対応している通貨コード
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["usd", "eur", "gbp"];

/// 決済種別
pub const PAYMENT_TYPES: [&str; 2] = ["subscription", "one-time"];

pub fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if SUPPORTED_CURRENCIES.contains(&currency.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_currency"))
    }
}

pub fn validate_payment_type(payment_type: &str) -> Result<(), ValidationError> {
    if PAYMENT_TYPES.contains(&payment_type) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_payment_type"))
    }
}

pub fn validate_price_id(price_id: &str) -> Result<(), ValidationError> {
    if PRICE_ID_REGEX.is_match(price_id) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_price_id"))
    }
}

/// validatorのエラーをレスポンス用のメッセージへ畳み込む
pub fn validation_error_messages(validation_errors: &ValidationErrors) -> AppError {
    let errors: Vec<String> = validation_errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                format!(
                    "{}: {}",
                    field,
                    error.message.as_ref().unwrap_or(&"Invalid value".into())
                )
            })
        })
        .collect();

    AppError::ValidationError(errors.join(", "))
}
