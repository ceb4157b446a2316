// src/api/dto/payment_dto.rs

use crate::domain::payment_model;
use crate::utils::validation::{validate_currency, validate_payment_type};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// PaymentIntent作成リクエスト
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[validate(range(min = 50, message = "Amount must be a number and at least $0.50"))]
    pub amount: i64,

    #[validate(custom(
        function = "validate_currency",
        message = "Invalid currency. Supported: USD, EUR, GBP"
    ))]
    pub currency: Option<String>,

    #[validate(custom(
        function = "validate_payment_type",
        message = "Invalid payment type. Use \"subscription\" or \"one-time\""
    ))]
    pub payment_type: Option<String>,

    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentHistoryResponse {
    pub payments: Vec<PaymentHistoryItem>,
}

/// 履歴1件分のビュー。ローカルレコードとStripe側のデータの両方から作られる
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryItem {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub description: String,
    /// エポックミリ秒
    pub created: i64,
    pub payment_method: PaymentMethodInfo,
}

impl PaymentHistoryItem {
    pub fn from_record(record: payment_model::Model) -> Self {
        let description = record
            .description
            .clone()
            .or_else(|| {
                record
                    .metadata
                    .as_ref()
                    .and_then(|metadata| metadata.get("description"))
                    .and_then(|value| value.as_str())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "Payment".to_string());

        Self {
            id: record.stripe_payment_intent_id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            description,
            created: record.created_at.timestamp_millis(),
            payment_method: PaymentMethodInfo {
                method_type: record
                    .payment_method_type
                    .unwrap_or_else(|| "card".to_string()),
                brand: record.payment_method_brand,
                last4: record.payment_method_last4,
            },
        }
    }
}

/// 決済手段の表示用情報
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodInfo {
    #[serde(rename = "type")]
    pub method_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
}

impl PaymentMethodInfo {
    pub fn card() -> Self {
        Self {
            method_type: "card".to_string(),
            brand: None,
            last4: None,
        }
    }

    /// インボイス由来の決済は手段の詳細が取れないためマスクする
    pub fn masked_card() -> Self {
        Self {
            method_type: "card".to_string(),
            brand: Some("card".to_string()),
            last4: Some("****".to_string()),
        }
    }
}
