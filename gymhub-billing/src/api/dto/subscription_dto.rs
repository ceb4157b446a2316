// src/api/dto/subscription_dto.rs

use crate::utils::validation::validate_price_id;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// サブスクリプション作成リクエスト
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    #[validate(custom(function = "validate_price_id", message = "Invalid Price ID format"))]
    pub price_id: String,

    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionResponse {
    pub subscription_id: String,
    /// 初回請求の確定に使うclient_secret（存在する場合のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub status: String,
}

/// サブスクリプション更新リクエスト（cancel / reactivate）
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: SubscriptionView,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionUpdateResponse {
    pub subscription: SubscriptionUpdateView,
}

/// 現在のサブスクリプションの非正規化ビュー
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub id: String,
    pub status: String,
    pub plan_id: String,
    pub plan_name: String,
    pub amount: i64,
    pub currency: String,
    /// エポックミリ秒
    pub current_period_start: i64,
    /// エポックミリ秒
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    pub last_four: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdateView {
    pub id: String,
    pub status: String,
    /// エポックミリ秒
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
}

/// インボイスのダウンロード先URL
#[derive(Debug, Clone)]
pub struct InvoiceLinks {
    pub invoice_url: Option<String>,
    pub hosted_url: Option<String>,
}
