// tests/common/stripe_helper.rs

use serde_json::json;

use super::TEST_WEBHOOK_SECRET;

/// テスト用のWebhookイベントペイロードを作成
pub fn create_test_webhook_payload(event_type: &str, data: serde_json::Value) -> String {
    json!({
        "id": format!("evt_test_{}", uuid::Uuid::new_v4().simple()),
        "object": "event",
        "api_version": "2024-04-10",
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": data
        },
        "livemode": false,
        "pending_webhooks": 1,
        "request": {
            "id": null,
            "idempotency_key": null
        },
        "type": event_type
    })
    .to_string()
}

/// サブスクリプションオブジェクト。必要最小限のフィールドのみ含める
pub fn subscription_object(
    subscription_id: &str,
    customer_id: &str,
    status: &str,
    cancel_at_period_end: bool,
) -> serde_json::Value {
    let timestamp = chrono::Utc::now().timestamp();

    json!({
        "id": subscription_id,
        "object": "subscription",
        "automatic_tax": {
            "enabled": false,
            "liability": null
        },
        "billing_cycle_anchor": timestamp - 86400,
        "cancel_at_period_end": cancel_at_period_end,
        "canceled_at": null,
        "collection_method": "charge_automatically",
        "created": timestamp - 86400,
        "currency": "usd",
        "current_period_end": timestamp + 86400 * 29,
        "current_period_start": timestamp - 86400,
        "customer": customer_id,
        "default_tax_rates": [],
        "ended_at": null,
        "items": {
            "object": "list",
            "data": [],
            "has_more": false,
            "total_count": 0,
            "url": format!("/v1/subscriptions/{}/items", subscription_id)
        },
        "livemode": false,
        "metadata": {},
        "start_date": timestamp - 86400,
        "status": status,
        "trial_start": null,
        "trial_end": null
    })
}

/// サブスクリプション更新イベントのペイロードを作成
pub fn create_subscription_updated_payload(
    subscription_id: &str,
    customer_id: &str,
    status: &str,
) -> String {
    create_test_webhook_payload(
        "customer.subscription.updated",
        subscription_object(subscription_id, customer_id, status, false),
    )
}

/// サブスクリプション削除イベントのペイロードを作成
pub fn create_subscription_deleted_payload(subscription_id: &str, customer_id: &str) -> String {
    let mut object = subscription_object(subscription_id, customer_id, "canceled", false);
    object["canceled_at"] = json!(chrono::Utc::now().timestamp());
    object["ended_at"] = json!(chrono::Utc::now().timestamp());

    create_test_webhook_payload("customer.subscription.deleted", object)
}

/// インボイスオブジェクト
pub fn invoice_object(
    invoice_id: &str,
    customer_id: &str,
    subscription_id: Option<&str>,
    paid: bool,
) -> serde_json::Value {
    let timestamp = chrono::Utc::now().timestamp();

    json!({
        "id": invoice_id,
        "object": "invoice",
        "amount_due": 1999,
        "amount_paid": if paid { 1999 } else { 0 },
        "amount_remaining": if paid { 0 } else { 1999 },
        "attempted": true,
        "automatic_tax": {
            "enabled": false,
            "liability": null
        },
        "billing_reason": "subscription_cycle",
        "collection_method": "charge_automatically",
        "created": timestamp,
        "currency": "usd",
        "customer": customer_id,
        "customer_email": "test@example.com",
        "customer_name": "Test User",
        "livemode": false,
        "metadata": {},
        "paid": paid,
        "payment_intent": if paid { json!("pi_test_123") } else { serde_json::Value::Null },
        "status": if paid { "paid" } else { "open" },
        "subscription": subscription_id,
        "total": 1999
    })
}

/// インボイス支払い成功イベントのペイロードを作成
pub fn create_invoice_payment_succeeded_payload(
    invoice_id: &str,
    customer_id: &str,
    subscription_id: Option<&str>,
) -> String {
    create_test_webhook_payload(
        "invoice.payment_succeeded",
        invoice_object(invoice_id, customer_id, subscription_id, true),
    )
}

/// 支払い失敗イベントのペイロードを作成
pub fn create_payment_failed_payload(
    invoice_id: &str,
    customer_id: &str,
    subscription_id: &str,
) -> String {
    create_test_webhook_payload(
        "invoice.payment_failed",
        invoice_object(invoice_id, customer_id, Some(subscription_id), false),
    )
}

/// PaymentIntent成功イベントのペイロードを作成
pub fn create_payment_intent_succeeded_payload(payment_intent_id: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();

    create_test_webhook_payload(
        "payment_intent.succeeded",
        json!({
            "id": payment_intent_id,
            "object": "payment_intent",
            "amount": 999,
            "amount_capturable": 0,
            "amount_received": 999,
            "automatic_payment_methods": null,
            "capture_method": "automatic",
            "client_secret": null,
            "confirmation_method": "automatic",
            "created": timestamp,
            "currency": "usd",
            "customer": null,
            "description": null,
            "livemode": false,
            "metadata": {},
            "payment_method_types": ["card"],
            "status": "succeeded"
        }),
    )
}

/// Webhook署名を生成（テスト用）
pub fn generate_test_webhook_signature(payload: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let timestamp = chrono::Utc::now().timestamp();

    // 署名ペイロードを作成
    let signed_payload = format!("{}.{}", timestamp, payload);

    // HMAC-SHA256で署名
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    // Stripe形式の署名ヘッダーを作成
    format!("t={},v1={}", timestamp, signature)
}
