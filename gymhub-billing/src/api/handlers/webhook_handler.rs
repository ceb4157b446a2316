// src/api/handlers/webhook_handler.rs

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

/// Stripe Webhookハンドラー。
/// 署名検証のためボディはパースせず生のまま受け取る必要がある
pub async fn stripe_webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<Value>> {
    let stripe_signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing stripe-signature header");
            AppError::BadRequest("Missing stripe-signature header".to_string())
        })?;

    // 個別ハンドラーの空振りは正常応答。ディスパッチ中の予期しない失敗のみ
    // 5xxとなり、プロバイダー側の再配送に委ねる
    app_state
        .webhook_service
        .handle_event(&body, stripe_signature)
        .await?;

    Ok(Json(json!({ "received": true })))
}

/// Webhookルーター（認証不要）
pub fn webhook_router(app_state: AppState) -> Router {
    Router::new()
        .route("/webhooks/stripe", post(stripe_webhook_handler))
        .with_state(app_state)
}
