// src/api/handlers/payment_handler.rs

use crate::api::dto::payment_dto::{
    CreatePaymentIntentRequest, CreatePaymentIntentResponse, PaymentHistoryResponse,
};
use crate::api::dto::subscription_dto::{
    CreateSubscriptionRequest, CreateSubscriptionResponse, SubscriptionResponse,
    SubscriptionUpdateResponse, UpdateSubscriptionRequest,
};
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::utils::validation::validation_error_messages;
use axum::{
    extract::{Json, Path, State},
    response::Redirect,
    routing::{get, post, put},
    Router,
};
use tracing::info;
use validator::Validate;

/// PaymentIntent作成
pub async fn create_payment_intent_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> AppResult<Json<CreatePaymentIntentResponse>> {
    payload
        .validate()
        .map_err(|e| validation_error_messages(&e))?;

    info!(
        user_id = %user.user_id,
        amount = payload.amount,
        "Creating payment intent"
    );

    match app_state
        .payment_service
        .create_payment_intent(user.user_id, payload)
        .await
    {
        Ok(response) => Ok(Json(response)),
        Err(e @ (AppError::DbErr(_) | AppError::InternalServerError(_))) => Err(e),
        // サービス層の失敗はこのエンドポイントでは400として返す
        Err(e) => Err(AppError::BadRequest(e.message())),
    }
}

/// 支払い履歴取得
pub async fn get_payment_history_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<PaymentHistoryResponse>> {
    info!(user_id = %user.user_id, "Getting payment history");

    match app_state
        .payment_service
        .get_payment_history(user.user_id)
        .await
    {
        Ok(payments) => Ok(Json(PaymentHistoryResponse { payments })),
        Err(e @ AppError::DbErr(_)) => Err(e),
        // 説明付きの500で返す（部分的なマージ結果は返さない）
        Err(e) => Err(AppError::ExternalServiceError(e.message())),
    }
}

/// インボイスダウンロード。PDFのURLへリダイレクトする
pub async fn download_invoice_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Redirect> {
    let links = match app_state.payment_service.get_invoice(user.user_id, &id).await {
        Ok(links) => links,
        Err(e @ AppError::DbErr(_)) => return Err(e),
        Err(_) => return Err(AppError::NotFound("Invoice not found".to_string())),
    };

    let invoice_url = links
        .invoice_url
        .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))?;

    Ok(Redirect::to(&invoice_url))
}

/// サブスクリプション作成
pub async fn create_subscription_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> AppResult<Json<CreateSubscriptionResponse>> {
    payload
        .validate()
        .map_err(|e| validation_error_messages(&e))?;

    info!(
        user_id = %user.user_id,
        price_id = %payload.price_id,
        "Creating subscription"
    );

    match app_state
        .payment_service
        .create_subscription(user.user_id, payload)
        .await
    {
        Ok(response) => Ok(Json(response)),
        Err(e @ (AppError::DbErr(_) | AppError::InternalServerError(_))) => Err(e),
        Err(e) => Err(AppError::BadRequest(e.message())),
    }
}

/// 現在のサブスクリプション取得
pub async fn get_current_subscription_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<SubscriptionResponse>> {
    info!(user_id = %user.user_id, "Getting current subscription");

    match app_state
        .payment_service
        .get_current_subscription(user.user_id)
        .await
    {
        Ok(subscription) => Ok(Json(SubscriptionResponse { subscription })),
        Err(e @ AppError::DbErr(_)) => Err(e),
        // このエンドポイントの失敗はすべて404として返す
        Err(e) => Err(AppError::NotFound(e.message())),
    }
}

/// サブスクリプション更新（cancel / reactivate）
pub async fn update_subscription_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> AppResult<Json<SubscriptionUpdateResponse>> {
    info!(
        user_id = %user.user_id,
        subscription_id = %id,
        action = %payload.action,
        "Updating subscription"
    );

    match app_state
        .payment_service
        .update_subscription(user.user_id, &id, &payload.action)
        .await
    {
        Ok(subscription) => Ok(Json(SubscriptionUpdateResponse { subscription })),
        // 所有権の不一致は403のまま通す
        Err(
            e @ (AppError::Forbidden(_) | AppError::DbErr(_) | AppError::InternalServerError(_)),
        ) => Err(e),
        Err(e) => Err(AppError::BadRequest(e.message())),
    }
}

/// 課金関連のルーター（認証必須）
pub fn payment_router(app_state: AppState) -> Router {
    Router::new()
        .route("/payments/create-intent", post(create_payment_intent_handler))
        .route("/payments/history", get(get_payment_history_handler))
        .route("/payments/{id}/invoice", get(download_invoice_handler))
        .route("/subscriptions/create", post(create_subscription_handler))
        .route(
            "/subscriptions/current",
            get(get_current_subscription_handler),
        )
        .route("/subscriptions/{id}", put(update_subscription_handler))
        .with_state(app_state)
}
