// tests/api_tests.rs

mod common;

use axum::http::StatusCode;
use axum::Router;
use common::stripe_helper::{
    create_subscription_updated_payload, create_test_webhook_payload,
    generate_test_webhook_signature,
};
use common::{auth_token, test_app_state, test_user};
use gymhub_billing::api::handlers::payment_handler::payment_router;
use gymhub_billing::api::handlers::webhook_handler::webhook_router;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

/// 本番と同じ構成のルーターを組み立てる
fn test_router(db: DatabaseConnection) -> Router {
    let app_state = test_app_state(db);
    Router::new().nest(
        "/api",
        payment_router(app_state.clone()).merge(webhook_router(app_state)),
    )
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_payment_history_requires_authentication() {
    // Arrange
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    // Act - 認証ヘッダーなし
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("GET")
                .uri("/api/payments/history")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    // Arrange
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    // Act
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("GET")
                .uri("/api/payments/history")
                .header("Authorization", "Bearer not-a-token")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_payment_history_local_records_only() {
    // Arrange - Stripe顧客が未リンクのユーザーはローカル履歴のみを受け取る
    let user_id = Uuid::new_v4();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![test_user(user_id, None)]])
        .append_query_results([Vec::<gymhub_billing::domain::payment_model::Model>::new()])
        .into_connection();
    let app = test_router(db);

    // Act
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("GET")
                .uri("/api/payments/history")
                .header("Authorization", format!("Bearer {}", auth_token(user_id)))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["payments"], json!([]));
}

#[tokio::test]
async fn test_create_intent_validation_error_is_400() {
    // Arrange
    let user_id = Uuid::new_v4();
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    // Act - 最低請求額未満
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/payments/create-intent")
                .header("Authorization", format!("Bearer {}", auth_token(user_id)))
                .header("Content-Type", "application/json")
                .body(axum::body::Body::from(json!({ "amount": 10 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("$0.50"));
}

#[tokio::test]
async fn test_update_subscription_invalid_action_is_400() {
    // Arrange
    let user_id = Uuid::new_v4();
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    // Act
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("PUT")
                .uri("/api/subscriptions/sub_test_123")
                .header("Authorization", format!("Bearer {}", auth_token(user_id)))
                .header("Content-Type", "application/json")
                .body(axum::body::Body::from(
                    json!({ "action": "pause" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_missing_signature() {
    // Arrange
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    let payload = create_subscription_updated_payload("sub_test_123", "cus_test_123", "active");

    // Act - 署名なしでWebhookリクエスト
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("Content-Type", "application/json")
                .body(axum::body::Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_invalid_signature() {
    // Arrange
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    let payload = create_subscription_updated_payload("sub_test_123", "cus_test_123", "active");

    // Act
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("Content-Type", "application/json")
                .header("stripe-signature", "invalid-signature")
                .body(axum::body::Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_acknowledges_valid_event() {
    // Arrange - レコードが存在しなくても受領応答を返す
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .into_connection();
    let app = test_router(db);

    let payload = create_subscription_updated_payload("sub_unknown", "cus_test_123", "active");
    let signature = generate_test_webhook_signature(&payload);

    // Act
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("Content-Type", "application/json")
                .header("stripe-signature", signature)
                .body(axum::body::Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body, json!({ "received": true }));
}

#[tokio::test]
async fn test_webhook_ignores_unhandled_event_type() {
    // Arrange
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    let payload = create_test_webhook_payload(
        "customer.created",
        json!({
            "id": "cus_test_123",
            "object": "customer",
            "created": chrono::Utc::now().timestamp(),
            "livemode": false,
            "metadata": {}
        }),
    );
    let signature = generate_test_webhook_signature(&payload);

    // Act
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("Content-Type", "application/json")
                .header("stripe-signature", signature)
                .body(axum::body::Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert - 未知のイベントも正常に受領される
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_does_not_require_authentication() {
    // Arrange
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = test_router(db);

    let payload = create_subscription_updated_payload("sub_test_123", "cus_test_123", "active");

    // Act - 認証ヘッダーなしでもアクセス可能
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("Content-Type", "application/json")
                .header("stripe-signature", "test-signature")
                .body(axum::body::Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert - 署名は無効でも、認証エラーにはならない
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}
