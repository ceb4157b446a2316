// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl AppError {
    /// バリアントが持つ呼び出し側向けメッセージを取り出す
    pub fn message(&self) -> String {
        match self {
            AppError::DbErr(err) => err.to_string(),
            AppError::NotFound(message)
            | AppError::ValidationError(message)
            | AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::InternalServerError(message)
            | AppError::ExternalServiceError(message) => message.clone(),
        }
    }
}

// axum でエラーをHTTPレスポンスに変換するための実装
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::DbErr(db_err) => {
                // 想定外のエラーは詳細を伏せ、相関IDでログと突き合わせる
                let request_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(request_id = %request_id, "Database error: {:?}", db_err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal server error occurred".to_string(),
                        request_id: Some(request_id),
                    },
                )
            }
            AppError::InternalServerError(message) => {
                let request_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(request_id = %request_id, "Internal server error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal server error occurred".to_string(),
                        request_id: Some(request_id),
                    },
                )
            }
            AppError::ExternalServiceError(message) => {
                tracing::error!("External service error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: message,
                        request_id: None,
                    },
                )
            }
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: message,
                    request_id: None,
                },
            ),
            AppError::ValidationError(message) | AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message,
                    request_id: None,
                },
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: message,
                    request_id: None,
                },
            ),
            AppError::Forbidden(message) => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    error: message,
                    request_id: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

// Result 型のエイリアス
pub type AppResult<T> = Result<T, AppError>;

/// 統一的なエラーレスポンス構造
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
