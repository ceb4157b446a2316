// src/api/mod.rs

use crate::config::AppConfig;
use crate::service::payment_service::PaymentService;
use crate::service::webhook_service::WebhookService;
use std::sync::Arc;

pub mod dto;
pub mod handlers;

/// アプリケーション全体で共有する状態。
/// サービスはプロセス起動時に1度だけ構築され、リクエスト間で共有される
#[derive(Clone)]
pub struct AppState {
    pub payment_service: Arc<PaymentService>,
    pub webhook_service: Arc<WebhookService>,
    pub config: Arc<AppConfig>,
}
