// src/main.rs
use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gymhub_billing::api::handlers::payment_handler::payment_router;
use gymhub_billing::api::handlers::webhook_handler::webhook_router;
use gymhub_billing::api::AppState;
use gymhub_billing::config::stripe::StripeConfig;
use gymhub_billing::config::AppConfig;
use gymhub_billing::db::create_db_pool;
use gymhub_billing::service::payment_service::PaymentService;
use gymhub_billing::service::webhook_service::WebhookService;
use migration::{Migrator, MigratorTrait};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // トレーシングの設定
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymhub_billing=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Starting GymHub billing server...");

    // 設定を読み込む。Stripe関連の欠落・不正値はここで致命的エラーになる
    let app_config = AppConfig::from_env().expect("Failed to load configuration");
    let stripe_config = StripeConfig::from_env();

    if stripe_config.is_test_mode() {
        tracing::info!("Stripe is running with test keys");
    }

    // データベース接続とマイグレーション
    let db_pool = create_db_pool(&app_config)
        .await
        .expect("Failed to create database pool");

    Migrator::up(&db_pool, None)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database pool created successfully.");

    // サービスはプロセスにつき1度だけ構築する
    let payment_service = Arc::new(PaymentService::new(db_pool.clone(), stripe_config.clone()));
    let webhook_service = Arc::new(WebhookService::new(
        db_pool.clone(),
        stripe_config.webhook_secret.clone(),
    ));

    let app_state = AppState {
        payment_service,
        webhook_service,
        config: Arc::new(app_config.clone()),
    };

    // CORSはフロントエンドのオリジンのみ許可する
    let cors = CorsLayer::new()
        .allow_origin(app_config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let app_router = axum::Router::new()
        .nest(
            "/api",
            payment_router(app_state.clone()).merge(webhook_router(app_state)),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // サーバーの起動
    tracing::info!(
        "Router configured. Server listening on {}",
        app_config.server_addr
    );

    let listener = TcpListener::bind(&app_config.server_addr).await?;
    axum::serve(listener, app_router.into_make_service()).await?;

    Ok(())
}
