// src/db.rs
use crate::config::AppConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;

pub type DbPool = DatabaseConnection;

pub async fn create_db_pool(config: &AppConfig) -> Result<DbPool, DbErr> {
    let mut opt = ConnectOptions::new(config.database_url.clone());

    // 接続オプションを設定
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8 * 60));

    Database::connect(opt).await
}
