// src/config/mod.rs

pub mod stripe;

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_addr: String,
    pub jwt_secret: String,
    pub frontend_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv().ok(); // .env ファイルを読み込む (存在しなくてもエラーにしない)

        let database_url = env::var("DATABASE_URL")?;
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
        let jwt_secret = env::var("JWT_SECRET")?;
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(AppConfig {
            database_url,
            server_addr,
            jwt_secret,
            frontend_url,
        })
    }
}
