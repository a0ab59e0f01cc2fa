//! Configuration management for Chatline Server

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin for the web client, `*` for any
    pub client_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
    pub files_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub cookie_name: String,
    pub secure_cookie: bool,
    pub password_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_message_length: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_upload_size_mb: u64,
}

impl Config {
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = fs::read_to_string(path).await?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            let content = toml::to_string_pretty(&config)?;
            fs::write(path, content).await?;
            tracing::info!("Created default config at {}", path);
            config
        };

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                config.auth.jwt_secret = secret;
            }
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                client_origin: "http://localhost:5173".to_string(),
            },
            storage: StorageConfig {
                database_path: "./data/chatline.db".to_string(),
                files_path: "./data/files".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "CHANGE-THIS-SECRET-IMMEDIATELY".to_string(),
                token_ttl_days: 7,
                cookie_name: "token".to_string(),
                secure_cookie: false,
                password_iterations: 100_000,
            },
            limits: LimitsConfig {
                max_message_length: 5000,
                default_page_size: 50,
                max_page_size: 100,
                max_upload_size_mb: 5,
            },
        }
    }
}
