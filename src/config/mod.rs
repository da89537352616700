use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

// Re-export existing config types
pub use crate::chat::ChatConfig;
pub use crate::games::DatabaseConfig;

/// Complete gameroom configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Page size used when `?size=` is omitted
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Largest `?size=` accepted on `GET /games`
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Directory receiving `POST /file` uploads
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Request body limit for uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> usize {
    10_485_760 // 10 MB
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl AppConfig {
    /// Apply `GAMEROOM_*` environment overrides on top of file/default values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GAMEROOM_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("GAMEROOM_DB_PATH") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("GAMEROOM_UPLOAD_DIR") {
            self.api.upload_dir = PathBuf::from(v);
        }
    }

    /// Load from `GAMEROOM_CONFIG` when set, defaults otherwise, then apply
    /// environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("GAMEROOM_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject values the services would otherwise reinterpret or fail on
    /// at request time.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chat.inbound_queue_capacity > 0,
            "chat.inbound_queue_capacity must be at least 1"
        );
        ensure!(
            self.chat.write_timeout_ms > 0,
            "chat.write_timeout_ms must be at least 1"
        );
        ensure!(
            self.api.max_page_size > 0,
            "api.max_page_size must be at least 1"
        );
        ensure!(
            (1..=self.api.max_page_size).contains(&self.api.default_page_size),
            "api.default_page_size ({}) must be between 1 and api.max_page_size ({})",
            self.api.default_page_size,
            self.api.max_page_size
        );
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}
