use std::time::Duration;

use serde::Deserialize;

use crate::services::ChatSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db")]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub db_pool_size: u32,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_typing_window_ms")]
    pub typing_window_ms: u64,
    #[serde(default = "default_online_window_secs")]
    pub online_window_secs: u64,
    /// How many message ids behind `after_id` a poll still reports receipts for.
    #[serde(default = "default_receipt_lookback")]
    pub receipt_lookback: i64,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Shared secret for `/internal/*`. Unset leaves those routes open, so they
    /// must then only be reachable from the service network.
    #[serde(default)]
    pub internal_token: Option<String>,
}

fn default_port() -> u16 { 3004 }
fn default_db() -> String { "crmchat.db".into() }
fn default_pool_size() -> u32 { 10 }
fn default_jwt_secret() -> String { "development-secret-change-in-production".into() }
fn default_typing_window_ms() -> u64 { 5_000 }
fn default_online_window_secs() -> u64 { 90 }
fn default_receipt_lookback() -> i64 { 50 }
fn default_max_message_len() -> usize { 5_000 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: default_db(),
            db_pool_size: default_pool_size(),
            jwt_secret: default_jwt_secret(),
            typing_window_ms: default_typing_window_ms(),
            online_window_secs: default_online_window_secs(),
            receipt_lookback: default_receipt_lookback(),
            max_message_len: default_max_message_len(),
            internal_token: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CRMCHAT_MESSAGING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = config.try_deserialize()?;

        if config.jwt_secret == default_jwt_secret() {
            tracing::warn!("using the development JWT secret; set CRMCHAT_MESSAGING__JWT_SECRET");
        }
        Ok(config)
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            typing_window: Duration::from_millis(self.typing_window_ms),
            online_window: Duration::from_secs(self.online_window_secs),
            receipt_lookback: self.receipt_lookback.max(0),
            max_message_len: self.max_message_len,
        }
    }
}
