//! Bot configuration types.
//!
//! `BotConfig` represents the `config.toml` the bot is started with. The
//! account fields are required; everything else has a default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Top-level configuration for the chess bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Base URL of the homeserver, e.g. `https://matrix.example.org`.
    pub homeserver: String,

    /// Full user id of the bot account.
    pub username: UserId,

    /// File holding the account password.
    pub password_file: PathBuf,

    /// Display name for the device created at login.
    #[serde(default = "default_device_display_name")]
    pub device_display_name: String,

    /// Long-poll timeout for each sync request.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Directory of the end-to-end encryption key store.
    #[serde(default = "default_crypto_store")]
    pub crypto_store: PathBuf,

    /// Repository link appended to the help notice.
    #[serde(default)]
    pub source_url: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_device_display_name() -> String {
    "chessbot".to_string()
}

fn default_crypto_store() -> PathBuf {
    PathBuf::from("chessbot-crypto")
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

/// Bounded retry applied to every network action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff step; later steps follow the Fibonacci sequence.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable text.
    #[serde(default = "default_true")]
    pub json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json: true,
            otel: false,
        }
    }
}
