//! Configuration loader for the chess bot.
//!
//! Reads `config.toml` into [`BotConfig`] and the account password from the
//! file it names. Unlike optional settings, the account fields have no
//! defaults, so a missing or malformed file is an error.

use std::path::Path;

use chessbot_types::config::BotConfig;
use chessbot_types::error::ConfigError;
use secrecy::SecretString;

/// Load and validate the bot configuration at `path`.
pub async fn load_bot_config(path: &Path) -> Result<BotConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let config: BotConfig = toml::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    validate(&config)?;
    tracing::debug!(homeserver = %config.homeserver, username = %config.username, "loaded config");
    Ok(config)
}

fn validate(config: &BotConfig) -> Result<(), ConfigError> {
    if !config.username.is_valid() {
        return Err(ConfigError::Invalid(format!(
            "username '{}' is not a full user id like @bot:example.org",
            config.username
        )));
    }
    if config.homeserver.trim().is_empty() {
        return Err(ConfigError::Invalid("homeserver must not be empty".to_string()));
    }
    Ok(())
}

/// Read the account password, trimming surrounding whitespace.
pub async fn read_password(path: &Path) -> Result<SecretString, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let password = content.trim();
    if password.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "password file {} is empty",
            path.display()
        )));
    }
    Ok(SecretString::from(password.to_string()))
}
