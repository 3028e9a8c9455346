//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default long-poll timeout passed to `getUpdates`.
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Port for the administrative HTTP API.
    pub http_port: u16,
    /// Long-poll timeout for Telegram updates.
    pub poll_timeout: Duration,
    /// Admin token registered on startup so a fresh database is usable.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Token/identity pair inserted into the token table at startup.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub token: SecretString,
    pub admin_id: String,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    ///
    /// `TELEGRAM_BOT_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let db_path = std::env::var("SURVEY_BOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/survey-bot.db"));

        let http_port = parse_var("SURVEY_BOT_HTTP_PORT", 3000u16)?;
        let poll_timeout_secs = parse_var("SURVEY_BOT_POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?;

        let bootstrap_admin = match std::env::var("SURVEY_BOT_ADMIN_TOKEN") {
            Ok(token) if !token.trim().is_empty() => {
                let admin_id = std::env::var("SURVEY_BOT_ADMIN_ID")
                    .map_err(|_| ConfigError::MissingEnvVar("SURVEY_BOT_ADMIN_ID".into()))?;
                Some(BootstrapAdmin {
                    token: SecretString::from(token.trim().to_string()),
                    admin_id,
                })
            }
            _ => None,
        };

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            db_path,
            http_port,
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            bootstrap_admin,
        })
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let port: u16 = parse_var("SURVEY_BOT_TEST_UNSET_VAR_7F3A", 3000).unwrap();
        assert_eq!(port, 3000);
    }

    #[test]
    fn parse_var_rejects_garbage() {
        // SAFETY: test-local variable name not read by any other test.
        unsafe { std::env::set_var("SURVEY_BOT_TEST_BAD_PORT_91C2", "not-a-port") };
        let result: Result<u16, _> = parse_var("SURVEY_BOT_TEST_BAD_PORT_91C2", 3000);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
