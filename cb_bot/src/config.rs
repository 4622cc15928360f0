//! Bot configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chat_blackjack::bot::DEFAULT_NUM_WORKERS;
use chat_blackjack::db::DatabaseConfig;
use chat_blackjack::game::GameRules;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default chat API endpoint
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Complete bot configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Chat transport configuration
    pub telegram: TelegramConfig,
    /// Admin HTTP API configuration
    pub admin: AdminConfig,
    /// Number of update workers
    pub num_workers: usize,
    /// Prometheus scrape address, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Reply template file, bundled templates when unset
    pub reply_templates: Option<PathBuf>,
    /// Balances and payout coefficients
    pub rules: GameRules,
}

/// Chat transport configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token issued by the chat platform (required)
    pub token: String,
    /// Base URL of the bot API
    pub api_url: String,
    /// Long-poll timeout in seconds
    pub poll_timeout_secs: u64,
}

/// Admin HTTP API configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Bind address
    pub bind: SocketAddr,
    /// Hex SHA-256 digest of the admin token, admin routes refuse every
    /// request when unset
    pub token_sha256: Option<String>,
}

impl BotConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `admin_bind_override` - Optional admin bind address (from CLI args)
    /// * `database_url_override` - Optional database URL (from CLI args)
    /// * `num_workers_override` - Optional worker count (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or unparsable
    pub fn from_env(
        admin_bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        num_workers_override: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| DatabaseConfig::development().database_url);

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 2),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT", 10),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT", 600),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME", 1800),
        };

        let token = std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingRequired {
            var: "BOT_TOKEN".to_string(),
            hint: "Register a bot with @BotFather and copy its token".to_string(),
        })?;

        let telegram = TelegramConfig {
            token,
            api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string()),
            poll_timeout_secs: parse_env_or("POLL_TIMEOUT_SECS", 30),
        };

        let bind = match admin_bind_override {
            Some(bind) => bind,
            None => parse_addr("ADMIN_BIND")?.unwrap_or(SocketAddr::from(([127, 0, 0, 1], 8080))),
        };

        let admin = AdminConfig {
            bind,
            token_sha256: std::env::var("ADMIN_TOKEN_SHA256")
                .ok()
                .map(|digest| digest.trim().to_ascii_lowercase())
                .filter(|digest| !digest.is_empty()),
        };

        Ok(BotConfig {
            database,
            telegram,
            admin,
            num_workers: num_workers_override
                .unwrap_or_else(|| parse_env_or("NUM_WORKERS", DEFAULT_NUM_WORKERS)),
            metrics_bind: parse_addr("METRICS_BIND")?,
            reply_templates: std::env::var("REPLY_TEMPLATES").ok().map(PathBuf::from),
            rules: GameRules::from_env(),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "DB_*".to_string(),
                reason,
            })?;

        self.rules.validate().map_err(|reason| ConfigError::Invalid {
            var: "GAME_RULES".to_string(),
            reason,
        })?;

        if self.num_workers == 0 {
            return Err(ConfigError::Invalid {
                var: "NUM_WORKERS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "BOT_TOKEN".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if self.telegram.poll_timeout_secs > 50 {
            return Err(ConfigError::Invalid {
                var: "POLL_TIMEOUT_SECS".to_string(),
                reason: "Must be at most 50".to_string(),
            });
        }

        if let Some(digest) = &self.admin.token_sha256
            && (digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(ConfigError::Invalid {
                var: "ADMIN_TOKEN_SHA256".to_string(),
                reason: "Must be a 64-character hex SHA-256 digest".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_addr(key: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("{value:?} is not an IP:PORT address ({e})"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BotConfig {
        BotConfig {
            database: DatabaseConfig::development(),
            telegram: TelegramConfig {
                token: "123:abc".to_string(),
                api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
                poll_timeout_secs: 30,
            },
            admin: AdminConfig {
                bind: "127.0.0.1:8080".parse().unwrap(),
                token_sha256: Some("a".repeat(64)),
            },
            num_workers: 3,
            metrics_bind: None,
            reply_templates: None,
            rules: GameRules::default(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "BOT_TOKEN".to_string(),
            hint: "Ask @BotFather".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("BOT_TOKEN"));
        assert!(msg.contains("Ask @BotFather"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = BotConfig {
            num_workers: 0,
            ..valid_config()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "NUM_WORKERS"));
    }

    #[test]
    fn test_malformed_admin_digest_rejected() {
        let mut config = valid_config();
        config.admin.token_sha256 = Some("not-a-digest".to_string());

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "ADMIN_TOKEN_SHA256"));
    }

    #[test]
    fn test_missing_admin_digest_allowed() {
        let mut config = valid_config();
        config.admin.token_sha256 = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_coefficient_rejected() {
        let mut config = valid_config();
        config.rules.win_coefficient = -1;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "GAME_RULES"));
    }

    #[test]
    fn test_long_poll_timeout_capped() {
        let mut config = valid_config();
        config.telegram.poll_timeout_secs = 120;
        assert!(config.validate().is_err());
    }
}
