//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtConfig,
    /// Vote ledger configuration.
    #[serde(default)]
    pub voting: VotingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Timeout for establishing a new connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Timeout for acquiring a pooled connection, in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_acquire_timeout() -> u64 {
    3
}

impl DatabaseConfig {
    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Pool acquire timeout as a [`Duration`].
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Vote ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VotingConfig {
    /// Upper bound for a single vote cast, including the wait for the
    /// per-key lock and the storage transaction.
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_ms: u64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: default_storage_timeout(),
        }
    }
}

fn default_storage_timeout() -> u64 {
    5_000
}

impl VotingConfig {
    /// Storage timeout as a [`Duration`].
    #[must_use]
    pub const fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("AGORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_applies_defaults() {
        temp_env::with_vars(
            [
                ("AGORA__DATABASE__URL", Some("postgres://localhost/agora_test")),
                ("AGORA__JWT__SECRET", Some("test-secret")),
                ("AGORA__SERVER__PORT", None),
                ("AGORA__VOTING__STORAGE_TIMEOUT_MS", None),
                ("RUN_MODE", Some("test-defaults")),
            ],
            || {
                let config = AppConfig::load().expect("config should load");

                assert_eq!(config.database.url, "postgres://localhost/agora_test");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.database.acquire_timeout(), Duration::from_secs(3));
                assert_eq!(config.jwt.secret, "test-secret");
                assert_eq!(config.jwt.access_token_expiry_secs, 900);
                assert_eq!(config.server.port, 5001);
                assert_eq!(config.voting.storage_timeout(), Duration::from_secs(5));
            },
        );
    }

    #[test]
    fn test_load_reads_overrides() {
        temp_env::with_vars(
            [
                ("AGORA__DATABASE__URL", Some("postgres://db/agora")),
                ("AGORA__JWT__SECRET", Some("override-secret")),
                ("AGORA__SERVER__PORT", Some("9090")),
                ("AGORA__VOTING__STORAGE_TIMEOUT_MS", Some("250")),
                ("RUN_MODE", Some("test-overrides")),
            ],
            || {
                let config = AppConfig::load().expect("config should load");

                assert_eq!(config.server.port, 9090);
                assert_eq!(config.voting.storage_timeout(), Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn test_load_requires_database_url() {
        temp_env::with_vars(
            [
                ("AGORA__DATABASE__URL", None::<&str>),
                ("AGORA__JWT__SECRET", Some("secret")),
                ("RUN_MODE", Some("test-missing")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
