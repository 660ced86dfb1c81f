//! Server and database configuration.
//!
//! The server reads an optional JSON config file (`listen_port`,
//! `max_tokens`, `db_config_path`); the database config is a second
//! JSON document referenced from it, with environment variables taking
//! precedence over file values (Heroku style). Unset values fall back
//! to defaults; malformed environment values are ignored.

use std::env;
use std::fs;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_LISTEN_PORT: u16 = 2416;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_port: u16,
    /// Default capacity for issuers created without an explicit one.
    pub max_tokens: i32,
    pub db_config_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            max_tokens: crate::storage::DEFAULT_MAX_TOKENS,
            db_config_path: None,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Issuer/redemption cache configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CachingConfig {
    pub enabled: bool,
    #[serde(rename = "expirationSec")]
    pub expiration_sec: u64,
}

/// Database and rotation-window configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    #[serde(rename = "connectionURI")]
    pub connection_uri: String,
    #[serde(rename = "redisURI")]
    pub redis_uri: String,
    pub caching: CachingConfig,
    #[serde(rename = "maxConnection")]
    pub max_connection: u32,
    /// Days before expiry at which rotation begins.
    #[serde(rename = "expirationWindow")]
    pub expiration_window: i64,
    /// Days of validity granted to a successor beyond its predecessor.
    #[serde(rename = "renewalWindow")]
    pub renewal_window: i64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            connection_uri: String::new(),
            redis_uri: "redis://127.0.0.1:6379".to_string(),
            caching: CachingConfig::default(),
            max_connection: 100,
            expiration_window: 7,
            renewal_window: 30,
        }
    }
}

impl DbConfig {
    /// Load from the given JSON file (or defaults when absent), then
    /// apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let data = fs::read_to_string(path)?;
                serde_json::from_str(&data)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(uri) = env::var("DATABASE_URL") {
            if !uri.is_empty() {
                self.connection_uri = uri;
            }
        }
        if let Ok(uri) = env::var("REDIS_URL") {
            if !uri.is_empty() {
                self.redis_uri = uri;
            }
        }
        if let Ok(value) = env::var("MAX_DB_CONNECTION") {
            if let Ok(count) = value.parse() {
                self.max_connection = count;
            }
        }
        if let Ok(value) = env::var("EXPIRATION_WINDOW") {
            if let Ok(days) = value.parse() {
                self.expiration_window = days;
            }
        }
        if let Ok(value) = env::var("RENEWAL_WINDOW") {
            if let Ok(days) = value.parse() {
                self.renewal_window = days;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.max_tokens, 40);
        assert!(config.db_config_path.is_none());
    }

    #[test]
    fn db_config_parses_camel_case_fields() {
        let config: DbConfig = serde_json::from_str(
            r#"{
                "connectionURI": "postgres://localhost/tollgate",
                "caching": {"enabled": true, "expirationSec": 30},
                "maxConnection": 5,
                "expirationWindow": 3,
                "renewalWindow": 10
            }"#,
        )
        .unwrap();

        assert_eq!(config.connection_uri, "postgres://localhost/tollgate");
        assert!(config.caching.enabled);
        assert_eq!(config.caching.expiration_sec, 30);
        assert_eq!(config.max_connection, 5);
        assert_eq!(config.expiration_window, 3);
        assert_eq!(config.renewal_window, 10);
    }

    #[test]
    fn db_config_defaults() {
        let config: DbConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_connection, 100);
        assert_eq!(config.expiration_window, 7);
        assert_eq!(config.renewal_window, 30);
        assert!(!config.caching.enabled);
    }
}
