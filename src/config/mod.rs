//! Configuration management
//!
//! Configuration is read from `config.yml` and then overridden by
//! `ECOLEARN_*` environment variables. Missing values fall back to defaults,
//! so an absent or empty file still yields a runnable server.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Token issuing configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration (SQLite)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path or `sqlite:` URL; `:memory:` for an in-process database
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/ecolearn.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds for entries stored without an explicit TTL
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_capacity() -> u64 {
    10_000
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime in minutes
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    /// Refresh token lifetime in days
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_minutes: default_access_token_minutes(),
            refresh_token_days: default_refresh_token_days(),
        }
    }
}

fn default_jwt_secret() -> String {
    "ecolearn-development-secret".to_string()
}

fn default_access_token_minutes() -> i64 {
    60
}

fn default_refresh_token_days() -> i64 {
    7
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration. Invalid YAML
    /// is reported with its line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - ECOLEARN_SERVER_HOST, ECOLEARN_SERVER_PORT, ECOLEARN_SERVER_CORS_ORIGIN
    /// - ECOLEARN_DATABASE_URL, ECOLEARN_DATABASE_MAX_CONNECTIONS
    /// - ECOLEARN_CACHE_TTL_SECONDS
    /// - ECOLEARN_AUTH_JWT_SECRET, ECOLEARN_AUTH_ACCESS_TOKEN_MINUTES,
    ///   ECOLEARN_AUTH_REFRESH_TOKEN_DAYS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }
        if self.auth.access_token_minutes <= 0 || self.auth.refresh_token_days <= 0 {
            return Err(ConfigError::ValidationError(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides; unparsable numbers are ignored
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ECOLEARN_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("ECOLEARN_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(cors_origin) = std::env::var("ECOLEARN_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("ECOLEARN_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = env_parse::<u32>("ECOLEARN_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = max;
        }

        if let Some(ttl) = env_parse::<u64>("ECOLEARN_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl;
        }

        if let Ok(secret) = std::env::var("ECOLEARN_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(minutes) = env_parse::<i64>("ECOLEARN_AUTH_ACCESS_TOKEN_MINUTES") {
            self.auth.access_token_minutes = minutes;
        }
        if let Some(days) = env_parse::<i64>("ECOLEARN_AUTH_REFRESH_TOKEN_DAYS") {
            self.auth.refresh_token_days = days;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "ECOLEARN_SERVER_HOST",
    "ECOLEARN_SERVER_PORT",
    "ECOLEARN_SERVER_CORS_ORIGIN",
    "ECOLEARN_DATABASE_URL",
    "ECOLEARN_DATABASE_MAX_CONNECTIONS",
    "ECOLEARN_CACHE_TTL_SECONDS",
    "ECOLEARN_AUTH_JWT_SECRET",
    "ECOLEARN_AUTH_ACCESS_TOKEN_MINUTES",
    "ECOLEARN_AUTH_REFRESH_TOKEN_DAYS",
];

#[cfg(test)]
fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_ecolearn_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.url, "data/ecolearn.db");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.auth.access_token_minutes, 60);
        assert_eq!(config.auth.refresh_token_days, 7);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 3000\nauth:\n  refresh_token_days: 30\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.refresh_token_days, 30);
        assert_eq!(config.auth.access_token_minutes, 60);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
  cors_origin: "https://ecolearn.example"
database:
  url: "sqlite:/var/lib/ecolearn/app.db"
  max_connections: 5
cache:
  ttl_seconds: 60
  max_capacity: 500
auth:
  jwt_secret: "s3cret"
  access_token_minutes: 15
  refresh_token_days: 14
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.cors_origin, "https://ecolearn.example");
        assert_eq!(config.database.url, "sqlite:/var/lib/ecolearn/app.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.cache.max_capacity, 500);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.access_token_minutes, 15);
        assert_eq!(config.auth.refresh_token_days, 14);
    }

    #[test]
    fn test_load_invalid_yaml_reports_location() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err().to_string();
        assert!(err.contains("parse"));
        assert!(err.contains("line"));
    }

    #[test]
    fn test_load_rejects_empty_secret() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "auth:\n  jwt_secret: \"\"\n").unwrap();

        let err = Config::load(file.path()).unwrap_err().to_string();
        assert!(err.contains("jwt_secret"));
    }

    #[test]
    fn test_env_override_server_and_auth() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: \"0.0.0.0\"\n  port: 8000\n").unwrap();

        std::env::set_var("ECOLEARN_SERVER_HOST", "192.168.1.1");
        std::env::set_var("ECOLEARN_SERVER_PORT", "4000");
        std::env::set_var("ECOLEARN_AUTH_JWT_SECRET", "from-env");
        std::env::set_var("ECOLEARN_AUTH_ACCESS_TOKEN_MINUTES", "5");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.auth.access_token_minutes, 5);

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_database_and_cache() {
        let _guard = lock_env();

        let file = NamedTempFile::new().unwrap();
        std::env::set_var("ECOLEARN_DATABASE_URL", ":memory:");
        std::env::set_var("ECOLEARN_DATABASE_MAX_CONNECTIONS", "2");
        std::env::set_var("ECOLEARN_CACHE_TTL_SECONDS", "1800");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.database.url, ":memory:");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.cache.ttl_seconds, 1800);

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_invalid_number_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8000\n").unwrap();
        std::env::set_var("ECOLEARN_SERVER_PORT", "not_a_number");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 8000);

        std::env::remove_var("ECOLEARN_SERVER_PORT");
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            "[a-z][a-z0-9_/]{0,20}\\.db",
            1u64..=86400,
            "[A-Za-z0-9]{8,32}",
            1i64..=1440,
        )
            .prop_map(|(host, port, url, ttl_seconds, jwt_secret, minutes)| Config {
                server: ServerConfig {
                    host,
                    port,
                    cors_origin: default_cors_origin(),
                },
                database: DatabaseConfig {
                    url,
                    max_connections: 4,
                },
                cache: CacheConfig {
                    ttl_seconds,
                    max_capacity: 1000,
                },
                auth: AuthConfig {
                    jwt_secret,
                    access_token_minutes: minutes,
                    refresh_token_days: 7,
                },
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        /// Serialising a valid config to YAML and loading it back preserves every field.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).unwrap();
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.host, config.server.host);
            prop_assert_eq!(loaded.server.port, config.server.port);
            prop_assert_eq!(loaded.database.url, config.database.url);
            prop_assert_eq!(loaded.cache.ttl_seconds, config.cache.ttl_seconds);
            prop_assert_eq!(loaded.auth.jwt_secret, config.auth.jwt_secret);
            prop_assert_eq!(loaded.auth.access_token_minutes, config.auth.access_token_minutes);
        }

        /// Wrongly typed values are rejected rather than silently defaulted.
        #[test]
        fn malformed_values_are_errors(yaml in prop_oneof![
            Just("server:\n  port: true".to_string()),
            Just("server:\n  port: [1, 2]".to_string()),
            Just("cache:\n  ttl_seconds: -100".to_string()),
            Just("auth:\n  access_token_minutes: soon".to_string()),
            Just("database: \"just_a_string\"".to_string()),
        ]) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();
            prop_assert!(Config::load(file.path()).is_err());
        }
    }
}
