//! Configuration management
//!
//! Configuration is read from `config.yml` and can be overridden with
//! `MOIGORODA_*` environment variables. Missing sections and keys fall back
//! to defaults, so an absent or empty file yields a runnable setup
//! (SQLite in `data/moi-goroda.db`, port 8080).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
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
    /// Allowed origin for cross-site calls to the JSON API
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
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Connection URL or SQLite file path
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/moi-goroda.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// In-process cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default entry lifetime in seconds
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
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Login session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a sign-in stays valid
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,
    /// Add the `Secure` attribute to the session cookie
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_days: default_expiration_days(),
            secure_cookie: false,
        }
    }
}

fn default_expiration_days() -> i64 {
    14
}

/// Site metadata exposed to templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Absolute base URL used for share links
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            base_url: default_base_url(),
        }
    }
}

fn default_site_name() -> String {
    "Мои города".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Template location
///
/// Templates are compiled into the binary. Setting `path` loads them from
/// that directory instead, which is handy while editing markup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
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
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the defaults. Malformed YAML is an
    /// error carrying the line and column of the problem.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
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

    /// Load configuration from file and apply environment overrides.
    ///
    /// Recognized variables:
    /// - `MOIGORODA_SERVER_HOST`, `MOIGORODA_SERVER_PORT`
    /// - `MOIGORODA_DATABASE_DRIVER`, `MOIGORODA_DATABASE_URL`
    /// - `MOIGORODA_CACHE_TTL_SECONDS`
    /// - `MOIGORODA_SESSION_EXPIRATION_DAYS`
    /// - `MOIGORODA_SITE_BASE_URL`
    /// - `MOIGORODA_TEMPLATES_PATH`
    ///
    /// Values that fail to parse are ignored.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "session.expiration_days must be positive".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MOIGORODA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MOIGORODA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("MOIGORODA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("MOIGORODA_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("MOIGORODA_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(days) = std::env::var("MOIGORODA_SESSION_EXPIRATION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                if days > 0 {
                    self.session.expiration_days = days;
                }
            }
        }

        if let Ok(base_url) = std::env::var("MOIGORODA_SITE_BASE_URL") {
            self.site.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(path) = std::env::var("MOIGORODA_TEMPLATES_PATH") {
            if !path.is_empty() {
                self.templates.path = Some(PathBuf::from(path));
            }
        }
    }
}

fn format_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(location) => format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        ),
        None => e.to_string(),
    }
}

// Tests touching process environment share this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn server_strategy() -> impl Strategy<Value = ServerConfig> {
        ("[a-z]{1,10}(\\.[a-z]{1,10}){0,2}", 1u16..=65535).prop_map(|(host, port)| ServerConfig {
            host,
            port,
            cors_origin: default_cors_origin(),
        })
    }

    fn config_strategy() -> impl Strategy<Value = Config> {
        (
            server_strategy(),
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z]{1,12}\\.db",
            1u64..86_400,
            1i64..365,
        )
            .prop_map(|(server, driver, url, ttl, days)| Config {
                server,
                database: DatabaseConfig { driver, url },
                cache: CacheConfig {
                    ttl_seconds: ttl,
                    max_capacity: default_max_capacity(),
                },
                session: SessionConfig {
                    expiration_days: days,
                    secure_cookie: false,
                },
                ..Config::default()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn yaml_roundtrip_preserves_fields(config in config_strategy()) {
            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.server.host, config.server.host);
            prop_assert_eq!(parsed.server.port, config.server.port);
            prop_assert_eq!(parsed.database.driver, config.database.driver);
            prop_assert_eq!(parsed.database.url, config.database.url);
            prop_assert_eq!(parsed.cache.ttl_seconds, config.cache.ttl_seconds);
            prop_assert_eq!(parsed.session.expiration_days, config.session.expiration_days);
        }

        #[test]
        fn missing_sections_use_defaults(port in 1u16..=65535) {
            let yaml = format!("server:\n  port: {}\n", port);
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.database.url, default_database_url());
            prop_assert_eq!(parsed.session.expiration_days, default_expiration_days());
        }
    }
}
