//! Service configuration
//!
//! Configuration is read from a TOML file and then overridden by environment
//! variables, so a managed deployment only needs to export the Redis
//! credentials.
//!
//! Load order:
//! 1. `BUSUANZI_CONFIG` environment variable (path to TOML file)
//! 2. `./busuanzi.toml` in the current directory
//! 3. Default configuration
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8080"
//!
//! [store]
//! host = "redis.internal"
//! port = 6380
//! tls = true
//!
//! [legacy]
//! max_attempts = 3
//! retry_backoff_ms = 1000
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "BUSUANZI_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "busuanzi.toml";

/// 30 days, the lifetime of every cache entry and counter
pub const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24 * 30;

/// Legacy provider endpoint
pub const DEFAULT_LEGACY_ENDPOINT: &str = "https://busuanzi.ibruce.info/busuanzi";

/// Callback name the legacy provider wraps its payload in
pub const DEFAULT_LEGACY_CALLBACK: &str = "BusuanziCallback_777487655111";

/// Session cookie the legacy provider's tracking protocol expects
pub const DEFAULT_LEGACY_COOKIE: &str = "busuanziId=89D15D1F66D2494F91FB315545BF9C2A";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP gateway settings
    pub server: ServerSettings,
    /// Counter store settings
    pub store: StoreConfig,
    /// Legacy provider settings
    pub legacy: LegacyConfig,
    /// Background reconciler settings
    pub reconciler: ReconcilerConfig,
}

/// HTTP gateway settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// HTTP server address
    pub listen_addr: String,
    /// `version` field reported in the JSONP payload
    pub response_version: f64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            response_version: 2.4,
        }
    }
}

/// Which counter store implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Managed Redis
    Redis,
    /// Process-local store, for development only
    Memory,
}

/// Counter store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// Redis host
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Redis password
    pub password: Option<String>,
    /// Redis database index
    pub db: u8,
    /// Connect over TLS
    pub tls: bool,
    /// Number of pooled connections
    pub pool_size: usize,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-command timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Expiry applied to caches and counters, in seconds
    pub ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            tls: true,
            pool_size: 8,
            connect_timeout_ms: 5_000,
            command_timeout_ms: 2_000,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl StoreConfig {
    /// Expiry applied to caches and counters
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Connection establishment timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-command timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Legacy provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Consult the legacy provider at all; disabling completes the migration
    pub enabled: bool,
    /// Provider endpoint, without query string
    pub endpoint: String,
    /// Callback name sent as `jsonpCallback`
    pub callback: String,
    /// Tracking cookie sent with every request
    pub cookie: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Attempts per lookup before falling back to zero
    pub max_attempts: u32,
    /// Pause between failed attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_LEGACY_ENDPOINT.to_string(),
            callback: DEFAULT_LEGACY_CALLBACK.to_string(),
            cookie: DEFAULT_LEGACY_COOKIE.to_string(),
            timeout_ms: 3_000,
            max_attempts: 3,
            retry_backoff_ms: 1_000,
        }
    }
}

impl LegacyConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause between failed attempts
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Background reconciler settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Delay before each notification, in milliseconds
    pub delay_ms: u64,
    /// Pending notifications held before new ones are dropped
    pub queue_capacity: usize,
    /// Time allowed to flush pending notifications at shutdown, in milliseconds
    pub drain_timeout_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            queue_capacity: 1024,
            drain_timeout_ms: 5_000,
        }
    }
}

impl ReconcilerConfig {
    /// Delay before each notification
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Time allowed to flush pending notifications at shutdown
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from file (if any) and the process environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            match Self::from_file(&path) {
                Ok(config) => {
                    info!(path = %path, "Loaded configuration from file");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load config file, using defaults");
                }
            }
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            match Self::from_file(DEFAULT_CONFIG_FILE) {
                Ok(config) => {
                    info!("Loaded configuration from {}", DEFAULT_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse {}, using defaults", DEFAULT_CONFIG_FILE);
                }
            }
        }

        info!("Using default configuration");
        Self::default()
    }

    /// Parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Apply `REDIS_*` and `LISTEN_ADDR` overrides using `lookup` to read
    /// variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REDIS_HOST") {
            self.store.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT") {
            self.store.port = port
                .parse()
                .map_err(|_| Error::Configuration(format!("invalid REDIS_PORT: {}", port)))?;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.store.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Some(db) = lookup("REDIS_DB") {
            self.store.db = db
                .parse()
                .map_err(|_| Error::Configuration(format!("invalid REDIS_DB: {}", db)))?;
        }
        if let Some(tls) = lookup("REDIS_TLS") {
            self.store.tls = !matches!(tls.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }
        if let Some(addr) = lookup("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.store.ttl_secs == 0 {
            return Err(Error::Configuration("store.ttl_secs must be > 0".into()));
        }
        if self.store.pool_size == 0 {
            return Err(Error::Configuration("store.pool_size must be > 0".into()));
        }
        if self.legacy.max_attempts == 0 {
            return Err(Error::Configuration("legacy.max_attempts must be > 0".into()));
        }
        if self.legacy.callback.is_empty() {
            return Err(Error::Configuration("legacy.callback must not be empty".into()));
        }
        if self.reconciler.queue_capacity == 0 {
            return Err(Error::Configuration(
                "reconciler.queue_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.ttl(), Duration::from_secs(2_592_000));
        assert!(config.store.tls);
        assert_eq!(config.legacy.max_attempts, 3);
        assert_eq!(config.legacy.timeout(), Duration::from_secs(3));
        assert_eq!(config.legacy.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.reconciler.delay(), Duration::from_millis(500));
        assert_eq!(config.server.response_version, 2.4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
listen_addr = "127.0.0.1:9000"

[store]
backend = "memory"
ttl_secs = 60

[legacy]
enabled = false
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.ttl_secs, 60);
        assert!(!config.legacy.enabled);
        // Untouched sections keep their defaults
        assert_eq!(config.legacy.max_attempts, 3);
        assert_eq!(config.reconciler.queue_capacity, 1024);
    }

    #[test]
    fn test_config_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\nport = \"not a port\"").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REDIS_HOST", "cache.example.net"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "secret"),
            ("REDIS_DB", "2"),
            ("REDIS_TLS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.store.host, "cache.example.net");
        assert_eq!(config.store.port, 6380);
        assert_eq!(config.store.password.as_deref(), Some("secret"));
        assert_eq!(config.store.db, 2);
        assert!(!config.store.tls);
    }

    #[test]
    fn test_env_override_rejects_bad_port() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|name| (name == "REDIS_PORT").then(|| "abc".to_string()));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        config.legacy.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.store.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.reconciler.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
