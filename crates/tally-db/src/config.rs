//! # Tally Configuration
//!
//! Settings for the storage layer: where the database lives, which cache
//! backend to use and how records are validated and paginated.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │     TALLY_CACHE_BACKEND=redis                                          │
//! │     TALLY_REDIS_URL=redis://127.0.0.1/                                 │
//! │     TALLY_ITEM_LIMIT=25                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/org.tally.tally/tally.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "tally.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [cache]
//! backend = "memory"   # memory | redis
//! redis_url = "redis://127.0.0.1/"
//!
//! [records]
//! item_limit = 50
//! amount_decimals = 2
//! delivery_note_label = "delivery note"
//! default_tax = "IVA21"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tally_core::ValidationSettings;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, InMemoryCache};
use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Cache Backend
// =============================================================================

/// Where cached lists are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local map.
    #[default]
    Memory,

    /// Shared Redis server (`redis` feature).
    Redis,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(DbError::Config(format!(
                "Unknown cache backend: '{}'. Valid options: memory, redis",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,
}

/// `[records]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSettings {
    /// Page size of paginated finders.
    #[serde(default = "default_item_limit")]
    pub item_limit: u32,

    /// Decimal places used when comparing amounts.
    #[serde(default = "default_amount_decimals")]
    pub amount_decimals: u32,

    /// Document name used in line validation messages.
    #[serde(default = "default_delivery_note_label")]
    pub delivery_note_label: String,

    /// Tax code preselected for new lines.
    #[serde(default = "default_tax")]
    pub default_tax: String,
}

fn default_item_limit() -> u32 {
    tally_core::DEFAULT_ITEM_LIMIT
}

fn default_amount_decimals() -> u32 {
    tally_core::amount::DEFAULT_AMOUNT_DECIMALS
}

fn default_delivery_note_label() -> String {
    "delivery note".to_string()
}

fn default_tax() -> String {
    "IVA21".to_string()
}

impl Default for RecordSettings {
    fn default() -> Self {
        RecordSettings {
            item_limit: default_item_limit(),
            amount_decimals: default_amount_decimals(),
            delivery_note_label: default_delivery_note_label(),
            default_tax: default_tax(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete storage-layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub records: RecordSettings,
}

impl TallyConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`tally.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading tally config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&contents).map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.connect_timeout_secs == 0 {
            return Err(DbError::Config(
                "database.connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.records.item_limit == 0 {
            return Err(DbError::Config(
                "records.item_limit must be greater than 0".into(),
            ));
        }

        if self.records.amount_decimals > 6 {
            return Err(DbError::Config(format!(
                "records.amount_decimals must be at most 6, got: {}",
                self.records.amount_decimals
            )));
        }

        if self.cache.backend == CacheBackend::Redis {
            match self.cache.redis_url.as_deref() {
                Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {}
                Some(url) => {
                    return Err(DbError::Config(format!(
                        "cache.redis_url must start with redis:// or rediss://, got: {}",
                        url
                    )))
                }
                None => {
                    return Err(DbError::Config(
                        "cache.redis_url is required for the redis backend".into(),
                    ))
                }
            }
        }

        Ok(())
    }

    /// Applies `TALLY_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(backend) = lookup("TALLY_CACHE_BACKEND") {
            match backend.parse() {
                Ok(parsed) => self.cache.backend = parsed,
                Err(_) => warn!(backend = %backend, "Unknown cache backend in environment"),
            }
        }

        if let Some(url) = lookup("TALLY_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }

        if let Some(limit) = lookup("TALLY_ITEM_LIMIT") {
            match limit.parse::<u32>() {
                Ok(n) => self.records.item_limit = n,
                Err(_) => warn!(limit = %limit, "Invalid item limit in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Pool configuration for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
    }

    /// Settings handed to record validation.
    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            amount_decimals: self.records.amount_decimals,
            delivery_note_label: self.records.delivery_note_label.clone(),
        }
    }

    /// Builds the configured cache backend, connecting to Redis if selected.
    pub async fn build_cache(&self) -> DbResult<Arc<dyn CacheStore>> {
        match self.cache.backend {
            CacheBackend::Memory => Ok(Arc::new(InMemoryCache::new())),
            #[cfg(feature = "redis")]
            CacheBackend::Redis => {
                let url = self.cache.redis_url.as_deref().ok_or_else(|| {
                    DbError::Config("cache.redis_url is required for the redis backend".into())
                })?;
                info!(url = %url, "Using Redis list cache");
                Ok(Arc::new(crate::cache::RedisCache::connect(url).await?))
            }
            #[cfg(not(feature = "redis"))]
            CacheBackend::Redis => Err(DbError::Config(
                "redis cache backend requested but tally-db was built without the `redis` feature"
                    .into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TallyConfig::default();
        assert_eq!(config.database.path, PathBuf::from("tally.db"));
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.records.item_limit, 50);
        assert_eq!(config.records.amount_decimals, 2);
        assert_eq!(config.records.delivery_note_label, "delivery note");
        assert_eq!(config.records.default_tax, "IVA21");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
        assert_eq!("REDIS".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert!("memcached".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\npath = \"/tmp/books.db\"\n\n[records]\nitem_limit = 20\ndelivery_note_label = \"albarán\""
        )
        .unwrap();

        let config = TallyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/books.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.connect_timeout_secs, 30);
        assert_eq!(config.records.item_limit, 20);
        assert_eq!(config.records.delivery_note_label, "albarán");
        assert_eq!(config.records.amount_decimals, 2);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[records]\nitem_limit = \"lots\"").unwrap();

        let err = TallyConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TALLY_DB_PATH", "/data/override.db"),
            ("TALLY_CACHE_BACKEND", "redis"),
            ("TALLY_REDIS_URL", "redis://cache:6379/"),
            ("TALLY_ITEM_LIMIT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = TallyConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/override.db"));
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379/"));
        // Unparseable values are ignored
        assert_eq!(config.records.item_limit, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = TallyConfig::default();
        config.records.item_limit = 0;
        assert!(config.validate().is_err());

        let mut config = TallyConfig::default();
        config.database.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = TallyConfig::default();
        config.cache.backend = CacheBackend::Redis;
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("http://cache".to_string());
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("redis://cache".to_string());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_conversions() {
        let mut config = TallyConfig::default();
        config.records.amount_decimals = 3;
        config.database.max_connections = 8;
        config.database.connect_timeout_secs = 2;

        let settings = config.validation_settings();
        assert_eq!(settings.amount_decimals, 3);
        assert_eq!(settings.delivery_note_label, "delivery note");
        let db_config = config.db_config();
        assert_eq!(db_config.max_connections, 8);
        assert_eq!(db_config.connect_timeout, Duration::from_secs(2));
        assert!(config.build_cache().await.is_ok());
    }
}
