//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Application startup                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TallyConfig::load(..) ← tally.toml + TALLY_* overrides                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::from_config(&config).await ← pool + migrations + cache      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌──────────────────┐    │
//! │  │            SqlitePool                    │   │    ListCache     │    │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │   │ memory | redis   │    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │   └──────────────────┘    │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.taxes() / db.delivery_note_lines() / db.sequences() / ...          │
//! │  (each repository shares the pool and the cache)                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for file databases so
//! readers don't block writers and writers don't block readers.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tally_core::ValidationSettings;
use tracing::{debug, info};

use crate::cache::{CacheStore, ListCache};
use crate::config::TallyConfig;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::delivery_note::DeliveryNoteRepository;
use crate::repository::delivery_note_line::DeliveryNoteLineRepository;
use crate::repository::fiscal_year::{FiscalYearRepository, SeriesRepository};
use crate::repository::sequence::SequenceRepository;
use crate::repository::tax::TaxRepository;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/tally.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes. Ignored for in-memory databases.
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Schema and default taxes are installed, nothing is shared
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    /// True for `:memory:` databases.
    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY_PATH)
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        if self.is_in_memory() {
            // The whole database lives in the single pooled connection
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
                .foreign_keys(true);
            return Ok(options);
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.database_path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .create_if_missing(true);

        Ok(options)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cloning is cheap: the pool and the cache are shared.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::from_config(&TallyConfig::load(None)?).await?;
///
/// let taxes = db.taxes().all().await?;
/// let report = db.sequences().check().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// List cache shared by every repository.
    cache: ListCache,

    /// Rules applied when records are validated.
    settings: ValidationSettings,

    /// Page size of paginated finders.
    item_limit: u32,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite (WAL, NORMAL synchronous, foreign keys)
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled), which also installs default taxes
    ///
    /// The returned handle uses an in-memory list cache and default
    /// validation settings. See [`Database::from_config`].
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        pool_options = if config.is_in_memory() {
            // Closing the only connection would drop the database
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.idle_timeout(Some(config.idle_timeout))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            cache: ListCache::in_memory(),
            settings: ValidationSettings::default(),
            item_limit: tally_core::DEFAULT_ITEM_LIMIT,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Opens the database described by a [`TallyConfig`], with the
    /// configured cache backend and record settings.
    pub async fn from_config(config: &TallyConfig) -> DbResult<Self> {
        let cache = config.build_cache().await?;

        let db = Database::new(config.db_config())
            .await?
            .with_cache(cache)
            .with_settings(config.validation_settings())
            .with_item_limit(config.records.item_limit);

        Ok(db)
    }

    /// Replaces the list cache backend.
    pub fn with_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = ListCache::new(store);
        self
    }

    /// Replaces the validation settings.
    pub fn with_settings(mut self, settings: ValidationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the page size of paginated finders.
    pub fn with_item_limit(mut self, item_limit: u32) -> Self {
        self.item_limit = item_limit;
        self
    }

    /// Runs database migrations.
    ///
    /// Idempotent: already applied migrations are skipped.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// For queries not covered by repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the shared list cache.
    pub fn cache(&self) -> &ListCache {
        &self.cache
    }

    /// Returns the validation settings in use.
    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Returns the tax repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let iva = db.taxes().get("IVA21").await?;
    /// ```
    pub fn taxes(&self) -> TaxRepository {
        TaxRepository::new(self.pool.clone(), self.cache.clone())
    }

    /// Returns the delivery note line repository.
    pub fn delivery_note_lines(&self) -> DeliveryNoteLineRepository {
        DeliveryNoteLineRepository::new(
            self.pool.clone(),
            self.cache.clone(),
            self.settings.clone(),
            self.item_limit,
        )
    }

    /// Returns the numbering sequence repository.
    pub fn sequences(&self) -> SequenceRepository {
        SequenceRepository::new(self.pool.clone(), self.cache.clone())
    }

    /// Returns the delivery note header repository.
    pub fn delivery_notes(&self) -> DeliveryNoteRepository {
        DeliveryNoteRepository::new(self.pool.clone())
    }

    /// Returns the fiscal year repository.
    pub fn fiscal_years(&self) -> FiscalYearRepository {
        FiscalYearRepository::new(self.pool.clone())
    }

    /// Returns the series repository.
    pub fn series(&self) -> SeriesRepository {
        SeriesRepository::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
