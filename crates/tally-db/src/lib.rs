//! # tally-db: Database Layer for Tally
//!
//! Storage for tally records: SQLite through sqlx, a list cache in front of
//! the hot lists, and numbering sequence reconciliation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  Web request (edit tax, save delivery note line, ...)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ TaxRepo       │    │  (embedded)  │  │   │
//! │  │   │               │◄───│ LineRepo      │    │ 001_schema   │  │   │
//! │  │   │ SqlitePool    │    │ SequenceRepo  │    │ 002_taxes    │  │   │
//! │  │   │ ListCache     │    └───────────────┘    └──────────────┘  │   │
//! │  │   └───────────────┘                                            │   │
//! │  │          ▲                                                      │   │
//! │  │          │  TallyConfig (tally.toml + TALLY_* env)              │   │
//! │  └──────────┴──────────────────────────────────────────────────────┘   │
//! │       │                              │                                  │
//! │       ▼                              ▼                                  │
//! │  SQLite file                  memory / Redis list cache                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository access
//! - [`config`] - TOML / environment configuration
//! - [`cache`] - List cache backends
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, TallyConfig};
//!
//! let config = TallyConfig::load(None)?;
//! let db = Database::from_config(&config).await?;
//!
//! let iva = db.taxes().get("IVA21").await?;
//! let report = db.sequences().check().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{CacheStore, InMemoryCache, ListCache};
pub use config::{CacheBackend, TallyConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

#[cfg(feature = "redis")]
pub use cache::RedisCache;

// Repository re-exports for convenience
pub use repository::{
    ArticleTotal, DeliveryNoteDirectory, DeliveryNoteLineRepository, DeliveryNoteRepository,
    FiscalYearRepository, ReconciliationFailure, ReconciliationReport, SequenceRepository,
    SeriesRepository, TaxRepository,
};
