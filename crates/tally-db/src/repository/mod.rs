//! # Repository Module
//!
//! Database repository implementations for tally records.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Caller                                                                │
//! │       │                                                                 │
//! │       │  db.taxes().save(&mut tax)                                     │
//! │       ▼                                                                 │
//! │  TaxRepository                                                         │
//! │  ├── get / exists / all            (reads, all() is cached)            │
//! │  ├── save                          validate → invalidate → upsert      │
//! │  └── delete                        invalidate → DELETE                 │
//! │       │                                                                 │
//! │       │  SQL (bound parameters only)                                   │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TaxRepository`] - Tax rates, natural key `code`
//! - [`DeliveryNoteLineRepository`] - Lines, search and customer history
//! - [`SequenceRepository`] - Per fiscal year/series counters, reconciliation
//! - [`DeliveryNoteRepository`] - Delivery note headers
//! - [`FiscalYearRepository`], [`SeriesRepository`] - Master lists

pub mod delivery_note;
pub mod delivery_note_line;
pub mod fiscal_year;
pub mod sequence;
pub mod tax;

pub use delivery_note::DeliveryNoteRepository;
pub use delivery_note_line::{ArticleTotal, DeliveryNoteDirectory, DeliveryNoteLineRepository};
pub use fiscal_year::{FiscalYearRepository, SeriesRepository};
pub use sequence::{ReconciliationFailure, ReconciliationReport, SequenceRepository};
pub use tax::TaxRepository;

use tally_core::{Record, ValidationSettings};
use tracing::debug;

use crate::cache::ListCache;
use crate::error::{DbError, DbResult};

/// First half of every `save`: validate in place, then drop the cached
/// lists that contain the record. Nothing is touched when validation fails,
/// and a failed invalidation is returned before the caller writes.
pub(crate) async fn prepare_save<R: Record>(
    record: &mut R,
    settings: &ValidationSettings,
    cache: &ListCache,
) -> DbResult<()> {
    if let Err(errors) = record.validate(settings) {
        debug!(
            entity = R::ENTITY,
            key = ?record.key(),
            errors = %errors,
            "Validation failed, record not saved"
        );
        return Err(DbError::Validation(errors));
    }

    cache.invalidate(R::CACHE_KEYS).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_core::record::TAX_LIST_CACHE_KEY;

    use crate::cache::tests::StuckCache;
    use tally_core::Tax;

    #[tokio::test]
    async fn test_prepare_save_rejects_and_keeps_cache() {
        let cache = ListCache::in_memory();
        cache.store_list(TAX_LIST_CACHE_KEY, &[1]).await;

        let mut tax = Tax::new("", "", 0.0, 0.0);
        let err = prepare_save(&mut tax, &ValidationSettings::default(), &cache)
            .await
            .unwrap_err();

        let errors = err.validation_errors().unwrap();
        assert!(errors.has_field("code"));
        assert!(errors.has_field("description"));
        assert!(cache.fetch::<i32>(TAX_LIST_CACHE_KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_prepare_save_invalidates_on_success() {
        let cache = ListCache::in_memory();
        cache.store_list(TAX_LIST_CACHE_KEY, &[1]).await;

        let mut tax = Tax::new("IVA7", "IVA 7%", 7.0, 1.0);
        prepare_save(&mut tax, &ValidationSettings::default(), &cache)
            .await
            .unwrap();

        assert!(cache.fetch::<i32>(TAX_LIST_CACHE_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_prepare_save_fails_when_invalidation_fails() {
        let cache = ListCache::new(Arc::new(StuckCache::default()));
        cache.store_list(TAX_LIST_CACHE_KEY, &[1]).await;

        let mut tax = Tax::new("IVA7", "IVA 7%", 7.0, 1.0);
        let err = prepare_save(&mut tax, &ValidationSettings::default(), &cache)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Cache(_)));
    }
}
