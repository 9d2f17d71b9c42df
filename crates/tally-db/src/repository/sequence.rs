//! # Sequence Repository
//!
//! Numbering counters per fiscal year and series.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      check()                                            │
//! │                                                                         │
//! │  fiscal_years.all() ─┐                                                 │
//! │                      ├── Err ──► abort, nothing created                │
//! │  series.all() ───────┘                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each (fiscal_year, series):                                       │
//! │       ├── record exists?  ── yes ──► keep it, counters untouched       │
//! │       └── no ──► save(SequenceRecord::new(..))                         │
//! │                   ├── Ok  ──► report.created += 1                      │
//! │                   └── Err ──► report.failures.push(..), warn!, go on   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tally_core::{Record, SequenceRecord, ValidationSettings};
use tracing::{debug, info, warn};

use super::fiscal_year::{FiscalYearRepository, SeriesRepository};
use super::prepare_save;
use crate::cache::ListCache;
use crate::error::{DbError, DbResult};

const SEQUENCE_COLUMNS: &str = r#"
    id, fiscal_year, series,
    customer_invoice, customer_delivery_note, customer_order, customer_quote,
    supplier_invoice, supplier_delivery_note, supplier_order, supplier_quote
"#;

// =============================================================================
// Reconciliation Report
// =============================================================================

/// A fiscal year/series pair whose record could not be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationFailure {
    pub fiscal_year: String,
    pub series: String,
    pub reason: String,
}

/// Outcome of [`SequenceRepository::check`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Pairs examined.
    pub examined: usize,

    /// Records created with every counter at 1.
    pub created: usize,

    pub failures: Vec<ReconciliationFailure>,
}

impl ReconciliationReport {
    /// True when no pair failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for numbering sequence records.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
    cache: ListCache,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool, cache: ListCache) -> Self {
        SequenceRepository { pool, cache }
    }

    /// Gets a record by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<SequenceRecord>> {
        let sql = format!("SELECT {} FROM fiscal_year_sequences WHERE id = ?1", SEQUENCE_COLUMNS);

        let record = sqlx::query_as::<_, SequenceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Gets the record of a fiscal year and series.
    pub async fn get_by_params(
        &self,
        fiscal_year: &str,
        series: &str,
    ) -> DbResult<Option<SequenceRecord>> {
        debug!(fiscal_year = %fiscal_year, series = %series, "Getting sequence record");

        let sql = format!(
            "SELECT {} FROM fiscal_year_sequences WHERE fiscal_year = ?1 AND series = ?2",
            SEQUENCE_COLUMNS
        );

        let record = sqlx::query_as::<_, SequenceRecord>(&sql)
            .bind(fiscal_year)
            .bind(series)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Every record of a fiscal year, by series.
    pub async fn all_from_fiscal_year(&self, fiscal_year: &str) -> DbResult<Vec<SequenceRecord>> {
        let sql = format!(
            "SELECT {} FROM fiscal_year_sequences WHERE fiscal_year = ?1 ORDER BY series",
            SEQUENCE_COLUMNS
        );

        let records = sqlx::query_as::<_, SequenceRecord>(&sql)
            .bind(fiscal_year)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// True when the record has an id and that row exists.
    pub async fn exists(&self, record: &SequenceRecord) -> DbResult<bool> {
        let Some(id) = record.id else {
            return Ok(false);
        };

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM fiscal_year_sequences WHERE id = ?1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    /// Validates and stores a record.
    ///
    /// Updates by id when possible, otherwise inserts and writes the new id
    /// back into `record`. Stored counters are never overwritten by an
    /// insert: a second record for a fiscal year and series that already
    /// has one is rejected.
    ///
    /// ## Returns
    /// * `Ok(())` - Stored
    /// * `Err(DbError::Validation)` - Rules failed, nothing written
    /// * `Err(DbError::UniqueViolation)` - The pair already has a record
    pub async fn save(&self, record: &mut SequenceRecord) -> DbResult<()> {
        prepare_save(record, &ValidationSettings::default(), &self.cache).await?;

        if let Some(id) = record.id {
            debug!(id = id, "Updating sequence record");

            let result = sqlx::query(
                r#"
                UPDATE fiscal_year_sequences SET
                    fiscal_year = ?1,
                    series = ?2,
                    customer_invoice = ?3,
                    customer_delivery_note = ?4,
                    customer_order = ?5,
                    customer_quote = ?6,
                    supplier_invoice = ?7,
                    supplier_delivery_note = ?8,
                    supplier_order = ?9,
                    supplier_quote = ?10
                WHERE id = ?11
                "#,
            )
            .bind(&record.fiscal_year)
            .bind(&record.series)
            .bind(record.customer_invoice)
            .bind(record.customer_delivery_note)
            .bind(record.customer_order)
            .bind(record.customer_quote)
            .bind(record.supplier_invoice)
            .bind(record.supplier_delivery_note)
            .bind(record.supplier_order)
            .bind(record.supplier_quote)
            .bind(id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(());
            }
        }

        debug!(
            fiscal_year = %record.fiscal_year,
            series = %record.series,
            "Inserting sequence record"
        );

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO fiscal_year_sequences (
                fiscal_year, series,
                customer_invoice, customer_delivery_note, customer_order, customer_quote,
                supplier_invoice, supplier_delivery_note, supplier_order, supplier_quote
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING id
            "#,
        )
        .bind(&record.fiscal_year)
        .bind(&record.series)
        .bind(record.customer_invoice)
        .bind(record.customer_delivery_note)
        .bind(record.customer_order)
        .bind(record.customer_quote)
        .bind(record.supplier_invoice)
        .bind(record.supplier_delivery_note)
        .bind(record.supplier_order)
        .bind(record.supplier_quote)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(
                "fiscal_year, series",
                format!("{}/{}", record.fiscal_year, record.series),
            ),
            other => other,
        })?;

        record.id = Some(id);
        Ok(())
    }

    /// Deletes a record.
    pub async fn delete(&self, record: &SequenceRecord) -> DbResult<bool> {
        let Some(id) = record.id else {
            return Ok(false);
        };

        self.cache.invalidate(SequenceRecord::CACHE_KEYS).await?;
        debug!(id = id, "Deleting sequence record");

        let result = sqlx::query("DELETE FROM fiscal_year_sequences WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Creates the missing record of every fiscal year × series pair.
    ///
    /// Existing records are left alone. A pair that cannot be created is
    /// reported and skipped; only failing to read the master lists is an
    /// error.
    pub async fn check(&self) -> DbResult<ReconciliationReport> {
        let fiscal_years = FiscalYearRepository::new(self.pool.clone()).all().await?;
        let series_list = SeriesRepository::new(self.pool.clone()).all().await?;

        info!(
            fiscal_years = fiscal_years.len(),
            series = series_list.len(),
            "Reconciling numbering sequences"
        );

        let mut report = ReconciliationReport::default();

        for year in &fiscal_years {
            for series in &series_list {
                report.examined += 1;

                match self.ensure(&year.code, &series.code).await {
                    Ok(true) => report.created += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            fiscal_year = %year.code,
                            series = %series.code,
                            error = %e,
                            "Could not create sequence record"
                        );
                        report.failures.push(ReconciliationFailure {
                            fiscal_year: year.code.clone(),
                            series: series.code.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            created = report.created,
            failed = report.failures.len(),
            "Sequence reconciliation finished"
        );
        Ok(report)
    }

    /// Creates the record of one pair when missing. `Ok(true)` if created.
    async fn ensure(&self, fiscal_year: &str, series: &str) -> DbResult<bool> {
        if self.get_by_params(fiscal_year, series).await?.is_some() {
            return Ok(false);
        }

        let mut record = SequenceRecord::new(fiscal_year, series);
        self.save(&mut record).await?;
        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
