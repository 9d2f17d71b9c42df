//! # Tax Repository
//!
//! Database operations for tax rates.
//!
//! ## Key Operations
//! - Lookup by code or by rate
//! - Cached full list, most expensive rate first
//! - Upsert on the natural key `code`
//!
//! ## Cache Coherence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  all()     ──► "taxes:all" hit?  ── yes ──► cached Vec<Tax>            │
//! │                      │ no                                              │
//! │                      ▼                                                 │
//! │            SELECT .. ORDER BY rate DESC ──► store "taxes:all"          │
//! │                                                                         │
//! │  save()    ──► validate ──► delete "taxes:all" ──► INSERT .. ON CONFLICT│
//! │  delete()  ──► delete "taxes:all" ──► DELETE                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tally_core::record::TAX_LIST_CACHE_KEY;
use tally_core::{Record, Tax, ValidationSettings};
use tracing::debug;

use super::prepare_save;
use crate::cache::ListCache;
use crate::error::DbResult;

/// Repository for tax database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.taxes();
///
/// let iva = repo.get("IVA21").await?;
/// let all = repo.all().await?;  // cached
/// ```
#[derive(Debug, Clone)]
pub struct TaxRepository {
    pool: SqlitePool,
    cache: ListCache,
}

impl TaxRepository {
    /// Creates a new TaxRepository.
    pub fn new(pool: SqlitePool, cache: ListCache) -> Self {
        TaxRepository { pool, cache }
    }

    /// Gets a tax by its code.
    ///
    /// ## Returns
    /// * `Ok(Some(Tax))` - Tax found
    /// * `Ok(None)` - No tax with that code
    pub async fn get(&self, code: &str) -> DbResult<Option<Tax>> {
        let code = code.trim();
        debug!(code = %code, "Getting tax");

        let tax = sqlx::query_as::<_, Tax>(
            r#"
            SELECT code, sales_account, purchase_account, description, rate, surcharge
            FROM taxes
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tax)
    }

    /// Gets the first tax (by code) with the given rate.
    pub async fn get_by_rate(&self, rate: f64) -> DbResult<Option<Tax>> {
        debug!(rate = rate, "Getting tax by rate");

        let tax = sqlx::query_as::<_, Tax>(
            r#"
            SELECT code, sales_account, purchase_account, description, rate, surcharge
            FROM taxes
            WHERE rate = ?1
            ORDER BY code
            LIMIT 1
            "#,
        )
        .bind(rate)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tax)
    }

    /// True when a row with the tax's code exists.
    ///
    /// A transient tax (blank code) never exists.
    pub async fn exists(&self, tax: &Tax) -> DbResult<bool> {
        let Some(code) = tax.key() else {
            return Ok(false);
        };

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM taxes WHERE code = ?1)")
            .bind(&code)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    /// Returns every tax, highest rate first.
    ///
    /// Served from the list cache when possible.
    pub async fn all(&self) -> DbResult<Vec<Tax>> {
        if let Some(taxes) = self.cache.fetch::<Tax>(TAX_LIST_CACHE_KEY).await {
            return Ok(taxes);
        }

        let taxes = sqlx::query_as::<_, Tax>(
            r#"
            SELECT code, sales_account, purchase_account, description, rate, surcharge
            FROM taxes
            ORDER BY rate DESC, code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = taxes.len(), "Loaded tax list");
        self.cache.store_list(TAX_LIST_CACHE_KEY, &taxes).await;

        Ok(taxes)
    }

    /// Validates and stores a tax.
    ///
    /// The code is trimmed and the description sanitised in place. Inserts a
    /// new row or updates the existing one with the same code.
    ///
    /// ## Returns
    /// * `Ok(())` - Stored
    /// * `Err(DbError::Validation)` - Rules failed, nothing written
    /// * `Err(DbError::Cache)` - Cached list could not be dropped, nothing written
    pub async fn save(&self, tax: &mut Tax) -> DbResult<()> {
        prepare_save(tax, &ValidationSettings::default(), &self.cache).await?;

        debug!(code = %tax.code, rate = tax.rate, "Saving tax");

        sqlx::query(
            r#"
            INSERT INTO taxes (code, sales_account, purchase_account, description, rate, surcharge)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(code) DO UPDATE SET
                sales_account = excluded.sales_account,
                purchase_account = excluded.purchase_account,
                description = excluded.description,
                rate = excluded.rate,
                surcharge = excluded.surcharge
            "#,
        )
        .bind(&tax.code)
        .bind(&tax.sales_account)
        .bind(&tax.purchase_account)
        .bind(&tax.description)
        .bind(tax.rate)
        .bind(tax.surcharge)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a tax.
    ///
    /// ## Returns
    /// * `Ok(true)` - Row removed
    /// * `Ok(false)` - Transient tax or no such row
    pub async fn delete(&self, tax: &Tax) -> DbResult<bool> {
        let Some(code) = tax.key() else {
            return Ok(false);
        };

        self.cache.invalidate(Tax::CACHE_KEYS).await?;
        debug!(code = %code, "Deleting tax");

        let result = sqlx::query("DELETE FROM taxes WHERE code = ?1")
            .bind(&code)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cache::tests::StuckCache;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use tally_core::Tax;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_default_taxes_installed() {
        let db = db().await;

        let iva = db.taxes().get("IVA21").await.unwrap().unwrap();
        assert_eq!(iva.rate, 21.0);
        assert_eq!(iva.surcharge, 5.2);

        assert!(db.taxes().get("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_orders_by_rate_desc() {
        let db = db().await;

        let codes: Vec<String> = db
            .taxes()
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.code)
            .collect();

        assert_eq!(codes, vec!["IVA21", "IVA10", "IVA4", "IVA0"]);
    }

    #[tokio::test]
    async fn test_get_by_rate() {
        let db = db().await;

        let tax = db.taxes().get_by_rate(10.0).await.unwrap().unwrap();
        assert_eq!(tax.code, "IVA10");
        assert!(db.taxes().get_by_rate(99.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_save_does_not_touch_storage() {
        let db = db().await;
        let repo = db.taxes();

        let mut tax = Tax::new("WAY-TOO-LONG-CODE", "", 5.0, 0.0);
        let err = repo.save(&mut tax).await.unwrap_err();

        match err {
            DbError::Validation(errors) => {
                assert!(errors.has_field("code"));
                assert!(errors.has_field("description"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(repo.all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let db = db().await;
        let repo = db.taxes();

        let mut tax = Tax::new(" IVA7 ", "IVA <7>", 7.0, 1.0);
        repo.save(&mut tax).await.unwrap();
        assert_eq!(tax.code, "IVA7");
        assert_eq!(tax.description, "IVA &lt;7&gt;");
        assert!(repo.exists(&tax).await.unwrap());

        // Same record twice is the same row
        repo.save(&mut tax).await.unwrap();
        assert_eq!(repo.all().await.unwrap().len(), 5);

        tax.rate = 7.5;
        repo.save(&mut tax).await.unwrap();
        let stored = repo.get("IVA7").await.unwrap().unwrap();
        assert_eq!(stored.rate, 7.5);
        assert_eq!(stored, tax);
    }

    #[tokio::test]
    async fn test_all_reflects_mutations() {
        let db = db().await;
        let repo = db.taxes();

        // Prime the cache
        assert_eq!(repo.all().await.unwrap().len(), 4);

        let mut tax = Tax::new("IVA7", "IVA 7%", 7.0, 1.0);
        repo.save(&mut tax).await.unwrap();
        assert!(repo.all().await.unwrap().iter().any(|t| t.code == "IVA7"));

        assert!(repo.delete(&tax).await.unwrap());
        assert!(!repo.all().await.unwrap().iter().any(|t| t.code == "IVA7"));
        assert!(!repo.delete(&tax).await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_tax() {
        let db = db().await;
        let tax = Tax::default();

        assert!(!db.taxes().exists(&tax).await.unwrap());
        assert!(!db.taxes().delete(&tax).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_invalidation_blocks_the_write() {
        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_cache(Arc::new(StuckCache::default()));
        let repo = db.taxes();

        assert_eq!(repo.all().await.unwrap().len(), 4);

        let mut tax = Tax::new("IVA7", "IVA 7%", 7.0, 1.0);
        let err = repo.save(&mut tax).await.unwrap_err();
        assert!(matches!(err, DbError::Cache(_)));
        assert!(repo.get("IVA7").await.unwrap().is_none());

        let iva0 = repo.get("IVA0").await.unwrap().unwrap();
        assert!(matches!(repo.delete(&iva0).await, Err(DbError::Cache(_))));
        assert!(repo.exists(&iva0).await.unwrap());

        // The cached list still matches the table
        assert_eq!(repo.all().await.unwrap().len(), 4);
    }
}
