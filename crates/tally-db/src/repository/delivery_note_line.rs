//! # Delivery Note Line Repository
//!
//! Database operations for customer delivery note lines.
//!
//! ## Key Operations
//! - Save with total checks (update, or insert when no row matches)
//! - Free-text search over reference and description
//! - Customer history (search, notes filter, latest lines)
//! - Article statistics (distinct count, most delivered)
//!
//! ## Search Matching
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  query "12"       (numeric) ──► reference LIKE '%12%'                  │
//! │                                  OR description LIKE '%12%'            │
//! │                                                                         │
//! │  query "Red Box"  (text)    ──► lower(reference) LIKE '%red%box%'      │
//! │                                  OR lower(description) LIKE '%red%box%'│
//! │                                                                         │
//! │  always: ORDER BY delivery_note_id DESC, id ASC                        │
//! │          LIMIT item_limit OFFSET offset                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tally_core::record::TOP_ARTICLES_CACHE_KEY;
use tally_core::validation::{no_html, SearchPattern};
use tally_core::{DeliveryNote, DeliveryNoteLine, Record, ValidationSettings};
use tracing::debug;

use super::delivery_note::DeliveryNoteRepository;
use super::prepare_save;
use crate::cache::ListCache;
use crate::error::DbResult;

/// Customer name shown when a line's delivery note cannot be found.
pub const UNKNOWN_CUSTOMER: &str = "unknown";

/// Reference and delivered quantity, for article rankings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArticleTotal {
    pub reference: String,
    pub quantity: f64,
}

/// Repository for delivery note line database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.delivery_note_lines();
///
/// let mut line = DeliveryNoteLine { unit_price: 10.0, quantity: 3.0, ..Default::default() };
/// line.recalculate_totals();
/// repo.save(&mut line).await?;          // line.id is now set
///
/// let hits = repo.search("abc123", 0).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DeliveryNoteLineRepository {
    pool: SqlitePool,
    cache: ListCache,
    settings: ValidationSettings,
    item_limit: u32,
}

impl DeliveryNoteLineRepository {
    /// Creates a new DeliveryNoteLineRepository.
    pub fn new(
        pool: SqlitePool,
        cache: ListCache,
        settings: ValidationSettings,
        item_limit: u32,
    ) -> Self {
        DeliveryNoteLineRepository {
            pool,
            cache,
            settings,
            item_limit,
        }
    }

    /// Page size of the paginated finders.
    pub fn item_limit(&self) -> u32 {
        self.item_limit
    }

    /// Gets a line by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<DeliveryNoteLine>> {
        debug!(id = id, "Getting delivery note line");

        let line = sqlx::query_as::<_, DeliveryNoteLine>(
            "SELECT * FROM delivery_note_lines WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(line)
    }

    /// True when the line has an id and that row exists.
    pub async fn exists(&self, line: &DeliveryNoteLine) -> DbResult<bool> {
        let Some(id) = line.id else {
            return Ok(false);
        };

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM delivery_note_lines WHERE id = ?1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    /// Validates and stores a line.
    ///
    /// ## How It Works
    /// 1. Description sanitised, totals checked against price × quantity
    /// 2. Article ranking cache dropped
    /// 3. `UPDATE .. WHERE id = ?` when the line has an id
    /// 4. `INSERT .. RETURNING id` when it has none or no row matched;
    ///    the new id is written back into `line`
    ///
    /// ## Returns
    /// * `Ok(())` - Stored
    /// * `Err(DbError::Validation)` - Totals or text rules failed, nothing written
    pub async fn save(&self, line: &mut DeliveryNoteLine) -> DbResult<()> {
        prepare_save(line, &self.settings, &self.cache).await?;

        if let Some(id) = line.id {
            debug!(id = id, reference = ?line.reference, "Updating delivery note line");

            let result = sqlx::query(
                r#"
                UPDATE delivery_note_lines SET
                    order_line_id = ?1,
                    delivery_note_id = ?2,
                    order_id = ?3,
                    reference = ?4,
                    combination_code = ?5,
                    description = ?6,
                    quantity = ?7,
                    discount_pct = ?8,
                    tax_code = ?9,
                    tax_rate = ?10,
                    total = ?11,
                    total_without_discount = ?12,
                    unit_price = ?13,
                    withholding_pct = ?14,
                    surcharge_pct = ?15,
                    sort_order = ?16,
                    show_quantity = ?17,
                    show_price = ?18
                WHERE id = ?19
                "#,
            )
            .bind(line.order_line_id)
            .bind(line.delivery_note_id)
            .bind(line.order_id)
            .bind(&line.reference)
            .bind(&line.combination_code)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.discount_pct)
            .bind(&line.tax_code)
            .bind(line.tax_rate)
            .bind(line.total)
            .bind(line.total_without_discount)
            .bind(line.unit_price)
            .bind(line.withholding_pct)
            .bind(line.surcharge_pct)
            .bind(line.sort_order)
            .bind(line.show_quantity)
            .bind(line.show_price)
            .bind(id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(());
            }

            debug!(id = id, "No row with this id, inserting a new one");
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO delivery_note_lines (
                order_line_id, delivery_note_id, order_id, reference, combination_code,
                description, quantity, discount_pct, tax_code, tax_rate,
                total, total_without_discount, unit_price, withholding_pct, surcharge_pct,
                sort_order, show_quantity, show_price
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18
            )
            RETURNING id
            "#,
        )
        .bind(line.order_line_id)
        .bind(line.delivery_note_id)
        .bind(line.order_id)
        .bind(&line.reference)
        .bind(&line.combination_code)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.discount_pct)
        .bind(&line.tax_code)
        .bind(line.tax_rate)
        .bind(line.total)
        .bind(line.total_without_discount)
        .bind(line.unit_price)
        .bind(line.withholding_pct)
        .bind(line.surcharge_pct)
        .bind(line.sort_order)
        .bind(line.show_quantity)
        .bind(line.show_price)
        .fetch_one(&self.pool)
        .await?;

        debug!(id = id, reference = ?line.reference, "Inserted delivery note line");
        line.id = Some(id);

        Ok(())
    }

    /// Deletes a line.
    ///
    /// ## Returns
    /// * `Ok(true)` - Row removed
    /// * `Ok(false)` - Transient line or no such row
    pub async fn delete(&self, line: &DeliveryNoteLine) -> DbResult<bool> {
        let Some(id) = line.id else {
            return Ok(false);
        };

        self.cache.invalidate(DeliveryNoteLine::CACHE_KEYS).await?;
        debug!(id = id, "Deleting delivery note line");

        let result = sqlx::query("DELETE FROM delivery_note_lines WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Finders
    // =========================================================================

    /// Lines of one delivery note, in document order.
    pub async fn all_from_delivery_note(&self, delivery_note_id: i64) -> DbResult<Vec<DeliveryNoteLine>> {
        let lines = sqlx::query_as::<_, DeliveryNoteLine>(
            r#"
            SELECT * FROM delivery_note_lines
            WHERE delivery_note_id = ?1
            ORDER BY sort_order DESC, id ASC
            "#,
        )
        .bind(delivery_note_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(delivery_note_id = delivery_note_id, count = lines.len(), "Loaded delivery note lines");
        Ok(lines)
    }

    /// Lines of one article, newest delivery note first.
    pub async fn all_from_article(
        &self,
        reference: &str,
        offset: u32,
        limit: u32,
    ) -> DbResult<Vec<DeliveryNoteLine>> {
        let lines = sqlx::query_as::<_, DeliveryNoteLine>(
            r#"
            SELECT * FROM delivery_note_lines
            WHERE reference = ?1
            ORDER BY delivery_note_id DESC, id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(reference)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lines whose reference or description matches `query`.
    pub async fn search(&self, query: &str, offset: u32) -> DbResult<Vec<DeliveryNoteLine>> {
        let pattern = SearchPattern::from_query(query);
        debug!(pattern = %pattern.like(), offset = offset, "Searching delivery note lines");

        let sql = format!(
            r#"
            SELECT l.* FROM delivery_note_lines l
            WHERE {}
            ORDER BY l.delivery_note_id DESC, l.id ASC
            LIMIT ?2 OFFSET ?3
            "#,
            match_clause(&pattern)
        );

        let lines = sqlx::query_as::<_, DeliveryNoteLine>(&sql)
            .bind(pattern.like())
            .bind(self.item_limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = lines.len(), "Search returned lines");
        Ok(lines)
    }

    /// [`search`](Self::search) restricted to one customer's delivery notes.
    pub async fn search_from_customer(
        &self,
        customer_code: &str,
        query: &str,
        offset: u32,
    ) -> DbResult<Vec<DeliveryNoteLine>> {
        let pattern = SearchPattern::from_query(query);
        debug!(customer = %customer_code, pattern = %pattern.like(), "Searching customer lines");

        let sql = format!(
            r#"
            SELECT l.* FROM delivery_note_lines l
            INNER JOIN delivery_notes n ON n.id = l.delivery_note_id
            WHERE n.customer_code = ?4 AND ({})
            ORDER BY l.delivery_note_id DESC, l.id ASC
            LIMIT ?2 OFFSET ?3
            "#,
            match_clause(&pattern)
        );

        let lines = sqlx::query_as::<_, DeliveryNoteLine>(&sql)
            .bind(pattern.like())
            .bind(self.item_limit)
            .bind(offset)
            .bind(customer_code)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    /// Customer lines matching `reference` whose delivery note notes start
    /// with `notes_prefix` (case-insensitive).
    pub async fn search_from_customer_with_notes(
        &self,
        customer_code: &str,
        reference: &str,
        notes_prefix: &str,
        offset: u32,
    ) -> DbResult<Vec<DeliveryNoteLine>> {
        let pattern = SearchPattern::from_query(reference);
        let notes_like = format!("{}%", no_html(notes_prefix).to_lowercase());
        debug!(
            customer = %customer_code,
            pattern = %pattern.like(),
            notes = %notes_like,
            "Searching customer lines by notes"
        );

        let sql = format!(
            r#"
            SELECT l.* FROM delivery_note_lines l
            INNER JOIN delivery_notes n ON n.id = l.delivery_note_id
            WHERE n.customer_code = ?4
              AND lower(n.notes) LIKE ?5
              AND ({})
            ORDER BY l.delivery_note_id DESC, l.id ASC
            LIMIT ?2 OFFSET ?3
            "#,
            match_clause(&pattern)
        );

        let lines = sqlx::query_as::<_, DeliveryNoteLine>(&sql)
            .bind(pattern.like())
            .bind(self.item_limit)
            .bind(offset)
            .bind(customer_code)
            .bind(notes_like)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    /// Latest lines delivered to a customer.
    pub async fn last_from_customer(
        &self,
        customer_code: &str,
        offset: u32,
    ) -> DbResult<Vec<DeliveryNoteLine>> {
        let lines = sqlx::query_as::<_, DeliveryNoteLine>(
            r#"
            SELECT l.* FROM delivery_note_lines l
            INNER JOIN delivery_notes n ON n.id = l.delivery_note_id
            WHERE n.customer_code = ?1
            ORDER BY l.delivery_note_id DESC, l.id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(customer_code)
        .bind(self.item_limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    // =========================================================================
    // Article Statistics
    // =========================================================================

    /// Number of distinct article references on any line.
    pub async fn count_by_article(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT reference) FROM delivery_note_lines")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Most delivered articles by total quantity.
    ///
    /// The full ranking is cached; `limit` only truncates it.
    pub async fn top_articles(&self, limit: usize) -> DbResult<Vec<ArticleTotal>> {
        let mut ranking = match self.cache.fetch::<ArticleTotal>(TOP_ARTICLES_CACHE_KEY).await {
            Some(ranking) => ranking,
            None => {
                let ranking = sqlx::query_as::<_, ArticleTotal>(
                    r#"
                    SELECT reference, SUM(quantity) AS quantity
                    FROM delivery_note_lines
                    WHERE reference IS NOT NULL AND reference <> ''
                    GROUP BY reference
                    ORDER BY quantity DESC, reference ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?;

                self.cache.store_list(TOP_ARTICLES_CACHE_KEY, &ranking).await;
                ranking
            }
        };

        ranking.truncate(limit);
        Ok(ranking)
    }
}

/// WHERE fragment matching `?1` against reference and description.
fn match_clause(pattern: &SearchPattern) -> &'static str {
    if pattern.is_case_folded() {
        "lower(l.reference) LIKE ?1 OR lower(l.description) LIKE ?1"
    } else {
        "l.reference LIKE ?1 OR l.description LIKE ?1"
    }
}

// =============================================================================
// Delivery Note Directory
// =============================================================================

/// Request-scoped lookup of the delivery notes that lines belong to.
///
/// Each note is read at most once; misses are remembered too. Create one
/// per request and drop it afterwards.
///
/// ## Usage
/// ```rust,ignore
/// let notes = db.delivery_notes();
/// let mut directory = DeliveryNoteDirectory::new();
///
/// for line in &lines {
///     let code = directory.parent_code(&notes, line).await?;
///     let customer = directory.parent_customer_name(&notes, line).await?;
/// }
/// ```
#[derive(Debug, Default)]
pub struct DeliveryNoteDirectory {
    notes: HashMap<i64, Option<DeliveryNote>>,
}

impl DeliveryNoteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notes looked up so far (found or not).
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Returns the delivery note with `id`, loading it on first use.
    pub async fn resolve(
        &mut self,
        repo: &DeliveryNoteRepository,
        id: i64,
    ) -> DbResult<Option<&DeliveryNote>> {
        if !self.notes.contains_key(&id) {
            let note = repo.get(id).await?;
            self.notes.insert(id, note);
        }

        Ok(self.notes.get(&id).and_then(Option::as_ref))
    }

    async fn parent(
        &mut self,
        repo: &DeliveryNoteRepository,
        line: &DeliveryNoteLine,
    ) -> DbResult<Option<&DeliveryNote>> {
        match line.delivery_note_id {
            Some(id) => self.resolve(repo, id).await,
            None => Ok(None),
        }
    }

    /// Code of the line's delivery note.
    pub async fn parent_code(
        &mut self,
        repo: &DeliveryNoteRepository,
        line: &DeliveryNoteLine,
    ) -> DbResult<Option<String>> {
        Ok(self.parent(repo, line).await?.map(|note| note.code.clone()))
    }

    /// Date of the line's delivery note.
    pub async fn parent_date(
        &mut self,
        repo: &DeliveryNoteRepository,
        line: &DeliveryNoteLine,
    ) -> DbResult<Option<NaiveDate>> {
        Ok(self.parent(repo, line).await?.map(|note| note.date))
    }

    /// Customer of the line's delivery note, [`UNKNOWN_CUSTOMER`] when the
    /// note cannot be found.
    pub async fn parent_customer_name(
        &mut self,
        repo: &DeliveryNoteRepository,
        line: &DeliveryNoteLine,
    ) -> DbResult<String> {
        Ok(self
            .parent(repo, line)
            .await?
            .map(|note| note.customer_name.clone())
            .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn note(db: &Database, code: &str, customer: &str, notes: &str) -> i64 {
        let mut note = DeliveryNote {
            id: None,
            code: code.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            customer_code: Some(customer.to_string()),
            customer_name: format!("Customer {}", customer),
            notes: notes.to_string(),
        };
        db.delivery_notes().insert(&mut note).await.unwrap()
    }

    fn line(note_id: i64, reference: &str, description: &str, quantity: f64) -> DeliveryNoteLine {
        let mut line = DeliveryNoteLine {
            delivery_note_id: Some(note_id),
            reference: Some(reference.to_string()),
            description: description.to_string(),
            quantity,
            unit_price: 2.5,
            ..DeliveryNoteLine::default()
        };
        line.recalculate_totals();
        line
    }

    async fn saved(db: &Database, mut line: DeliveryNoteLine) -> DeliveryNoteLine {
        db.delivery_note_lines().save(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_totals_checked_before_save() {
        let db = db().await;
        let repo = db.delivery_note_lines();
        let note_id = note(&db, "A1", "C1", "").await;

        let mut line = DeliveryNoteLine {
            delivery_note_id: Some(note_id),
            reference: Some("ABC123".to_string()),
            unit_price: 10.0,
            quantity: 3.0,
            discount_pct: 10.0,
            ..DeliveryNoteLine::default()
        };
        line.recalculate_totals();
        assert_eq!(line.total, 27.0);
        assert_eq!(line.total_without_discount, 30.0);

        line.total = 25.0;
        let err = repo.save(&mut line).await.unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert!(errors.has_field("total"));
        assert!(!errors.has_field("total_without_discount"));
        assert!(line.id.is_none());
        assert!(repo.all_from_delivery_note(note_id).await.unwrap().is_empty());

        line.total = 27.0;
        repo.save(&mut line).await.unwrap();
        assert!(line.id.is_some());
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let db = db().await;
        let repo = db.delivery_note_lines();
        let note_id = note(&db, "A1", "C1", "").await;

        let mut line = line(note_id, "R1", "Red <box>", 2.0);
        repo.save(&mut line).await.unwrap();
        let id = line.id.unwrap();
        assert_eq!(line.description, "Red &lt;box&gt;");

        // Unchanged save keeps the row
        repo.save(&mut line).await.unwrap();
        assert_eq!(line.id, Some(id));

        line.quantity = 4.0;
        line.recalculate_totals();
        repo.save(&mut line).await.unwrap();
        assert_eq!(line.id, Some(id));

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored, line);
        assert_eq!(repo.all_from_delivery_note(note_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_line_is_reinserted_with_new_id() {
        let db = db().await;
        let repo = db.delivery_note_lines();
        let note_id = note(&db, "A1", "C1", "").await;

        let mut line = saved(&db, line(note_id, "R1", "thing", 1.0)).await;
        let old_id = line.id.unwrap();

        assert!(repo.delete(&line).await.unwrap());
        assert!(!repo.exists(&line).await.unwrap());
        assert!(!repo.delete(&line).await.unwrap());

        repo.save(&mut line).await.unwrap();
        let new_id = line.id.unwrap();
        assert_ne!(new_id, old_id);
        assert!(repo.exists(&line).await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_line() {
        let db = db().await;
        let line = DeliveryNoteLine::default();

        assert!(!db.delivery_note_lines().exists(&line).await.unwrap());
        assert!(!db.delivery_note_lines().delete(&line).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_from_delivery_note_order() {
        let db = db().await;
        let note_id = note(&db, "A1", "C1", "").await;

        let mut first = line(note_id, "R1", "first", 1.0);
        first.sort_order = 1;
        let first = saved(&db, first).await;
        let second = saved(&db, line(note_id, "R2", "second", 1.0)).await;
        let mut top = line(note_id, "R3", "top", 1.0);
        top.sort_order = 5;
        let top = saved(&db, top).await;

        let ids: Vec<Option<i64>> = db
            .delivery_note_lines()
            .all_from_delivery_note(note_id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();

        assert_eq!(ids, vec![top.id, first.id, second.id]);
    }

    #[tokio::test]
    async fn test_search_matches_reference_and_description() {
        let db = db().await;
        let older = note(&db, "A1", "C1", "").await;
        let newer = note(&db, "A2", "C1", "").await;

        let a = saved(&db, line(older, "ABC123", "widget", 1.0)).await;
        let b = saved(&db, line(older, "X9", "spare for abc1234", 1.0)).await;
        let c = saved(&db, line(newer, "xABC123y", "gadget", 1.0)).await;
        saved(&db, line(newer, "ZZZ", "unrelated", 1.0)).await;

        let ids: Vec<Option<i64>> = db
            .delivery_note_lines()
            .search("ABC123", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();

        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[tokio::test]
    async fn test_search_spaces_are_wildcards_and_paginates() {
        let db = db().await.with_item_limit(2);
        let note_id = note(&db, "A1", "C1", "").await;

        for description in ["red big box", "red box", "redbox", "blue box"] {
            saved(&db, line(note_id, "R", description, 1.0)).await;
        }

        let repo = db.delivery_note_lines();
        assert_eq!(repo.item_limit(), 2);
        assert_eq!(repo.search("Red Box", 0).await.unwrap().len(), 2);
        assert_eq!(repo.search("Red Box", 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_numeric_search() {
        let db = db().await;
        let note_id = note(&db, "A1", "C1", "").await;

        let hit = saved(&db, line(note_id, "1200", "part", 1.0)).await;
        saved(&db, line(note_id, "900", "part", 1.0)).await;

        let found = db.delivery_note_lines().search("12", 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, hit.id);
    }

    #[tokio::test]
    async fn test_customer_finders() {
        let db = db().await;
        let acme_a = note(&db, "A1", "ACME", "Urgent delivery").await;
        let acme_b = note(&db, "A2", "ACME", "regular").await;
        let other = note(&db, "A3", "OTHER", "urgent").await;

        let l1 = saved(&db, line(acme_a, "BOLT", "steel bolt", 1.0)).await;
        let l2 = saved(&db, line(acme_b, "BOLT", "steel bolt", 1.0)).await;
        saved(&db, line(other, "BOLT", "steel bolt", 1.0)).await;
        let l3 = saved(&db, line(acme_b, "NUT", "steel nut", 1.0)).await;

        let repo = db.delivery_note_lines();

        let ids: Vec<Option<i64>> = repo
            .search_from_customer("ACME", "bolt", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![l2.id, l1.id]);

        let ids: Vec<Option<i64>> = repo
            .search_from_customer_with_notes("ACME", "bolt", "URGENT", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![l1.id]);

        let ids: Vec<Option<i64>> = repo
            .last_from_customer("ACME", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![l2.id, l3.id, l1.id]);
    }

    #[tokio::test]
    async fn test_all_from_article() {
        let db = db().await;
        let older = note(&db, "A1", "C1", "").await;
        let newer = note(&db, "A2", "C1", "").await;

        let a = saved(&db, line(older, "BOLT", "bolt", 1.0)).await;
        let b = saved(&db, line(newer, "BOLT", "bolt", 1.0)).await;
        saved(&db, line(newer, "NUT", "nut", 1.0)).await;

        let repo = db.delivery_note_lines();
        let ids: Vec<Option<i64>> = repo
            .all_from_article("BOLT", 0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);

        assert_eq!(repo.all_from_article("BOLT", 1, 10).await.unwrap().len(), 1);
        assert_eq!(repo.all_from_article("BOLT", 0, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_article_statistics() {
        let db = db().await;
        let note_id = note(&db, "A1", "C1", "").await;
        let repo = db.delivery_note_lines();

        saved(&db, line(note_id, "A", "a", 3.0)).await;
        saved(&db, line(note_id, "A", "a", 2.0)).await;
        saved(&db, line(note_id, "B", "b", 10.0)).await;

        assert_eq!(repo.count_by_article().await.unwrap(), 2);

        let top = repo.top_articles(10).await.unwrap();
        assert_eq!(
            top,
            vec![
                ArticleTotal {
                    reference: "B".to_string(),
                    quantity: 10.0
                },
                ArticleTotal {
                    reference: "A".to_string(),
                    quantity: 5.0
                },
            ]
        );
        assert_eq!(repo.top_articles(1).await.unwrap().len(), 1);

        // Saving a line drops the cached ranking
        let big = saved(&db, line(note_id, "C", "c", 20.0)).await;
        assert_eq!(repo.top_articles(1).await.unwrap()[0].reference, "C");

        // So does deleting one
        assert!(repo.delete(&big).await.unwrap());
        let top = repo.top_articles(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].reference, "B");
    }

    #[tokio::test]
    async fn test_directory_resolves_parents_once() {
        let db = db().await;
        let notes = db.delivery_notes();
        let note_id = note(&db, "ALB-7", "C1", "").await;

        let with_parent = line(note_id, "R", "r", 1.0);
        let orphan = DeliveryNoteLine {
            delivery_note_id: Some(9999),
            ..DeliveryNoteLine::default()
        };

        let mut directory = DeliveryNoteDirectory::new();
        assert!(directory.is_empty());

        assert_eq!(
            directory.parent_code(&notes, &with_parent).await.unwrap().as_deref(),
            Some("ALB-7")
        );
        assert_eq!(
            directory.parent_date(&notes, &with_parent).await.unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 20)
        );
        assert_eq!(
            directory.parent_customer_name(&notes, &with_parent).await.unwrap(),
            "Customer C1"
        );
        assert_eq!(directory.len(), 1);

        assert_eq!(
            directory.parent_customer_name(&notes, &orphan).await.unwrap(),
            UNKNOWN_CUSTOMER
        );
        assert!(directory.parent_code(&notes, &orphan).await.unwrap().is_none());
        assert_eq!(directory.len(), 2);

        let unattached = DeliveryNoteLine::default();
        assert_eq!(
            directory.parent_customer_name(&notes, &unattached).await.unwrap(),
            UNKNOWN_CUSTOMER
        );
    }

    #[tokio::test]
    async fn test_line_requires_existing_note() {
        let db = db().await;
        let mut orphan = line(4242, "R", "r", 1.0);

        let err = db.delivery_note_lines().save(&mut orphan).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
