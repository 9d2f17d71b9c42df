//! # Delivery Note Repository
//!
//! Header rows that delivery note lines hang from. Lines only read code,
//! date, customer and notes from here; the full document lifecycle lives
//! with the caller.

use sqlx::SqlitePool;
use tally_core::DeliveryNote;
use tracing::debug;

use crate::error::DbResult;

/// Repository for delivery note headers.
#[derive(Debug, Clone)]
pub struct DeliveryNoteRepository {
    pool: SqlitePool,
}

impl DeliveryNoteRepository {
    /// Creates a new DeliveryNoteRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeliveryNoteRepository { pool }
    }

    /// Gets a delivery note by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<DeliveryNote>> {
        debug!(id = id, "Getting delivery note");

        let note = sqlx::query_as::<_, DeliveryNote>(
            r#"
            SELECT id, code, date, customer_code, customer_name, notes
            FROM delivery_notes
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(note)
    }

    /// Inserts a header and writes the generated id back.
    pub async fn insert(&self, note: &mut DeliveryNote) -> DbResult<i64> {
        debug!(code = %note.code, "Inserting delivery note");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO delivery_notes (code, date, customer_code, customer_name, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(&note.code)
        .bind(note.date)
        .bind(&note.customer_code)
        .bind(&note.customer_name)
        .bind(&note.notes)
        .fetch_one(&self.pool)
        .await?;

        note.id = Some(id);
        Ok(id)
    }

    /// Deletes a header; its lines go with it.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        debug!(id = id, "Deleting delivery note");

        let result = sqlx::query("DELETE FROM delivery_notes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;
    use tally_core::DeliveryNote;

    #[tokio::test]
    async fn test_insert_get_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.delivery_notes();

        let mut note = DeliveryNote {
            id: None,
            code: "ALB2024A1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            customer_code: Some("C001".to_string()),
            customer_name: "Acme".to_string(),
            notes: String::new(),
        };

        let id = repo.insert(&mut note).await.unwrap();
        assert_eq!(note.id, Some(id));

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored, note);

        assert!(repo.delete(id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_none());
    }
}
