//! # Fiscal Year & Series Repositories
//!
//! Master lists read by sequence reconciliation.

use sqlx::SqlitePool;
use tally_core::{FiscalYear, Series};
use tracing::debug;

use crate::error::DbResult;

/// Repository for fiscal years.
#[derive(Debug, Clone)]
pub struct FiscalYearRepository {
    pool: SqlitePool,
}

impl FiscalYearRepository {
    /// Creates a new FiscalYearRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FiscalYearRepository { pool }
    }

    /// Every fiscal year, newest first.
    pub async fn all(&self) -> DbResult<Vec<FiscalYear>> {
        let years = sqlx::query_as::<_, FiscalYear>(
            "SELECT code, name, start_date, end_date FROM fiscal_years ORDER BY start_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = years.len(), "Loaded fiscal years");
        Ok(years)
    }

    pub async fn get(&self, code: &str) -> DbResult<Option<FiscalYear>> {
        let year = sqlx::query_as::<_, FiscalYear>(
            "SELECT code, name, start_date, end_date FROM fiscal_years WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(year)
    }

    /// Inserts or updates a fiscal year.
    pub async fn save(&self, year: &FiscalYear) -> DbResult<()> {
        debug!(code = %year.code, "Saving fiscal year");

        sqlx::query(
            r#"
            INSERT INTO fiscal_years (code, name, start_date, end_date)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                start_date = excluded.start_date,
                end_date = excluded.end_date
            "#,
        )
        .bind(&year.code)
        .bind(&year.name)
        .bind(year.start_date)
        .bind(year.end_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Repository for document series.
#[derive(Debug, Clone)]
pub struct SeriesRepository {
    pool: SqlitePool,
}

impl SeriesRepository {
    /// Creates a new SeriesRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SeriesRepository { pool }
    }

    /// Every series, by code.
    pub async fn all(&self) -> DbResult<Vec<Series>> {
        let series = sqlx::query_as::<_, Series>("SELECT code, description FROM series ORDER BY code")
            .fetch_all(&self.pool)
            .await?;

        debug!(count = series.len(), "Loaded series");
        Ok(series)
    }

    /// Inserts or updates a series.
    pub async fn save(&self, series: &Series) -> DbResult<()> {
        debug!(code = %series.code, "Saving series");

        sqlx::query(
            r#"
            INSERT INTO series (code, description) VALUES (?1, ?2)
            ON CONFLICT(code) DO UPDATE SET description = excluded.description
            "#,
        )
        .bind(&series.code)
        .bind(&series.description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;
    use tally_core::{FiscalYear, Series};

    #[tokio::test]
    async fn test_fiscal_years_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.fiscal_years();

        for year in [2023, 2024] {
            repo.save(&FiscalYear {
                code: year.to_string(),
                name: format!("Year {}", year),
                start_date: NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            })
            .await
            .unwrap();
        }

        let codes: Vec<String> = repo.all().await.unwrap().into_iter().map(|y| y.code).collect();
        assert_eq!(codes, vec!["2024", "2023"]);
        assert_eq!(repo.get("2023").await.unwrap().unwrap().name, "Year 2023");
        assert!(repo.get("1999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_series_upsert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.series();

        let mut series = Series {
            code: "A".to_string(),
            description: "Main".to_string(),
        };
        repo.save(&series).await.unwrap();
        series.description = "Main series".to_string();
        repo.save(&series).await.unwrap();

        assert_eq!(repo.all().await.unwrap(), vec![series]);
    }
}
