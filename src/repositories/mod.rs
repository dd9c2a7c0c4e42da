// src/repositories/mod.rs
//! Read-side data access for the catalog and the borrow ledger

pub mod catalog;
pub mod ledger;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};

pub use catalog::BookRepository;
pub use ledger::{LedgerRepository, LedgerScope};

/// Lookup by integer primary key shared by every repository.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Send + Unpin + for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow>,
{
    fn table_name(&self) -> &'static str;

    fn not_found(&self, id: i64) -> ApiError;

    async fn get_by_id(&self, pool: &SqlitePool, id: i64) -> ApiResult<Option<T>> {
        let query = format!("SELECT * FROM {} WHERE id = ?", self.table_name());

        let result = sqlx::query_as::<_, T>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(result)
    }

    async fn require(&self, pool: &SqlitePool, id: i64) -> ApiResult<T> {
        self.get_by_id(pool, id)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    async fn count(&self, pool: &SqlitePool) -> ApiResult<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table_name());
        let total: i64 = sqlx::query_scalar(&query).fetch_one(pool).await?;
        Ok(total)
    }
}

/// `%term%` with LIKE wildcards in the term escaped (use with `ESCAPE '\'`).
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
