//! SQLite-backed record store.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use super::{RecordStore, StoreError, with_write_retry};
use crate::db::Database;
use crate::record::Record;

/// Record store backed by the `records` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens (creating if needed) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] when the database cannot be opened or
    /// migrated.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open(path).await?;
        let journal_mode = db.journal_mode().await?;
        debug!(path = %path.display(), %journal_mode, "opened record database");
        Ok(Self::new(db))
    }

    /// Closes the underlying pool.
    pub async fn close(self) {
        self.db.close().await;
    }

    async fn upsert_once(&self, records: &[Record]) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO records (id, display_name) ");
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.id)
                .push_bind(record.display_name.clone());
        });
        builder.push(" ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name");
        builder.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    #[instrument(level = "debug", skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: &[Record]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        with_write_retry(|| self.upsert_once(records)).await?;
        Ok(records.len())
    }

    async fn last_committed_id(&self) -> Result<Option<i64>, StoreError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM records")
            .fetch_one(self.db.pool())
            .await?;
        Ok(max)
    }

    async fn record_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(self.db.pool())
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
