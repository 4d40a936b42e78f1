//! SQLite connection setup for the record store.
//!
//! Journal mode and busy timeout are part of the connect options, so every
//! pooled connection gets them, not just the first one. WAL lets the
//! checkpoint read run while a flush holds the write lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Flushes are serialized by the sink, so a small pool covers one writer
/// plus checkpoint and count reads.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening the record database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The database file could not be opened or created.
    #[error("failed to open database {}: {source}", .path.display())]
    Connect {
        /// Database file.
        path: PathBuf,
        /// The underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// The `records` schema could not be applied.
    #[error("failed to apply records schema: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool over the `records` database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database file at `path` and applies
    /// the `records` schema.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connect`] if the file cannot be opened and
    /// [`DbError::Migration`] if the schema cannot be applied.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|source| DbError::Connect {
                path: path.to_path_buf(),
                source,
            })?;

        Self::migrate(pool).await
    }

    /// Single-connection in-memory database; a second connection would see
    /// a different, empty database.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self, DbError> {
        let connect_error = |source| DbError::Connect {
            path: PathBuf::from(":memory:"),
            source,
        };
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()
            .map_err(connect_error)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(connect_error)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Journal mode reported by SQLite (`wal` for file databases).
    ///
    /// # Errors
    ///
    /// Returns the driver error if the pragma query fails.
    pub async fn journal_mode(&self) -> Result<String, sqlx::Error> {
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_lowercase())
    }

    /// Closes all pooled connections.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
