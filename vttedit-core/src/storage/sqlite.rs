use super::{StorageBackend, StorageRecord};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r"
-- One row per document, cues stored as a JSON array
CREATE TABLE IF NOT EXISTS documents (
    filename TEXT PRIMARY KEY NOT NULL,
    cues TEXT NOT NULL,
    last_modified INTEGER NOT NULL
);
";

/// SQLite-backed primary document store
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the document database at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Opening document database at {:?}", path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        Self::init(conn, true).await
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, false).await
    }

    async fn init(conn: Connection, wal: bool) -> Result<Self> {
        conn.call(move |conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            if wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            Ok(())
        })
        .await?;

        info!("Document database initialized");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn put(&self, record: &StorageRecord) -> Result<()> {
        debug!(
            "Writing {} cue(s) for {} to document database",
            record.cues.len(),
            record.filename
        );
        let filename = record.filename.clone();
        let cues = serde_json::to_string(&record.cues)?;
        let last_modified = record.last_modified.timestamp_millis();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO documents (filename, cues, last_modified)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(filename) DO UPDATE SET
                        cues = excluded.cues,
                        last_modified = excluded.last_modified
                ",
                    rusqlite::params![filename, cues, last_modified],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn get(&self, filename: &str) -> Result<Option<StorageRecord>> {
        debug!("Looking up {} in document database", filename);
        let key = filename.to_string();

        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT filename, cues, last_modified FROM documents WHERE filename = ?1",
                )?;
                let row = stmt
                    .query_row(rusqlite::params![key], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((filename, cues, last_modified)) = row else {
            return Ok(None);
        };

        Ok(Some(StorageRecord {
            filename,
            cues: serde_json::from_str(&cues)?,
            last_modified: DateTime::from_timestamp_millis(last_modified)
                .unwrap_or_else(Utc::now),
        }))
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        let key = filename.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM documents WHERE filename = ?1",
                    rusqlite::params![key],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn clear(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM documents", [])?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Checkpoint WAL for clean shutdown
    async fn shutdown(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}
