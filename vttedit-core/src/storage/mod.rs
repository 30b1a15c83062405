//! Durable per-document storage with ranked backend fallback.

mod blob;
mod gateway;
mod sqlite;

pub use blob::{BlobBackend, FileStringStore, MemoryStringStore, StringStore, BLOB_STORAGE_KEY};
pub use gateway::{ClearScope, PersistenceGateway};
pub use sqlite::SqliteBackend;

use crate::error::Result;
use crate::vtt::Cue;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Saved state of one document, keyed by file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    pub filename: String,
    pub cues: Vec<Cue>,
    pub last_modified: DateTime<Utc>,
}

impl StorageRecord {
    /// Snapshot `cues` for `filename`, stamped with the current time.
    ///
    /// The timestamp is kept at millisecond precision so it survives every
    /// backend unchanged.
    pub fn new(filename: impl Into<String>, cues: Vec<Cue>) -> Self {
        Self {
            filename: filename.into(),
            cues,
            last_modified: Utc::now().trunc_subsecs(3),
        }
    }
}

/// A key-value store of [`StorageRecord`]s keyed by file name.
///
/// Writing a record replaces any existing record for the same name.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Insert or replace the record for `record.filename`.
    async fn put(&self, record: &StorageRecord) -> Result<()>;

    /// Fetch the record for `filename`, if any.
    async fn get(&self, filename: &str) -> Result<Option<StorageRecord>>;

    /// Remove the record for `filename`. Removing a missing record is not an error.
    async fn delete(&self, filename: &str) -> Result<()>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    /// Flush anything buffered before the process exits.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
