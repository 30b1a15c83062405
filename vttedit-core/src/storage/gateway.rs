//! Persistence gateway that tries storage backends in rank order.

use super::{BlobBackend, FileStringStore, SqliteBackend, StorageBackend, StorageRecord};
use crate::config::StorageConfig;
use crate::error::Result;
use crate::vtt::Cue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Which records a clear removes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    /// The record of one document
    Document(String),
    /// Every stored record
    All,
}

/// Saves and loads documents through a ranked list of backends.
///
/// Saves and loads go to the first backend that answers successfully and
/// that answer is authoritative for the call; results from different
/// backends are never merged. Clears go to every backend so stale copies
/// cannot resurface later through a fallback path.
pub struct PersistenceGateway {
    backends: Vec<Arc<dyn StorageBackend>>,
}

impl PersistenceGateway {
    /// Create a gateway over backends in priority order
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self { backends }
    }

    /// Build the gateway from a primary that may have failed to open and an
    /// always-available secondary. A failed primary is dropped for the rest
    /// of the session.
    pub fn with_fallback(
        primary: Result<Arc<dyn StorageBackend>>,
        secondary: Arc<dyn StorageBackend>,
    ) -> Self {
        let mut backends = Vec::with_capacity(2);
        match primary {
            Ok(backend) => backends.push(backend),
            Err(e) => warn!(
                "Primary document store unavailable, falling back to {}: {}",
                secondary.name(),
                e
            ),
        }
        backends.push(secondary);
        Self::new(backends)
    }

    /// Open the configured backends: SQLite first (if enabled), the JSON blob
    /// store always.
    pub async fn open(config: &StorageConfig) -> Self {
        let secondary: Arc<dyn StorageBackend> =
            Arc::new(BlobBackend::new(FileStringStore::new(config.resolve_blob_dir())));

        if !config.primary_enabled {
            info!("Primary document store disabled by config");
            return Self::new(vec![secondary]);
        }

        let primary = SqliteBackend::open(&config.resolve_database_path())
            .await
            .map(|db| Arc::new(db) as Arc<dyn StorageBackend>);

        let gateway = Self::with_fallback(primary, secondary);
        info!("Document storage backends: {:?}", gateway.backend_names());
        gateway
    }

    /// Backend names in priority order
    #[must_use]
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Store a snapshot of `cues` for `filename`.
    ///
    /// Best effort: a failing backend hands the write to the next one, and
    /// failures are logged rather than returned. Returns the name of the
    /// backend that accepted the write, if any did.
    pub async fn save(&self, filename: &str, cues: Vec<Cue>) -> Option<&'static str> {
        let record = StorageRecord::new(filename, cues);

        for backend in &self.backends {
            match backend.put(&record).await {
                Ok(()) => {
                    debug!(
                        "Saved {} ({} cues) to {}",
                        filename,
                        record.cues.len(),
                        backend.name()
                    );
                    return Some(backend.name());
                }
                Err(e) => warn!("Saving {} to {} failed: {}", filename, backend.name(), e),
            }
        }

        error!(
            "Every storage backend failed to save {}, edits are not persisted",
            filename
        );
        None
    }

    /// Load the stored record for `filename` from the first backend that has one.
    pub async fn load(&self, filename: &str) -> Option<StorageRecord> {
        for backend in &self.backends {
            match backend.get(filename).await {
                Ok(Some(record)) => {
                    debug!("Loaded {} from {}", filename, backend.name());
                    return Some(record);
                }
                Ok(None) => debug!("{} has no record for {}", backend.name(), filename),
                Err(e) => warn!("Loading {} from {} failed: {}", filename, backend.name(), e),
            }
        }
        None
    }

    /// Remove records from every backend.
    pub async fn clear(&self, scope: &ClearScope) {
        for backend in &self.backends {
            let result = match scope {
                ClearScope::Document(filename) => backend.delete(filename).await,
                ClearScope::All => backend.clear().await,
            };
            if let Err(e) = result {
                warn!("Clearing {:?} from {} failed: {}", scope, backend.name(), e);
            }
        }
    }

    /// Give every backend a chance to flush before exit.
    pub async fn shutdown(&self) {
        for backend in &self.backends {
            if let Err(e) = backend.shutdown().await {
                warn!("Shutting down {} failed: {}", backend.name(), e);
            }
        }
    }
}
