//! Fallback store: every record in one JSON blob under a fixed key.

use super::{StorageBackend, StorageRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Key the document blob is stored under
pub const BLOB_STORAGE_KEY: &str = "vttedit-data";

/// A minimal string-keyed store, the only thing the blob backend needs.
pub trait StringStore: Send {
    /// Read the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be written.
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be written.
    fn remove_item(&mut self, key: &str) -> Result<()>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStringStore {
    dir: PathBuf,
}

impl FileStringStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StringStore for FileStringStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.item_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write-then-rename so a crash never leaves a half-written blob
        let path = self.item_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.item_path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Process-local store, for tests and storage-less sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryStringStore {
    items: HashMap<String, String>,
}

impl MemoryStringStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StringStore for MemoryStringStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

type Blob = BTreeMap<String, StorageRecord>;

/// Stores all documents as `{filename: record}` JSON under [`BLOB_STORAGE_KEY`]
pub struct BlobBackend<S> {
    store: Mutex<S>,
    key: String,
}

impl<S: StringStore> BlobBackend<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_key(store, BLOB_STORAGE_KEY)
    }

    #[must_use]
    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store: Mutex::new(store),
            key: key.into(),
        }
    }

    fn read_blob(&self, store: &S) -> Result<Blob> {
        match store.get_item(&self.key)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Blob::new()),
        }
    }

    fn write_blob(&self, store: &mut S, blob: &Blob) -> Result<()> {
        let content = serde_json::to_string(blob)?;
        store.set_item(&self.key, &content)
    }
}

#[async_trait]
impl<S: StringStore + 'static> StorageBackend for BlobBackend<S> {
    fn name(&self) -> &'static str {
        "blob"
    }

    async fn put(&self, record: &StorageRecord) -> Result<()> {
        let mut store = self.store.lock().await;
        let mut blob = self.read_blob(&store).unwrap_or_else(|e| {
            warn!("Discarding unreadable document blob: {}", e);
            Blob::new()
        });

        debug!(
            "Writing {} cue(s) for {} to document blob",
            record.cues.len(),
            record.filename
        );
        blob.insert(record.filename.clone(), record.clone());
        self.write_blob(&mut store, &blob)
    }

    async fn get(&self, filename: &str) -> Result<Option<StorageRecord>> {
        let store = self.store.lock().await;
        let mut blob = self.read_blob(&store)?;
        Ok(blob.remove(filename))
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let mut blob = self.read_blob(&store)?;
        if blob.remove(filename).is_some() {
            self.write_blob(&mut store, &blob)?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.store.lock().await.remove_item(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vtt::Cue;

    fn record(name: &str, text: &str) -> StorageRecord {
        StorageRecord::new(
            name,
            vec![Cue::new("", "00:00:01.000", "00:00:02.000", text)],
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let blob = BlobBackend::new(MemoryStringStore::new());
        let a = record("a.vtt", "a");
        blob.put(&a).await.unwrap();
        blob.put(&record("b.vtt", "b")).await.unwrap();

        assert_eq!(blob.get("a.vtt").await.unwrap(), Some(a));
        blob.delete("a.vtt").await.unwrap();
        assert!(blob.get("a.vtt").await.unwrap().is_none());
        assert!(blob.get("b.vtt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let blob = BlobBackend::new(MemoryStringStore::new());
        blob.put(&record("a.vtt", "a")).await.unwrap();
        blob.clear().await.unwrap();
        assert!(blob.get("a.vtt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_layout_is_filename_map() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobBackend::new(FileStringStore::new(dir.path()));
        blob.put(&record("movie.vtt", "hi")).await.unwrap();

        let raw = FileStringStore::new(dir.path())
            .get_item(BLOB_STORAGE_KEY)
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["movie.vtt"]["filename"], "movie.vtt");
        assert_eq!(json["movie.vtt"]["cues"][0]["text"], "hi");
        assert!(json["movie.vtt"]["lastModified"].is_string());
    }

    #[tokio::test]
    async fn test_corrupt_blob() {
        let mut store = MemoryStringStore::new();
        store.set_item(BLOB_STORAGE_KEY, "{not json").unwrap();
        let blob = BlobBackend::new(store);

        assert!(blob.get("a.vtt").await.is_err());

        // A write starts a fresh blob rather than failing forever
        blob.put(&record("a.vtt", "a")).await.unwrap();
        assert!(blob.get("a.vtt").await.unwrap().is_some());
    }

    #[test]
    fn test_file_store_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStringStore::new(dir.path().join("not-yet-created"));
        assert!(store.get_item("anything").unwrap().is_none());
        store.remove_item("anything").unwrap();
        store.set_item("anything", "value").unwrap();
        assert_eq!(store.get_item("anything").unwrap().as_deref(), Some("value"));
    }
}
