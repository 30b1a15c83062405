//! Editing session for one open document.
//!
//! The [`Editor`] owns the in-memory cue sequence, applies commands from a
//! view layer, queues a save after every change and publishes
//! [`EditorEvent`]s so views can re-render.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::autosave::{AutosaveHandle, Autosaver};
use crate::command::{Command, Outcome};
use crate::config::EditorConfig;
use crate::error::Result;
use crate::storage::{ClearScope, PersistenceGateway};
use crate::store::{CueAddress, CueKey, CueStore};
use crate::time;
use crate::vtt::{self, Cue, CueField};

/// Where the cues of an opened document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    /// A stored version existed and was used instead of the file contents
    Restored { last_modified: DateTime<Utc> },
    /// The file contents were parsed
    Parsed,
}

/// Change notifications for views
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    DocumentOpened {
        filename: String,
        source: DocumentSource,
        cue_count: usize,
    },
    CueAdded {
        index: usize,
        key: CueKey,
    },
    CueChanged {
        index: usize,
        key: CueKey,
    },
    CueRemoved {
        index: usize,
        key: CueKey,
    },
    StorageCleared {
        scope: ClearScope,
    },
}

/// Which document is being edited and when it was last saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub document: Option<String>,
    pub last_saved: Option<DateTime<Utc>>,
}

impl fmt::Display for StorageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(document) = &self.document else {
            return f.write_str("No VTT file loaded");
        };
        match self.last_saved {
            Some(saved) => write!(
                f,
                "Editing: {document} (Last saved: {})",
                saved.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            None => write!(f, "Editing: {document} (Last saved: Never)"),
        }
    }
}

/// Editing session over one document at a time
pub struct Editor {
    settings: EditorConfig,
    document: Option<String>,
    cues: CueStore,
    gateway: Arc<PersistenceGateway>,
    autosave: AutosaveHandle,
    saver_task: JoinHandle<()>,
    cancel_token: CancellationToken,
    event_tx: broadcast::Sender<EditorEvent>,
}

impl Editor {
    /// Create an editor and start its background saver.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(gateway: Arc<PersistenceGateway>, settings: EditorConfig) -> Self {
        let (saver, autosave) = Autosaver::new(gateway.clone(), None);
        let cancel_token = saver.cancel_token();
        let saver_task = saver.start();
        let (event_tx, _) = broadcast::channel(64);

        Self {
            settings,
            document: None,
            cues: CueStore::new(),
            gateway,
            autosave,
            saver_task,
            cancel_token,
            event_tx,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub const fn cues(&self) -> &CueStore {
        &self.cues
    }

    /// Open `filename`, preferring a stored version over parsing `contents`.
    pub async fn open_document(&mut self, filename: &str, contents: &str) -> DocumentSource {
        // Earlier edits must land before we read back
        self.autosave.flush().await;

        let source = if let Some(record) = self.gateway.load(filename).await {
            info!(
                "Loaded saved version of {} ({} cues)",
                filename,
                record.cues.len()
            );
            self.cues.replace_all(record.cues);
            DocumentSource::Restored {
                last_modified: record.last_modified,
            }
        } else {
            let cues = vtt::parse(contents);
            info!("Parsed {} cue(s) from {}", cues.len(), filename);
            self.cues.replace_all(cues);
            DocumentSource::Parsed
        };

        self.document = Some(filename.to_string());
        if source == DocumentSource::Parsed {
            self.persist();
        }

        let _ = self.event_tx.send(EditorEvent::DocumentOpened {
            filename: filename.to_string(),
            source,
            cue_count: self.cues.len(),
        });
        source
    }

    /// Apply a view command
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` for stale or out-of-range addresses,
    /// `EmptyCueText` for edits that would leave a cue without text, and
    /// `InvalidTimecode` when playing a cue whose start time is unusable.
    /// A failed command changes nothing and saves nothing.
    pub fn apply(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Play(address) => self.play(address).map(Outcome::Seek),
            Command::SetStart { address, position } => self
                .set_start(address, position)
                .map(|index| Outcome::Updated { index }),
            Command::SetEnd { address, position } => self
                .set_end(address, position)
                .map(|index| Outcome::Updated { index }),
            Command::Delete(address) => {
                let index = self.cues.resolve(address)?;
                self.delete_cue(address)
                    .map(|cue| Outcome::Removed { index, cue })
            }
            Command::Update {
                address,
                field,
                value,
            } => self
                .update_field(address, field, value)
                .map(|index| Outcome::Updated { index }),
            Command::Replace { address, cue } => self
                .replace_cue(address, cue)
                .map(|index| Outcome::Updated { index }),
            Command::Add { reference } => {
                let (index, key) = self.add_cue(reference);
                Ok(Outcome::Added { index, key })
            }
        }
    }

    /// Start position of a cue, for the media layer to seek to
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` or `InvalidTimecode`.
    pub fn play(&self, address: impl Into<CueAddress>) -> Result<Duration> {
        self.cues.get(address)?.start()
    }

    /// Set a cue's start time from the media position
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` if the address does not resolve.
    pub fn set_start(&mut self, address: impl Into<CueAddress>, position: Duration) -> Result<usize> {
        self.update_field(address, CueField::StartTime, time::format(position))
    }

    /// Set a cue's end time from the media position
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` if the address does not resolve.
    pub fn set_end(&mut self, address: impl Into<CueAddress>, position: Duration) -> Result<usize> {
        self.update_field(address, CueField::EndTime, time::format(position))
    }

    /// Overwrite one field of a cue with raw text
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` if the address does not resolve.
    pub fn update_field(
        &mut self,
        address: impl Into<CueAddress>,
        field: CueField,
        value: impl Into<String>,
    ) -> Result<usize> {
        let index = self.cues.resolve(address.into())?;
        self.cues.update_field(index, field, value)?;
        self.changed(index);
        Ok(index)
    }

    /// Replace a cue wholesale
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` if the address does not resolve.
    pub fn replace_cue(&mut self, address: impl Into<CueAddress>, cue: Cue) -> Result<usize> {
        let index = self.cues.resolve(address.into())?;
        self.cues.replace(index, cue)?;
        self.changed(index);
        Ok(index)
    }

    /// Append a default cue starting at the media position
    pub fn add_cue(&mut self, reference: Duration) -> (usize, CueKey) {
        let (index, key) = self.cues.insert_default_with(
            reference,
            self.settings.default_cue_span(),
            &self.settings.default_cue_text,
        );
        self.persist();
        let _ = self.event_tx.send(EditorEvent::CueAdded { index, key });
        (index, key)
    }

    /// Remove a cue; later cues move up one position
    ///
    /// # Errors
    ///
    /// Returns `CueNotFound` if the address does not resolve.
    pub fn delete_cue(&mut self, address: impl Into<CueAddress>) -> Result<Cue> {
        let index = self.cues.resolve(address.into())?;
        let key = self.cues.key_at(index);
        let cue = self.cues.delete(index)?;
        self.persist();
        if let Some(key) = key {
            let _ = self.event_tx.send(EditorEvent::CueRemoved { index, key });
        }
        Ok(cue)
    }

    /// Positions of cues active at the media position
    #[must_use]
    pub fn active_cues(&self, position: Duration) -> Vec<usize> {
        self.cues.active_at(position)
    }

    /// Render the open document
    ///
    /// # Errors
    ///
    /// Returns `EmptyExport` when there are no cues.
    pub fn export(&self) -> Result<String> {
        vtt::serialize(&self.cues.snapshot())
    }

    /// File name for an export
    #[must_use]
    pub fn export_file_name(&self) -> &str {
        self.document
            .as_deref()
            .unwrap_or(&self.settings.default_export_name)
    }

    /// Current document and its last-saved time, as stored
    pub async fn storage_info(&self) -> StorageInfo {
        let Some(document) = self.document.clone() else {
            return StorageInfo {
                document: None,
                last_saved: None,
            };
        };

        self.autosave.flush().await;
        let last_saved = self
            .gateway
            .load(&document)
            .await
            .map(|record| record.last_modified);

        StorageInfo {
            document: Some(document),
            last_saved,
        }
    }

    /// Delete the open document's stored record (every record if none is
    /// open) from all backends, and empty the cue list.
    pub async fn clear_storage(&mut self) {
        // A queued save landing after the clear would resurrect the data
        self.autosave.flush().await;

        let scope = self
            .document
            .clone()
            .map_or(ClearScope::All, ClearScope::Document);
        self.gateway.clear(&scope).await;
        self.cues.clear();

        info!("Cleared stored documents ({:?})", scope);
        let _ = self.event_tx.send(EditorEvent::StorageCleared { scope });
    }

    /// Wait until every edit so far has been written
    pub async fn flush(&self) {
        self.autosave.flush().await;
    }

    /// Finish pending saves and release storage
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.saver_task.await {
            warn!("Autosaver task failed: {}", e);
        }
        self.gateway.shutdown().await;
    }

    fn changed(&self, index: usize) {
        self.persist();
        if let Some(key) = self.cues.key_at(index) {
            let _ = self.event_tx.send(EditorEvent::CueChanged { index, key });
        }
    }

    fn persist(&self) {
        if let Some(document) = &self.document {
            self.autosave.save(document.clone(), self.cues.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::{
        BlobBackend, MemoryStringStore, SqliteBackend, StorageBackend, StorageRecord,
    };

    const DOC: &str = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:04.000\nHello\n\n2\n00:00:05.000 --> 00:00:06.000\nWorld\n\n3\n00:00:07.000 --> 00:00:08.000\nAgain\n";

    struct Backends {
        primary: Arc<SqliteBackend>,
        secondary: Arc<BlobBackend<MemoryStringStore>>,
    }

    impl Backends {
        async fn new() -> Self {
            Self {
                primary: Arc::new(SqliteBackend::open_in_memory().await.unwrap()),
                secondary: Arc::new(BlobBackend::new(MemoryStringStore::new())),
            }
        }

        fn gateway(&self) -> Arc<PersistenceGateway> {
            let primary: Arc<dyn StorageBackend> = self.primary.clone();
            let secondary: Arc<dyn StorageBackend> = self.secondary.clone();
            Arc::new(PersistenceGateway::new(vec![primary, secondary]))
        }
    }

    async fn opened() -> (Editor, Arc<PersistenceGateway>) {
        let gateway = Backends::new().await.gateway();
        let mut editor = Editor::new(gateway.clone(), EditorConfig::default());
        editor.open_document("talk.vtt", DOC).await;
        (editor, gateway)
    }

    async fn stored(gateway: &PersistenceGateway, name: &str) -> Vec<Cue> {
        gateway.load(name).await.map(|r| r.cues).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_open_parses_then_restores() {
        let gateway = Backends::new().await.gateway();

        let mut editor = Editor::new(gateway.clone(), EditorConfig::default());
        assert_eq!(
            editor.open_document("talk.vtt", DOC).await,
            DocumentSource::Parsed
        );
        editor.update_field(0, CueField::Text, "Edited").unwrap();
        editor.shutdown().await;

        // Reopening the same name ignores the file contents in favour of the stored edit
        let mut editor = Editor::new(gateway, EditorConfig::default());
        let source = editor.open_document("talk.vtt", DOC).await;
        assert!(matches!(source, DocumentSource::Restored { .. }));
        assert_eq!(editor.cues().get(0).unwrap().text, "Edited");
        assert_eq!(editor.cues().len(), 3);
    }

    #[tokio::test]
    async fn test_every_mutation_is_saved() {
        let (mut editor, gateway) = opened().await;

        editor.add_cue(Duration::from_secs(10));
        editor.flush().await;
        assert_eq!(stored(&gateway, "talk.vtt").await.len(), 4);

        editor.delete_cue(1).unwrap();
        editor.flush().await;
        let cues = stored(&gateway, "talk.vtt").await;
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[1].text, "Again");

        editor
            .set_end(0, Duration::from_millis(4_250))
            .unwrap();
        editor.flush().await;
        assert_eq!(stored(&gateway, "talk.vtt").await[0].end_time, "00:00:04.250");
    }

    #[tokio::test]
    async fn test_overlapping_saves_keep_last_initiated_state() {
        let (mut editor, gateway) = opened().await;

        // Issue many edits without waiting for any save to land
        for i in 0..20 {
            editor
                .update_field(0, CueField::Text, format!("draft {i}"))
                .unwrap();
            editor.add_cue(Duration::from_secs(i));
            editor.delete_cue(3).unwrap();
        }
        editor.set_start(2, Duration::from_secs(30)).unwrap();

        editor.flush().await;
        assert_eq!(stored(&gateway, "talk.vtt").await, editor.cues().snapshot());
        assert_eq!(editor.cues().get(0).unwrap().text, "draft 19");
    }

    #[tokio::test]
    async fn test_stale_address_is_rejected_without_saving() {
        let (mut editor, gateway) = opened().await;
        let key_second = editor.cues().key_at(1).unwrap();
        let stale = CueAddress::pinned(1, key_second);

        editor.apply(Command::Delete(stale)).unwrap();
        let err = editor
            .apply(Command::Update {
                address: stale,
                field: CueField::Text,
                value: "wrong cue".into(),
            })
            .unwrap_err();
        assert!(err.is_not_found());

        editor.flush().await;
        let cues = stored(&gateway, "talk.vtt").await;
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "Again");
    }

    #[tokio::test]
    async fn test_blank_text_edits_are_rejected_without_saving() {
        let (mut editor, gateway) = opened().await;
        editor.flush().await;
        let before = stored(&gateway, "talk.vtt").await;

        let err = editor
            .apply(Command::Update {
                address: CueAddress::at(0),
                field: CueField::Text,
                value: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyCueText { index: 0 }));

        let err = editor
            .apply(Command::Replace {
                address: CueAddress::at(1),
                cue: Cue::new("2", "", "", ""),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyCueText { index: 1 }));

        editor.flush().await;
        assert_eq!(editor.cues().snapshot(), before);
        assert_eq!(stored(&gateway, "talk.vtt").await, before);
    }

    #[tokio::test]
    async fn test_apply_commands() {
        let (mut editor, _gateway) = opened().await;

        assert_eq!(
            editor.apply(Command::Play(CueAddress::at(1))).unwrap(),
            Outcome::Seek(Duration::from_secs(5))
        );
        assert_eq!(
            editor
                .apply(Command::SetStart {
                    address: CueAddress::at(1),
                    position: Duration::from_millis(4_500),
                })
                .unwrap(),
            Outcome::Updated { index: 1 }
        );
        assert_eq!(editor.cues().get(1).unwrap().start_time, "00:00:04.500");

        let added = editor
            .apply(Command::Add {
                reference: Duration::from_secs(10),
            })
            .unwrap();
        assert!(matches!(added, Outcome::Added { index: 3, .. }));
        assert_eq!(editor.cues().get(3).unwrap().end_time, "00:00:13.000");

        let removed = editor.apply(Command::Delete(CueAddress::at(0))).unwrap();
        assert!(matches!(removed, Outcome::Removed { index: 0, ref cue } if cue.text == "Hello"));

        assert!(editor
            .apply(Command::Play(CueAddress::at(42)))
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_play_rejects_unusable_start() {
        let (mut editor, _gateway) = opened().await;
        editor.update_field(0, CueField::StartTime, "soon").unwrap();
        assert!(matches!(
            editor.play(0),
            Err(CoreError::InvalidTimecode { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_uses_configured_defaults() {
        let gateway = Backends::new().await.gateway();
        let settings = EditorConfig {
            default_cue_span_ms: 1500,
            default_cue_text: "…".to_string(),
            ..EditorConfig::default()
        };
        let mut editor = Editor::new(gateway, settings);
        editor.add_cue(Duration::from_secs(2));

        let cue = editor.cues().get(0).unwrap();
        assert_eq!(cue.id, "1");
        assert_eq!(cue.end_time, "00:00:03.500");
        assert_eq!(cue.text, "…");
    }

    #[tokio::test]
    async fn test_export() {
        let gateway = Backends::new().await.gateway();
        let mut editor = Editor::new(gateway, EditorConfig::default());
        assert!(matches!(editor.export(), Err(CoreError::EmptyExport)));
        assert_eq!(editor.export_file_name(), "subtitles.vtt");

        editor.open_document("talk.vtt", DOC).await;
        assert_eq!(editor.export_file_name(), "talk.vtt");
        assert_eq!(vtt::parse(&editor.export().unwrap()), vtt::parse(DOC));
    }

    #[tokio::test]
    async fn test_active_cues() {
        let (editor, _gateway) = opened().await;
        assert_eq!(editor.active_cues(Duration::from_secs(2)), vec![0]);
        assert!(editor.active_cues(Duration::from_millis(4_500)).is_empty());
    }

    #[tokio::test]
    async fn test_clear_storage_with_document_open() {
        let backends = Backends::new().await;
        let gateway = backends.gateway();
        backends
            .secondary
            .put(&StorageRecord::new("talk.vtt", vec![Cue::new("", "", "", "old copy")]))
            .await
            .unwrap();

        let mut editor = Editor::new(gateway.clone(), EditorConfig::default());
        editor.open_document("other.vtt", DOC).await;
        let mut editor_talk = Editor::new(gateway.clone(), EditorConfig::default());
        editor_talk.open_document("talk.vtt", DOC).await;
        editor_talk.update_field(0, CueField::Text, "pending").unwrap();

        editor_talk.clear_storage().await;
        assert!(editor_talk.cues().is_empty());
        assert!(backends.primary.get("talk.vtt").await.unwrap().is_none());
        assert!(backends.secondary.get("talk.vtt").await.unwrap().is_none());

        // Other documents are untouched
        editor.flush().await;
        assert!(gateway.load("other.vtt").await.is_some());

        // Reopening parses the file again
        assert_eq!(
            editor_talk.open_document("talk.vtt", DOC).await,
            DocumentSource::Parsed
        );
    }

    #[tokio::test]
    async fn test_clear_storage_without_document_wipes_all() {
        let backends = Backends::new().await;
        let gateway = backends.gateway();
        gateway.save("a.vtt", vtt::parse(DOC)).await;
        gateway.save("b.vtt", vtt::parse(DOC)).await;

        let mut editor = Editor::new(gateway.clone(), EditorConfig::default());
        let mut events = editor.subscribe();
        editor.clear_storage().await;

        assert!(gateway.load("a.vtt").await.is_none());
        assert!(gateway.load("b.vtt").await.is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            EditorEvent::StorageCleared {
                scope: ClearScope::All
            }
        );
    }

    #[tokio::test]
    async fn test_primary_open_failure_end_to_end() {
        let secondary = Arc::new(BlobBackend::new(MemoryStringStore::new()));
        let gateway = Arc::new(PersistenceGateway::with_fallback(
            Err(CoreError::StorageUnavailable {
                backend: "sqlite",
                reason: "simulated open failure".to_string(),
            }),
            secondary.clone(),
        ));

        let mut editor = Editor::new(gateway.clone(), EditorConfig::default());
        editor.open_document("talk.vtt", DOC).await;
        editor.delete_cue(0).unwrap();
        editor.flush().await;

        let record = secondary.get("talk.vtt").await.unwrap().unwrap();
        assert_eq!(record.cues, editor.cues().snapshot());

        editor.clear_storage().await;
        assert!(secondary.get("talk.vtt").await.unwrap().is_none());
        assert!(gateway.load("talk.vtt").await.is_none());
    }

    #[tokio::test]
    async fn test_events() {
        let gateway = Backends::new().await.gateway();
        let mut editor = Editor::new(gateway, EditorConfig::default());
        let mut events = editor.subscribe();

        editor.open_document("talk.vtt", DOC).await;
        let (_, key) = editor.add_cue(Duration::ZERO);
        editor.update_field(3, CueField::Id, "new").unwrap();
        editor.delete_cue(3).unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            EditorEvent::DocumentOpened {
                filename: "talk.vtt".to_string(),
                source: DocumentSource::Parsed,
                cue_count: 3,
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            EditorEvent::CueAdded { index: 3, key }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            EditorEvent::CueChanged { index: 3, key }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            EditorEvent::CueRemoved { index: 3, key }
        );
    }

    #[tokio::test]
    async fn test_storage_info() {
        let gateway = Backends::new().await.gateway();
        let mut editor = Editor::new(gateway, EditorConfig::default());
        assert_eq!(editor.storage_info().await.to_string(), "No VTT file loaded");

        editor.open_document("talk.vtt", DOC).await;
        let info = editor.storage_info().await;
        assert_eq!(info.document.as_deref(), Some("talk.vtt"));
        assert!(info.last_saved.is_some());
        assert!(info.to_string().starts_with("Editing: talk.vtt (Last saved: "));

        let never = StorageInfo {
            document: Some("x.vtt".into()),
            last_saved: None,
        };
        assert_eq!(never.to_string(), "Editing: x.vtt (Last saved: Never)");
    }
}
