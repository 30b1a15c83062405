pub mod autosave;
pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod paths;
pub mod storage;
pub mod store;
pub mod time;
pub mod vtt;

pub use autosave::{AutosaveHandle, Autosaver};
pub use command::{ActionKind, Command, CueAction, CueEdit, Outcome};
pub use config::{EditorConfig, LoggingConfig, StorageConfig, VttEditConfig, CONFIG_TEMPLATE};
pub use editor::{DocumentSource, Editor, EditorEvent, StorageInfo};
pub use error::CoreError;
pub use paths::{config_dir, CONFIG_DIR_NAME, CONFIG_FILE_NAME, DOCUMENTS_DB_FILE_NAME};
pub use storage::{
    BlobBackend, ClearScope, FileStringStore, MemoryStringStore, PersistenceGateway,
    SqliteBackend, StorageBackend, StorageRecord, StringStore,
};
pub use store::{CueAddress, CueKey, CueStore};
pub use time::DurationExt;
pub use vtt::{Cue, CueField};
