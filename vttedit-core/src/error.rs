use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Document errors
    #[error("Invalid timestamp '{value}', expected HH:MM:SS.mmm")]
    InvalidTimecode { value: String },

    #[error("Invalid media position {value}s, expected a finite non-negative number")]
    InvalidSeconds { value: f64 },

    #[error("No cue at position {index}")]
    CueNotFound { index: usize },

    #[error("Cue {index} must have text")]
    EmptyCueText { index: usize },

    #[error("No cues to export")]
    EmptyExport,

    // Storage errors
    #[error("Storage backend {backend} unavailable: {reason}")]
    StorageUnavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("Document database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the error means the addressed cue does not exist (stale or out-of-range index).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::CueNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
