//! Path constants for configuration, storage and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "vttedit";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the primary document database file
pub const DOCUMENTS_DB_FILE_NAME: &str = "documents.db";

/// The name of the directory holding the fallback document blob
pub const BLOB_DIR_NAME: &str = "blob";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "vttedit.log";

/// Get the configuration directory path (~/.config/vttedit/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/vttedit/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the document database path (`~/.config/vttedit/documents.db`)
#[must_use]
pub fn documents_db_path() -> PathBuf {
    config_dir().join(DOCUMENTS_DB_FILE_NAME)
}

/// Get the fallback blob directory (`~/.config/vttedit/blob/`)
#[must_use]
pub fn blob_dir() -> PathBuf {
    config_dir().join(BLOB_DIR_NAME)
}

/// Get the log file path (`~/.config/vttedit/vttedit.log`)
#[must_use]
pub fn log_file_path() -> PathBuf {
    config_dir().join(LOG_FILE_NAME)
}
