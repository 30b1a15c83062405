use crate::error::{CoreError, Result};
use crate::store::{DEFAULT_CUE_SPAN, DEFAULT_CUE_TEXT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VttEditConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Use the SQLite database as the primary store
    #[serde(default = "default_true")]
    pub primary_enabled: bool,
    /// Override for the database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Override for the fallback blob directory
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
}

const fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary_enabled: true,
            database_path: None,
            blob_dir: None,
        }
    }
}

impl StorageConfig {
    /// Database path, falling back to `~/.config/vttedit/documents.db`
    #[must_use]
    pub fn resolve_database_path(&self) -> PathBuf {
        non_empty(self.database_path.as_deref()).unwrap_or_else(crate::paths::documents_db_path)
    }

    /// Blob directory, falling back to `~/.config/vttedit/blob/`
    #[must_use]
    pub fn resolve_blob_dir(&self) -> PathBuf {
        non_empty(self.blob_dir.as_deref()).unwrap_or_else(crate::paths::blob_dir)
    }
}

fn non_empty(path: Option<&Path>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Length of a newly added cue
    #[serde(default = "default_cue_span_ms")]
    pub default_cue_span_ms: u64,
    /// Text of a newly added cue
    #[serde(default = "default_cue_text")]
    pub default_cue_text: String,
    /// Export file name when no document is open
    #[serde(default = "default_export_name")]
    pub default_export_name: String,
}

fn default_cue_span_ms() -> u64 {
    u64::try_from(DEFAULT_CUE_SPAN.as_millis()).unwrap_or(3000)
}

fn default_cue_text() -> String {
    DEFAULT_CUE_TEXT.to_string()
}

fn default_export_name() -> String {
    "subtitles.vtt".to_string()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_cue_span_ms: default_cue_span_ms(),
            default_cue_text: default_cue_text(),
            default_export_name: default_export_name(),
        }
    }
}

impl EditorConfig {
    #[must_use]
    pub const fn default_cue_span(&self) -> Duration {
        Duration::from_millis(self.default_cue_span_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to ~/.config/vttedit/vttedit.log
    #[serde(default)]
    pub enabled: bool,
}

impl VttEditConfig {
    /// Get the config file path (~/.config/vttedit/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location, writing the template on first run.
    ///
    /// A missing config file is not an error: the template is written and the
    /// defaults it describes are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing config file cannot be read or parsed.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `config_path`, writing the template there if it is missing.
    ///
    /// Failing to write the template only logs a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read, parsed or fails validation.
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            match write_template(config_path) {
                Ok(()) => info!("Wrote default config to {:?}", config_path),
                Err(e) => warn!(
                    "Could not write default config to {:?}, using defaults: {}",
                    config_path, e
                ),
            }
            return Ok(Self::default());
        }

        Self::load_from(config_path)
    }

    /// Load config from a specific file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.editor.default_cue_span_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "editor.default_cue_span_ms must be greater than zero".to_string(),
            });
        }
        if self.editor.default_cue_text.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "editor.default_cue_text must not be empty".to_string(),
            });
        }
        if self.editor.default_export_name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "editor.default_export_name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn write_template(config_path: &Path) -> Result<()> {
    // Create config directory if it doesn't exist
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, CONFIG_TEMPLATE)?;
    Ok(())
}

/// Commented config written on first run
pub const CONFIG_TEMPLATE: &str = r#"# vttedit configuration
# ~/.config/vttedit/config.toml

[storage]
# The SQLite database is the primary store; the JSON blob store is always
# available as a fallback. Set to false to use only the blob store.
primary_enabled = true
# database_path = "/path/to/documents.db"
# blob_dir = "/path/to/blob"

[editor]
# Length and text of cues created with "add"
default_cue_span_ms = 3000
default_cue_text = "New cue"
# Export name used when no document is open
default_export_name = "subtitles.vtt"

[logging]
# Also write logs to ~/.config/vttedit/vttedit.log
enabled = false
"#;
