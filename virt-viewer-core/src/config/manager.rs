//! Settings file location and persistence

use std::fs;
use std::path::{Path, PathBuf};

use super::Settings;
use crate::error::{ConfigError, ConfigResult};

/// Directory name under the XDG config and data homes
const APP_DIR: &str = "virt-viewer";

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.toml";

/// Recent-connections file name
pub const RECENT_FILE: &str = "recent-connections.json";

/// Resolves and reads/writes the on-disk files
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ConfigManager {
    /// Uses the XDG config and data directories of the current user
    ///
    /// Returns `None` when the home directory cannot be determined.
    #[must_use]
    pub fn new() -> Option<Self> {
        Some(Self {
            config_dir: dirs::config_dir()?.join(APP_DIR),
            data_dir: dirs::data_dir()?.join(APP_DIR),
        })
    }

    /// Uses explicit directories
    #[must_use]
    pub fn with_dirs(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Path of the settings file
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Path of the recent-connections file
    #[must_use]
    pub fn recent_path(&self) -> PathBuf {
        self.data_dir.join(RECENT_FILE)
    }

    /// Loads settings; a missing file yields the defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_settings(&self) -> ConfigResult<Settings> {
        let path = self.settings_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Writes settings, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save_settings(&self, settings: &Settings) -> ConfigResult<()> {
        let text =
            toml::to_string_pretty(settings).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        write_file(&self.settings_path(), &text)
    }
}

/// Writes `contents` to `path`, creating parent directories
pub(crate) fn write_file(path: &Path, contents: &str) -> ConfigResult<()> {
    let io_err = |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
