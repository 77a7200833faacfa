//! Recent connections
//!
//! remote-viewer remembers the URIs it connected to, most recent first, so
//! the connection prompt can offer them again. Entries are keyed by URI; a
//! repeated connection moves the entry to the front.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::write_file;
use crate::error::{ConfigError, ConfigResult};
use crate::models::SessionKind;

/// MIME type recorded for `.vv` connection files
pub const VV_FILE_MIME: &str = "application/x-virt-viewer";

/// Maximum number of remembered connections
pub const MAX_RECENT: usize = 20;

/// One remembered connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEntry {
    /// Stable identifier
    pub id: Uuid,
    /// URI as typed by the user (or `.vv` file path)
    pub uri: String,
    /// `application/x-spice`, `application/x-vnc` or `application/x-virt-viewer`
    pub mime_type: String,
    /// Last successful connection
    pub last_used: DateTime<Utc>,
}

/// Recent connections list backed by a JSON file
#[derive(Debug, Clone)]
pub struct RecentConnections {
    path: PathBuf,
    entries: Vec<RecentEntry>,
}

impl RecentConnections {
    /// Loads the list; a missing file yields an empty list
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| ConfigError::Json {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Ok(Self { path, entries })
    }

    /// File backing this list
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries, most recent first
    #[must_use]
    pub fn entries(&self) -> &[RecentEntry] {
        &self.entries
    }

    /// Entries whose MIME type is one of `mime_types`
    pub fn filtered<'a>(
        &'a self,
        mime_types: &'a [&str],
    ) -> impl Iterator<Item = &'a RecentEntry> + 'a {
        self.entries
            .iter()
            .filter(|e| mime_types.contains(&e.mime_type.as_str()))
    }

    /// Records a connection to `uri` at `now`
    pub fn add(&mut self, uri: &str, mime_type: &str, now: DateTime<Utc>) {
        let id = self
            .entries
            .iter()
            .position(|e| e.uri == uri)
            .map_or_else(Uuid::new_v4, |pos| self.entries.remove(pos).id);
        self.entries.insert(
            0,
            RecentEntry {
                id,
                uri: uri.to_string(),
                mime_type: mime_type.to_string(),
                last_used: now,
            },
        );
        self.entries.truncate(MAX_RECENT);
    }

    /// Records a display-protocol connection
    pub fn add_session(&mut self, uri: &str, kind: SessionKind) {
        self.add(uri, kind.mime_type(), Utc::now());
    }

    /// Writes the list back
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self) -> ConfigResult<()> {
        let text = serde_json::to_string_pretty(&self.entries).map_err(|e| ConfigError::Json {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_file(&self.path, &text)?;
        tracing::debug!(path = %self.path.display(), count = self.entries.len(), "Saved recent connections");
        Ok(())
    }
}
