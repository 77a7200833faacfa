//! Options of the embedded VNC client

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wire encodings the client offers, most preferred first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VncEncoding {
    /// Tight (zlib/JPEG)
    Tight,
    /// Zlib run-length
    Zrle,
    /// Copy from elsewhere on the framebuffer
    CopyRect,
    /// Uncompressed pixels
    Raw,
}

/// Settings shared by every connection a VNC session opens
///
/// Targets are not part of it: they are passed to `open_host`/`open_fd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VncClientConfig {
    /// Offered encodings
    pub encodings: Vec<VncEncoding>,
    /// Ask the server to keep other clients connected
    pub shared: bool,
    /// Framebuffer refresh period in milliseconds
    pub refresh_interval_ms: u64,
}

impl Default for VncClientConfig {
    fn default() -> Self {
        Self {
            encodings: vec![
                VncEncoding::Tight,
                VncEncoding::Zrle,
                VncEncoding::CopyRect,
                VncEncoding::Raw,
            ],
            // other viewers of the same guest stay connected
            shared: true,
            refresh_interval_ms: 16,
        }
    }
}

impl VncClientConfig {
    /// Requests an exclusive session
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.shared = false;
        self
    }

    /// Refresh period
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_share_the_guest() {
        let config = VncClientConfig::default();
        assert!(config.shared);
        assert_eq!(config.encodings.first(), Some(&VncEncoding::Tight));
        assert_eq!(config.encodings.last(), Some(&VncEncoding::Raw));
        assert_eq!(config.refresh_interval(), Duration::from_millis(16));
        assert!(!config.exclusive().shared);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: VncClientConfig = toml::from_str("encodings = [\"raw\"]").unwrap();
        assert_eq!(config.encodings, vec![VncEncoding::Raw]);
        assert!(config.shared);
    }
}
