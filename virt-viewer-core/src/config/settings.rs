//! Settings schema

use serde::{Deserialize, Serialize};

use crate::display::{ZOOM_DEFAULT, ZOOM_MAX, ZOOM_MIN};
use crate::tracing::TracingLevel;
use crate::transport::DEFAULT_SSH_PROGRAM;

/// Top-level settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Window and display presentation
    pub viewer: ViewerSettings,
    /// SSH tunnelling
    pub ssh: SshSettings,
    /// Logging
    pub logging: LoggingSettings,
}

/// Window and display presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    /// Zoom level in percent
    pub zoom: u32,
    /// Start in fullscreen
    pub fullscreen: bool,
    /// Local screen width used for window fitting
    pub screen_width: u32,
    /// Local screen height used for window fitting
    pub screen_height: u32,
    /// Redirect newly plugged USB devices automatically (SPICE)
    pub auto_usbredir: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            zoom: ZOOM_DEFAULT,
            fullscreen: false,
            screen_width: 1920,
            screen_height: 1080,
            auto_usbredir: false,
        }
    }
}

impl ViewerSettings {
    /// Zoom clamped to what a display accepts
    #[must_use]
    pub fn clamped_zoom(&self) -> u32 {
        self.zoom.clamp(ZOOM_MIN, ZOOM_MAX)
    }

    /// Local screen geometry
    #[must_use]
    pub const fn screen(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }
}

/// SSH tunnelling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Program spawned for tunnels
    pub program: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_SSH_PROGRAM.to_string(),
        }
    }
}

/// Logging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level used when neither `--verbose`, `--debug` nor `RUST_LOG` is set
    pub level: TracingLevel,
}
