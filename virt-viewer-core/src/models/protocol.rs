//! Display protocol identifiers

use serde::{Deserialize, Serialize};

/// Display protocol spoken by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// VNC (RFB) protocol
    Vnc,
    /// SPICE protocol
    Spice,
}

impl SessionKind {
    /// All protocol kinds
    pub const ALL: [Self; 2] = [Self::Vnc, Self::Spice];

    /// Returns the lowercase identifier used in libvirt XML and URIs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vnc => "vnc",
            Self::Spice => "spice",
        }
    }

    /// Returns the default port for this protocol
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        5900
    }

    /// MIME type recorded in the recent-connections list
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Vnc => "application/x-vnc",
            Self::Spice => "application/x-spice",
        }
    }

    /// Maps a libvirt `<graphics type=...>` value to a protocol kind
    #[must_use]
    pub fn from_graphics_type(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "vnc" => Some(Self::Vnc),
            "spice" => Some(Self::Spice),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vnc => write!(f, "VNC"),
            Self::Spice => write!(f, "SPICE"),
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_graphics_type(s).ok_or_else(|| s.to_string())
    }
}
