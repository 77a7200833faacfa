//! Session connection state machine

use serde::{Deserialize, Serialize};

/// Lifecycle state of one connection attempt
///
/// ```text
/// Idle -open-> Connecting -> Connected -> Initialized
///                  |             |             |
///                  |             +------+------+
///                  v                    v
///              Cancelled           Disconnected
/// ```
///
/// `Connecting` may also go straight to `Disconnected`. `close()` returns
/// any state to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No attempt in progress
    #[default]
    Idle,
    /// `open_*` was called, waiting for the protocol handshake
    Connecting,
    /// Protocol handshake succeeded
    Connected,
    /// Protocol initialisation finished, displays may appear
    Initialized,
    /// Attempt ended
    Disconnected,
    /// Attempt aborted by the user during a credential prompt
    Cancelled,
}

impl SessionState {
    /// Whether `self -> next` is an allowed transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Idle)
                | (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Disconnected | Self::Cancelled)
                | (Self::Connected, Self::Initialized | Self::Disconnected)
                | (Self::Initialized, Self::Disconnected)
        )
    }

    /// Whether an attempt is in flight
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Initialized)
    }

    /// Whether the attempt has ended
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Cancelled)
    }

    /// Lowercase name used in log output and errors
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Initialized => "initialized",
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
