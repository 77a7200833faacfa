//! Events a session reports to its owner

use crate::spice_client::ChannelId;

/// Lifecycle and display events drained by the App on each loop iteration
///
/// For one attempt they arrive in the order
/// `ChannelOpenRequest* -> Connected -> Initialized -> DisplayAdded* -> ...
/// -> Disconnected`, with `AuthRefused`/`AuthFailed` before `Disconnected`.
/// `Disconnected` or `Cancelled` is emitted exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Protocol handshake succeeded
    Connected,
    /// Protocol initialisation finished
    Initialized,
    /// Attempt ended
    Disconnected,
    /// Server rejected the credentials; a retry may succeed
    AuthRefused(String),
    /// Authentication cannot succeed (unsupported mechanism)
    AuthFailed(String),
    /// USB redirection failed
    UsbFailed(String),
    /// A channel needs its own descriptor
    ChannelOpenRequest(ChannelId),
    /// Display `nth` appeared
    DisplayAdded(usize),
    /// Display `nth` went away
    DisplayRemoved(usize),
    /// Guest resolution of display `nth` changed
    DesktopResized {
        /// Display index
        nth: usize,
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// Guest clipboard text
    CutText(String),
    /// Guest bell
    Bell,
    /// User aborted a credential prompt
    Cancelled,
}

impl SessionEvent {
    /// Whether this event ends the attempt
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Cancelled)
    }
}
