//! SPICE library events
//!
//! Everything a SPICE binding reports back to the session: channel
//! lifecycle, per-channel state changes, display surfaces and USB errors.

/// Dirty area of a display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiceRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl SpiceRect {
    /// Area at `(x, y)` of `width` x `height`
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Channel types of a SPICE session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpiceChannel {
    /// Session control; its state drives the whole connection
    Main,
    /// One guest monitor per channel id
    Display,
    /// Keyboard and pointer
    Inputs,
    /// Server-side cursor
    Cursor,
    /// Audio out
    Playback,
    /// Audio in
    Record,
    /// USB device redirection
    Usbredir,
    /// Smartcard passthrough
    Smartcard,
    /// Folder sharing
    Webdav,
    /// Generic named port
    Port,
}

impl SpiceChannel {
    /// Channel type name as used by the SPICE protocol
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Display => "display",
            Self::Inputs => "inputs",
            Self::Cursor => "cursor",
            Self::Playback => "playback",
            Self::Record => "record",
            Self::Usbredir => "usbredir",
            Self::Smartcard => "smartcard",
            Self::Webdav => "webdav",
            Self::Port => "port",
        }
    }
}

impl std::fmt::Display for SpiceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One channel of a SPICE session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    /// Channel type
    pub channel: SpiceChannel,
    /// Channel id; for display channels this is the monitor index
    pub id: u32,
}

impl ChannelId {
    /// Creates a channel handle
    #[must_use]
    pub const fn new(channel: SpiceChannel, id: u32) -> Self {
        Self { channel, id }
    }

    /// The main channel
    #[must_use]
    pub const fn main() -> Self {
        Self::new(SpiceChannel::Main, 0)
    }

    /// Display channel `id`
    #[must_use]
    pub const fn display(id: u32) -> Self {
        Self::new(SpiceChannel::Display, id)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.channel, self.id)
    }
}

/// Per-channel state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiceChannelEvent {
    /// Channel link is up
    Opened,
    /// Channel closed
    Closed,
    /// Migration switch in progress
    Switching,
    /// Could not connect
    ErrorConnect,
    /// TLS negotiation failed
    ErrorTls,
    /// Link handshake failed
    ErrorLink,
    /// Server rejected the credentials
    ErrorAuth,
    /// I/O failure on an established channel
    ErrorIo,
}

/// Events emitted by a SPICE binding
#[derive(Debug, Clone)]
pub enum SpiceEvent {
    /// A channel was created
    ChannelNew(ChannelId),
    /// A channel changed state
    ChannelEvent {
        /// Affected channel
        channel: ChannelId,
        /// New state
        event: SpiceChannelEvent,
    },
    /// A channel needs its own connected descriptor
    ChannelOpenFd(ChannelId),
    /// A channel was destroyed
    ChannelDestroy(ChannelId),
    /// Primary surface of a display channel was (re)created
    PrimaryCreate {
        /// Display channel id
        channel_id: u32,
        /// Surface width
        width: u32,
        /// Surface height
        height: u32,
    },
    /// Display surface update (BGRA pixel data)
    Invalidate {
        /// Display channel id
        channel_id: u32,
        /// Updated area
        rect: SpiceRect,
        /// BGRA pixel data for the area
        data: Vec<u8>,
    },
    /// Guest monitor enabled or disabled
    MonitorEnabled {
        /// Display channel id
        channel_id: u32,
        /// Whether the monitor is active
        enabled: bool,
    },
    /// Pointer grab state changed on a display
    PointerGrab {
        /// Display channel id
        channel_id: u32,
        /// Whether the pointer is grabbed
        grabbed: bool,
    },
    /// Guest clipboard text
    ClipboardText(String),
    /// USB auto-connect of a device failed
    UsbAutoConnectFailed(String),
    /// USB redirection of a device failed
    UsbDeviceError(String),
}
