//! Messages between a VNC connection object and its session

/// Framebuffer area in server coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VncRect {
    /// Left edge
    pub x: u16,
    /// Top edge
    pub y: u16,
    /// Width
    pub width: u16,
    /// Height
    pub height: u16,
}

impl VncRect {
    /// Area at `(x, y)` of `width` x `height`
    #[must_use]
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// Top-left corner, widened for display arithmetic
    #[must_use]
    pub const fn origin(self) -> (u32, u32) {
        (self.x as u32, self.y as u32)
    }

    /// Size, widened for display arithmetic
    #[must_use]
    pub const fn size(self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

/// Credential kinds a VNC server can ask for in one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VncCredential {
    /// Login name
    Username,
    /// Password
    Password,
    /// Fixed client identification string
    ClientName,
    /// Anything else, by numeric id
    Other(u32),
}

/// What a connection object reports, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VncClientEvent {
    /// Handshake, including authentication, completed
    Connected,
    /// Server init received
    Initialized {
        /// Initial desktop width
        width: u32,
        /// Initial desktop height
        height: u32,
    },
    /// One credential round; every entry must be answered with
    /// `set_credential` before the handshake continues
    AuthCredential(Vec<VncCredential>),
    /// Server rejected the credentials
    AuthFailure(String),
    /// Server offered no authentication type we support
    AuthUnsupported(u32),
    /// Guest desktop resized
    ResolutionChanged {
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// BGRA pixels for one area
    FrameUpdate {
        /// Updated area
        rect: VncRect,
        /// Pixel data, row-major
        data: Vec<u8>,
    },
    /// Area copied within the framebuffer
    CopyRect {
        /// Destination area
        dst: VncRect,
        /// Source area, same size
        src: VncRect,
    },
    /// Guest bell
    Bell,
    /// Guest clipboard text
    ClipboardText(String),
    /// Non-fatal error worth logging
    Error(String),
    /// Connection closed; nothing follows
    Disconnected,
}

/// Requests from the session to a running connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VncClientCommand {
    /// Close the connection
    Disconnect,
    /// Key transition as an X11 keysym
    Key {
        /// X11 keysym
        keysym: u32,
        /// Press (`true`) or release
        down: bool,
    },
    /// Ask the server for a full framebuffer update
    Refresh,
}
