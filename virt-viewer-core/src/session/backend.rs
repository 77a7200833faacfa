//! Protocol backends and their capabilities
//!
//! Each protocol is one variant of [`Backend`]. Every backend can connect
//! ([`Connectable`]); USB redirection and smartcards are optional
//! capabilities handed out as `Option<&mut dyn ...>`.

use std::fmt;

use super::spice::SpiceBackend;
use super::vnc::VncBackend;
use crate::credentials::CredentialCollector;
use crate::display::KeyPress;
use crate::error::SessionResult;
use crate::models::{ConnectionSpec, SessionKind};
use crate::spice_client::{self, ChannelId, SpiceFactory, UsbDevice};
use crate::transport::Descriptor;
use crate::vnc_client::{self, VncFactory};

/// Protocol-neutral event produced by a backend while polling its library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Handshake succeeded
    Connected,
    /// Initialisation finished
    Initialized,
    /// Connection ended
    Disconnected,
    /// User cancelled a credential prompt
    Cancelled,
    /// Credentials rejected
    AuthRefused(String),
    /// Authentication impossible
    AuthFailed(String),
    /// USB redirection failed
    UsbFailed(String),
    /// A channel asks for its own descriptor
    ChannelOpenRequest(ChannelId),
    /// Display `nth` appeared
    DisplayAdded(usize),
    /// Display `nth` went away
    DisplayRemoved(usize),
    /// Guest resolution reported
    DesktopResized {
        /// Display index
        nth: usize,
        /// Width
        width: u32,
        /// Height
        height: u32,
    },
    /// Framebuffer update
    Frame {
        /// Display index
        nth: usize,
        /// Left edge
        x: u32,
        /// Top edge
        y: u32,
        /// Width
        width: u32,
        /// Height
        height: u32,
        /// BGRA data
        data: Vec<u8>,
    },
    /// Copy of a framebuffer area
    CopyRect {
        /// Display index
        nth: usize,
        /// Source top-left corner
        src: (u32, u32),
        /// Destination top-left corner
        dst: (u32, u32),
        /// Width
        width: u32,
        /// Height
        height: u32,
    },
    /// Guest monitor turned on/off
    MonitorEnabled {
        /// Display index
        nth: usize,
        /// New state
        enabled: bool,
    },
    /// Pointer grab changed
    PointerGrab {
        /// Display index
        nth: usize,
        /// New state
        grabbed: bool,
    },
    /// Guest clipboard text
    CutText(String),
    /// Guest bell
    Bell,
}

/// Connection lifecycle every backend implements
pub trait Connectable {
    /// Protocol of this backend
    fn kind(&self) -> SessionKind;

    /// Applies password and TLS settings for the next attempt
    fn configure(&mut self, spec: &ConnectionSpec);

    /// Starts a connection over a connected descriptor
    ///
    /// # Errors
    ///
    /// Returns an error if the library refuses to start.
    fn open_fd(&mut self, fd: Descriptor) -> SessionResult<()>;

    /// Starts a direct connection
    ///
    /// # Errors
    ///
    /// Returns an error if the library refuses to start.
    fn open_host(&mut self, host: &str, port: u16, tls_port: Option<u16>) -> SessionResult<()>;

    /// Starts a connection from a display URI
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is unusable or the library refuses to start.
    fn open_uri(&mut self, uri: &str) -> SessionResult<()>;

    /// Hands a descriptor to a channel that requested one
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for protocols without secondary channels.
    fn channel_open_fd(&mut self, channel: ChannelId, fd: Descriptor) -> SessionResult<()>;

    /// Disconnects and replaces the library object with a fresh one
    fn close(&mut self);

    /// Drains library events, running credential prompts as they come up
    fn poll_events(&mut self, collector: &mut dyn CredentialCollector) -> Vec<BackendEvent>;

    /// Forwards key transitions for display `nth`
    fn send_keys(&mut self, nth: usize, keys: &[KeyPress]);
}

/// USB redirection capability
pub trait UsbCapable {
    /// Whether a USB device manager is available
    fn has_usb(&self) -> bool;

    /// Turns automatic redirection of new devices on or off
    fn set_auto_redirect(&mut self, enabled: bool);

    /// Devices that can be redirected
    fn usb_devices(&self) -> Vec<UsbDevice>;

    /// Redirects or releases one device
    ///
    /// # Errors
    ///
    /// Returns an error if the library fails to change the redirection.
    fn redirect_usb_device(&mut self, device: &UsbDevice, redirect: bool) -> SessionResult<()>;
}

/// Smartcard capability
pub trait SmartcardCapable {
    /// Inserts the software smartcard
    fn smartcard_insert(&mut self) -> bool;

    /// Removes the software smartcard
    fn smartcard_remove(&mut self) -> bool;
}

/// Picks which USB devices should be redirected
///
/// Stands in for the device selection dialog.
pub trait UsbDeviceSelector {
    /// Returns the wanted redirect state for each device id to change
    fn select(&mut self, devices: &[UsbDevice]) -> Vec<(String, bool)>;
}

/// One protocol backend
pub enum Backend {
    /// VNC
    Vnc(VncBackend),
    /// SPICE
    Spice(SpiceBackend),
}

impl Backend {
    /// Protocol of this backend
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.connectable_ref().kind()
    }

    fn connectable_ref(&self) -> &dyn Connectable {
        match self {
            Self::Vnc(backend) => backend,
            Self::Spice(backend) => backend,
        }
    }

    /// Connection lifecycle
    pub fn connectable(&mut self) -> &mut dyn Connectable {
        match self {
            Self::Vnc(backend) => backend,
            Self::Spice(backend) => backend,
        }
    }

    /// USB capability, if the protocol has one
    pub fn usb(&mut self) -> Option<&mut dyn UsbCapable> {
        match self {
            Self::Vnc(_) => None,
            Self::Spice(backend) => Some(backend),
        }
    }

    /// USB capability for read-only queries
    #[must_use]
    pub fn usb_ref(&self) -> Option<&dyn UsbCapable> {
        match self {
            Self::Vnc(_) => None,
            Self::Spice(backend) => Some(backend),
        }
    }

    /// Smartcard capability, if the protocol has one
    pub fn smartcard(&mut self) -> Option<&mut dyn SmartcardCapable> {
        match self {
            Self::Vnc(_) => None,
            Self::Spice(backend) => Some(backend),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.kind()).finish()
    }
}

/// Protocol library factories available to this process
#[derive(Clone, Default)]
pub struct BackendRegistry {
    vnc: Option<VncFactory>,
    spice: Option<SpiceFactory>,
}

impl BackendRegistry {
    /// Registry with the libraries compiled into this crate
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            vnc: vnc_client::default_factory(),
            spice: spice_client::default_factory(),
        }
    }

    /// Registers a VNC library
    #[must_use]
    pub fn with_vnc(mut self, factory: VncFactory) -> Self {
        self.vnc = Some(factory);
        self
    }

    /// Registers a SPICE library
    #[must_use]
    pub fn with_spice(mut self, factory: SpiceFactory) -> Self {
        self.spice = Some(factory);
        self
    }

    /// Whether a backend exists for `kind`
    #[must_use]
    pub const fn supports(&self, kind: SessionKind) -> bool {
        match kind {
            SessionKind::Vnc => self.vnc.is_some(),
            SessionKind::Spice => self.spice.is_some(),
        }
    }

    /// Builds a backend for `kind`, if one is registered
    #[must_use]
    pub fn create(&self, kind: SessionKind) -> Option<Backend> {
        match kind {
            SessionKind::Vnc => self.vnc.clone().map(|f| Backend::Vnc(VncBackend::new(f))),
            SessionKind::Spice => self
                .spice
                .clone()
                .map(|f| Backend::Spice(SpiceBackend::new(f))),
        }
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("vnc", &self.vnc.is_some())
            .field("spice", &self.spice.is_some())
            .finish()
    }
}
