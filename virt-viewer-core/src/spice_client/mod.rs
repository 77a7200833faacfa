//! SPICE protocol client
//!
//! [`SpiceProtocol`] is the surface a SPICE library must offer to back a
//! SPICE session: a session object with settable properties, `connect()`,
//! per-channel events, descriptor handoff and the USB/smartcard managers.
//! With the `spice-embedded` feature (on by default) [`SpiceClient`]
//! implements it on top of `spice-client`. Front-ends with a richer binding
//! register their own [`SpiceFactory`].

#[cfg(feature = "spice-embedded")]
mod client;
mod config;
mod event;

use std::rc::Rc;

#[cfg(feature = "spice-embedded")]
pub use client::{SpiceClient, SpiceClientCommand, SpiceCommandSender, SpiceEventReceiver};
pub use config::{SpiceProperty, UsbDevice};
pub use event::{ChannelId, SpiceChannel, SpiceChannelEvent, SpiceEvent, SpiceRect};

use crate::display::KeyPress;
use crate::error::ProtocolClientError;
use crate::transport::Descriptor;

/// A SPICE session object from the protocol library
///
/// A disconnected object cannot be reconnected; the owning session builds a
/// fresh one through its [`SpiceFactory`] after every close.
pub trait SpiceProtocol {
    /// Sets a session property
    fn set_property(&mut self, property: SpiceProperty);

    /// Starts connecting with the current properties
    ///
    /// # Errors
    ///
    /// Returns an error if the library refuses to start.
    fn connect(&mut self) -> Result<(), ProtocolClientError>;

    /// Starts a session over an already connected descriptor
    ///
    /// # Errors
    ///
    /// Returns an error if the library refuses the descriptor.
    fn open_fd(&mut self, fd: Descriptor) -> Result<(), ProtocolClientError>;

    /// Hands a connected descriptor to a channel that asked for one
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is unknown or refuses the descriptor.
    fn channel_open_fd(&mut self, channel: ChannelId, fd: Descriptor)
    -> Result<(), ProtocolClientError>;

    /// Disconnects every channel
    fn disconnect(&mut self);

    /// Next pending event, if any (non-blocking)
    fn try_recv_event(&mut self) -> Option<SpiceEvent>;

    /// Sends key transitions through the inputs channel
    fn send_keys(&mut self, channel_id: u32, keys: &[KeyPress]);

    /// Whether a USB device manager is available
    fn has_usb(&self) -> bool {
        false
    }

    /// Turns on automatic redirection of newly plugged USB devices
    fn set_usb_autoconnect(&mut self, _enabled: bool) {}

    /// Local USB devices known to the device manager
    fn usb_devices(&self) -> Vec<UsbDevice> {
        Vec::new()
    }

    /// Redirects or releases a USB device
    ///
    /// # Errors
    ///
    /// Returns an error if redirection is unavailable or fails.
    fn redirect_usb_device(
        &mut self,
        device: &UsbDevice,
        _redirect: bool,
    ) -> Result<(), ProtocolClientError> {
        Err(ProtocolClientError::Unsupported(format!(
            "USB redirection of {}",
            device.id
        )))
    }

    /// Inserts the software smartcard; returns `false` if unavailable
    fn smartcard_insert(&mut self) -> bool {
        false
    }

    /// Removes the software smartcard; returns `false` if unavailable
    fn smartcard_remove(&mut self) -> bool {
        false
    }
}

/// Builds fresh SPICE session objects
pub type SpiceFactory = Rc<dyn Fn() -> Box<dyn SpiceProtocol>>;

/// Factory for the built-in client, when compiled in
#[must_use]
pub fn default_factory() -> Option<SpiceFactory> {
    #[cfg(feature = "spice-embedded")]
    {
        Some(Rc::new(|| Box::new(SpiceClient::new()) as Box<dyn SpiceProtocol>))
    }
    #[cfg(not(feature = "spice-embedded"))]
    {
        None
    }
}

/// Check if embedded SPICE support is available
#[must_use]
pub const fn is_embedded_spice_available() -> bool {
    cfg!(feature = "spice-embedded")
}
