//! VNC protocol client
//!
//! [`VncProtocol`] is the surface a VNC library must offer to back a VNC
//! session: open by host or descriptor, answer credential requests, send
//! input and report events. With the `vnc-embedded` feature (on by default)
//! [`VncClient`] implements it on top of `vnc-rs`, running the protocol in a
//! background thread with its own Tokio runtime and talking to the caller
//! through `std::sync::mpsc` channels.

#[cfg(feature = "vnc-embedded")]
mod client;
mod config;
mod event;

use std::rc::Rc;

#[cfg(feature = "vnc-embedded")]
pub use client::{VncClient, VncCommandSender, VncEventReceiver};
pub use config::{VncClientConfig, VncEncoding};
pub use event::{VncClientCommand, VncClientEvent, VncCredential, VncRect};

use crate::error::ProtocolClientError;
use crate::transport::Descriptor;

/// A VNC display connection from the protocol library
pub trait VncProtocol {
    /// Starts connecting to `host:port`
    ///
    /// # Errors
    ///
    /// Returns an error if a connection is already open or cannot be started.
    fn open_host(&mut self, host: &str, port: u16) -> Result<(), ProtocolClientError>;

    /// Starts a connection over an already connected descriptor
    ///
    /// # Errors
    ///
    /// Returns an error if a connection is already open or cannot be started.
    fn open_fd(&mut self, fd: Descriptor) -> Result<(), ProtocolClientError>;

    /// Answers one credential of a pending `AuthCredential` request
    ///
    /// # Errors
    ///
    /// Returns an error if no request is pending or the kind is unsupported.
    fn set_credential(
        &mut self,
        credential: VncCredential,
        value: &str,
    ) -> Result<(), ProtocolClientError>;

    /// Closes the connection
    fn close(&mut self);

    /// Sends a command to the connection
    ///
    /// # Errors
    ///
    /// Returns an error if not connected.
    fn send_command(&mut self, command: VncClientCommand) -> Result<(), ProtocolClientError>;

    /// Next pending event, if any (non-blocking)
    fn try_recv_event(&mut self) -> Option<VncClientEvent>;
}

/// Builds fresh VNC connection objects
pub type VncFactory = Rc<dyn Fn() -> Box<dyn VncProtocol>>;

/// Factory for the built-in client, when compiled in
#[must_use]
pub fn default_factory() -> Option<VncFactory> {
    #[cfg(feature = "vnc-embedded")]
    {
        Some(Rc::new(|| {
            Box::new(VncClient::new(VncClientConfig::default())) as Box<dyn VncProtocol>
        }))
    }
    #[cfg(not(feature = "vnc-embedded"))]
    {
        None
    }
}

/// Check if embedded VNC support is available
#[must_use]
pub const fn is_embedded_vnc_available() -> bool {
    cfg!(feature = "vnc-embedded")
}
