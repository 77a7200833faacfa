//! Display sessions
//!
//! A [`Session`] wraps one protocol backend (VNC or SPICE), runs the
//! per-attempt state machine and owns the displays the backend reports.
//! The App drains [`SessionEvent`]s from it on every loop iteration.

mod backend;
mod event;
mod manager;
mod spice;
mod state;
mod vnc;

pub use backend::{
    Backend, BackendEvent, BackendRegistry, Connectable, SmartcardCapable, UsbCapable,
    UsbDeviceSelector,
};
pub use event::SessionEvent;
pub use manager::Session;
pub use spice::SpiceBackend;
pub use state::SessionState;
pub use vnc::{VNC_CLIENT_NAME, VncBackend};

#[cfg(test)]
mod tests;
