//! Core data structures: protocol kinds and connection parameters

mod connection;
mod protocol;

pub use connection::{ConnectionSpec, SSH_TRANSPORT, SshRelay};
pub use protocol::SessionKind;
