//! SPICE session properties and USB device descriptions

use std::path::PathBuf;

use secrecy::SecretString;

/// Settable property of a SPICE session object
#[derive(Debug, Clone)]
pub enum SpiceProperty {
    /// Server host
    Host(String),
    /// Plain port
    Port(u16),
    /// TLS port
    TlsPort(u16),
    /// Password or ticket
    Password(SecretString),
    /// CA certificate file
    CaFile(PathBuf),
    /// CA certificate, PEM text
    Ca(String),
    /// Expected certificate subject
    HostSubject(String),
    /// Full `spice://` URI
    Uri(String),
}

impl SpiceProperty {
    /// Property name as used by the SPICE library
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Host(_) => "host",
            Self::Port(_) => "port",
            Self::TlsPort(_) => "tls-port",
            Self::Password(_) => "password",
            Self::CaFile(_) => "ca-file",
            Self::Ca(_) => "ca",
            Self::HostSubject(_) => "cert-subject",
            Self::Uri(_) => "uri",
        }
    }
}

/// A local USB device that can be redirected into the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// Bus/address identifier (`bus-addr`)
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Whether it is currently redirected
    pub redirected: bool,
}

impl UsbDevice {
    /// Creates a device entry
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            redirected: false,
        }
    }
}
