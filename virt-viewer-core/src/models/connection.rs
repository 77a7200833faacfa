//! Connection parameters for reaching a display server

use std::path::PathBuf;

use secrecy::SecretString;

use super::SessionKind;
use crate::error::{TransportError, TransportResult};

/// Transport name that requests an SSH tunnel
pub const SSH_TRANSPORT: &str = "ssh";

/// Relay host used to tunnel the display connection over SSH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshRelay {
    /// Host to ssh into
    pub host: String,
    /// SSH port, `None` for the ssh default
    pub port: Option<u16>,
    /// Login user, `None` for the ssh default
    pub user: Option<String>,
}

impl SshRelay {
    /// Creates a relay through `host`
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
        }
    }

    /// Sets the SSH port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// One full set of parameters needed to reach a display server
///
/// At least one of host+port, a unix socket path or a URI must be set before
/// a session is opened with it; see [`ConnectionSpec::validate`].
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    /// Display protocol
    pub kind: SessionKind,
    /// Display server host as seen from the relay (or from us when direct)
    pub host: Option<String>,
    /// Display server port
    pub port: Option<u16>,
    /// SPICE TLS port
    pub tls_port: Option<u16>,
    /// Local (or relay-side) unix socket of the display server
    pub unix_socket_path: Option<PathBuf>,
    /// Transport named by the management URI (`ssh`, `tcp`, `tls`, ...)
    pub transport: Option<String>,
    /// SSH relay used when the transport is `ssh`
    pub ssh_relay: Option<SshRelay>,
    /// Connect straight to the display server even when the management
    /// connection is tunnelled
    pub direct: bool,
    /// Full display URI handed to the protocol library verbatim
    pub uri: Option<String>,
    /// Password or ticket known up front (oVirt ticket, `.vv` file)
    pub password: Option<SecretString>,
    /// CA certificate file for SPICE TLS
    pub ca_file: Option<PathBuf>,
    /// CA certificate for SPICE TLS given inline as PEM text
    pub ca: Option<String>,
    /// Expected certificate subject for SPICE TLS
    pub host_subject: Option<String>,
}

impl ConnectionSpec {
    fn empty(kind: SessionKind) -> Self {
        Self {
            kind,
            host: None,
            port: None,
            tls_port: None,
            unix_socket_path: None,
            transport: None,
            ssh_relay: None,
            direct: false,
            uri: None,
            password: None,
            ca_file: None,
            ca: None,
            host_subject: None,
        }
    }

    /// Targets `host:port`
    #[must_use]
    pub fn with_host(kind: SessionKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::empty(kind)
        }
    }

    /// Targets a unix socket
    #[must_use]
    pub fn with_unix_socket(kind: SessionKind, path: impl Into<PathBuf>) -> Self {
        Self {
            unix_socket_path: Some(path.into()),
            ..Self::empty(kind)
        }
    }

    /// Targets a display URI
    #[must_use]
    pub fn with_uri(kind: SessionKind, uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::empty(kind)
        }
    }

    /// Sets the SPICE TLS port
    #[must_use]
    pub const fn tls_port(mut self, port: u16) -> Self {
        self.tls_port = Some(port);
        self
    }

    /// Tunnels through `relay` over SSH
    #[must_use]
    pub fn ssh_relay(mut self, relay: SshRelay) -> Self {
        self.transport = Some(SSH_TRANSPORT.to_string());
        self.ssh_relay = Some(relay);
        self
    }

    /// Sets the direct flag
    #[must_use]
    pub const fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Sets the password known up front
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Returns true when the display connection must go through an SSH tunnel
    #[must_use]
    pub fn uses_ssh_tunnel(&self) -> bool {
        !self.direct
            && self.ssh_relay.is_some()
            && self
                .transport
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(SSH_TRANSPORT))
    }

    /// Checks that the spec names exactly one kind of target
    ///
    /// # Errors
    ///
    /// Returns `NoTarget` when nothing is set and `AmbiguousTarget` when a
    /// URI is combined with host/port.
    pub fn validate(&self) -> TransportResult<()> {
        let has_host = self.host.is_some() && self.port.is_some();
        let has_unix = self.unix_socket_path.is_some();
        let has_uri = self.uri.is_some();

        if has_uri && (self.host.is_some() || self.port.is_some()) {
            return Err(TransportError::AmbiguousTarget);
        }
        if !has_host && !has_unix && !has_uri {
            return Err(TransportError::NoTarget);
        }
        Ok(())
    }

    /// Human-readable address shown in error dialogs
    #[must_use]
    pub fn pretty_address(&self) -> String {
        match (&self.host, self.port, &self.unix_socket_path, &self.uri) {
            (Some(host), Some(port), _, _) => format!("{host}:{port}"),
            (_, _, Some(path), _) => path.display().to_string(),
            (_, _, _, Some(uri)) => uri.clone(),
            (Some(host), None, _, _) => host.clone(),
            _ => String::new(),
        }
    }
}
