//! Display and management URI parsing
//!
//! Display URIs (`spice://`, `vnc://`, `spice+unix://`, `vnc+unix://`,
//! `ovirt://`) are what remote-viewer accepts on its command line.
//! Management URIs (`qemu+ssh://user@host:port/system`) tell virt-viewer how
//! to reach libvirt and, through the transport part, whether the display
//! connection must be tunnelled.

use url::Url;

use crate::error::UriError;
use crate::models::{ConnectionSpec, SSH_TRANSPORT, SessionKind, SshRelay};
use crate::ovirt::OvirtTarget;

/// Result of parsing a remote-viewer URI
#[derive(Debug, Clone)]
pub enum DisplayUri {
    /// Direct connection to a display server
    Direct(ConnectionSpec),
    /// VM to be looked up through the oVirt REST API
    Ovirt(OvirtTarget),
}

fn parse_url(uri: &str) -> Result<Url, UriError> {
    Url::parse(uri).map_err(|e| UriError::Invalid {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}

/// Strips the brackets `url` keeps around IPv6 literals
fn host_of(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
}

fn user_of(url: &Url) -> Option<String> {
    let user = url.username();
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

/// Parses a remote-viewer display URI
///
/// # Errors
///
/// Returns an error when the URI is malformed, uses an unknown scheme or
/// lacks a host where one is needed.
pub fn parse_display_uri(uri: &str) -> Result<DisplayUri, UriError> {
    let url = parse_url(uri)?;
    let scheme = url.scheme().to_ascii_lowercase();
    let (base, transport) = match scheme.split_once('+') {
        Some((base, transport)) => (base.to_string(), Some(transport.to_string())),
        None => (scheme.clone(), None),
    };

    if base == "ovirt" {
        let host = host_of(&url).ok_or_else(|| UriError::MissingHost(uri.to_string()))?;
        let vm_name = url.path().trim_matches('/').to_string();
        if vm_name.is_empty() {
            return Err(UriError::Invalid {
                uri: uri.to_string(),
                reason: "no VM name in path".to_string(),
            });
        }
        return Ok(DisplayUri::Ovirt(OvirtTarget {
            host,
            port: url.port(),
            user: user_of(&url),
            vm_name,
        }));
    }

    let kind = SessionKind::from_graphics_type(&base)
        .ok_or_else(|| UriError::UnsupportedScheme(scheme.clone()))?;

    if transport.as_deref() == Some("unix") {
        let path = url.path();
        if path.is_empty() || path == "/" {
            return Err(UriError::Invalid {
                uri: uri.to_string(),
                reason: "no socket path".to_string(),
            });
        }
        return Ok(DisplayUri::Direct(ConnectionSpec::with_unix_socket(kind, path)));
    }
    if let Some(transport) = transport
        && transport != "tls"
    {
        return Err(UriError::UnsupportedScheme(scheme));
    }

    let host = host_of(&url).ok_or_else(|| UriError::MissingHost(uri.to_string()))?;
    let spec = match kind {
        // spice-gtk parses tls-port, password and friends from the URI itself
        SessionKind::Spice => ConnectionSpec::with_uri(kind, uri),
        SessionKind::Vnc => {
            let port = url.port().unwrap_or_else(|| kind.default_port());
            ConnectionSpec::with_host(kind, host, port)
        }
    };
    Ok(DisplayUri::Direct(spec))
}

/// Parsed libvirt management URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibvirtUri {
    /// Hypervisor driver (`qemu`, `xen`, ...)
    pub driver: String,
    /// Transport (`ssh`, `tcp`, `tls`, `unix`, ...)
    pub transport: Option<String>,
    /// Login user
    pub user: Option<String>,
    /// Remote host, `None` for a local hypervisor
    pub host: Option<String>,
    /// Remote port
    pub port: Option<u16>,
}

impl LibvirtUri {
    /// Parses `driver[+transport]://[user@][host][:port]/path`
    ///
    /// # Errors
    ///
    /// Returns an error when the URI is malformed.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let url = parse_url(uri)?;
        let scheme = url.scheme().to_ascii_lowercase();
        let (driver, transport) = match scheme.split_once('+') {
            Some((d, t)) => (d.to_string(), Some(t.to_string())),
            None => (scheme, None),
        };
        Ok(Self {
            driver,
            transport,
            user: user_of(&url),
            host: host_of(&url),
            port: url.port(),
        })
    }

    /// SSH relay for tunnelling display connections, if the transport is ssh
    #[must_use]
    pub fn ssh_relay(&self) -> Option<SshRelay> {
        if !self
            .transport
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(SSH_TRANSPORT))
        {
            return None;
        }
        let host = self.host.clone()?;
        Some(SshRelay {
            host,
            port: self.port,
            user: self.user.clone(),
        })
    }
}
