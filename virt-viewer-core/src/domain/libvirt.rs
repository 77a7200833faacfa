//! Management API over the libvirt bindings
//!
//! One connection per resolver, opened on first use and reopened when
//! libvirt reports it dead. Every call looks the domain up again, so a guest
//! that was recreated between attempts is still found by name or UUID.

use std::fmt;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

use virt::connect::Connect;
use virt::domain::Domain;
use virt::error::{Error as VirtError, ErrorNumber};

use super::{DomainInfo, DomainKey, DomainResolver, DomainState, EventWatcher};
use crate::error::{DomainError, DomainResult};
use crate::transport::Descriptor;

/// Maps a `virDomainState` code
#[must_use]
pub fn domain_state(code: virt::sys::virDomainState) -> DomainState {
    match code {
        virt::sys::VIR_DOMAIN_RUNNING | virt::sys::VIR_DOMAIN_BLOCKED => DomainState::Running,
        virt::sys::VIR_DOMAIN_PAUSED | virt::sys::VIR_DOMAIN_PMSUSPENDED => DomainState::Paused,
        virt::sys::VIR_DOMAIN_SHUTOFF => DomainState::ShutOff,
        virt::sys::VIR_DOMAIN_NOSTATE => DomainState::Other("no state".to_string()),
        virt::sys::VIR_DOMAIN_SHUTDOWN => DomainState::Other("in shutdown".to_string()),
        virt::sys::VIR_DOMAIN_CRASHED => DomainState::Other("crashed".to_string()),
        other => DomainState::Other(format!("state {other}")),
    }
}

fn is_missing_domain(err: &VirtError) -> bool {
    err.code() == ErrorNumber::NoDomain
}

/// Resolver talking to libvirt through its C library
pub struct LibvirtResolver {
    uri: Option<String>,
    conn: Option<Connect>,
}

impl LibvirtResolver {
    /// Resolver for `uri` (the default connection when `None`)
    #[must_use]
    pub const fn new(uri: Option<String>) -> Self {
        Self { uri, conn: None }
    }

    fn uri_label(&self) -> String {
        self.uri.clone().unwrap_or_else(|| "default".to_string())
    }

    /// Open connection, reopened when the previous one died
    fn connection(&mut self) -> DomainResult<&Connect> {
        let conn = match self.conn.take() {
            Some(conn) if conn.is_alive().unwrap_or(false) => conn,
            stale => {
                if let Some(mut conn) = stale {
                    tracing::info!(uri = %self.uri_label(), "libvirt connection lost, reopening");
                    let _ = conn.close();
                }
                tracing::debug!(uri = %self.uri_label(), "Opening libvirt connection");
                Connect::open(self.uri.as_deref()).map_err(|e| DomainError::ConnectFailed {
                    uri: self.uri_label(),
                    reason: e.message().to_string(),
                })?
            }
        };
        Ok(self.conn.insert(conn))
    }

    fn find(&mut self, key: &DomainKey) -> DomainResult<Option<Domain>> {
        let uri = self.uri_label();
        let conn = self.connection()?;
        let found = match key {
            DomainKey::Id(id) => Domain::lookup_by_id(conn, *id),
            DomainKey::Uuid(uuid) => Domain::lookup_by_uuid(conn, *uuid),
            DomainKey::Name(name) => Domain::lookup_by_name(conn, name),
        };
        match found {
            Ok(domain) => Ok(Some(domain)),
            Err(e) if is_missing_domain(&e) => Ok(None),
            Err(e) => Err(DomainError::ConnectFailed {
                uri,
                reason: e.message().to_string(),
            }),
        }
    }

    /// Domain behind `info`, by UUID when known
    fn open_domain(&mut self, info: &DomainInfo) -> DomainResult<Domain> {
        let key = info
            .uuid
            .map_or_else(|| DomainKey::Name(info.name.clone()), DomainKey::Uuid);
        self.find(&key)?
            .ok_or_else(|| DomainError::NotFound(info.name.clone()))
    }
}

impl fmt::Debug for LibvirtResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibvirtResolver")
            .field("uri", &self.uri)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl Drop for LibvirtResolver {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take()
            && let Err(e) = conn.close()
        {
            tracing::warn!(error = %e.message(), "Failed to close libvirt connection");
        }
    }
}

impl DomainResolver for LibvirtResolver {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn lookup(&mut self, key: &DomainKey) -> DomainResult<Option<DomainInfo>> {
        let Some(domain) = self.find(key)? else {
            return Ok(None);
        };
        let name = domain.get_name().map_err(|e| DomainError::ConnectFailed {
            uri: self.uri_label(),
            reason: e.message().to_string(),
        })?;
        Ok(Some(DomainInfo {
            id: domain.get_id(),
            uuid: domain.get_uuid().ok(),
            name,
        }))
    }

    fn dumpxml(&mut self, info: &DomainInfo) -> DomainResult<String> {
        let domain = self.open_domain(info)?;
        // graphics passwords are only present in the secure dump
        domain
            .get_xml_desc(virt::sys::VIR_DOMAIN_XML_SECURE)
            .map_err(|e| DomainError::ConnectFailed {
                uri: self.uri_label(),
                reason: e.message().to_string(),
            })
    }

    fn state(&mut self, info: &DomainInfo) -> DomainResult<DomainState> {
        let domain = self.open_domain(info)?;
        let (code, _reason) = domain
            .get_state()
            .map_err(|e| DomainError::State(e.message().to_string()))?;
        Ok(domain_state(code))
    }

    fn open_graphics(&mut self, info: &DomainInfo) -> DomainResult<Descriptor> {
        let domain = self.open_domain(info)?;
        let (ours, theirs) =
            UnixStream::pair().map_err(|e| DomainError::Attach(e.to_string()))?;
        domain
            .open_graphics(
                0,
                theirs.as_raw_fd(),
                virt::sys::VIR_DOMAIN_OPEN_GRAPHICS_SKIPAUTH,
            )
            .map_err(|e| DomainError::Attach(e.message().to_string()))?;
        drop(theirs);
        tracing::info!(domain = %info.name, "Attached to guest graphics through libvirt");
        Ok(Descriptor::from_stream(ours))
    }

    fn watch_events(&mut self) -> Option<EventWatcher> {
        // the bindings expose no domain lifecycle callbacks
        tracing::debug!(uri = %self.uri_label(), "libvirt lifecycle events unavailable");
        None
    }
}
