//! libvirt collaborator
//!
//! virt-viewer finds the guest through the management API, reads the
//! `<graphics>` device from its XML and, when the API can deliver them,
//! follows lifecycle events instead of polling. The API itself sits behind
//! [`DomainResolver`]; [`LibvirtResolver`] talks to libvirt through the
//! `virt` bindings.

mod events;
mod libvirt;
mod source;
mod xml;

use std::fmt;

use uuid::Uuid;

pub use source::DomainSource;
pub use events::{DomainEvent, EventWatcher};
pub use libvirt::{LibvirtResolver, domain_state};
pub use xml::{GraphicsInfo, parse_graphics};

use crate::error::{DomainError, DomainResult};
use crate::transport::Descriptor;

/// How the user named the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainKey {
    /// Numeric id of a running domain
    Id(u32),
    /// Domain UUID
    Uuid(Uuid),
    /// Domain name
    Name(String),
}

impl DomainKey {
    /// Interprets a command-line argument: id, then UUID, then name
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if let Ok(id) = value.parse::<u32>() {
            return Self::Id(id);
        }
        if let Ok(uuid) = Uuid::parse_str(value) {
            return Self::Uuid(uuid);
        }
        Self::Name(value.to_string())
    }

    /// Whether `info` is the domain this key names
    #[must_use]
    pub fn matches(&self, info: &DomainInfo) -> bool {
        match self {
            Self::Id(id) => info.id == Some(*id),
            Self::Uuid(uuid) => info.uuid == Some(*uuid),
            Self::Name(name) => info.name == *name,
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Uuid(uuid) => write!(f, "{uuid}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Identity of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    /// Id while running
    pub id: Option<u32>,
    /// UUID
    pub uuid: Option<Uuid>,
    /// Name
    pub name: String,
}

/// Run state of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainState {
    /// Running (or blocked)
    Running,
    /// Paused by the user or the hypervisor
    Paused,
    /// Not running
    ShutOff,
    /// Any other state
    Other(String),
}

/// Lifecycle notification relevant to the App
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainLifecycle {
    /// The guest started
    Started,
    /// The guest stopped
    Stopped,
}

/// Access to the management API
pub trait DomainResolver {
    /// Management URI in use, `None` for the default connection
    fn uri(&self) -> Option<&str>;

    /// Looks a domain up
    ///
    /// # Errors
    ///
    /// Returns an error when the management API cannot be reached. A
    /// missing domain is `Ok(None)`.
    fn lookup(&mut self, key: &DomainKey) -> DomainResult<Option<DomainInfo>>;

    /// Current domain XML
    ///
    /// # Errors
    ///
    /// Returns an error if the XML cannot be fetched.
    fn dumpxml(&mut self, domain: &DomainInfo) -> DomainResult<String>;

    /// Current run state
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be fetched.
    fn state(&mut self, domain: &DomainInfo) -> DomainResult<DomainState>;

    /// Connected descriptor to the graphics device (`--attach`)
    ///
    /// # Errors
    ///
    /// Returns `AttachUnsupported` unless the resolver can hand one over.
    fn open_graphics(&mut self, domain: &DomainInfo) -> DomainResult<Descriptor> {
        Err(DomainError::AttachUnsupported(domain.name.clone()))
    }

    /// Starts delivering lifecycle events; `None` when unavailable
    fn watch_events(&mut self) -> Option<EventWatcher> {
        None
    }
}
