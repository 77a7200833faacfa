//! Where connection parameters come from
//!
//! virt-viewer resolves them from libvirt on every attempt; remote-viewer
//! has a fixed target from its command line. Both sit behind
//! [`ConnectionSource`] so the App's reconnect logic is shared.

use crate::domain::DomainLifecycle;
use crate::error::AppResult;
use crate::models::ConnectionSpec;
use crate::transport::Descriptor;

/// Everything needed to start one attempt
#[derive(Debug)]
pub struct Target {
    /// Connection parameters
    pub spec: ConnectionSpec,
    /// Guest name for window titles
    pub guest_name: Option<String>,
    /// Descriptor handed over by the management API (`--attach`)
    pub fd: Option<Descriptor>,
}

impl Target {
    /// Target without guest name or descriptor
    #[must_use]
    pub const fn new(spec: ConnectionSpec) -> Self {
        Self {
            spec,
            guest_name: None,
            fd: None,
        }
    }

    /// Sets the guest name
    #[must_use]
    pub fn with_guest_name(mut self, name: impl Into<String>) -> Self {
        self.guest_name = Some(name.into());
        self
    }
}

/// Outcome of one resolution
#[derive(Debug)]
pub enum Resolution {
    /// Ready to connect
    Ready(Target),
    /// Nothing to connect to yet; the message is shown as status
    Waiting(String),
}

/// Provides connection parameters for each attempt
pub trait ConnectionSource {
    /// Resolves the current target
    ///
    /// # Errors
    ///
    /// Returns an error when the guest cannot be reached and waiting would
    /// not help.
    fn resolve(&mut self) -> AppResult<Resolution>;

    /// Whether lifecycle push events are delivered
    fn has_events(&self) -> bool {
        false
    }

    /// Lifecycle events received since the last call
    fn poll_lifecycle(&mut self) -> Vec<DomainLifecycle> {
        Vec::new()
    }
}

/// Fixed target given on the command line
#[derive(Debug, Clone)]
pub struct UriSource {
    spec: ConnectionSpec,
    guest_name: Option<String>,
}

impl UriSource {
    /// Source always resolving to `spec`
    #[must_use]
    pub const fn new(spec: ConnectionSpec) -> Self {
        Self {
            spec,
            guest_name: None,
        }
    }

    /// Sets the guest name shown in titles
    #[must_use]
    pub fn with_guest_name(mut self, name: impl Into<String>) -> Self {
        self.guest_name = Some(name.into());
        self
    }
}

impl ConnectionSource for UriSource {
    fn resolve(&mut self) -> AppResult<Resolution> {
        Ok(Resolution::Ready(Target {
            spec: self.spec.clone(),
            guest_name: self.guest_name.clone(),
            fd: None,
        }))
    }
}
