//! Credential collection
//!
//! Protocol backends and the management collaborators ask for a username
//! and/or password through a [`CredentialCollector`]. The collector runs on
//! the loop thread; protocol threads waiting for the answer stay parked until
//! the session hands it back.

use secrecy::SecretString;
use thiserror::Error;

/// What is being asked for, and for which connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    /// Label of the requester (`VNC`, `SPICE`, `libvirt`, `oVirt`)
    pub kind: String,
    /// Address shown to the user, if known
    pub address: Option<String>,
    /// Whether a username must be returned
    pub need_username: bool,
    /// Whether a password must be returned
    pub need_password: bool,
}

impl CredentialRequest {
    /// Request for a password only
    #[must_use]
    pub fn password(kind: impl Into<String>, address: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            address,
            need_username: false,
            need_password: true,
        }
    }

    /// Request for both username and password
    #[must_use]
    pub fn username_password(kind: impl Into<String>, address: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            address,
            need_username: true,
            need_password: true,
        }
    }

    /// Prompt heading shown above the fields
    #[must_use]
    pub fn prompt(&self) -> String {
        match self.address {
            Some(ref address) => {
                format!("Authentication is required for the {} connection to:\n{address}", self.kind)
            }
            None => format!("Authentication is required for the {} connection", self.kind),
        }
    }
}

/// Values returned by a collector
///
/// Fields that were not requested are always `None`.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Collected username
    pub username: Option<String>,
    /// Collected password
    pub password: Option<SecretString>,
}

impl Credentials {
    /// Drops fields the request did not ask for
    #[must_use]
    pub fn restrict_to(mut self, request: &CredentialRequest) -> Self {
        if !request.need_username {
            self.username = None;
        }
        if !request.need_password {
            self.password = None;
        }
        self
    }
}

/// The user dismissed the credential prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Credential collection was cancelled")]
pub struct Cancelled;

/// Presents a modal prompt for credentials
///
/// May be called any number of times during one session; every call is an
/// independent prompt.
pub trait CredentialCollector {
    /// Blocks until the user confirms or cancels
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when the user aborts the prompt.
    fn collect(&mut self, request: &CredentialRequest) -> Result<Credentials, Cancelled>;
}
