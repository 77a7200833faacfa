//! Error types for the viewer core
//!
//! Every concern has its own enum so callers can match on the failure class
//! they care about; `VirtViewerError` wraps them all for code that only
//! needs to report.

use thiserror::Error;

use crate::models::SessionKind;

/// Errors raised while opening a transport to a display server
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting a local socket failed
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// Socket path or address that was attempted
        target: String,
        /// Underlying OS error text
        reason: String,
    },

    /// The SSH tunnel process could not be started or exited immediately
    #[error("SSH tunnel to {host} failed: {reason}")]
    TunnelFailed {
        /// Relay host the tunnel was opened through
        host: String,
        /// Why the tunnel is unusable
        reason: String,
    },

    /// The connection parameters do not name any reachable target
    #[error("No display target: need host and port, a unix socket or a URI")]
    NoTarget,

    /// Both a URI and host/port were provided
    #[error("Connection parameters name both a URI and a host/port")]
    AmbiguousTarget,
}

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors raised by a protocol library binding (VNC or SPICE)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolClientError {
    /// Connection to the display server failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Protocol error during communication
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// IO error during network operations
    #[error("IO error: {0}")]
    IoError(String),

    /// Client is not connected
    #[error("Not connected")]
    NotConnected,

    /// Client is already connected
    #[error("Already connected")]
    AlreadyConnected,

    /// Channel communication error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Operation not supported by the library
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<std::io::Error> for ProtocolClientError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors raised by a display session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The protocol library refused to start the connection
    #[error("Failed to open {kind} session: {reason}")]
    OpenFailed {
        /// Protocol of the session
        kind: SessionKind,
        /// Reason reported by the protocol library
        reason: String,
    },

    /// An `open_*` call was made while an attempt is already in flight
    #[error("Session is already {0}")]
    Busy(String),

    /// The requested operation is not supported by this protocol
    #[error("{kind} sessions do not support {operation}")]
    Unsupported {
        /// Protocol of the session
        kind: SessionKind,
        /// Operation that was requested
        operation: &'static str,
    },

    /// No display with the given index exists
    #[error("No display with index {0}")]
    NoSuchDisplay(usize),

    /// Sending a command to the protocol library failed
    #[error("Protocol channel error: {0}")]
    Channel(String),
}

/// Result type for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors raised by the App controller
#[derive(Debug, Error)]
pub enum AppError {
    /// A session already exists
    #[error("A display session already exists")]
    SessionExists,

    /// No backend is compiled in for the requested protocol
    #[error("Unsupported graphic type '{0}'")]
    UnsupportedKind(String),

    /// `activate` was called while a connection attempt is open
    #[error("Connection is already active")]
    AlreadyActive,

    /// `activate` was called before any session was created
    #[error("No display session has been created")]
    NoSession,

    /// `activate` was called before connection parameters were set
    #[error("No connection parameters have been set")]
    NoConnectInfo,

    /// Opening the transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session refused to start
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Resolving the guest failed
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Resolving through the oVirt API failed
    #[error(transparent)]
    Ovirt(#[from] OvirtError),

    /// Fatal connection-source failure
    #[error("{0}")]
    Source(String),
}

/// Result type for App operations
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errors raised while resolving a guest through the management API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// No domain matches the given key
    #[error("Cannot find guest domain {0}")]
    NotFound(String),

    /// The management API could not be reached
    #[error("Unable to connect to libvirt with URI {uri}: {reason}")]
    ConnectFailed {
        /// Management URI that was used
        uri: String,
        /// Reason reported by libvirt
        reason: String,
    },

    /// The domain XML has no usable graphics device
    #[error("Cannot determine the graphic type for the guest {0}")]
    NoGraphics(String),

    /// The graphics device exists but has no allocated port yet
    #[error("Guest domain display is not yet active")]
    DisplayNotActive,

    /// The domain XML is malformed
    #[error("Cannot parse domain XML: {0}")]
    InvalidXml(String),

    /// Lifecycle state query failed
    #[error("Cannot get guest state: {0}")]
    State(String),

    /// The resolver cannot hand over a graphics descriptor
    #[error("Attaching to the guest display is not supported: {0}")]
    AttachUnsupported(String),

    /// The management API refused the graphics descriptor
    #[error("Cannot attach to the guest display: {0}")]
    Attach(String),
}

/// Result type for domain lookups
pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Errors raised by the oVirt REST collaborator
#[derive(Debug, Error)]
pub enum OvirtError {
    /// HTTP transport failure
    #[error("oVirt request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST API answered with an error status
    #[error("oVirt API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        body: String,
    },

    /// No VM with that name exists
    #[error("Cannot find VM {0}")]
    VmNotFound(String),

    /// The VM has no display descriptor
    #[error("VM {0} has no display")]
    NoDisplay(String),

    /// The response could not be parsed
    #[error("Cannot parse oVirt response: {0}")]
    Parse(String),

    /// The user cancelled the credential prompt
    #[error("Authentication was cancelled")]
    Cancelled,
}

/// Errors raised while parsing URIs
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The URI failed to parse
    #[error("Invalid URI '{uri}': {reason}")]
    Invalid {
        /// URI text
        uri: String,
        /// Parse failure
        reason: String,
    },

    /// The scheme does not name a supported display protocol
    #[error("Unsupported URI scheme '{0}'")]
    UnsupportedScheme(String),

    /// A host is required but missing
    #[error("URI '{0}' has no host")]
    MissingHost(String),
}

/// Errors raised while reading `.vv` connection files
#[derive(Debug, Error)]
pub enum VvFileError {
    /// The file could not be read
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The `[virt-viewer]` group is missing
    #[error("No [virt-viewer] group found")]
    MissingGroup,

    /// A required key is missing
    #[error("Missing required key '{0}'")]
    MissingKey(&'static str),

    /// A key has an unusable value
    #[error("Invalid value for '{key}': {value}")]
    InvalidValue {
        /// Key name
        key: &'static str,
        /// Offending value
        value: String,
    },
}

/// Errors raised while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing a file failed
    #[error("IO error on {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// TOML deserialization failed
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// File path
        path: String,
        /// Parser message
        reason: String,
    },

    /// TOML serialization failed
    #[error("Failed to serialize settings: {0}")]
    Serialize(String),

    /// JSON (de)serialization failed
    #[error("Invalid JSON in {path}: {reason}")]
    Json {
        /// File path
        path: String,
        /// Parser message
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Umbrella error for callers that only report failures
#[derive(Debug, Error)]
pub enum VirtViewerError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// App controller failure
    #[error(transparent)]
    App(#[from] AppError),

    /// Domain lookup failure
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// oVirt failure
    #[error(transparent)]
    Ovirt(#[from] OvirtError),

    /// URI failure
    #[error(transparent)]
    Uri(#[from] UriError),

    /// `.vv` file failure
    #[error(transparent)]
    VvFile(#[from] VvFileError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Protocol library failure
    #[error(transparent)]
    Protocol(#[from] ProtocolClientError),
}

/// Result type using the umbrella error
pub type Result<T> = std::result::Result<T, VirtViewerError>;
