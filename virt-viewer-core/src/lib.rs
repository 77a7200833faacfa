//! virt-viewer Core Library
//!
//! Session, transport and reconnect logic shared by the `virt-viewer` and
//! `remote-viewer` front-ends.
//!
//! # Crate Structure
//!
//! - [`app`] - Reconnect controller: session lifecycle, retry policy, windows
//! - [`session`] - One VNC or SPICE connection and its per-attempt state machine
//! - [`transport`] - Unix sockets, SSH tunnels and descriptor handoff
//! - [`domain`] - libvirt guest lookup, graphics XML and lifecycle events
//! - [`ovirt`] - oVirt REST lookup of a VM console ticket
//! - [`vv_file`] - `.vv` connection files
//! - [`uri`] - Display and libvirt URI parsing
//! - [`config`] / [`recent`] - Settings and recent connections
//! - [`vnc_client`] / [`spice_client`] - Protocol library contracts and built-in clients
//!
//! # Feature Flags
//!
//! - `vnc-embedded` - Native VNC client via `vnc-rs` (default)
//! - `spice-embedded` - Native SPICE client via `spice-client` (default)

#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod credentials;
pub mod display;
pub mod domain;
pub mod error;
pub mod mainloop;
pub mod models;
pub mod ovirt;
pub mod recent;
pub mod session;
pub mod spice_client;
pub mod testing;
pub mod tracing;
pub mod transport;
pub mod uri;
pub mod vnc_client;
pub mod vv_file;

// =============================================================================
// Convenience re-exports
//
// Front-ends and the integration tests use these; library code imports via
// the module paths.
// =============================================================================

pub use app::{
    App, AppConfig, ConnectOutcome, ConnectionSource, Notifier, RECONNECT_POLL_INTERVAL,
    Resolution, STATUS_SHUTDOWN, STATUS_WAIT_RESTART, Target, UriSource, Window,
};
pub use config::{ConfigManager, Settings};
pub use credentials::{Cancelled, CredentialCollector, CredentialRequest, Credentials};
pub use display::{Display, KeyCombo, Snapshot, ZOOM_DEFAULT, ZOOM_MAX, ZOOM_MIN};
pub use domain::{
    DomainEvent, DomainInfo, DomainKey, DomainLifecycle, DomainResolver, DomainSource,
    DomainState, GraphicsInfo, LibvirtResolver,
};
pub use error::{
    AppError, AppResult, ConfigError, ConfigResult, DomainError, DomainResult, OvirtError,
    SessionError, SessionResult, TransportError, TransportResult, UriError, VirtViewerError,
    VvFileError,
};
pub use mainloop::{MainContext, SourceId, Task};
pub use models::{ConnectionSpec, SessionKind, SshRelay};
pub use ovirt::{OvirtClient, OvirtTarget};
pub use recent::{RecentConnections, RecentEntry};
pub use session::{BackendRegistry, Session, SessionEvent, SessionState};
pub use self::spice_client::{SpiceFactory, SpiceProtocol, is_embedded_spice_available};
pub use self::tracing::{TracingConfig, TracingLevel, TracingOutput, init_tracing};
pub use transport::{Descriptor, Endpoint, TransportOpener};
pub use uri::{DisplayUri, LibvirtUri, parse_display_uri};
pub use vnc_client::{VncFactory, VncProtocol, is_embedded_vnc_available};
pub use vv_file::VvFile;
