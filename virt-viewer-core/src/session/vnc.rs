//! VNC session backend

use secrecy::{ExposeSecret, SecretString};

use super::backend::{BackendEvent, Connectable};
use crate::credentials::{CredentialCollector, CredentialRequest};
use crate::display::KeyPress;
use crate::error::{ProtocolClientError, SessionError, SessionResult};
use crate::models::{ConnectionSpec, SessionKind};
use crate::spice_client::ChannelId;
use crate::transport::Descriptor;
use crate::vnc_client::{
    VncClientCommand, VncClientEvent, VncCredential, VncFactory, VncProtocol,
};

/// Value sent for the client-name credential
pub const VNC_CLIENT_NAME: &str = "libvirt";

/// VNC has a single display
const VNC_DISPLAY: usize = 0;

fn open_failed(err: &ProtocolClientError) -> SessionError {
    SessionError::OpenFailed {
        kind: SessionKind::Vnc,
        reason: err.to_string(),
    }
}

/// Backend driving one VNC connection object
pub struct VncBackend {
    factory: VncFactory,
    protocol: Box<dyn VncProtocol>,
    address: Option<String>,
    /// Password known up front, used for the first request only
    preset_password: Option<SecretString>,
}

impl VncBackend {
    /// Creates a backend building its connection objects with `factory`
    #[must_use]
    pub fn new(factory: VncFactory) -> Self {
        let protocol = factory();
        Self {
            factory,
            protocol,
            address: None,
            preset_password: None,
        }
    }

    /// Answers one credential request round
    ///
    /// Returns `false` when the connection was closed and polling must stop.
    fn handle_credentials(
        &mut self,
        wanted: &[VncCredential],
        collector: &mut dyn CredentialCollector,
        events: &mut Vec<BackendEvent>,
    ) -> bool {
        if let Some(VncCredential::Other(id)) = wanted
            .iter()
            .find(|c| matches!(c, VncCredential::Other(_)))
        {
            tracing::warn!(credential = id, "Unsupported credential type {id}");
            self.protocol.close();
            events.push(BackendEvent::Disconnected);
            return false;
        }

        let want_username = wanted.contains(&VncCredential::Username);
        let mut want_password = wanted.contains(&VncCredential::Password);
        let mut username = None;
        let mut password = None;

        if want_password
            && !want_username
            && let Some(preset) = self.preset_password.take()
        {
            password = Some(preset);
            want_password = false;
        }

        if want_username || want_password {
            let request = CredentialRequest {
                kind: "VNC".to_string(),
                address: self.address.clone(),
                need_username: want_username,
                need_password: want_password,
            };
            match collector.collect(&request) {
                Ok(creds) => {
                    let creds = creds.restrict_to(&request);
                    username = creds.username;
                    if want_password {
                        password = creds.password;
                    }
                }
                Err(_) => {
                    tracing::debug!("VNC credential prompt cancelled");
                    self.protocol.close();
                    events.push(BackendEvent::Cancelled);
                    return false;
                }
            }
        }

        for credential in wanted {
            let result = match credential {
                VncCredential::Username => self
                    .protocol
                    .set_credential(*credential, username.as_deref().unwrap_or_default()),
                VncCredential::Password => self.protocol.set_credential(
                    *credential,
                    password
                        .as_ref()
                        .map(ExposeSecret::expose_secret)
                        .unwrap_or_default(),
                ),
                VncCredential::ClientName => {
                    self.protocol.set_credential(*credential, VNC_CLIENT_NAME)
                }
                VncCredential::Other(_) => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!(?credential, error = %e, "Failed to set credential type");
                self.protocol.close();
                events.push(BackendEvent::Disconnected);
                return false;
            }
        }
        true
    }
}

impl Connectable for VncBackend {
    fn kind(&self) -> SessionKind {
        SessionKind::Vnc
    }

    fn configure(&mut self, spec: &ConnectionSpec) {
        self.address = Some(spec.pretty_address()).filter(|a| !a.is_empty());
        self.preset_password.clone_from(&spec.password);
    }

    fn open_fd(&mut self, fd: Descriptor) -> SessionResult<()> {
        self.protocol.open_fd(fd).map_err(|e| open_failed(&e))
    }

    fn open_host(&mut self, host: &str, port: u16, _tls_port: Option<u16>) -> SessionResult<()> {
        self.protocol.open_host(host, port).map_err(|e| open_failed(&e))
    }

    fn open_uri(&mut self, uri: &str) -> SessionResult<()> {
        let url = url::Url::parse(uri).map_err(|e| SessionError::OpenFailed {
            kind: SessionKind::Vnc,
            reason: format!("{uri}: {e}"),
        })?;
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| {
            SessionError::OpenFailed {
                kind: SessionKind::Vnc,
                reason: format!("{uri}: no host"),
            }
        })?;
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        let port = url.port().unwrap_or_else(|| SessionKind::Vnc.default_port());
        self.open_host(&host, port, None)
    }

    fn channel_open_fd(&mut self, _channel: ChannelId, _fd: Descriptor) -> SessionResult<()> {
        Err(SessionError::Unsupported {
            kind: SessionKind::Vnc,
            operation: "channel descriptors",
        })
    }

    fn close(&mut self) {
        self.protocol.close();
        self.protocol = (self.factory)();
    }

    fn poll_events(&mut self, collector: &mut dyn CredentialCollector) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.protocol.try_recv_event() {
            match event {
                VncClientEvent::Connected => events.push(BackendEvent::Connected),
                VncClientEvent::Initialized { width, height } => {
                    events.push(BackendEvent::Initialized);
                    events.push(BackendEvent::DisplayAdded(VNC_DISPLAY));
                    events.push(BackendEvent::DesktopResized {
                        nth: VNC_DISPLAY,
                        width,
                        height,
                    });
                }
                VncClientEvent::AuthCredential(wanted) => {
                    if !self.handle_credentials(&wanted, collector, &mut events) {
                        break;
                    }
                }
                VncClientEvent::AuthFailure(reason) => {
                    events.push(BackendEvent::AuthRefused(reason));
                }
                VncClientEvent::AuthUnsupported(auth_type) => {
                    events.push(BackendEvent::AuthFailed(format!(
                        "Unsupported authentication type {auth_type}"
                    )));
                    self.protocol.close();
                    events.push(BackendEvent::Disconnected);
                    break;
                }
                VncClientEvent::ResolutionChanged { width, height } => {
                    events.push(BackendEvent::DesktopResized {
                        nth: VNC_DISPLAY,
                        width,
                        height,
                    });
                }
                VncClientEvent::FrameUpdate { rect, data } => {
                    let ((x, y), (width, height)) = (rect.origin(), rect.size());
                    events.push(BackendEvent::Frame {
                        nth: VNC_DISPLAY,
                        x,
                        y,
                        width,
                        height,
                        data,
                    });
                }
                VncClientEvent::CopyRect { dst, src } => {
                    let (width, height) = dst.size();
                    events.push(BackendEvent::CopyRect {
                        nth: VNC_DISPLAY,
                        src: src.origin(),
                        dst: dst.origin(),
                        width,
                        height,
                    });
                }
                VncClientEvent::Bell => events.push(BackendEvent::Bell),
                VncClientEvent::ClipboardText(text) => events.push(BackendEvent::CutText(text)),
                VncClientEvent::Error(message) => {
                    tracing::warn!(error = %message, "VNC connection error");
                }
                VncClientEvent::Disconnected => events.push(BackendEvent::Disconnected),
            }
        }
        events
    }

    fn send_keys(&mut self, _nth: usize, keys: &[KeyPress]) {
        for key in keys {
            if let Err(e) = self.protocol.send_command(VncClientCommand::Key {
                keysym: key.keysym,
                down: key.down,
            }) {
                tracing::debug!(error = %e, "Dropping key event");
                break;
            }
        }
    }
}
