//! SPICE session backend

use std::path::PathBuf;

use secrecy::SecretString;

use super::backend::{BackendEvent, Connectable, SmartcardCapable, UsbCapable};
use crate::credentials::{CredentialCollector, CredentialRequest};
use crate::display::KeyPress;
use crate::error::{ProtocolClientError, SessionError, SessionResult};
use crate::models::{ConnectionSpec, SessionKind};
use crate::spice_client::{
    ChannelId, SpiceChannel, SpiceChannelEvent, SpiceEvent, SpiceFactory, SpiceProperty,
    SpiceProtocol, UsbDevice,
};
use crate::transport::Descriptor;

fn open_failed(err: &ProtocolClientError) -> SessionError {
    SessionError::OpenFailed {
        kind: SessionKind::Spice,
        reason: err.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn display_index(channel_id: u32) -> usize {
    channel_id as usize
}

/// Backend driving one SPICE session object
pub struct SpiceBackend {
    factory: SpiceFactory,
    protocol: Box<dyn SpiceProtocol>,
    address: Option<String>,
    password: Option<SecretString>,
    ca_file: Option<PathBuf>,
    ca: Option<String>,
    host_subject: Option<String>,
    /// Set once the first display channel shows up
    initialized: bool,
    auto_redirect: bool,
}

impl SpiceBackend {
    /// Creates a backend building its session objects with `factory`
    #[must_use]
    pub fn new(factory: SpiceFactory) -> Self {
        let protocol = factory();
        Self {
            factory,
            protocol,
            address: None,
            password: None,
            ca_file: None,
            ca: None,
            host_subject: None,
            initialized: false,
            auto_redirect: false,
        }
    }

    fn apply_settings(&mut self) {
        if let Some(ref password) = self.password {
            self.protocol
                .set_property(SpiceProperty::Password(password.clone()));
        }
        if let Some(ref ca_file) = self.ca_file {
            self.protocol
                .set_property(SpiceProperty::CaFile(ca_file.clone()));
        }
        if let Some(ref ca) = self.ca {
            self.protocol.set_property(SpiceProperty::Ca(ca.clone()));
        }
        if let Some(ref subject) = self.host_subject {
            self.protocol
                .set_property(SpiceProperty::HostSubject(subject.clone()));
        }
    }

    /// Prompts for a password after an auth error and reconnects
    ///
    /// Returns `false` when polling must stop.
    fn retry_auth(
        &mut self,
        collector: &mut dyn CredentialCollector,
        events: &mut Vec<BackendEvent>,
    ) -> bool {
        let request = CredentialRequest::password("SPICE", self.address.clone());
        let Ok(creds) = collector.collect(&request) else {
            tracing::debug!("SPICE credential prompt cancelled");
            events.push(BackendEvent::Cancelled);
            return false;
        };

        if let Some(password) = creds.password {
            self.protocol
                .set_property(SpiceProperty::Password(password.clone()));
            self.password = Some(password);
        }
        if let Err(e) = self.protocol.connect() {
            tracing::warn!(error = %e, "SPICE reconnect after authentication failed");
            events.push(BackendEvent::Disconnected);
            return false;
        }
        true
    }

    /// Handles a main-channel state change; returns `false` to stop polling
    fn main_channel_event(
        &mut self,
        event: SpiceChannelEvent,
        collector: &mut dyn CredentialCollector,
        events: &mut Vec<BackendEvent>,
    ) -> bool {
        match event {
            SpiceChannelEvent::Opened => events.push(BackendEvent::Connected),
            SpiceChannelEvent::Switching => {}
            SpiceChannelEvent::ErrorAuth => return self.retry_auth(collector, events),
            SpiceChannelEvent::Closed
            | SpiceChannelEvent::ErrorConnect
            | SpiceChannelEvent::ErrorTls
            | SpiceChannelEvent::ErrorLink
            | SpiceChannelEvent::ErrorIo => {
                tracing::debug!(?event, "SPICE main channel ended");
                events.push(BackendEvent::Disconnected);
            }
        }
        true
    }
}

impl Connectable for SpiceBackend {
    fn kind(&self) -> SessionKind {
        SessionKind::Spice
    }

    fn configure(&mut self, spec: &ConnectionSpec) {
        self.address = Some(spec.pretty_address()).filter(|a| !a.is_empty());
        self.password.clone_from(&spec.password);
        self.ca_file.clone_from(&spec.ca_file);
        self.ca.clone_from(&spec.ca);
        self.host_subject.clone_from(&spec.host_subject);
    }

    fn open_fd(&mut self, fd: Descriptor) -> SessionResult<()> {
        self.apply_settings();
        self.protocol.open_fd(fd).map_err(|e| open_failed(&e))
    }

    fn open_host(&mut self, host: &str, port: u16, tls_port: Option<u16>) -> SessionResult<()> {
        self.apply_settings();
        self.protocol
            .set_property(SpiceProperty::Host(host.to_string()));
        self.protocol.set_property(SpiceProperty::Port(port));
        if let Some(tls_port) = tls_port {
            self.protocol.set_property(SpiceProperty::TlsPort(tls_port));
        }
        self.protocol.connect().map_err(|e| open_failed(&e))
    }

    fn open_uri(&mut self, uri: &str) -> SessionResult<()> {
        self.apply_settings();
        self.protocol.set_property(SpiceProperty::Uri(uri.to_string()));
        self.protocol.connect().map_err(|e| open_failed(&e))
    }

    fn channel_open_fd(&mut self, channel: ChannelId, fd: Descriptor) -> SessionResult<()> {
        self.protocol
            .channel_open_fd(channel, fd)
            .map_err(|e| SessionError::Channel(format!("{channel}: {e}")))
    }

    fn close(&mut self) {
        self.protocol.disconnect();
        self.protocol = (self.factory)();
        self.initialized = false;
    }

    fn poll_events(&mut self, collector: &mut dyn CredentialCollector) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.protocol.try_recv_event() {
            match event {
                SpiceEvent::ChannelNew(channel) => match channel.channel {
                    SpiceChannel::Display => {
                        if !self.initialized {
                            self.initialized = true;
                            events.push(BackendEvent::Initialized);
                        }
                        events.push(BackendEvent::DisplayAdded(display_index(channel.id)));
                    }
                    SpiceChannel::Usbredir if self.auto_redirect => {
                        tracing::debug!("Enabling USB auto-redirection");
                        self.protocol.set_usb_autoconnect(true);
                    }
                    _ => {}
                },
                SpiceEvent::ChannelEvent { channel, event } => {
                    if channel.channel == SpiceChannel::Main {
                        if !self.main_channel_event(event, collector, &mut events) {
                            break;
                        }
                    } else {
                        tracing::debug!(%channel, ?event, "SPICE channel event");
                    }
                }
                SpiceEvent::ChannelOpenFd(channel) => {
                    events.push(BackendEvent::ChannelOpenRequest(channel));
                }
                SpiceEvent::ChannelDestroy(channel) => {
                    if channel.channel == SpiceChannel::Display {
                        events.push(BackendEvent::DisplayRemoved(display_index(channel.id)));
                    }
                }
                SpiceEvent::PrimaryCreate {
                    channel_id,
                    width,
                    height,
                } => events.push(BackendEvent::DesktopResized {
                    nth: display_index(channel_id),
                    width,
                    height,
                }),
                SpiceEvent::Invalidate {
                    channel_id,
                    rect,
                    data,
                } => events.push(BackendEvent::Frame {
                    nth: display_index(channel_id),
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                    data,
                }),
                SpiceEvent::MonitorEnabled {
                    channel_id,
                    enabled,
                } => events.push(BackendEvent::MonitorEnabled {
                    nth: display_index(channel_id),
                    enabled,
                }),
                SpiceEvent::PointerGrab {
                    channel_id,
                    grabbed,
                } => events.push(BackendEvent::PointerGrab {
                    nth: display_index(channel_id),
                    grabbed,
                }),
                SpiceEvent::ClipboardText(text) => events.push(BackendEvent::CutText(text)),
                SpiceEvent::UsbAutoConnectFailed(message) | SpiceEvent::UsbDeviceError(message) => {
                    events.push(BackendEvent::UsbFailed(message));
                }
            }
        }
        events
    }

    fn send_keys(&mut self, nth: usize, keys: &[KeyPress]) {
        let channel_id = u32::try_from(nth).unwrap_or_default();
        self.protocol.send_keys(channel_id, keys);
    }
}

impl UsbCapable for SpiceBackend {
    fn has_usb(&self) -> bool {
        self.protocol.has_usb()
    }

    fn set_auto_redirect(&mut self, enabled: bool) {
        self.auto_redirect = enabled;
    }

    fn usb_devices(&self) -> Vec<UsbDevice> {
        self.protocol.usb_devices()
    }

    fn redirect_usb_device(&mut self, device: &UsbDevice, redirect: bool) -> SessionResult<()> {
        self.protocol
            .redirect_usb_device(device, redirect)
            .map_err(|e| SessionError::Channel(e.to_string()))
    }
}

impl SmartcardCapable for SpiceBackend {
    fn smartcard_insert(&mut self) -> bool {
        self.protocol.smartcard_insert()
    }

    fn smartcard_remove(&mut self) -> bool {
        self.protocol.smartcard_remove()
    }
}
