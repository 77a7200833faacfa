//! SPICE client implementation using spice-client
//!
//! Same shape as the VNC client: the library runs in a background thread
//! with its own Tokio runtime, and what it reports is turned into
//! [`SpiceEvent`]s on a `std::sync::mpsc` channel the session polls.
//! Display updates arrive through per-channel surface callbacks; the end of
//! the main channel task becomes the main channel's closing event.
//!
//! The library connects by host and plain port only. TLS, descriptor
//! handoff, USB redirection and smartcards are refused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ::spice_client::{DisplaySurface, SpiceClientShared, SpiceError};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{
    ChannelId, SpiceChannelEvent, SpiceEvent, SpiceProperty, SpiceProtocol, SpiceRect,
};
use crate::display::{KeyPress, keysyms};
use crate::error::ProtocolClientError;
use crate::transport::Descriptor;

/// Sender for commands to the SPICE client (thread-safe, non-async)
pub type SpiceCommandSender = mpsc::Sender<SpiceClientCommand>;

/// Receiver for events from the SPICE client (thread-safe, non-async)
pub type SpiceEventReceiver = mpsc::Receiver<SpiceEvent>;

/// Display channel ids registered once the main channel is up
const MAX_DISPLAY_CHANNELS: u8 = 4;

/// How often the protocol thread looks at pending commands
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest wait for the inputs channel to take a key
const INPUT_TIMEOUT: Duration = Duration::from_millis(200);

/// Marks a scancode that needs the `0xe0` prefix
const EXTENDED: u16 = 0x100;

/// Requests from the session to the protocol thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiceClientCommand {
    /// Close every channel
    Disconnect,
    /// Key transition on an inputs channel
    Key {
        /// Inputs channel id
        channel_id: u8,
        /// PC/AT set 1 scancode, [`EXTENDED`] flagged
        scancode: u16,
        /// Press (`true`) or release
        down: bool,
    },
}

/// Server address carried by a `spice://` URI
#[derive(Debug, Clone, PartialEq, Eq)]
struct SpiceAddress {
    host: String,
    port: Option<u16>,
    tls_port: Option<u16>,
    password: Option<String>,
}

/// Parses `spice://host[:port][?port=..&tls-port=..&password=..]`
fn parse_spice_uri(uri: &str) -> Result<SpiceAddress, ProtocolClientError> {
    let url = Url::parse(uri)
        .map_err(|e| ProtocolClientError::ConnectionFailed(format!("{uri}: {e}")))?;
    let tls = match url.scheme().to_ascii_lowercase().as_str() {
        "spice" => false,
        "spice+tls" => true,
        other => {
            return Err(ProtocolClientError::Unsupported(format!("{other} URIs")));
        }
    };
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProtocolClientError::ConnectionFailed(format!("{uri}: no host")))?;

    let mut address = SpiceAddress {
        host: host.to_string(),
        port: None,
        tls_port: None,
        password: None,
    };
    if tls {
        address.tls_port = url.port();
    } else {
        address.port = url.port();
    }
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "port" => address.port = value.parse().ok(),
            "tls-port" => address.tls_port = value.parse().ok(),
            "password" => address.password = Some(value.into_owned()),
            other => tracing::debug!(parameter = other, "Ignoring SPICE URI parameter"),
        }
    }
    Ok(address)
}

/// PC/AT set 1 scancode for the keysyms the viewer sends
fn keysym_to_scancode(keysym: u32) -> Option<u16> {
    let code = match keysym {
        keysyms::CONTROL_L => 0x1d,
        0xffe4 => EXTENDED | 0x1d,
        keysyms::ALT_L => 0x38,
        0xffea => EXTENDED | 0x38,
        0xffe1 => 0x2a,
        0xffe2 => 0x36,
        keysyms::DELETE => EXTENDED | 0x53,
        keysyms::BACKSPACE => 0x0e,
        keysyms::PRINT => EXTENDED | 0x37,
        0xff09 => 0x0f,
        0xff0d => 0x1c,
        0xff1b => 0x01,
        0x20 => 0x39,
        // F1..F10 are contiguous, F11 and F12 are not
        f if (keysyms::F1..keysyms::F1 + 10).contains(&f) => 0x3b + (f - keysyms::F1) as u16,
        f if f == keysyms::F1 + 10 => 0x57,
        f if f == keysyms::F1 + 11 => 0x58,
        _ => return None,
    };
    Some(code)
}

/// Scancode as sent in an inputs channel key message
fn wire_scancode(scancode: u16, down: bool) -> u32 {
    let code = u32::from(scancode & 0xff);
    let code = if down { code } else { code | 0x80 };
    if scancode & EXTENDED == 0 {
        code
    } else {
        0xe0 | (code << 8)
    }
}

/// Library surfaces are RGBA, displays keep BGRA
fn rgba_to_bgra(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0], px[3]])
        .collect()
}

/// Main channel state after a failed connect
fn link_error_event(err: &SpiceError) -> SpiceChannelEvent {
    match err {
        SpiceError::AuthenticationFailed => SpiceChannelEvent::ErrorAuth,
        SpiceError::Protocol(message) if message.contains("PERMISSION_DENIED") => {
            SpiceChannelEvent::ErrorAuth
        }
        SpiceError::Protocol(message) if message.contains("NEED_SECURED") => {
            SpiceChannelEvent::ErrorTls
        }
        SpiceError::Io(_) | SpiceError::Connection(_) | SpiceError::ConnectionClosed => {
            SpiceChannelEvent::ErrorConnect
        }
        _ => SpiceChannelEvent::ErrorLink,
    }
}

fn main_event(event: SpiceChannelEvent) -> SpiceEvent {
    SpiceEvent::ChannelEvent {
        channel: ChannelId::main(),
        event,
    }
}

/// Turns surface callbacks of one display channel into events
struct SurfaceForwarder {
    channel_id: u32,
    size: Mutex<Option<(u32, u32)>>,
    events: mpsc::Sender<SpiceEvent>,
}

impl SurfaceForwarder {
    fn new(channel_id: u32, events: mpsc::Sender<SpiceEvent>) -> Self {
        Self {
            channel_id,
            size: Mutex::new(None),
            events,
        }
    }

    fn forward(&self, surface: &DisplaySurface) {
        let size = (surface.width, surface.height);
        let previous = self
            .size
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(size);
        if previous != Some(size) {
            let _ = self.events.send(SpiceEvent::PrimaryCreate {
                channel_id: self.channel_id,
                width: surface.width,
                height: surface.height,
            });
        }
        let _ = self.events.send(SpiceEvent::Invalidate {
            channel_id: self.channel_id,
            rect: SpiceRect::new(0, 0, surface.width, surface.height),
            data: rgba_to_bgra(&surface.data),
        });
    }
}

/// SPICE session object for one connection attempt
#[derive(Default)]
pub struct SpiceClient {
    host: Option<String>,
    port: Option<u16>,
    tls_port: Option<u16>,
    password: Option<SecretString>,
    /// Why the last `uri` property could not be used
    uri_error: Option<ProtocolClientError>,
    command_tx: Option<SpiceCommandSender>,
    event_rx: Option<SpiceEventReceiver>,
    connected: Arc<AtomicBool>,
}

impl SpiceClient {
    /// Creates an unconfigured client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the protocol thread is running
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn start(&mut self, host: String, port: u16) {
        let (event_tx, event_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();
        self.event_rx = Some(event_rx);
        self.command_tx = Some(command_tx);

        let password = self
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string());
        let connected = self.connected.clone();
        self.connected.store(true, Ordering::SeqCst);

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create Tokio runtime");
                    let _ = event_tx.send(main_event(SpiceChannelEvent::ErrorConnect));
                    connected.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let last = rt.block_on(run_spice_client(
                host,
                port,
                password,
                event_tx.clone(),
                command_rx,
            ));
            // channel tasks die with the runtime
            drop(rt);
            connected.store(false, Ordering::SeqCst);
            let _ = event_tx.send(main_event(last));
        });
    }
}

impl SpiceProtocol for SpiceClient {
    fn set_property(&mut self, property: SpiceProperty) {
        let name = property.name();
        match property {
            SpiceProperty::Host(host) => self.host = Some(host),
            SpiceProperty::Port(port) => self.port = Some(port),
            SpiceProperty::TlsPort(port) => self.tls_port = Some(port),
            SpiceProperty::Password(password) => self.password = Some(password),
            SpiceProperty::Uri(uri) => match parse_spice_uri(&uri) {
                Ok(address) => {
                    self.uri_error = None;
                    self.host = Some(address.host);
                    self.port = address.port;
                    self.tls_port = address.tls_port;
                    if let Some(password) = address.password {
                        self.password = Some(SecretString::from(password));
                    }
                }
                Err(e) => self.uri_error = Some(e),
            },
            SpiceProperty::CaFile(_) | SpiceProperty::Ca(_) | SpiceProperty::HostSubject(_) => {
                tracing::debug!(property = name, "TLS property ignored");
            }
        }
    }

    fn connect(&mut self) -> Result<(), ProtocolClientError> {
        if self.is_connected() {
            return Err(ProtocolClientError::AlreadyConnected);
        }
        if let Some(ref e) = self.uri_error {
            return Err(e.clone());
        }
        let host = self
            .host
            .clone()
            .ok_or_else(|| ProtocolClientError::ConnectionFailed("no host set".to_string()))?;
        let port = match (self.port, self.tls_port) {
            (Some(port), _) => port,
            (None, Some(_)) => {
                return Err(ProtocolClientError::Unsupported(
                    "TLS-only SPICE servers".to_string(),
                ));
            }
            (None, None) => {
                return Err(ProtocolClientError::ConnectionFailed(format!(
                    "no port set for {host}"
                )));
            }
        };
        tracing::debug!(%host, port, "Opening SPICE connection");
        self.start(host, port);
        Ok(())
    }

    fn open_fd(&mut self, _fd: Descriptor) -> Result<(), ProtocolClientError> {
        Err(ProtocolClientError::Unsupported(
            "SPICE over a connected descriptor".to_string(),
        ))
    }

    fn channel_open_fd(
        &mut self,
        channel: ChannelId,
        _fd: Descriptor,
    ) -> Result<(), ProtocolClientError> {
        Err(ProtocolClientError::Unsupported(format!(
            "descriptor handoff to {channel}"
        )))
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(SpiceClientCommand::Disconnect);
        }
        self.event_rx = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn try_recv_event(&mut self) -> Option<SpiceEvent> {
        self.event_rx.as_ref()?.try_recv().ok()
    }

    fn send_keys(&mut self, channel_id: u32, keys: &[KeyPress]) {
        let Some(tx) = self.command_tx.as_ref() else {
            return;
        };
        let Ok(channel_id) = u8::try_from(channel_id) else {
            return;
        };
        for key in keys {
            let Some(scancode) = keysym_to_scancode(key.keysym) else {
                tracing::debug!(keysym = key.keysym, "No scancode for keysym");
                continue;
            };
            let _ = tx.send(SpiceClientCommand::Key {
                channel_id,
                scancode,
                down: key.down,
            });
        }
    }
}

impl Drop for SpiceClient {
    fn drop(&mut self) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(SpiceClientCommand::Disconnect);
        }
    }
}

async fn send_key(client: &SpiceClientShared, channel_id: u8, scancode: u16, down: bool) {
    let code = wire_scancode(scancode, down);
    let sent = if down {
        tokio::time::timeout(INPUT_TIMEOUT, client.send_key_down(channel_id, code)).await
    } else {
        tokio::time::timeout(INPUT_TIMEOUT, client.send_key_up(channel_id, code)).await
    };
    match sent {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(channel_id, code, error = %e, "Key event dropped"),
        Err(_) => tracing::debug!(channel_id, code, "Inputs channel busy, key event dropped"),
    }
}

/// Runs one SPICE session; returns the main channel's final state
async fn run_spice_client(
    host: String,
    port: u16,
    password: Option<String>,
    event_tx: mpsc::Sender<SpiceEvent>,
    command_rx: mpsc::Receiver<SpiceClientCommand>,
) -> SpiceChannelEvent {
    let mut client = SpiceClientShared::new(host.clone(), port);
    if let Some(password) = password {
        client.set_password(password).await;
    }

    let _ = event_tx.send(SpiceEvent::ChannelNew(ChannelId::main()));
    if let Err(e) = client.connect().await {
        tracing::debug!(%host, port, error = %e, "SPICE link failed");
        return link_error_event(&e);
    }
    let _ = event_tx.send(main_event(SpiceChannelEvent::Opened));

    // callbacks must be in place before the channel tasks take their locks
    for id in 0..MAX_DISPLAY_CHANNELS {
        let forwarder = SurfaceForwarder::new(u32::from(id), event_tx.clone());
        if client
            .set_display_update_callback(id, move |surface| forwarder.forward(surface))
            .await
            .is_ok()
        {
            let _ = event_tx.send(SpiceEvent::ChannelNew(ChannelId::display(u32::from(id))));
        }
    }

    if let Err(e) = client.start_event_loop().await {
        tracing::warn!(error = %e, "SPICE channels did not start");
        return SpiceChannelEvent::ErrorLink;
    }

    let completion = client.wait_for_completion();
    tokio::pin!(completion);
    loop {
        tokio::select! {
            result = &mut completion => {
                return match result {
                    Ok(()) => SpiceChannelEvent::Closed,
                    Err(e) => {
                        tracing::debug!(error = %e, "SPICE channel failed");
                        SpiceChannelEvent::ErrorIo
                    }
                };
            }
            () = tokio::time::sleep(COMMAND_POLL_INTERVAL) => loop {
                match command_rx.try_recv() {
                    Ok(SpiceClientCommand::Key { channel_id, scancode, down }) => {
                        send_key(&client, channel_id, scancode, down).await;
                    }
                    Ok(SpiceClientCommand::Disconnect) | Err(TryRecvError::Disconnected) => {
                        client.disconnect().await;
                        return SpiceChannelEvent::Closed;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            },
        }
    }
}
