//! VNC client implementation using vnc-rs
//!
//! The protocol runs in a background thread with its own Tokio runtime.
//! Commands and events cross over `std::sync::mpsc` channels so the session
//! can poll them from its own loop. Password requests suspend the handshake
//! on a oneshot channel until the session answers through
//! [`VncProtocol::set_credential`].

use std::sync::Arc;
use std::sync::mpsc::TryRecvError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use vnc::{
    ClientKeyEvent, PixelFormat, VncConnector, VncEncoding as RfbEncoding, VncEvent, X11Event,
};

use super::{
    VncClientCommand, VncClientConfig, VncClientEvent, VncCredential, VncEncoding, VncProtocol,
    VncRect,
};
use crate::error::ProtocolClientError;
use crate::transport::Descriptor;

/// Sender for commands to the VNC client (thread-safe, non-async)
pub type VncCommandSender = std::sync::mpsc::Sender<VncClientCommand>;

/// Receiver for events from the VNC client (thread-safe, non-async)
pub type VncEventReceiver = std::sync::mpsc::Receiver<VncClientEvent>;

/// Where the protocol thread connects to
enum VncTarget {
    Host { host: String, port: u16 },
    Descriptor(Descriptor),
}

/// VNC client handle for one connection attempt
pub struct VncClient {
    command_tx: Option<VncCommandSender>,
    event_rx: Option<VncEventReceiver>,
    /// Answer channel for a pending password request
    auth_tx: Option<oneshot::Sender<String>>,
    connected: Arc<AtomicBool>,
    config: VncClientConfig,
}

impl VncClient {
    /// Creates a new VNC client with the given configuration
    #[must_use]
    pub fn new(config: VncClientConfig) -> Self {
        Self {
            command_tx: None,
            event_rx: None,
            auth_tx: None,
            connected: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns whether the protocol thread is running
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns the configuration
    #[must_use]
    pub const fn config(&self) -> &VncClientConfig {
        &self.config
    }

    fn start(&mut self, target: VncTarget) -> Result<(), ProtocolClientError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(ProtocolClientError::AlreadyConnected);
        }

        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let (command_tx, command_rx) = std::sync::mpsc::channel();
        let (auth_tx, auth_rx) = oneshot::channel();

        self.event_rx = Some(event_rx);
        self.command_tx = Some(command_tx);
        self.auth_tx = Some(auth_tx);

        let config = self.config.clone();
        let connected = self.connected.clone();
        self.connected.store(true, Ordering::SeqCst);

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = event_tx.send(VncClientEvent::Error(format!(
                        "Failed to create Tokio runtime: {e}"
                    )));
                    let _ = event_tx.send(VncClientEvent::Disconnected);
                    connected.store(false, Ordering::SeqCst);
                    return;
                }
            };

            rt.block_on(async move {
                let result =
                    run_vnc_client(target, config, event_tx.clone(), command_rx, auth_rx).await;
                connected.store(false, Ordering::SeqCst);

                match result {
                    Ok(()) => {}
                    Err(ProtocolClientError::AuthenticationFailed(reason)) => {
                        let _ = event_tx.send(VncClientEvent::AuthFailure(reason));
                    }
                    Err(e) => {
                        let _ = event_tx.send(VncClientEvent::Error(e.to_string()));
                    }
                }
                let _ = event_tx.send(VncClientEvent::Disconnected);
            });
        });

        Ok(())
    }
}

impl VncProtocol for VncClient {
    fn open_host(&mut self, host: &str, port: u16) -> Result<(), ProtocolClientError> {
        tracing::debug!(host, port, "Opening VNC connection");
        self.start(VncTarget::Host {
            host: host.to_string(),
            port,
        })
    }

    fn open_fd(&mut self, fd: Descriptor) -> Result<(), ProtocolClientError> {
        tracing::debug!("Opening VNC connection over descriptor");
        self.start(VncTarget::Descriptor(fd))
    }

    fn set_credential(
        &mut self,
        credential: VncCredential,
        value: &str,
    ) -> Result<(), ProtocolClientError> {
        match credential {
            VncCredential::Password => {
                let tx = self.auth_tx.take().ok_or_else(|| {
                    ProtocolClientError::ProtocolError("no password request pending".to_string())
                })?;
                tx.send(value.to_string()).map_err(|_| {
                    ProtocolClientError::ChannelError("handshake already finished".to_string())
                })
            }
            // vnc-rs has no use for a client name
            VncCredential::ClientName => Ok(()),
            VncCredential::Username => Err(ProtocolClientError::Unsupported(
                "username credentials".to_string(),
            )),
            VncCredential::Other(id) => Err(ProtocolClientError::Unsupported(format!(
                "credential type {id}"
            ))),
        }
    }

    fn close(&mut self) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(VncClientCommand::Disconnect);
        }
        self.command_tx = None;
        self.event_rx = None;
        self.auth_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn send_command(&mut self, command: VncClientCommand) -> Result<(), ProtocolClientError> {
        let tx = self
            .command_tx
            .as_ref()
            .ok_or(ProtocolClientError::NotConnected)?;
        tx.send(command)
            .map_err(|e| ProtocolClientError::ChannelError(e.to_string()))
    }

    fn try_recv_event(&mut self) -> Option<VncClientEvent> {
        self.event_rx.as_ref()?.try_recv().ok()
    }
}

impl Drop for VncClient {
    fn drop(&mut self) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(VncClientCommand::Disconnect);
        }
    }
}

/// Classifies a handshake failure reported by vnc-rs
fn handshake_error(message: &str) -> ProtocolClientError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("password") || lower.contains("auth") {
        ProtocolClientError::AuthenticationFailed(message.to_string())
    } else {
        ProtocolClientError::ConnectionFailed(message.to_string())
    }
}

async fn run_vnc_client(
    target: VncTarget,
    config: VncClientConfig,
    event_tx: std::sync::mpsc::Sender<VncClientEvent>,
    command_rx: std::sync::mpsc::Receiver<VncClientCommand>,
    auth_rx: oneshot::Receiver<String>,
) -> Result<(), ProtocolClientError> {
    match target {
        VncTarget::Host { host, port } => {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| ProtocolClientError::ConnectionFailed(format!("{host}:{port}: {e}")))?;
            run_vnc_session(tcp, config, event_tx, command_rx, auth_rx).await
        }
        VncTarget::Descriptor(fd) => {
            // the tunnel process must outlive the stream
            let (stream, tunnel) = fd.into_parts();
            stream.set_nonblocking(true)?;
            let stream = tokio::net::UnixStream::from_std(stream)?;
            let result = run_vnc_session(stream, config, event_tx, command_rx, auth_rx).await;
            drop(tunnel);
            result
        }
    }
}

/// Runs the VNC client protocol loop over a connected stream
async fn run_vnc_session<S>(
    stream: S,
    config: VncClientConfig,
    event_tx: std::sync::mpsc::Sender<VncClientEvent>,
    command_rx: std::sync::mpsc::Receiver<VncClientCommand>,
    auth_rx: oneshot::Receiver<String>,
) -> Result<(), ProtocolClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    let auth_events = event_tx.clone();
    let mut connector = VncConnector::new(stream)
        .set_auth_method(async move {
            let _ = auth_events.send(VncClientEvent::AuthCredential(vec![
                VncCredential::Password,
            ]));
            // a dropped answer channel means the session gave up on us
            Ok(auth_rx.await.unwrap_or_default())
        })
        .allow_shared(config.shared)
        .set_pixel_format(PixelFormat::bgra());

    for encoding in &config.encodings {
        connector = match encoding {
            VncEncoding::Tight => connector.add_encoding(RfbEncoding::Tight),
            VncEncoding::Zrle => connector.add_encoding(RfbEncoding::Zrle),
            VncEncoding::CopyRect => connector.add_encoding(RfbEncoding::CopyRect),
            VncEncoding::Raw => connector.add_encoding(RfbEncoding::Raw),
        };
    }

    let vnc = connector
        .build()
        .map_err(|e| ProtocolClientError::ConnectionFailed(e.to_string()))?
        .try_start()
        .await
        .map_err(|e| handshake_error(&e.to_string()))?
        .finish()
        .map_err(|e| handshake_error(&e.to_string()))?;

    let _ = event_tx.send(VncClientEvent::Connected);

    let mut initialized = false;
    let mut last_refresh = Instant::now();
    let refresh_interval = config.refresh_interval();

    loop {
        let command = match command_rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => break,
        };
        match command {
            Some(VncClientCommand::Disconnect) => break,
            Some(VncClientCommand::Key { keysym, down }) => {
                let key = ClientKeyEvent {
                    keycode: keysym,
                    down,
                };
                if let Err(e) = vnc.input(X11Event::KeyEvent(key)).await {
                    tracing::debug!(keysym, error = %e, "Key event dropped");
                }
            }
            Some(VncClientCommand::Refresh) => {
                let _ = vnc.input(X11Event::Refresh).await;
                last_refresh = Instant::now();
            }
            None => {}
        }

        match vnc.poll_event().await {
            Ok(Some(event)) => {
                if let Some(client_event) = convert_vnc_event(event, &mut initialized)
                    && event_tx.send(client_event).is_err()
                {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let _ = event_tx.send(VncClientEvent::Error(e.to_string()));
                break;
            }
        }

        if last_refresh.elapsed() >= refresh_interval {
            let _ = vnc.input(X11Event::Refresh).await;
            last_refresh = Instant::now();
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let _ = vnc.close().await;
    Ok(())
}

/// Converts vnc-rs events to our event type
///
/// The first resolution report doubles as the server-init notification.
fn convert_vnc_event(event: VncEvent, initialized: &mut bool) -> Option<VncClientEvent> {
    match event {
        VncEvent::SetResolution(screen) => {
            let width = u32::from(screen.width);
            let height = u32::from(screen.height);
            if *initialized {
                Some(VncClientEvent::ResolutionChanged { width, height })
            } else {
                *initialized = true;
                Some(VncClientEvent::Initialized { width, height })
            }
        }
        VncEvent::RawImage(rect, data) | VncEvent::JpegImage(rect, data) => {
            Some(VncClientEvent::FrameUpdate {
                rect: VncRect::new(rect.x, rect.y, rect.width, rect.height),
                data,
            })
        }
        VncEvent::Copy(dst, src) => Some(VncClientEvent::CopyRect {
            dst: VncRect::new(dst.x, dst.y, dst.width, dst.height),
            src: VncRect::new(src.x, src.y, src.width, src.height),
        }),
        VncEvent::Bell => Some(VncClientEvent::Bell),
        VncEvent::Text(text) => Some(VncClientEvent::ClipboardText(text)),
        _ => None,
    }
}
