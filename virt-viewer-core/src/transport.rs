//! Transport opener
//!
//! Turns a [`ConnectionSpec`] into something a protocol backend can connect
//! with: a connected byte-stream [`Descriptor`] (unix socket or SSH tunnel),
//! a URI to hand over verbatim, or a host/port pair for a direct connect.
//!
//! SSH tunnels run `ssh [-p port] [-l user] host nc <host> <port>` (or
//! `nc -U <socket>`) with both stdin and stdout bound to one end of a
//! socketpair; the other end becomes the descriptor.

use std::ffi::OsString;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{TransportError, TransportResult};
use crate::models::{ConnectionSpec, SshRelay};

/// Default SSH client program
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Child process relaying bytes for a tunnelled descriptor
///
/// The child exits on its own once its end of the pipe closes; dropping the
/// handle reaps it, killing it first if it is still running.
#[derive(Debug)]
pub struct TunnelProcess {
    child: Child,
    argv: Vec<String>,
}

impl TunnelProcess {
    /// Process id of the tunnel
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Full argument vector the tunnel was started with (program first)
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl Drop for TunnelProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// A connected stream usable for raw byte I/O
#[derive(Debug)]
pub struct Descriptor {
    stream: UnixStream,
    tunnel: Option<TunnelProcess>,
}

impl Descriptor {
    /// Wraps an already connected stream (descriptor handoff)
    #[must_use]
    pub const fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream,
            tunnel: None,
        }
    }

    /// The connected stream
    #[must_use]
    pub const fn stream(&self) -> &UnixStream {
        &self.stream
    }

    /// The tunnel process behind this descriptor, if any
    #[must_use]
    pub const fn tunnel(&self) -> Option<&TunnelProcess> {
        self.tunnel.as_ref()
    }

    /// Splits into the stream and the tunnel that must outlive it
    #[must_use]
    pub fn into_parts(self) -> (UnixStream, Option<TunnelProcess>) {
        (self.stream, self.tunnel)
    }
}

/// How a session should reach its display server
#[derive(Debug)]
pub enum Endpoint {
    /// Already connected stream
    Descriptor(Descriptor),
    /// URI handed to the protocol library verbatim
    Uri(String),
    /// Direct connect by the protocol library
    Host {
        /// Display server host
        host: String,
        /// Display server port
        port: u16,
        /// SPICE TLS port
        tls_port: Option<u16>,
    },
}

/// Builds the `ssh ... nc ...` argument list (without the program name)
///
/// When `port` is `None` the relay connects to `unix_socket` with `nc -U`.
///
/// # Errors
///
/// Returns `NoTarget` when neither a port nor a socket path is given.
pub fn ssh_tunnel_args(
    relay: &SshRelay,
    host: Option<&str>,
    port: Option<u16>,
    unix_socket: Option<&Path>,
) -> TransportResult<Vec<String>> {
    if port.is_none() && unix_socket.is_none() {
        return Err(TransportError::NoTarget);
    }
    let mut args = Vec::new();
    if let Some(ssh_port) = relay.port {
        args.push("-p".to_string());
        args.push(ssh_port.to_string());
    }
    if let Some(ref user) = relay.user {
        args.push("-l".to_string());
        args.push(user.clone());
    }
    args.push(relay.host.clone());
    args.push("nc".to_string());
    if let Some(port) = port {
        args.push(host.unwrap_or("localhost").to_string());
        args.push(port.to_string());
    } else if let Some(path) = unix_socket {
        args.push("-U".to_string());
        args.push(path.display().to_string());
    }
    Ok(args)
}

/// Opens transports for connection specs
#[derive(Debug, Clone)]
pub struct TransportOpener {
    ssh_program: PathBuf,
}

impl Default for TransportOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOpener {
    /// Creates an opener using the `ssh` found on `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            ssh_program: PathBuf::from(DEFAULT_SSH_PROGRAM),
        }
    }

    /// Uses a different SSH client program
    #[must_use]
    pub fn with_ssh_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// SSH client program in use
    #[must_use]
    pub fn ssh_program(&self) -> &Path {
        &self.ssh_program
    }

    /// Resolves the endpoint for a session connection
    ///
    /// # Errors
    ///
    /// Returns an error if the spec names no target (or an ambiguous one),
    /// or if connecting the socket / starting the tunnel fails.
    pub fn open(&self, spec: &ConnectionSpec) -> TransportResult<Endpoint> {
        spec.validate()?;

        if let Some(descriptor) = self.open_descriptor(spec)? {
            return Ok(Endpoint::Descriptor(descriptor));
        }
        if let Some(ref uri) = spec.uri {
            return Ok(Endpoint::Uri(uri.clone()));
        }
        match (&spec.host, spec.port) {
            (Some(host), Some(port)) => Ok(Endpoint::Host {
                host: host.clone(),
                port,
                tls_port: spec.tls_port,
            }),
            _ => Err(TransportError::NoTarget),
        }
    }

    /// Opens a descriptor for a secondary channel
    ///
    /// # Errors
    ///
    /// Returns `NoTarget` when the spec is neither tunnelled nor a unix socket.
    pub fn open_channel(&self, spec: &ConnectionSpec) -> TransportResult<Descriptor> {
        self.open_descriptor(spec)?.ok_or(TransportError::NoTarget)
    }

    fn open_descriptor(&self, spec: &ConnectionSpec) -> TransportResult<Option<Descriptor>> {
        if spec.uses_ssh_tunnel()
            && let Some(ref relay) = spec.ssh_relay
        {
            let descriptor = self.open_ssh_tunnel(
                relay,
                spec.host.as_deref(),
                spec.port,
                spec.unix_socket_path.as_deref(),
            )?;
            return Ok(Some(descriptor));
        }
        if let Some(ref path) = spec.unix_socket_path {
            return Self::open_unix_socket(path).map(Some);
        }
        Ok(None)
    }

    /// Connects a local stream socket
    ///
    /// # Errors
    ///
    /// Returns `ConnectFailed` on any OS failure.
    pub fn open_unix_socket(path: &Path) -> TransportResult<Descriptor> {
        tracing::debug!(path = %path.display(), "Opening unix socket");
        let stream = UnixStream::connect(path).map_err(|e| TransportError::ConnectFailed {
            target: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Descriptor::from_stream(stream))
    }

    /// Starts an SSH tunnel and returns our end of its pipe
    ///
    /// # Errors
    ///
    /// Returns `NoTarget` when there is nothing to relay to, and
    /// `TunnelFailed` if the socketpair cannot be created, the process cannot
    /// be spawned or it exits straight away.
    pub fn open_ssh_tunnel(
        &self,
        relay: &SshRelay,
        host: Option<&str>,
        port: Option<u16>,
        unix_socket: Option<&Path>,
    ) -> TransportResult<Descriptor> {
        let tunnel_failed = |reason: String| TransportError::TunnelFailed {
            host: relay.host.clone(),
            reason,
        };

        let args = ssh_tunnel_args(relay, host, port, unix_socket)?;
        let (ours, theirs) = UnixStream::pair().map_err(|e| tunnel_failed(e.to_string()))?;
        let theirs_out = theirs
            .try_clone()
            .map_err(|e| tunnel_failed(e.to_string()))?;

        tracing::debug!(
            program = %self.ssh_program.display(),
            args = ?args,
            "Opening SSH tunnel"
        );

        let child = Command::new(&self.ssh_program)
            .args(&args)
            .stdin(Stdio::from(OwnedFd::from(theirs)))
            .stdout(Stdio::from(OwnedFd::from(theirs_out)))
            .spawn()
            .map_err(|e| tunnel_failed(format!("{}: {e}", self.ssh_program.display())))?;

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(
            OsString::from(self.ssh_program.as_os_str())
                .to_string_lossy()
                .into_owned(),
        );
        argv.extend(args);
        let mut tunnel = TunnelProcess { child, argv };

        if let Ok(Some(status)) = tunnel.child.try_wait() {
            return Err(tunnel_failed(format!("tunnel exited immediately ({status})")));
        }

        Ok(Descriptor {
            stream: ours,
            tunnel: Some(tunnel),
        })
    }
}
