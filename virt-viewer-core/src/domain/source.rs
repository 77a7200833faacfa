//! Connection source resolving a libvirt guest on every attempt

use secrecy::SecretString;

use super::{
    DomainInfo, DomainKey, DomainLifecycle, DomainResolver, DomainState, EventWatcher,
    GraphicsInfo, parse_graphics,
};
use crate::app::{ConnectionSource, Resolution, Target};
use crate::error::{AppResult, DomainError};
use crate::models::ConnectionSpec;
use crate::uri::LibvirtUri;

const WAIT_CREATE: &str = "Waiting for guest domain to be created";
const WAIT_START: &str = "Waiting for guest domain to start";

/// Listen addresses meaning "every interface"
fn is_wildcard(listen: Option<&str>) -> bool {
    matches!(listen, None | Some("" | "0.0.0.0" | "::" | "[::]"))
}

/// Guest named on the virt-viewer command line
#[derive(Debug)]
pub struct DomainSource<R> {
    resolver: R,
    key: DomainKey,
    wait: bool,
    direct: bool,
    attach: bool,
    watcher: Option<EventWatcher>,
    domain_name: Option<String>,
}

impl<R: DomainResolver> DomainSource<R> {
    /// Source looking `key` up through `resolver`
    #[must_use]
    pub const fn new(resolver: R, key: DomainKey) -> Self {
        Self {
            resolver,
            key,
            wait: false,
            direct: false,
            attach: false,
            watcher: None,
            domain_name: None,
        }
    }

    /// Waits for the guest to be created or started instead of failing
    #[must_use]
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Connects to the display directly instead of tunnelling over SSH
    #[must_use]
    pub const fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Asks the management API for the graphics descriptor
    #[must_use]
    pub const fn with_attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }

    /// Subscribes to lifecycle events; returns whether they are available
    pub fn start_events(&mut self) -> bool {
        if self.watcher.is_none() {
            self.watcher = self.resolver.watch_events();
        }
        self.watcher.is_some()
    }

    /// Borrow the resolver
    pub const fn resolver(&self) -> &R {
        &self.resolver
    }

    fn not_active(&self) -> AppResult<Resolution> {
        if self.wait {
            Ok(Resolution::Waiting(DomainError::DisplayNotActive.to_string()))
        } else {
            Err(DomainError::DisplayNotActive.into())
        }
    }

    fn build_spec(&self, gfx: &GraphicsInfo) -> Option<ConnectionSpec> {
        let libvirt = self.resolver.uri().and_then(|uri| match LibvirtUri::parse(uri) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(uri, error = %e, "Cannot parse libvirt URI");
                None
            }
        });
        let relay = libvirt.as_ref().and_then(LibvirtUri::ssh_relay);
        let tunnelled = relay.is_some() && !self.direct;

        let mut spec = if let Some(ref socket) = gfx.socket {
            ConnectionSpec::with_unix_socket(gfx.kind, socket.clone())
        } else {
            let port = u16::try_from(gfx.port).ok().filter(|p| *p > 0)?;
            let host = if is_wildcard(gfx.listen.as_deref()) {
                if tunnelled {
                    "localhost".to_string()
                } else {
                    libvirt
                        .as_ref()
                        .and_then(|l| l.host.clone())
                        .unwrap_or_else(|| "localhost".to_string())
                }
            } else {
                gfx.listen.clone().unwrap_or_default()
            };
            ConnectionSpec::with_host(gfx.kind, host, port)
        };

        spec.tls_port = gfx
            .tls_port
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0);
        if let Some(relay) = relay {
            spec = spec.ssh_relay(relay);
        }
        spec.transport = libvirt.and_then(|l| l.transport).or(spec.transport);
        spec.direct = self.direct;
        spec.password = gfx.password.clone().map(SecretString::from);
        Some(spec)
    }

    fn resolve_domain(&mut self, info: &DomainInfo) -> AppResult<Resolution> {
        if self.resolver.state(info)? == DomainState::ShutOff {
            tracing::info!(domain = %info.name, "Guest domain is not running");
            return Ok(Resolution::Waiting(WAIT_START.to_string()));
        }

        let xml = self.resolver.dumpxml(info)?;
        let Some(gfx) = parse_graphics(&xml)? else {
            return Err(DomainError::NoGraphics(info.name.clone()).into());
        };

        if self.attach {
            let fd = self.resolver.open_graphics(info)?;
            let spec = self
                .build_spec(&gfx)
                .unwrap_or_else(|| ConnectionSpec::with_host(gfx.kind, "localhost", gfx.kind.default_port()));
            let mut target = Target::new(spec).with_guest_name(info.name.clone());
            target.fd = Some(fd);
            return Ok(Resolution::Ready(target));
        }

        let Some(spec) = self.build_spec(&gfx) else {
            tracing::info!(domain = %info.name, port = gfx.port, "Guest display not yet active");
            return self.not_active();
        };
        tracing::debug!(
            domain = %info.name,
            kind = %gfx.kind,
            address = %spec.pretty_address(),
            tunnel = spec.uses_ssh_tunnel(),
            "Resolved guest display"
        );
        Ok(Resolution::Ready(
            Target::new(spec).with_guest_name(info.name.clone()),
        ))
    }
}

impl<R: DomainResolver> ConnectionSource for DomainSource<R> {
    fn resolve(&mut self) -> AppResult<Resolution> {
        let Some(info) = self.resolver.lookup(&self.key)? else {
            if self.wait {
                return Ok(Resolution::Waiting(WAIT_CREATE.to_string()));
            }
            return Err(DomainError::NotFound(self.key.to_string()).into());
        };
        self.domain_name = Some(info.name.clone());
        self.resolve_domain(&info)
    }

    fn has_events(&self) -> bool {
        self.watcher.is_some()
    }

    fn poll_lifecycle(&mut self) -> Vec<DomainLifecycle> {
        let Some(ref watcher) = self.watcher else {
            return Vec::new();
        };
        let key_name = match self.key {
            DomainKey::Name(ref name) => Some(name.as_str()),
            _ => None,
        };
        let ours = self.domain_name.as_deref().or(key_name);
        watcher
            .drain()
            .into_iter()
            .filter(|event| ours == Some(event.domain.as_str()))
            .map(|event| event.lifecycle)
            .collect()
    }
}
