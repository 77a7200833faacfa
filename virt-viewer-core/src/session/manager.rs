//! Session type

use std::collections::{BTreeMap, VecDeque};

use super::backend::{Backend, BackendEvent, UsbDeviceSelector};
use super::{SessionEvent, SessionState};
use crate::credentials::CredentialCollector;
use crate::display::Display;
use crate::error::{SessionError, SessionResult};
use crate::models::{ConnectionSpec, SessionKind};
use crate::spice_client::ChannelId;
use crate::transport::Descriptor;

/// One display-protocol connection and the displays it owns
///
/// Exactly one `open_*` call starts an attempt. Progress is reported later
/// through [`Session::dispatch`] and the event queue. [`Session::close`]
/// tears the attempt down and leaves the session ready for a new one.
#[derive(Debug)]
pub struct Session {
    kind: SessionKind,
    state: SessionState,
    backend: Backend,
    displays: BTreeMap<usize, Display>,
    events: VecDeque<SessionEvent>,
    auto_usbredir: bool,
}

impl Session {
    /// Creates an idle session around a protocol backend
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            kind: backend.kind(),
            state: SessionState::Idle,
            backend,
            displays: BTreeMap::new(),
            events: VecDeque::new(),
            auto_usbredir: false,
        }
    }

    /// Protocol of this session
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Current attempt state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Displays ordered by index
    pub fn displays(&self) -> impl Iterator<Item = &Display> {
        self.displays.values()
    }

    /// Number of displays
    #[must_use]
    pub fn display_count(&self) -> usize {
        self.displays.len()
    }

    /// Display `nth`
    #[must_use]
    pub fn display(&self, nth: usize) -> Option<&Display> {
        self.displays.get(&nth)
    }

    /// Display `nth`, mutably (zoom/fullscreen passthrough)
    pub fn display_mut(&mut self, nth: usize) -> Option<&mut Display> {
        self.displays.get_mut(&nth)
    }

    /// Applies password and TLS settings for the next attempt
    pub fn configure(&mut self, spec: &ConnectionSpec) {
        self.backend.connectable().configure(spec);
    }

    fn begin(&mut self) -> SessionResult<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::Busy(self.state.to_string()));
        }
        self.state = SessionState::Connecting;
        Ok(())
    }

    fn settle(&mut self, result: SessionResult<()>) -> SessionResult<()> {
        if let Err(ref e) = result {
            tracing::warn!(kind = %self.kind, error = %e, "Failed to start connection");
            self.state = SessionState::Idle;
        }
        result
    }

    /// Starts an attempt over a connected descriptor
    ///
    /// # Errors
    ///
    /// Returns `Busy` if an attempt was already started and not closed, or
    /// the backend's error if it refuses to start.
    pub fn open_fd(&mut self, fd: Descriptor) -> SessionResult<()> {
        self.begin()?;
        let result = self.backend.connectable().open_fd(fd);
        self.settle(result)
    }

    /// Starts a direct attempt to `host:port`
    ///
    /// # Errors
    ///
    /// See [`Session::open_fd`].
    pub fn open_host(&mut self, host: &str, port: u16, tls_port: Option<u16>) -> SessionResult<()> {
        self.begin()?;
        tracing::debug!(kind = %self.kind, host, port, ?tls_port, "Opening host");
        let result = self.backend.connectable().open_host(host, port, tls_port);
        self.settle(result)
    }

    /// Starts an attempt from a display URI
    ///
    /// # Errors
    ///
    /// See [`Session::open_fd`].
    pub fn open_uri(&mut self, uri: &str) -> SessionResult<()> {
        self.begin()?;
        let result = self.backend.connectable().open_uri(uri);
        self.settle(result)
    }

    /// Satisfies a channel-open request with a connected descriptor
    ///
    /// # Errors
    ///
    /// Returns an error when no attempt is in progress or the backend has
    /// no secondary channels.
    pub fn channel_open_fd(&mut self, channel: ChannelId, fd: Descriptor) -> SessionResult<()> {
        if !self.state.is_active() {
            return Err(SessionError::Channel(format!(
                "{channel}: session is {}",
                self.state
            )));
        }
        self.backend.connectable().channel_open_fd(channel, fd)
    }

    /// Tears the attempt down and rebuilds the protocol object
    ///
    /// A `DisplayRemoved` event is queued for every display first.
    pub fn close(&mut self) {
        tracing::debug!(kind = %self.kind, state = %self.state, "Closing session");
        self.events
            .retain(|e| matches!(e, SessionEvent::DisplayRemoved(_)));
        let displays = std::mem::take(&mut self.displays);
        for nth in displays.into_keys() {
            self.events.push_back(SessionEvent::DisplayRemoved(nth));
        }
        self.backend.connectable().close();
        self.state = SessionState::Idle;
    }

    /// Whether USB redirection is available
    #[must_use]
    pub fn has_usb(&self) -> bool {
        self.backend.usb_ref().is_some_and(|usb| usb.has_usb())
    }

    /// Whether new USB devices are redirected automatically
    #[must_use]
    pub const fn auto_usbredir(&self) -> bool {
        self.auto_usbredir
    }

    /// Enables automatic redirection of new USB devices
    pub fn set_auto_usbredir(&mut self, enabled: bool) {
        self.auto_usbredir = enabled;
        if let Some(usb) = self.backend.usb() {
            usb.set_auto_redirect(enabled);
        }
    }

    /// Lets `selector` choose which USB devices to redirect
    ///
    /// Returns `false` when the protocol has no USB support. Failures are
    /// reported as `UsbFailed` events.
    pub fn usb_device_selection(&mut self, selector: &mut dyn UsbDeviceSelector) -> bool {
        let Some(usb) = self.backend.usb() else {
            return false;
        };
        if !usb.has_usb() {
            return false;
        }

        let devices = usb.usb_devices();
        for (id, redirect) in selector.select(&devices) {
            let Some(device) = devices.iter().find(|d| d.id == id) else {
                continue;
            };
            if device.redirected == redirect {
                continue;
            }
            if let Err(e) = usb.redirect_usb_device(device, redirect) {
                self.events.push_back(SessionEvent::UsbFailed(e.to_string()));
            }
        }
        true
    }

    /// Inserts the software smartcard; `false` when unsupported
    pub fn smartcard_insert(&mut self) -> bool {
        self.backend
            .smartcard()
            .is_some_and(|card| card.smartcard_insert())
    }

    /// Removes the software smartcard; `false` when unsupported
    pub fn smartcard_remove(&mut self) -> bool {
        self.backend
            .smartcard()
            .is_some_and(|card| card.smartcard_remove())
    }

    /// Sends a key sequence to display `nth` right away
    ///
    /// # Errors
    ///
    /// Returns `NoSuchDisplay` if the display does not exist.
    pub fn send_keys(&mut self, nth: usize, keysyms: &[u32]) -> SessionResult<()> {
        self.displays
            .get_mut(&nth)
            .ok_or(SessionError::NoSuchDisplay(nth))?
            .send_keys(keysyms);
        self.flush_keys();
        Ok(())
    }

    fn flush_keys(&mut self) {
        for (nth, display) in &mut self.displays {
            let keys = display.take_pending_keys();
            if !keys.is_empty() {
                self.backend.connectable().send_keys(*nth, &keys);
            }
        }
    }

    /// Pumps the protocol library and runs the state machine
    ///
    /// Returns the number of events queued.
    pub fn dispatch(&mut self, collector: &mut dyn CredentialCollector) -> usize {
        self.flush_keys();
        let before = self.events.len();
        let events = self.backend.connectable().poll_events(collector);
        for event in events {
            self.apply(event);
        }
        self.events.len().saturating_sub(before)
    }

    /// Takes the next queued event
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state.can_transition_to(next) {
            tracing::debug!(kind = %self.kind, from = %self.state, to = %next, "Session state");
            self.state = next;
            true
        } else {
            tracing::debug!(kind = %self.kind, from = %self.state, to = %next, "Ignoring stale transition");
            false
        }
    }

    fn apply(&mut self, event: BackendEvent) {
        if !self.state.is_active() {
            tracing::trace!(state = %self.state, "Dropping backend event outside an attempt");
            return;
        }

        match event {
            BackendEvent::Connected => {
                if self.transition(SessionState::Connected) {
                    self.events.push_back(SessionEvent::Connected);
                }
            }
            BackendEvent::Initialized => {
                if self.transition(SessionState::Initialized) {
                    self.events.push_back(SessionEvent::Initialized);
                }
            }
            BackendEvent::Disconnected => {
                if self.transition(SessionState::Disconnected) {
                    self.events.push_back(SessionEvent::Disconnected);
                }
            }
            BackendEvent::Cancelled => {
                if self.transition(SessionState::Cancelled) {
                    self.events.push_back(SessionEvent::Cancelled);
                } else if self.transition(SessionState::Disconnected) {
                    self.events.push_back(SessionEvent::Disconnected);
                }
            }
            BackendEvent::AuthRefused(message) => {
                self.events.push_back(SessionEvent::AuthRefused(message));
            }
            BackendEvent::AuthFailed(message) => {
                self.events.push_back(SessionEvent::AuthFailed(message));
            }
            BackendEvent::UsbFailed(message) => {
                self.events.push_back(SessionEvent::UsbFailed(message));
            }
            BackendEvent::ChannelOpenRequest(channel) => {
                self.events
                    .push_back(SessionEvent::ChannelOpenRequest(channel));
            }
            BackendEvent::DisplayAdded(nth) => {
                if let std::collections::btree_map::Entry::Vacant(entry) = self.displays.entry(nth)
                {
                    entry.insert(Display::new(nth));
                    self.events.push_back(SessionEvent::DisplayAdded(nth));
                }
            }
            BackendEvent::DisplayRemoved(nth) => {
                if self.displays.remove(&nth).is_some() {
                    self.events.push_back(SessionEvent::DisplayRemoved(nth));
                }
            }
            BackendEvent::DesktopResized { nth, width, height } => {
                if let Some(display) = self.displays.get_mut(&nth)
                    && display.set_desktop_size(width, height)
                {
                    tracing::debug!(nth, width, height, "Desktop resized");
                    self.events
                        .push_back(SessionEvent::DesktopResized { nth, width, height });
                }
            }
            BackendEvent::Frame {
                nth,
                x,
                y,
                width,
                height,
                data,
            } => {
                if let Some(display) = self.displays.get_mut(&nth) {
                    display.apply_frame(x, y, width, height, &data);
                }
            }
            BackendEvent::CopyRect {
                nth,
                src,
                dst,
                width,
                height,
            } => {
                if let Some(display) = self.displays.get_mut(&nth) {
                    display.copy_rect(src, dst, width, height);
                }
            }
            BackendEvent::MonitorEnabled { nth, enabled } => {
                if let Some(display) = self.displays.get_mut(&nth) {
                    display.set_enabled(enabled);
                }
            }
            BackendEvent::PointerGrab { nth, grabbed } => {
                if let Some(display) = self.displays.get_mut(&nth) {
                    display.set_pointer_grabbed(grabbed);
                }
            }
            BackendEvent::CutText(text) => self.events.push_back(SessionEvent::CutText(text)),
            BackendEvent::Bell => self.events.push_back(SessionEvent::Bell),
        }
    }
}
