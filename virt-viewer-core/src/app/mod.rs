//! App / reconnect controller
//!
//! The [`App`] owns the one [`Session`], the window table and the source
//! table of its [`MainContext`]. Front-ends call [`App::start`] once and then
//! [`App::iterate`] from their loop until it returns `false`.
//!
//! When an attempt ends the App decides between retrying authentication,
//! waiting for a lifecycle event, polling every 500 ms, or shutting down.
//! Retries are never run synchronously from inside the disconnect handling;
//! they are queued on the context and picked up by a later iteration.

mod source;
mod window;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub use source::{ConnectionSource, Resolution, Target, UriSource};
pub use window::Window;

use crate::config::Settings;
use crate::credentials::CredentialCollector;
use crate::display::{KeyCombo, Snapshot, ZOOM_DEFAULT};
use crate::domain::DomainLifecycle;
use crate::error::{AppError, AppResult, TransportError};
use crate::mainloop::{MainContext, SourceId, Task};
use crate::models::{ConnectionSpec, SessionKind};
use crate::session::{BackendRegistry, Session, SessionEvent, UsbDeviceSelector};
use crate::spice_client::ChannelId;
use crate::transport::{Descriptor, Endpoint, TransportOpener};

/// Interval of the reconnect poll
pub const RECONNECT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Status shown while waiting for a guest to come back
pub const STATUS_WAIT_RESTART: &str = "Waiting for guest domain to re-start";

/// Status shown before shutting down
pub const STATUS_SHUTDOWN: &str = "Guest domain has shutdown";

/// User-facing side of the App: dialogs and status line
pub trait Notifier {
    /// Shows a modal error
    fn error(&mut self, message: &str);

    /// Asks a yes/no retry question
    fn ask_retry(&mut self, message: &str) -> bool;

    /// Updates the status line
    fn status(&mut self, message: &str);

    /// Guest bell
    fn bell(&mut self) {}

    /// Guest clipboard changed
    fn cut_text(&mut self, _text: &str) {}
}

/// Start-up options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Fallback window title
    pub program_name: String,
    /// Wait for the guest to come back after a disconnect
    pub reconnect: bool,
    /// Start in fullscreen
    pub fullscreen: bool,
    /// Initial zoom in percent
    pub zoom: u32,
    /// Title overriding the guest name
    pub title: Option<String>,
    /// Local screen size used to fit windows
    pub screen: (u32, u32),
    /// Redirect new USB devices automatically
    pub auto_usbredir: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            program_name: "virt-viewer".to_string(),
            reconnect: false,
            fullscreen: false,
            zoom: ZOOM_DEFAULT,
            title: None,
            screen: (1920, 1080),
            auto_usbredir: false,
        }
    }
}

impl AppConfig {
    /// Configuration seeded from persisted settings
    #[must_use]
    pub fn from_settings(program_name: impl Into<String>, settings: &Settings) -> Self {
        Self {
            program_name: program_name.into(),
            fullscreen: settings.viewer.fullscreen,
            zoom: settings.viewer.clamped_zoom(),
            screen: settings.viewer.screen(),
            auto_usbredir: settings.viewer.auto_usbredir,
            ..Self::default()
        }
    }
}

/// Result of one `initial_connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// An attempt was started
    Activated,
    /// Nothing to connect to yet
    Waiting,
}

/// Reconnect controller
pub struct App {
    config: AppConfig,
    registry: BackendRegistry,
    opener: TransportOpener,
    source: Box<dyn ConnectionSource>,
    notifier: Box<dyn Notifier>,
    collector: Box<dyn CredentialCollector>,
    context: MainContext,
    session: Option<Session>,
    connect_info: Option<ConnectionSpec>,
    pending_fd: Option<Descriptor>,
    guest_name: Option<String>,
    active: bool,
    connected: bool,
    cancelled: bool,
    authretry: bool,
    failure_reported: bool,
    reconnect_poll: Option<SourceId>,
    windows: BTreeMap<usize, Window>,
    clipboard: Option<String>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("session", &self.session.as_ref().map(Session::kind))
            .field("active", &self.active)
            .field("connected", &self.connected)
            .field("authretry", &self.authretry)
            .field("reconnect_poll", &self.reconnect_poll)
            .field("windows", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Creates an inactive App with its main window
    #[must_use]
    pub fn new(
        config: AppConfig,
        registry: BackendRegistry,
        source: Box<dyn ConnectionSource>,
        notifier: Box<dyn Notifier>,
        collector: Box<dyn CredentialCollector>,
    ) -> Self {
        let mut main = Window::new(0, config.zoom);
        main.set_fullscreen(config.fullscreen);
        let mut windows = BTreeMap::new();
        windows.insert(0, main);
        let mut app = Self {
            config,
            registry,
            opener: TransportOpener::new(),
            source,
            notifier,
            collector,
            context: MainContext::new(),
            session: None,
            connect_info: None,
            pending_fd: None,
            guest_name: None,
            active: false,
            connected: false,
            cancelled: false,
            authretry: false,
            failure_reported: false,
            reconnect_poll: None,
            windows,
            clipboard: None,
        };
        app.update_titles();
        app
    }

    /// Uses another transport opener (SSH program)
    #[must_use]
    pub fn with_opener(mut self, opener: TransportOpener) -> Self {
        self.opener = opener;
        self
    }

    /// Whether an attempt is in progress
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the current attempt reached `Connected`
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the user asked to retry authentication
    #[must_use]
    pub const fn authretry(&self) -> bool {
        self.authretry
    }

    /// Whether the reconnect poll is running
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.reconnect_poll
            .is_some_and(|id| self.context.contains(id))
    }

    /// Whether the loop should stop
    #[must_use]
    pub const fn is_quit(&self) -> bool {
        self.context.is_quit()
    }

    /// The session, if one was created
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Connection parameters of the current attempt
    #[must_use]
    pub const fn connect_info(&self) -> Option<&ConnectionSpec> {
        self.connect_info.as_ref()
    }

    /// Window `nth`
    #[must_use]
    pub fn window(&self, nth: usize) -> Option<&Window> {
        self.windows.get(&nth)
    }

    /// All windows by index
    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        self.windows.values()
    }

    /// Source table
    #[must_use]
    pub const fn context(&self) -> &MainContext {
        &self.context
    }

    /// Last guest clipboard text
    #[must_use]
    pub fn clipboard(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    /// Base title: the override, the guest, the address or the program
    #[must_use]
    pub fn title(&self) -> String {
        if let Some(ref title) = self.config.title {
            return title.clone();
        }
        if let Some(ref guest) = self.guest_name {
            return guest.clone();
        }
        self.connect_info
            .as_ref()
            .map(ConnectionSpec::pretty_address)
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| self.config.program_name.clone())
    }

    fn pretty_address(&self) -> String {
        self.connect_info
            .as_ref()
            .map(ConnectionSpec::pretty_address)
            .unwrap_or_default()
    }

    fn update_titles(&mut self) {
        let title = self.title();
        for window in self.windows.values_mut() {
            window.set_title(&title);
        }
    }

    /// Creates the one session
    ///
    /// # Errors
    ///
    /// Returns `SessionExists` if a session is already present and
    /// `UnsupportedKind` if no backend is compiled in for `kind`.
    pub fn create_session(&mut self, kind: SessionKind) -> AppResult<()> {
        if self.session.is_some() {
            return Err(AppError::SessionExists);
        }
        let backend = self
            .registry
            .create(kind)
            .ok_or_else(|| AppError::UnsupportedKind(kind.as_str().to_string()))?;
        let mut session = Session::new(backend);
        session.set_auto_usbredir(self.config.auto_usbredir);
        tracing::debug!(%kind, "Created session");
        self.session = Some(session);
        Ok(())
    }

    /// Stores the parameters the next `activate` connects with
    pub fn set_connect_info(&mut self, spec: ConnectionSpec) {
        tracing::debug!(address = %spec.pretty_address(), tunnel = spec.uses_ssh_tunnel(), "Connect info");
        self.connect_info = Some(spec);
        self.update_titles();
    }

    /// Starts an attempt with the stored parameters
    ///
    /// # Errors
    ///
    /// Returns `AlreadyActive`, `NoSession` or `NoConnectInfo` when called
    /// out of order, and the transport or session error if the attempt
    /// cannot start.
    pub fn activate(&mut self) -> AppResult<()> {
        if self.active {
            return Err(AppError::AlreadyActive);
        }
        let session = self.session.as_mut().ok_or(AppError::NoSession)?;
        let spec = self.connect_info.as_ref().ok_or(AppError::NoConnectInfo)?;

        session.configure(spec);
        if let Some(fd) = self.pending_fd.take() {
            session.open_fd(fd)?;
        } else {
            match self.opener.open(spec)? {
                Endpoint::Descriptor(fd) => session.open_fd(fd)?,
                Endpoint::Uri(uri) => session.open_uri(&uri)?,
                Endpoint::Host {
                    host,
                    port,
                    tls_port,
                } => session.open_host(&host, port, tls_port)?,
            }
        }

        tracing::info!(address = %spec.pretty_address(), "Connection started");
        self.active = true;
        self.connected = false;
        self.cancelled = false;
        self.failure_reported = false;
        Ok(())
    }

    /// Resolves the target and starts an attempt
    ///
    /// A session is created if none exists; an idle session of the wrong
    /// protocol is replaced.
    ///
    /// # Errors
    ///
    /// Returns the resolution or activation error.
    pub fn initial_connect(&mut self) -> AppResult<ConnectOutcome> {
        let target = match self.source.resolve()? {
            Resolution::Waiting(status) => {
                tracing::info!(%status, "Waiting");
                self.notifier.status(&status);
                return Ok(ConnectOutcome::Waiting);
            }
            Resolution::Ready(target) => target,
        };

        let kind = target.spec.kind;
        if !self.active
            && let Some(ref session) = self.session
            && session.kind() != kind
        {
            tracing::info!(old = %session.kind(), new = %kind, "Graphics type changed, replacing session");
            self.session = None;
        }
        if self.session.is_none() {
            self.create_session(kind)?;
        }

        if target.guest_name.is_some() {
            self.guest_name = target.guest_name;
        }
        self.pending_fd = target.fd;
        self.set_connect_info(target.spec);
        self.activate()?;
        Ok(ConnectOutcome::Activated)
    }

    /// First connection attempt
    ///
    /// # Errors
    ///
    /// Returns the error after reporting it; the front-end then exits.
    pub fn start(&mut self, now: Instant) -> AppResult<()> {
        match self.initial_connect() {
            Ok(ConnectOutcome::Activated) => Ok(()),
            Ok(ConnectOutcome::Waiting) => {
                if !self.source.has_events() {
                    self.start_reconnect_poll(now);
                }
                Ok(())
            }
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    fn error_message(&self, err: &AppError) -> String {
        match err {
            AppError::Transport(e) => format!(
                "Unable to connect to the graphic server {}: {e}",
                self.pretty_address()
            ),
            other => other.to_string(),
        }
    }

    fn report(&mut self, err: &AppError) {
        let message = self.error_message(err);
        tracing::warn!(error = %err, "Connection failed");
        self.notifier.error(&message);
    }

    /// Starts the reconnect poll unless it is running
    pub fn start_reconnect_poll(&mut self, now: Instant) {
        if self.is_polling() {
            return;
        }
        tracing::debug!("Starting reconnect poll");
        let id = self
            .context
            .timeout_add(RECONNECT_POLL_INTERVAL, now, Task::ReconnectPoll);
        self.reconnect_poll = Some(id);
    }

    /// Stops the reconnect poll if it is running
    pub fn stop_reconnect_poll(&mut self) {
        if let Some(id) = self.reconnect_poll.take() {
            tracing::debug!("Stopping reconnect poll");
            self.context.remove(id);
        }
    }

    /// Ends the attempt and applies the reconnect policy
    pub fn deactivate(&mut self, now: Instant) {
        if !self.active {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.close();
        }
        self.active = false;
        self.connected = false;
        self.pending_fd = None;

        if self.authretry {
            self.authretry = false;
            self.context.idle_add(now, Task::RetryAuth);
            return;
        }
        self.deactivated(now);
    }

    /// What happens once nothing is connected any more
    fn deactivated(&mut self, now: Instant) {
        if self.config.reconnect {
            if self.source.has_events() {
                tracing::info!("Waiting for a guest start event");
            } else {
                self.start_reconnect_poll(now);
            }
            self.notifier.status(STATUS_WAIT_RESTART);
        } else {
            self.notifier.status(STATUS_SHUTDOWN);
            self.quit();
        }
    }

    /// Closes the session and stops the loop
    pub fn quit(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.close();
        }
        self.stop_reconnect_poll();
        self.context.quit();
    }

    /// One loop iteration; returns `false` once the App quit
    pub fn iterate(&mut self, now: Instant) -> bool {
        for lifecycle in self.source.poll_lifecycle() {
            self.on_lifecycle(lifecycle, now);
        }
        if let Some(session) = self.session.as_mut() {
            session.dispatch(self.collector.as_mut());
        }
        self.drain_session_events(now);
        for (id, task) in self.context.take_due(now) {
            self.run_task(id, task, now);
        }
        self.drain_session_events(now);
        !self.context.is_quit()
    }

    fn drain_session_events(&mut self, now: Instant) {
        while let Some(event) = self.session.as_mut().and_then(Session::next_event) {
            self.handle_session_event(event, now);
        }
    }

    fn run_task(&mut self, id: SourceId, task: Task, now: Instant) {
        match task {
            Task::ReconnectPoll => self.reconnect_tick(id),
            Task::RetryAuth => self.retry_auth(now),
        }
    }

    fn reconnect_tick(&mut self, id: SourceId) {
        if self.reconnect_poll != Some(id) {
            return;
        }
        if !self.active
            && let Err(e) = self.initial_connect()
        {
            self.report(&e);
            self.quit();
            return;
        }
        if self.active {
            self.stop_reconnect_poll();
        }
    }

    fn retry_auth(&mut self, now: Instant) {
        tracing::debug!("Retrying authentication");
        match self.initial_connect() {
            Ok(ConnectOutcome::Activated) => {}
            Ok(ConnectOutcome::Waiting) => {
                if !self.source.has_events() {
                    self.start_reconnect_poll(now);
                }
            }
            Err(e) => {
                self.report(&e);
                self.deactivated(now);
            }
        }
    }

    fn on_lifecycle(&mut self, lifecycle: DomainLifecycle, now: Instant) {
        match lifecycle {
            DomainLifecycle::Started if !self.active => {
                tracing::info!("Guest domain started");
                if let Err(e) = self.initial_connect() {
                    self.report(&e);
                    if !self.config.reconnect {
                        self.deactivated(now);
                    }
                }
            }
            DomainLifecycle::Started => {}
            DomainLifecycle::Stopped => tracing::info!("Guest domain stopped"),
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Connected => {
                tracing::info!(address = %self.pretty_address(), "Connected");
                self.connected = true;
                self.notifier.status("");
            }
            SessionEvent::Initialized => {
                tracing::info!("Display initialized");
                self.update_titles();
            }
            SessionEvent::Disconnected => self.on_disconnected(now),
            SessionEvent::Cancelled => {
                self.cancelled = true;
                self.on_disconnected(now);
            }
            SessionEvent::AuthRefused(msg) => {
                self.failure_reported = true;
                let question = format!(
                    "Unable to authenticate with remote desktop server at {}: {msg}\nRetry connection again?",
                    self.pretty_address()
                );
                self.authretry = self.notifier.ask_retry(&question);
            }
            SessionEvent::AuthFailed(msg) => {
                self.failure_reported = true;
                self.notifier.error(&format!(
                    "Unable to authenticate with remote desktop server: {msg}"
                ));
            }
            SessionEvent::UsbFailed(msg) => {
                self.notifier.error(&format!("USB redirection error: {msg}"));
            }
            SessionEvent::ChannelOpenRequest(channel) => self.open_channel(channel),
            SessionEvent::DisplayAdded(nth) => self.display_added(nth),
            SessionEvent::DisplayRemoved(nth) => self.display_removed(nth),
            SessionEvent::DesktopResized { nth, width, height } => {
                let screen = self.config.screen;
                if let Some(window) = self.windows.get_mut(&nth) {
                    window.fit((width, height), screen);
                }
            }
            SessionEvent::CutText(text) => {
                self.notifier.cut_text(&text);
                self.clipboard = Some(text);
            }
            SessionEvent::Bell => self.notifier.bell(),
        }
    }

    fn on_disconnected(&mut self, now: Instant) {
        if !self.active {
            tracing::debug!("Ignoring disconnect outside an attempt");
            return;
        }
        if !self.connected && !self.cancelled && !self.failure_reported && !self.authretry {
            let message = format!(
                "Unable to connect to the graphic server {}",
                self.pretty_address()
            );
            self.notifier.error(&message);
        }
        tracing::info!(guest = %self.title(), "Guest display has disconnected, waiting to reconnect");
        self.deactivate(now);
    }

    fn open_channel(&mut self, channel: ChannelId) {
        let Some(spec) = self.connect_info.as_ref() else {
            return;
        };
        let tunnelled = spec.uses_ssh_tunnel();
        let result = self.opener.open_channel(spec);
        let message = match result {
            Ok(fd) => match self.session.as_mut() {
                Some(session) => match session.channel_open_fd(channel, fd) {
                    Ok(()) => return,
                    Err(e) => e.to_string(),
                },
                None => return,
            },
            Err(TransportError::NoTarget) => {
                "Can't connect to channel, SSH only supported.".to_string()
            }
            Err(e) if tunnelled => {
                tracing::warn!(%channel, error = %e, "Channel tunnel failed");
                "Connect to ssh failed.".to_string()
            }
            Err(e) => e.to_string(),
        };
        self.notifier.error(&message);
    }

    fn display_added(&mut self, nth: usize) {
        let zoom = self.config.zoom;
        let fullscreen = self.config.fullscreen;
        let title = self.title();
        let window = self
            .windows
            .entry(nth)
            .or_insert_with(|| Window::new(nth, zoom));
        window.bind(nth);
        window.set_title(&title);
        window.set_fullscreen(fullscreen);
        let (zoom, monitor) = (window.zoom(), window.monitor());

        if let Some(display) = self.session.as_mut().and_then(|s| s.display_mut(nth)) {
            display.set_zoom_level(zoom);
            display.set_fullscreen(fullscreen, monitor);
        }
        tracing::debug!(nth, "Display bound to window");
    }

    fn display_removed(&mut self, nth: usize) {
        if nth == 0 {
            if let Some(main) = self.windows.get_mut(&0) {
                main.unbind();
            }
        } else {
            self.windows.remove(&nth);
        }
        tracing::debug!(nth, "Display unbound");
    }

    fn each_bound_display(&mut self, nth: Option<usize>, mut f: impl FnMut(&mut Window)) {
        for window in self.windows.values_mut() {
            if nth.is_some_and(|n| n != window.nth()) {
                continue;
            }
            f(window);
            let Some(display_nth) = window.display() else {
                continue;
            };
            if let Some(display) = self.session.as_mut().and_then(|s| s.display_mut(display_nth)) {
                display.set_zoom_level(window.zoom());
                display.set_fullscreen(window.is_fullscreen(), window.monitor());
            }
        }
    }

    /// Zooms window `nth` in by one step
    pub fn zoom_in(&mut self, nth: usize) {
        self.each_bound_display(Some(nth), Window::zoom_in);
    }

    /// Zooms window `nth` out by one step
    pub fn zoom_out(&mut self, nth: usize) {
        self.each_bound_display(Some(nth), Window::zoom_out);
    }

    /// Resets the zoom of window `nth`
    pub fn zoom_reset(&mut self, nth: usize) {
        self.each_bound_display(Some(nth), Window::zoom_reset);
    }

    /// Sets the zoom of every window
    pub fn set_zoom(&mut self, percent: u32) {
        self.each_bound_display(None, |w| w.set_zoom(percent));
    }

    /// Enters or leaves fullscreen on every window
    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.config.fullscreen = fullscreen;
        self.each_bound_display(None, |w| w.set_fullscreen(fullscreen));
    }

    /// Sends a key combination to display `nth`
    ///
    /// # Errors
    ///
    /// Returns `NoSession` or the session's `NoSuchDisplay`.
    pub fn send_key_combo(&mut self, nth: usize, combo: KeyCombo) -> AppResult<()> {
        let session = self.session.as_mut().ok_or(AppError::NoSession)?;
        session.send_keys(nth, &combo.keysyms())?;
        Ok(())
    }

    /// Releases the pointer grab of display `nth`
    pub fn release_cursor(&mut self, nth: usize) {
        if let Some(display) = self.session.as_mut().and_then(|s| s.display_mut(nth)) {
            display.release_cursor();
        }
    }

    /// Framebuffer of display `nth`
    #[must_use]
    pub fn snapshot(&self, nth: usize) -> Option<Snapshot> {
        self.session
            .as_ref()
            .and_then(|s| s.display(nth))
            .map(crate::display::Display::get_snapshot)
    }

    /// Whether the session offers USB redirection
    #[must_use]
    pub fn has_usb(&self) -> bool {
        self.session.as_ref().is_some_and(Session::has_usb)
    }

    /// Runs the USB device selection; `false` when unsupported
    pub fn usb_device_selection(&mut self, selector: &mut dyn UsbDeviceSelector) -> bool {
        self.session
            .as_mut()
            .is_some_and(|s| s.usb_device_selection(selector))
    }

    /// Inserts the software smartcard
    pub fn smartcard_insert(&mut self) -> bool {
        self.session.as_mut().is_some_and(Session::smartcard_insert)
    }

    /// Removes the software smartcard
    pub fn smartcard_remove(&mut self) -> bool {
        self.session.as_mut().is_some_and(Session::smartcard_remove)
    }
}

#[cfg(test)]
mod tests;
