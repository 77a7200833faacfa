//! Scripted stand-ins for the protocol libraries, the management API and
//! the user
//!
//! The fakes share their state through a handle so a test can keep pushing
//! library events and inspecting calls after the session took ownership of
//! the protocol object. Every object built by a fake factory gets a new
//! generation; events queued for an older generation are discarded, which
//! mirrors a closed library object going silent.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::sync::mpsc::Sender;

use secrecy::{ExposeSecret, SecretString};

use crate::app::{ConnectionSource, Notifier, Resolution, Target};
use crate::credentials::{Cancelled, CredentialCollector, CredentialRequest, Credentials};
use crate::display::KeyPress;
use crate::domain::{
    DomainEvent, DomainInfo, DomainKey, DomainLifecycle, DomainResolver, DomainState, EventWatcher,
};
use crate::error::{AppError, AppResult, DomainError, DomainResult, ProtocolClientError};
use crate::models::ConnectionSpec;
use crate::spice_client::{
    ChannelId, SpiceEvent, SpiceFactory, SpiceProperty, SpiceProtocol, UsbDevice,
};
use crate::transport::Descriptor;
use crate::vnc_client::{
    VncClientCommand, VncClientEvent, VncCredential, VncFactory, VncProtocol,
};

/// Call recorded by [`FakeVnc`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VncCall {
    /// `open_host(host, port)`
    OpenHost(String, u16),
    /// `open_fd`
    OpenFd,
    /// `set_credential(kind, value)`
    SetCredential(VncCredential, String),
    /// `close`
    Close,
    /// Key transition
    Key(u32, bool),
}

#[derive(Debug, Default)]
struct FakeVncState {
    generation: usize,
    events: VecDeque<VncClientEvent>,
    calls: Vec<VncCall>,
    refuse_open: bool,
}

/// Scripted VNC library
#[derive(Debug, Clone, Default)]
pub struct FakeVnc {
    state: Rc<RefCell<FakeVncState>>,
}

impl FakeVnc {
    /// Creates a fake with no events queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out connection objects bound to this fake
    #[must_use]
    pub fn factory(&self) -> VncFactory {
        let state = self.state.clone();
        Rc::new(move || {
            let generation = {
                let mut s = state.borrow_mut();
                s.generation += 1;
                s.events.clear();
                s.generation
            };
            Box::new(FakeVncConnection {
                state: state.clone(),
                generation,
            }) as Box<dyn VncProtocol>
        })
    }

    /// Queues a library event for the current connection object
    pub fn push_event(&self, event: VncClientEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    /// Calls recorded so far
    #[must_use]
    pub fn calls(&self) -> Vec<VncCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of connection objects built
    #[must_use]
    pub fn instances(&self) -> usize {
        self.state.borrow().generation
    }

    /// Makes `open_*` fail
    pub fn set_refuse_open(&self, refuse: bool) {
        self.state.borrow_mut().refuse_open = refuse;
    }
}

struct FakeVncConnection {
    state: Rc<RefCell<FakeVncState>>,
    generation: usize,
}

impl FakeVncConnection {
    fn record(&self, call: VncCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn check_open(&self) -> Result<(), ProtocolClientError> {
        if self.state.borrow().refuse_open {
            Err(ProtocolClientError::ConnectionFailed("refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl VncProtocol for FakeVncConnection {
    fn open_host(&mut self, host: &str, port: u16) -> Result<(), ProtocolClientError> {
        self.check_open()?;
        self.record(VncCall::OpenHost(host.to_string(), port));
        Ok(())
    }

    fn open_fd(&mut self, _fd: Descriptor) -> Result<(), ProtocolClientError> {
        self.check_open()?;
        self.record(VncCall::OpenFd);
        Ok(())
    }

    fn set_credential(
        &mut self,
        credential: VncCredential,
        value: &str,
    ) -> Result<(), ProtocolClientError> {
        if let VncCredential::Other(id) = credential {
            return Err(ProtocolClientError::Unsupported(format!("credential {id}")));
        }
        self.record(VncCall::SetCredential(credential, value.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        self.record(VncCall::Close);
    }

    fn send_command(&mut self, command: VncClientCommand) -> Result<(), ProtocolClientError> {
        if let VncClientCommand::Key { keysym, down } = command {
            self.record(VncCall::Key(keysym, down));
        }
        Ok(())
    }

    fn try_recv_event(&mut self) -> Option<VncClientEvent> {
        let mut state = self.state.borrow_mut();
        if state.generation != self.generation {
            return None;
        }
        state.events.pop_front()
    }
}

/// Call recorded by [`FakeSpice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiceCall {
    /// Property name and value
    SetProperty(&'static str, String),
    /// `connect`
    Connect,
    /// `open_fd`
    OpenFd,
    /// `channel_open_fd`
    ChannelOpenFd(ChannelId),
    /// `disconnect`
    Disconnect,
    /// Keys sent to a display channel
    Keys(u32, Vec<KeyPress>),
    /// USB auto-connect toggled
    UsbAutoconnect(bool),
    /// USB device redirect change
    Redirect(String, bool),
    /// Smartcard inserted
    SmartcardInsert,
    /// Smartcard removed
    SmartcardRemove,
}

#[derive(Debug, Default)]
struct FakeSpiceState {
    generation: usize,
    events: VecDeque<SpiceEvent>,
    calls: Vec<SpiceCall>,
    refuse_connect: bool,
    usb_devices: Option<Vec<UsbDevice>>,
    fail_redirect: bool,
    smartcard: bool,
}

/// Scripted SPICE library
#[derive(Debug, Clone, Default)]
pub struct FakeSpice {
    state: Rc<RefCell<FakeSpiceState>>,
}

impl FakeSpice {
    /// Creates a fake with no events queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out session objects bound to this fake
    #[must_use]
    pub fn factory(&self) -> SpiceFactory {
        let state = self.state.clone();
        Rc::new(move || {
            let generation = {
                let mut s = state.borrow_mut();
                s.generation += 1;
                s.events.clear();
                s.generation
            };
            Box::new(FakeSpiceSession {
                state: state.clone(),
                generation,
            }) as Box<dyn SpiceProtocol>
        })
    }

    /// Queues a library event for the current session object
    pub fn push_event(&self, event: SpiceEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    /// Calls recorded so far
    #[must_use]
    pub fn calls(&self) -> Vec<SpiceCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of session objects built
    #[must_use]
    pub fn instances(&self) -> usize {
        self.state.borrow().generation
    }

    /// Makes `connect` fail
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.state.borrow_mut().refuse_connect = refuse;
    }

    /// Enables the USB manager with these devices
    pub fn set_usb_devices(&self, devices: Vec<UsbDevice>) {
        self.state.borrow_mut().usb_devices = Some(devices);
    }

    /// Makes USB redirection fail
    pub fn set_fail_redirect(&self, fail: bool) {
        self.state.borrow_mut().fail_redirect = fail;
    }

    /// Enables the software smartcard
    pub fn set_smartcard(&self, available: bool) {
        self.state.borrow_mut().smartcard = available;
    }
}

struct FakeSpiceSession {
    state: Rc<RefCell<FakeSpiceState>>,
    generation: usize,
}

impl FakeSpiceSession {
    fn record(&self, call: SpiceCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl SpiceProtocol for FakeSpiceSession {
    fn set_property(&mut self, property: SpiceProperty) {
        let value = match property {
            SpiceProperty::Host(ref v)
            | SpiceProperty::HostSubject(ref v)
            | SpiceProperty::Uri(ref v)
            | SpiceProperty::Ca(ref v) => v.clone(),
            SpiceProperty::Port(v) | SpiceProperty::TlsPort(v) => v.to_string(),
            SpiceProperty::Password(ref v) => v.expose_secret().to_string(),
            SpiceProperty::CaFile(ref v) => v.display().to_string(),
        };
        self.record(SpiceCall::SetProperty(property.name(), value));
    }

    fn connect(&mut self) -> Result<(), ProtocolClientError> {
        if self.state.borrow().refuse_connect {
            return Err(ProtocolClientError::ConnectionFailed("refused".to_string()));
        }
        self.record(SpiceCall::Connect);
        Ok(())
    }

    fn open_fd(&mut self, _fd: Descriptor) -> Result<(), ProtocolClientError> {
        self.record(SpiceCall::OpenFd);
        Ok(())
    }

    fn channel_open_fd(
        &mut self,
        channel: ChannelId,
        _fd: Descriptor,
    ) -> Result<(), ProtocolClientError> {
        self.record(SpiceCall::ChannelOpenFd(channel));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.record(SpiceCall::Disconnect);
    }

    fn try_recv_event(&mut self) -> Option<SpiceEvent> {
        let mut state = self.state.borrow_mut();
        if state.generation != self.generation {
            return None;
        }
        state.events.pop_front()
    }

    fn send_keys(&mut self, channel_id: u32, keys: &[KeyPress]) {
        self.record(SpiceCall::Keys(channel_id, keys.to_vec()));
    }

    fn has_usb(&self) -> bool {
        self.state.borrow().usb_devices.is_some()
    }

    fn set_usb_autoconnect(&mut self, enabled: bool) {
        self.record(SpiceCall::UsbAutoconnect(enabled));
    }

    fn usb_devices(&self) -> Vec<UsbDevice> {
        self.state.borrow().usb_devices.clone().unwrap_or_default()
    }

    fn redirect_usb_device(
        &mut self,
        device: &UsbDevice,
        redirect: bool,
    ) -> Result<(), ProtocolClientError> {
        if self.state.borrow().fail_redirect {
            return Err(ProtocolClientError::ChannelError(format!(
                "Could not redirect {}",
                device.description
            )));
        }
        self.record(SpiceCall::Redirect(device.id.clone(), redirect));
        Ok(())
    }

    fn smartcard_insert(&mut self) -> bool {
        let available = self.state.borrow().smartcard;
        if available {
            self.record(SpiceCall::SmartcardInsert);
        }
        available
    }

    fn smartcard_remove(&mut self) -> bool {
        let available = self.state.borrow().smartcard;
        if available {
            self.record(SpiceCall::SmartcardRemove);
        }
        available
    }
}

/// Credential collector answering from a script
///
/// Once the script is exhausted every prompt is cancelled.
#[derive(Debug, Default)]
pub struct ScriptedCollector {
    answers: VecDeque<Result<Credentials, Cancelled>>,
    requests: Vec<CredentialRequest>,
}

impl ScriptedCollector {
    /// Creates a collector that cancels every prompt
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an answer with a password
    #[must_use]
    pub fn password(mut self, password: &str) -> Self {
        self.answers.push_back(Ok(Credentials {
            username: None,
            password: Some(SecretString::from(password.to_string())),
        }));
        self
    }

    /// Queues an answer with a username and password
    #[must_use]
    pub fn username_password(mut self, username: &str, password: &str) -> Self {
        self.answers.push_back(Ok(Credentials {
            username: Some(username.to_string()),
            password: Some(SecretString::from(password.to_string())),
        }));
        self
    }

    /// Queues a cancellation
    #[must_use]
    pub fn cancel(mut self) -> Self {
        self.answers.push_back(Err(Cancelled));
        self
    }

    /// Prompts shown so far
    #[must_use]
    pub fn requests(&self) -> &[CredentialRequest] {
        &self.requests
    }
}

impl CredentialCollector for ScriptedCollector {
    fn collect(&mut self, request: &CredentialRequest) -> Result<Credentials, Cancelled> {
        self.requests.push(request.clone());
        self.answers
            .pop_front()
            .unwrap_or(Err(Cancelled))
            .map(|creds| creds.restrict_to(request))
    }
}

impl<C: CredentialCollector> CredentialCollector for Rc<RefCell<C>> {
    fn collect(&mut self, request: &CredentialRequest) -> Result<Credentials, Cancelled> {
        self.borrow_mut().collect(request)
    }
}

#[derive(Debug, Default)]
struct NotifierLog {
    errors: Vec<String>,
    retry_prompts: Vec<String>,
    statuses: Vec<String>,
    bells: usize,
    clipboard: Vec<String>,
    retry_answers: VecDeque<bool>,
}

/// Notifier recording every message
///
/// Retry questions are answered from a queue, `false` once it is empty.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    log: Rc<RefCell<NotifierLog>>,
}

impl RecordingNotifier {
    /// Creates a notifier declining every retry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer to the next retry question
    pub fn answer_retry(&self, retry: bool) {
        self.log.borrow_mut().retry_answers.push_back(retry);
    }

    /// Errors shown so far
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.log.borrow().errors.clone()
    }

    /// Retry questions asked so far
    #[must_use]
    pub fn retry_prompts(&self) -> Vec<String> {
        self.log.borrow().retry_prompts.clone()
    }

    /// Status lines shown so far
    #[must_use]
    pub fn statuses(&self) -> Vec<String> {
        self.log.borrow().statuses.clone()
    }

    /// Number of bells
    #[must_use]
    pub fn bells(&self) -> usize {
        self.log.borrow().bells
    }

    /// Clipboard texts received
    #[must_use]
    pub fn clipboard(&self) -> Vec<String> {
        self.log.borrow().clipboard.clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&mut self, message: &str) {
        self.log.borrow_mut().errors.push(message.to_string());
    }

    fn ask_retry(&mut self, message: &str) -> bool {
        let mut log = self.log.borrow_mut();
        log.retry_prompts.push(message.to_string());
        log.retry_answers.pop_front().unwrap_or(false)
    }

    fn status(&mut self, message: &str) {
        self.log.borrow_mut().statuses.push(message.to_string());
    }

    fn bell(&mut self) {
        self.log.borrow_mut().bells += 1;
    }

    fn cut_text(&mut self, text: &str) {
        self.log.borrow_mut().clipboard.push(text.to_string());
    }
}

/// One scripted answer of [`ScriptedSource`]
#[derive(Debug, Clone)]
pub enum SourceStep {
    /// Connect to this target
    Ready(ConnectionSpec, Option<String>),
    /// Nothing to connect to yet
    Waiting(String),
    /// Fatal resolution error
    Fail(String),
}

#[derive(Debug, Default)]
struct SourceScript {
    steps: VecDeque<SourceStep>,
    last: Option<SourceStep>,
    has_events: bool,
    lifecycle: VecDeque<DomainLifecycle>,
    resolves: usize,
}

/// Connection source answering from a script
///
/// Once the script is exhausted the last step repeats.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    script: Rc<RefCell<SourceScript>>,
}

impl ScriptedSource {
    /// Creates an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a target
    #[must_use]
    pub fn ready(self, spec: ConnectionSpec) -> Self {
        self.push(SourceStep::Ready(spec, None));
        self
    }

    /// Queues a target with a guest name
    #[must_use]
    pub fn ready_named(self, spec: ConnectionSpec, name: &str) -> Self {
        self.push(SourceStep::Ready(spec, Some(name.to_string())));
        self
    }

    /// Queues a wait
    #[must_use]
    pub fn waiting(self, status: &str) -> Self {
        self.push(SourceStep::Waiting(status.to_string()));
        self
    }

    /// Queues a failure
    #[must_use]
    pub fn fail(self, message: &str) -> Self {
        self.push(SourceStep::Fail(message.to_string()));
        self
    }

    /// Appends a step
    pub fn push(&self, step: SourceStep) {
        self.script.borrow_mut().steps.push_back(step);
    }

    /// Sets whether lifecycle events are delivered
    pub fn set_has_events(&self, has_events: bool) {
        self.script.borrow_mut().has_events = has_events;
    }

    /// Queues a lifecycle event
    pub fn push_lifecycle(&self, lifecycle: DomainLifecycle) {
        self.script.borrow_mut().lifecycle.push_back(lifecycle);
    }

    /// Number of `resolve` calls
    #[must_use]
    pub fn resolves(&self) -> usize {
        self.script.borrow().resolves
    }
}

impl ConnectionSource for ScriptedSource {
    fn resolve(&mut self) -> AppResult<Resolution> {
        let mut script = self.script.borrow_mut();
        script.resolves += 1;
        let step = match script.steps.pop_front() {
            Some(step) => {
                script.last = Some(step.clone());
                step
            }
            None => script
                .last
                .clone()
                .unwrap_or_else(|| SourceStep::Waiting("No target".to_string())),
        };
        match step {
            SourceStep::Ready(spec, name) => {
                let mut target = Target::new(spec);
                target.guest_name = name;
                Ok(Resolution::Ready(target))
            }
            SourceStep::Waiting(status) => Ok(Resolution::Waiting(status)),
            SourceStep::Fail(message) => Err(AppError::Source(message)),
        }
    }

    fn has_events(&self) -> bool {
        self.script.borrow().has_events
    }

    fn poll_lifecycle(&mut self) -> Vec<DomainLifecycle> {
        self.script.borrow_mut().lifecycle.drain(..).collect()
    }
}

#[derive(Debug)]
struct ResolverState {
    domain: Option<DomainInfo>,
    state: DomainState,
    xml: String,
    attachable: bool,
    events_available: bool,
    event_tx: Option<Sender<DomainEvent>>,
}

/// Scripted management API holding at most one domain
#[derive(Debug, Clone)]
pub struct FakeResolver {
    uri: Option<String>,
    state: Rc<RefCell<ResolverState>>,
}

impl FakeResolver {
    /// Resolver for `uri` without any domain
    #[must_use]
    pub fn new(uri: Option<&str>) -> Self {
        Self {
            uri: uri.map(str::to_string),
            state: Rc::new(RefCell::new(ResolverState {
                domain: None,
                state: DomainState::ShutOff,
                xml: String::new(),
                attachable: false,
                events_available: true,
                event_tx: None,
            })),
        }
    }

    /// Adds a running domain with the given XML
    #[must_use]
    pub fn running(self, name: &str, xml: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.domain = Some(DomainInfo {
                id: Some(1),
                uuid: None,
                name: name.to_string(),
            });
            state.state = DomainState::Running;
            state.xml = xml.to_string();
        }
        self
    }

    /// Changes the run state
    pub fn set_state(&self, state: DomainState) {
        self.state.borrow_mut().state = state;
    }

    /// Replaces the domain XML
    pub fn set_xml(&self, xml: &str) {
        self.state.borrow_mut().xml = xml.to_string();
    }

    /// Lets `open_graphics` hand out a descriptor
    pub fn set_attachable(&self, attachable: bool) {
        self.state.borrow_mut().attachable = attachable;
    }

    /// Controls whether `watch_events` succeeds
    pub fn set_events_available(&self, available: bool) {
        self.state.borrow_mut().events_available = available;
    }

    /// Sender feeding the watcher handed out by `watch_events`
    #[must_use]
    pub fn event_sender(&self) -> Option<Sender<DomainEvent>> {
        self.state.borrow().event_tx.clone()
    }
}

impl DomainResolver for FakeResolver {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn lookup(&mut self, key: &DomainKey) -> DomainResult<Option<DomainInfo>> {
        Ok(self
            .state
            .borrow()
            .domain
            .clone()
            .filter(|info| key.matches(info)))
    }

    fn dumpxml(&mut self, _domain: &DomainInfo) -> DomainResult<String> {
        Ok(self.state.borrow().xml.clone())
    }

    fn state(&mut self, _domain: &DomainInfo) -> DomainResult<DomainState> {
        Ok(self.state.borrow().state.clone())
    }

    fn open_graphics(&mut self, domain: &DomainInfo) -> DomainResult<Descriptor> {
        if !self.state.borrow().attachable {
            return Err(DomainError::AttachUnsupported(domain.name.clone()));
        }
        let (local, _remote) =
            UnixStream::pair().map_err(|e| DomainError::AttachUnsupported(e.to_string()))?;
        Ok(Descriptor::from_stream(local))
    }

    fn watch_events(&mut self) -> Option<EventWatcher> {
        let mut state = self.state.borrow_mut();
        if !state.events_available {
            return None;
        }
        let (tx, watcher) = EventWatcher::channel();
        state.event_tx = Some(tx);
        Some(watcher)
    }
}
