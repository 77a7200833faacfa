use std::os::unix::net::UnixListener;
use std::time::{Duration, Instant};

use super::*;
use crate::display::KeyCombo;
use crate::spice_client::{ChannelId, SpiceChannel, SpiceChannelEvent, SpiceEvent};
use crate::testing::{
    FakeSpice, FakeVnc, RecordingNotifier, ScriptedCollector, ScriptedSource, SpiceCall, VncCall,
};
use crate::vnc_client::{VncClientEvent, VncCredential};

const TICK: Duration = RECONNECT_POLL_INTERVAL;

struct Harness {
    app: App,
    vnc: FakeVnc,
    spice: FakeSpice,
    source: ScriptedSource,
    notifier: RecordingNotifier,
    now: Instant,
}

impl Harness {
    fn new(config: AppConfig, source: ScriptedSource) -> Self {
        let vnc = FakeVnc::new();
        let spice = FakeSpice::new();
        let notifier = RecordingNotifier::new();
        let registry = BackendRegistry::default()
            .with_vnc(vnc.factory())
            .with_spice(spice.factory());
        let app = App::new(
            config,
            registry,
            Box::new(source.clone()),
            Box::new(notifier.clone()),
            Box::new(ScriptedCollector::new()),
        );
        Self {
            app,
            vnc,
            spice,
            source,
            notifier,
            now: Instant::now(),
        }
    }

    fn iterate(&mut self) -> bool {
        self.app.iterate(self.now)
    }

    fn tick(&mut self) -> bool {
        self.now += TICK;
        self.app.iterate(self.now)
    }

    fn vnc_opens(&self) -> usize {
        self.vnc
            .calls()
            .iter()
            .filter(|c| matches!(c, VncCall::OpenHost(..)))
            .count()
    }
}

fn vnc_spec() -> ConnectionSpec {
    ConnectionSpec::with_host(SessionKind::Vnc, "vmhost", 5900)
}

fn spice_spec() -> ConnectionSpec {
    ConnectionSpec::with_host(SessionKind::Spice, "vmhost", 5901)
}

fn reconnecting() -> AppConfig {
    AppConfig {
        reconnect: true,
        ..AppConfig::default()
    }
}

#[test]
fn test_create_session_once() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new());
    h.app.create_session(SessionKind::Vnc).unwrap();
    assert!(matches!(
        h.app.create_session(SessionKind::Vnc),
        Err(AppError::SessionExists)
    ));
}

#[test]
fn test_unsupported_kind() {
    let mut app = App::new(
        AppConfig::default(),
        BackendRegistry::default().with_vnc(FakeVnc::new().factory()),
        Box::new(ScriptedSource::new()),
        Box::new(RecordingNotifier::new()),
        Box::new(ScriptedCollector::new()),
    );
    let err = app.create_session(SessionKind::Spice).unwrap_err();
    assert!(matches!(err, AppError::UnsupportedKind(ref k) if k == "spice"));
    assert_eq!(err.to_string(), "Unsupported graphic type 'spice'");
}

#[test]
fn test_activate_preconditions() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new());
    assert!(matches!(h.app.activate(), Err(AppError::NoSession)));

    h.app.create_session(SessionKind::Vnc).unwrap();
    assert!(matches!(h.app.activate(), Err(AppError::NoConnectInfo)));

    h.app.set_connect_info(vnc_spec());
    h.app.activate().unwrap();
    assert!(h.app.is_active());
    assert!(matches!(h.app.activate(), Err(AppError::AlreadyActive)));
}

#[test]
fn test_start_opens_host() {
    let mut h = Harness::new(
        AppConfig::default(),
        ScriptedSource::new().ready_named(vnc_spec(), "web01"),
    );
    h.app.start(h.now).unwrap();

    assert!(h.app.is_active());
    assert_eq!(h.vnc.calls(), vec![VncCall::OpenHost("vmhost".to_string(), 5900)]);
    assert_eq!(h.app.window(0).unwrap().title(), "web01");
    assert!(!h.app.is_polling());
}

#[test]
fn test_title_falls_back_to_address() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    assert_eq!(h.app.title(), "virt-viewer");
    h.app.start(h.now).unwrap();
    assert_eq!(h.app.title(), "vmhost:5900");

    let config = AppConfig {
        title: Some("Console".to_string()),
        ..AppConfig::default()
    };
    let h = Harness::new(config, ScriptedSource::new());
    assert_eq!(h.app.window(0).unwrap().title(), "Console");
}

#[test]
fn test_connect_failure_without_reconnect_quits() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();

    h.vnc.push_event(VncClientEvent::Disconnected);
    assert!(!h.iterate());

    assert_eq!(
        h.notifier.errors(),
        vec!["Unable to connect to the graphic server vmhost:5900".to_string()]
    );
    assert_eq!(h.notifier.statuses().last().map(String::as_str), Some(STATUS_SHUTDOWN));
    assert!(!h.app.is_active());
    assert!(h.app.is_quit());
}

#[test]
fn test_disconnect_after_connect_is_silent() {
    let mut h = Harness::new(reconnecting(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();
    h.vnc.push_event(VncClientEvent::Connected);
    h.iterate();
    assert!(h.app.is_connected());

    h.vnc.push_event(VncClientEvent::Disconnected);
    assert!(h.iterate());
    assert!(h.notifier.errors().is_empty());
    assert_eq!(h.notifier.statuses().last().map(String::as_str), Some(STATUS_WAIT_RESTART));
    assert!(h.app.is_polling());
}

#[test]
fn test_reconnect_poll_stops_once_active() {
    let source = ScriptedSource::new()
        .ready(vnc_spec())
        .waiting("Waiting for guest domain to start")
        .waiting("Waiting for guest domain to start")
        .ready(vnc_spec());
    let mut h = Harness::new(reconnecting(), source);
    h.app.start(h.now).unwrap();
    h.vnc.push_event(VncClientEvent::Connected);
    h.vnc.push_event(VncClientEvent::Disconnected);
    h.iterate();
    assert!(h.app.is_polling());
    assert_eq!(h.source.resolves(), 1);

    h.tick();
    h.tick();
    assert_eq!(h.source.resolves(), 3);
    assert!(!h.app.is_active());

    h.tick();
    assert_eq!(h.source.resolves(), 4);
    assert!(h.app.is_active());
    assert!(!h.app.is_polling());

    for _ in 0..5 {
        h.tick();
    }
    assert_eq!(h.source.resolves(), 4);
    assert_eq!(h.vnc_opens(), 2);
}

#[test]
fn test_poll_not_started_twice() {
    let mut h = Harness::new(reconnecting(), ScriptedSource::new().waiting("Waiting"));
    h.app.start(h.now).unwrap();
    assert!(h.app.is_polling());
    assert_eq!(h.app.context().len(), 1);

    h.app.start_reconnect_poll(h.now);
    assert_eq!(h.app.context().len(), 1);
}

#[test]
fn test_lifecycle_events_replace_polling() {
    let source = ScriptedSource::new().ready(vnc_spec());
    source.set_has_events(true);
    let mut h = Harness::new(reconnecting(), source);
    h.app.start(h.now).unwrap();
    h.vnc.push_event(VncClientEvent::Connected);
    h.vnc.push_event(VncClientEvent::Disconnected);
    h.iterate();
    assert!(!h.app.is_active());
    assert!(!h.app.is_polling());

    h.tick();
    assert_eq!(h.source.resolves(), 1);

    h.source.push_lifecycle(DomainLifecycle::Stopped);
    h.source.push_lifecycle(DomainLifecycle::Started);
    h.tick();
    assert_eq!(h.source.resolves(), 2);
    assert!(h.app.is_active());
}

#[test]
fn test_waiting_with_events_does_not_poll() {
    let source = ScriptedSource::new().waiting("Waiting for guest domain to be created");
    source.set_has_events(true);
    let mut h = Harness::new(AppConfig::default(), source);
    h.app.start(h.now).unwrap();
    assert!(!h.app.is_polling());
    assert_eq!(
        h.notifier.statuses(),
        vec!["Waiting for guest domain to be created".to_string()]
    );
}

#[test]
fn test_start_failure_is_reported() {
    let mut h = Harness::new(
        AppConfig::default(),
        ScriptedSource::new().fail("Cannot find guest domain ghost"),
    );
    assert!(h.app.start(h.now).is_err());
    assert_eq!(
        h.notifier.errors(),
        vec!["Cannot find guest domain ghost".to_string()]
    );
}

#[test]
fn test_poll_failure_quits() {
    let source = ScriptedSource::new().waiting("Waiting").fail("libvirt went away");
    let mut h = Harness::new(reconnecting(), source);
    h.app.start(h.now).unwrap();
    assert!(!h.tick());
    assert_eq!(h.notifier.errors(), vec!["libvirt went away".to_string()]);
    assert!(!h.app.is_polling());
}

#[test]
fn test_auth_refused_retry_is_deferred() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.notifier.answer_retry(true);
    h.app.start(h.now).unwrap();

    h.vnc.push_event(VncClientEvent::AuthFailure("bad password".to_string()));
    h.vnc.push_event(VncClientEvent::Disconnected);
    assert!(h.iterate());

    let prompts = h.notifier.retry_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("vmhost:5900: bad password"));
    assert!(prompts[0].ends_with("Retry connection again?"));
    assert!(h.notifier.errors().is_empty());

    assert!(h.app.is_active());
    assert!(!h.app.authretry());
    assert_eq!(h.vnc_opens(), 2);
    assert_eq!(h.source.resolves(), 2);
}

#[test]
fn test_auth_refused_declined() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();

    h.vnc.push_event(VncClientEvent::AuthFailure("bad password".to_string()));
    h.vnc.push_event(VncClientEvent::Disconnected);
    assert!(!h.iterate());
    assert_eq!(h.notifier.retry_prompts().len(), 1);
    assert!(h.notifier.errors().is_empty());
    assert_eq!(h.vnc_opens(), 1);
}

#[test]
fn test_unsupported_auth_is_not_retryable() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();

    h.vnc.push_event(VncClientEvent::AuthUnsupported(99));
    assert!(!h.iterate());

    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Unable to authenticate with remote desktop server:"));
    assert!(errors[0].contains("99"));
    assert!(h.notifier.retry_prompts().is_empty());
}

#[test]
fn test_cancelled_prompt_is_silent() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();

    h.vnc
        .push_event(VncClientEvent::AuthCredential(vec![VncCredential::Password]));
    assert!(!h.iterate());
    assert!(h.notifier.errors().is_empty());
    assert!(!h.app.is_active());
}

#[test]
fn test_multi_monitor_windows() {
    let config = AppConfig {
        fullscreen: true,
        zoom: 150,
        ..AppConfig::default()
    };
    let mut h = Harness::new(config, ScriptedSource::new().ready_named(spice_spec(), "web01"));
    h.app.start(h.now).unwrap();

    h.spice.push_event(SpiceEvent::ChannelEvent {
        channel: ChannelId::main(),
        event: SpiceChannelEvent::Opened,
    });
    h.spice.push_event(SpiceEvent::ChannelNew(ChannelId::display(0)));
    h.spice.push_event(SpiceEvent::ChannelNew(ChannelId::display(1)));
    h.iterate();

    assert_eq!(h.app.windows().count(), 2);
    let second = h.app.window(1).unwrap();
    assert_eq!(second.display(), Some(1));
    assert_eq!(second.title(), "web01 (2)");
    assert_eq!(second.monitor(), Some(1));

    let display = h.app.session().unwrap().display(1).unwrap();
    assert_eq!(display.zoom_level(), 150);
    assert_eq!(display.monitor(), Some(1));

    h.app.quit();
    h.iterate();
    assert_eq!(h.app.windows().count(), 1);
    assert_eq!(h.app.window(0).unwrap().display(), None);
}

#[test]
fn test_desktop_resize_fits_window() {
    let config = AppConfig {
        screen: (1280, 800),
        ..AppConfig::default()
    };
    let mut h = Harness::new(config, ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();
    h.vnc.push_event(VncClientEvent::Connected);
    h.vnc.push_event(VncClientEvent::Initialized {
        width: 1920,
        height: 1200,
    });
    h.iterate();

    assert_eq!(h.app.window(0).unwrap().size(), Some((1178, 736)));
}

#[test]
fn test_channel_request_without_ssh() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(spice_spec()));
    h.app.start(h.now).unwrap();

    let channel = ChannelId::new(SpiceChannel::Inputs, 0);
    h.spice.push_event(SpiceEvent::ChannelOpenFd(channel));
    h.iterate();
    assert_eq!(
        h.notifier.errors(),
        vec!["Can't connect to channel, SSH only supported.".to_string()]
    );
}

#[test]
fn test_channel_request_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spice.sock");
    let _listener = UnixListener::bind(&path).unwrap();

    let spec = ConnectionSpec::with_unix_socket(SessionKind::Spice, &path);
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(spec));
    h.app.start(h.now).unwrap();
    assert!(h.spice.calls().contains(&SpiceCall::OpenFd));

    let channel = ChannelId::new(SpiceChannel::Inputs, 0);
    h.spice.push_event(SpiceEvent::ChannelOpenFd(channel));
    h.iterate();
    assert!(h.notifier.errors().is_empty());
    assert!(h.spice.calls().contains(&SpiceCall::ChannelOpenFd(channel)));
}

#[test]
fn test_transport_failure_names_address() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ConnectionSpec::with_unix_socket(SessionKind::Vnc, dir.path().join("missing.sock"));
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(spec));
    assert!(matches!(h.app.start(h.now), Err(AppError::Transport(_))));

    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Unable to connect to the graphic server"));
    assert!(errors[0].contains("missing.sock"));
    assert!(!h.app.is_active());
}

#[test]
fn test_graphics_type_change_replaces_session() {
    let source = ScriptedSource::new().ready(vnc_spec()).ready(spice_spec());
    let mut h = Harness::new(reconnecting(), source);
    h.app.start(h.now).unwrap();
    assert_eq!(h.app.session().unwrap().kind(), SessionKind::Vnc);

    h.vnc.push_event(VncClientEvent::Connected);
    h.vnc.push_event(VncClientEvent::Disconnected);
    h.iterate();
    h.tick();

    assert!(h.app.is_active());
    assert_eq!(h.app.session().unwrap().kind(), SessionKind::Spice);
    assert_eq!(h.spice.calls().last(), Some(&SpiceCall::Connect));
}

#[test]
fn test_clipboard_and_bell() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();
    h.vnc.push_event(VncClientEvent::Connected);
    h.vnc.push_event(VncClientEvent::ClipboardText("hello".to_string()));
    h.vnc.push_event(VncClientEvent::Bell);
    h.iterate();

    assert_eq!(h.app.clipboard(), Some("hello"));
    assert_eq!(h.notifier.clipboard(), vec!["hello".to_string()]);
    assert_eq!(h.notifier.bells(), 1);
}

#[test]
fn test_zoom_and_keys_pass_through() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();
    h.vnc.push_event(VncClientEvent::Connected);
    h.vnc.push_event(VncClientEvent::Initialized {
        width: 800,
        height: 600,
    });
    h.iterate();

    h.app.zoom_in(0);
    assert_eq!(h.app.window(0).unwrap().zoom(), 110);
    assert_eq!(h.app.session().unwrap().display(0).unwrap().zoom_level(), 110);
    h.app.zoom_reset(0);
    assert_eq!(h.app.window(0).unwrap().zoom(), 100);

    h.app.send_key_combo(0, KeyCombo::CtrlAltDel).unwrap();
    let keys = h
        .vnc
        .calls()
        .into_iter()
        .filter(|c| matches!(c, VncCall::Key(..)))
        .count();
    assert_eq!(keys, 6);
    assert!(h.app.send_key_combo(3, KeyCombo::CtrlAltDel).is_err());
    assert!(h.app.snapshot(0).is_some());
}

#[test]
fn test_vnc_has_no_usb_or_smartcard() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new().ready(vnc_spec()));
    h.app.start(h.now).unwrap();
    assert!(!h.app.has_usb());
    assert!(!h.app.smartcard_insert());
    assert!(!h.app.smartcard_remove());
}

#[test]
fn test_stale_disconnect_ignored() {
    let mut h = Harness::new(AppConfig::default(), ScriptedSource::new());
    h.app.create_session(SessionKind::Vnc).unwrap();
    h.app.deactivate(h.now);
    assert!(h.iterate());
    assert!(h.notifier.statuses().is_empty());
}
