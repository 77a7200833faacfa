//! virt-viewer flows: a libvirt guest that is waited for, restarted and
//! reconnected to

use std::time::Instant;

use virt_viewer_core::domain::{DomainEvent, DomainKey, DomainLifecycle, DomainSource, DomainState};
use virt_viewer_core::testing::{
    FakeResolver, FakeVnc, RecordingNotifier, ScriptedCollector, VncCall,
};
use virt_viewer_core::vnc_client::VncClientEvent;
use virt_viewer_core::{
    App, AppConfig, BackendRegistry, RECONNECT_POLL_INTERVAL, STATUS_WAIT_RESTART,
};

const VNC_XML: &str = "<domain type='kvm'><name>web01</name><devices>\
    <graphics type='vnc' port='5900' autoport='yes' listen='0.0.0.0'>\
    <listen type='address' address='0.0.0.0'/></graphics>\
    </devices></domain>";

fn build_app(source: DomainSource<FakeResolver>, vnc: &FakeVnc, notifier: &RecordingNotifier) -> App {
    App::new(
        AppConfig {
            reconnect: true,
            ..AppConfig::default()
        },
        BackendRegistry::default().with_vnc(vnc.factory()),
        Box::new(source),
        Box::new(notifier.clone()),
        Box::new(ScriptedCollector::new()),
    )
}

fn opens(vnc: &FakeVnc) -> Vec<VncCall> {
    vnc.calls()
        .into_iter()
        .filter(|c| matches!(c, VncCall::OpenHost(..)))
        .collect()
}

fn started(domain: &str) -> DomainEvent {
    DomainEvent {
        domain: domain.to_string(),
        lifecycle: DomainLifecycle::Started,
    }
}

#[test]
fn test_wait_for_start_event_then_reconnect_after_reboot() {
    let resolver = FakeResolver::new(None).running("web01", VNC_XML);
    resolver.set_state(DomainState::ShutOff);
    let handle = resolver.clone();
    let mut source = DomainSource::new(resolver, DomainKey::parse("web01")).with_wait(true);
    assert!(source.start_events());

    let vnc = FakeVnc::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(source, &vnc, &notifier);
    let now = Instant::now();

    app.start(now).unwrap();
    assert!(!app.is_active());
    assert!(!app.is_polling());
    assert_eq!(
        notifier.statuses(),
        vec!["Waiting for guest domain to start".to_string()]
    );

    // An event for another guest changes nothing
    let events = handle.event_sender().unwrap();
    handle.set_state(DomainState::Running);
    events.send(started("db01")).unwrap();
    assert!(app.iterate(now));
    assert!(!app.is_active());

    events.send(started("web01")).unwrap();
    assert!(app.iterate(now));
    assert!(app.is_active());
    assert_eq!(opens(&vnc), vec![VncCall::OpenHost("localhost".to_string(), 5900)]);
    assert_eq!(app.title(), "web01");

    vnc.push_event(VncClientEvent::Connected);
    vnc.push_event(VncClientEvent::Initialized {
        width: 1024,
        height: 768,
    });
    app.iterate(now);
    assert!(app.is_connected());
    assert_eq!(app.window(0).unwrap().display(), Some(0));

    // Guest reboots: the display goes away and the App waits for the event
    handle.set_state(DomainState::ShutOff);
    vnc.push_event(VncClientEvent::Disconnected);
    assert!(app.iterate(now));
    assert!(!app.is_active());
    assert!(notifier.errors().is_empty());
    assert_eq!(
        notifier.statuses().last().map(String::as_str),
        Some(STATUS_WAIT_RESTART)
    );
    assert_eq!(app.window(0).unwrap().display(), None);

    handle.set_state(DomainState::Running);
    events.send(started("web01")).unwrap();
    app.iterate(now);
    assert!(app.is_active());
    assert_eq!(opens(&vnc).len(), 2);
}

#[test]
fn test_poll_until_guest_runs_without_events() {
    let resolver = FakeResolver::new(None).running("web01", VNC_XML);
    resolver.set_state(DomainState::ShutOff);
    resolver.set_events_available(false);
    let handle = resolver.clone();
    let mut source = DomainSource::new(resolver, DomainKey::parse("web01")).with_wait(true);
    assert!(!source.start_events());

    let vnc = FakeVnc::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(source, &vnc, &notifier);
    let mut now = Instant::now();

    app.start(now).unwrap();
    assert!(app.is_polling());

    now += RECONNECT_POLL_INTERVAL;
    app.iterate(now);
    assert!(!app.is_active());
    assert!(app.is_polling());

    handle.set_state(DomainState::Running);
    now += RECONNECT_POLL_INTERVAL;
    app.iterate(now);
    assert!(app.is_active());
    assert!(!app.is_polling());
    assert_eq!(app.context().len(), 0);
    assert_eq!(opens(&vnc).len(), 1);
}

#[test]
fn test_missing_guest_without_wait_fails_start() {
    let source = DomainSource::new(FakeResolver::new(None), DomainKey::parse("ghost"));
    let vnc = FakeVnc::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(source, &vnc, &notifier);

    assert!(app.start(Instant::now()).is_err());
    assert_eq!(
        notifier.errors(),
        vec!["Cannot find guest domain ghost".to_string()]
    );
    assert!(opens(&vnc).is_empty());
}

#[test]
fn test_inactive_display_waits_with_wait() {
    let xml = "<domain><devices><graphics type='vnc' port='-1' autoport='yes'/></devices></domain>";
    let resolver = FakeResolver::new(None).running("web01", xml);
    resolver.set_events_available(false);
    let handle = resolver.clone();
    let source = DomainSource::new(resolver, DomainKey::parse("1")).with_wait(true);

    let vnc = FakeVnc::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(source, &vnc, &notifier);
    let mut now = Instant::now();

    app.start(now).unwrap();
    assert!(!app.is_active());
    assert!(app.is_polling());

    handle.set_xml(VNC_XML);
    now += RECONNECT_POLL_INTERVAL;
    app.iterate(now);
    assert!(app.is_active());
    assert_eq!(app.title(), "web01");
}
