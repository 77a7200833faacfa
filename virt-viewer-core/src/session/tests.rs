use super::*;
use crate::error::SessionError;
use crate::models::{ConnectionSpec, SessionKind};
use crate::spice_client::{ChannelId, SpiceChannel, SpiceChannelEvent, SpiceEvent, UsbDevice};
use crate::testing::{FakeSpice, FakeVnc, ScriptedCollector, SpiceCall, VncCall};
use crate::vnc_client::{VncClientEvent, VncCredential};

fn vnc_session(fake: &FakeVnc) -> Session {
    Session::new(Backend::Vnc(VncBackend::new(fake.factory())))
}

fn spice_session(fake: &FakeSpice) -> Session {
    Session::new(Backend::Spice(SpiceBackend::new(fake.factory())))
}

fn drain(session: &mut Session) -> Vec<SessionEvent> {
    std::iter::from_fn(|| session.next_event()).collect()
}

fn main_event(event: SpiceChannelEvent) -> SpiceEvent {
    SpiceEvent::ChannelEvent {
        channel: ChannelId::main(),
        event,
    }
}

#[test]
fn test_vnc_connect_and_initialize() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5901, None).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(fake.calls(), vec![VncCall::OpenHost("localhost".to_string(), 5901)]);

    fake.push_event(VncClientEvent::Connected);
    fake.push_event(VncClientEvent::Initialized {
        width: 1024,
        height: 768,
    });
    session.dispatch(&mut collector);

    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(
        drain(&mut session),
        vec![
            SessionEvent::Connected,
            SessionEvent::Initialized,
            SessionEvent::DisplayAdded(0),
            SessionEvent::DesktopResized {
                nth: 0,
                width: 1024,
                height: 768
            },
        ]
    );
    assert_eq!(session.display(0).unwrap().desktop_size(), (1024, 768));
}

#[test]
fn test_second_open_is_busy() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);

    session.open_host("localhost", 5900, None).unwrap();
    let err = session.open_host("localhost", 5900, None).unwrap_err();
    assert!(matches!(err, SessionError::Busy(_)));
}

#[test]
fn test_failed_open_returns_to_idle() {
    let fake = FakeVnc::new();
    fake.set_refuse_open(true);
    let mut session = vnc_session(&fake);

    assert!(session.open_host("localhost", 5900, None).is_err());
    assert_eq!(session.state(), SessionState::Idle);

    fake.set_refuse_open(false);
    session.open_host("localhost", 5900, None).unwrap();
}

#[test]
fn test_close_rebuilds_protocol_object() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    assert_eq!(fake.instances(), 1);

    session.open_host("localhost", 5900, None).unwrap();
    session.close();
    assert_eq!(fake.instances(), 2);
    assert_eq!(session.state(), SessionState::Idle);

    session.open_host("localhost", 5900, None).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
}

#[test]
fn test_close_removes_displays() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::Connected);
    fake.push_event(VncClientEvent::Initialized {
        width: 800,
        height: 600,
    });
    session.dispatch(&mut collector);
    drain(&mut session);

    session.close();
    assert_eq!(session.display_count(), 0);
    assert_eq!(drain(&mut session), vec![SessionEvent::DisplayRemoved(0)]);
}

#[test]
fn test_events_from_closed_connection_are_ignored() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::Connected);
    session.close();
    session.dispatch(&mut collector);

    assert_eq!(session.state(), SessionState::Idle);
    assert!(drain(&mut session).is_empty());
}

#[test]
fn test_events_while_idle_are_dropped() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    fake.push_event(VncClientEvent::Connected);
    session.dispatch(&mut collector);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(drain(&mut session).is_empty());
}

#[test]
fn test_initialized_before_connected_is_ignored() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_uri("spice://localhost:5900").unwrap();
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::display(0)));
    session.dispatch(&mut collector);

    assert_eq!(session.state(), SessionState::Connecting);
    let events = drain(&mut session);
    assert!(!events.contains(&SessionEvent::Initialized));
}

#[test]
fn test_vnc_unsupported_auth_type() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::Connected);
    fake.push_event(VncClientEvent::AuthUnsupported(99));
    session.dispatch(&mut collector);

    let events = drain(&mut session);
    assert!(matches!(&events[1], SessionEvent::AuthFailed(msg) if msg.contains("99")));
    assert_eq!(events.last(), Some(&SessionEvent::Disconnected));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(fake.calls().contains(&VncCall::Close));
}

#[test]
fn test_vnc_auth_failure_is_refused() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::AuthFailure("bad password".to_string()));
    fake.push_event(VncClientEvent::Disconnected);
    session.dispatch(&mut collector);

    assert_eq!(
        drain(&mut session),
        vec![
            SessionEvent::AuthRefused("bad password".to_string()),
            SessionEvent::Disconnected,
        ]
    );
}

#[test]
fn test_vnc_credentials_from_collector() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new().username_password("alice", "s3cret");

    session.configure(&ConnectionSpec::with_host(SessionKind::Vnc, "vmhost", 5900));
    session.open_host("vmhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::AuthCredential(vec![
        VncCredential::Username,
        VncCredential::Password,
        VncCredential::ClientName,
    ]));
    session.dispatch(&mut collector);

    let request = &collector.requests()[0];
    assert_eq!(request.kind, "VNC");
    assert_eq!(request.address.as_deref(), Some("vmhost:5900"));
    assert!(request.need_username && request.need_password);

    let calls = fake.calls();
    assert!(calls.contains(&VncCall::SetCredential(
        VncCredential::Username,
        "alice".to_string()
    )));
    assert!(calls.contains(&VncCall::SetCredential(
        VncCredential::Password,
        "s3cret".to_string()
    )));
    assert!(calls.contains(&VncCall::SetCredential(
        VncCredential::ClientName,
        VNC_CLIENT_NAME.to_string()
    )));
}

#[test]
fn test_vnc_preset_password_skips_prompt_once() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new().password("typed");

    session.configure(
        &ConnectionSpec::with_host(SessionKind::Vnc, "vmhost", 5900).password("ticket"),
    );
    session.open_host("vmhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::AuthCredential(vec![VncCredential::Password]));
    fake.push_event(VncClientEvent::AuthCredential(vec![VncCredential::Password]));
    session.dispatch(&mut collector);

    assert_eq!(collector.requests().len(), 1);
    let passwords: Vec<_> = fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            VncCall::SetCredential(VncCredential::Password, v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(passwords, vec!["ticket".to_string(), "typed".to_string()]);
}

#[test]
fn test_vnc_cancelled_prompt() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new().cancel();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::AuthCredential(vec![VncCredential::Password]));
    session.dispatch(&mut collector);

    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(drain(&mut session), vec![SessionEvent::Cancelled]);
}

#[test]
fn test_vnc_unknown_credential_disconnects() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::Connected);
    fake.push_event(VncClientEvent::AuthCredential(vec![VncCredential::Other(42)]));
    session.dispatch(&mut collector);

    assert!(collector.requests().is_empty());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_vnc_has_no_channel_fds() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    session.open_host("localhost", 5900, None).unwrap();

    let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
    let err = session
        .channel_open_fd(ChannelId::main(), crate::transport::Descriptor::from_stream(a))
        .unwrap_err();
    assert!(matches!(err, SessionError::Unsupported { .. }));
}

#[test]
fn test_vnc_has_no_usb_or_smartcard() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    assert!(!session.has_usb());
    assert!(!session.smartcard_insert());
    assert!(!session.smartcard_remove());
}

#[test]
fn test_send_keys_needs_display() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    assert!(matches!(
        session.send_keys(0, &[0xffe3]),
        Err(SessionError::NoSuchDisplay(0))
    ));
}

#[test]
fn test_vnc_send_keys_forwards_transitions() {
    let fake = FakeVnc::new();
    let mut session = vnc_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, None).unwrap();
    fake.push_event(VncClientEvent::Connected);
    fake.push_event(VncClientEvent::Initialized {
        width: 640,
        height: 480,
    });
    session.dispatch(&mut collector);

    session.send_keys(0, &[0xffe3, 0xffff]).unwrap();
    let keys: Vec<_> = fake
        .calls()
        .into_iter()
        .filter(|c| matches!(c, VncCall::Key(..)))
        .collect();
    assert_eq!(
        keys,
        vec![
            VncCall::Key(0xffe3, true),
            VncCall::Key(0xffff, true),
            VncCall::Key(0xffff, false),
            VncCall::Key(0xffe3, false),
        ]
    );
}

#[test]
fn test_spice_lifecycle_and_displays() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_host("localhost", 5900, Some(5901)).unwrap();
    let calls = fake.calls();
    assert!(calls.contains(&SpiceCall::SetProperty("host", "localhost".to_string())));
    assert!(calls.contains(&SpiceCall::SetProperty("tls-port", "5901".to_string())));
    assert_eq!(calls.last(), Some(&SpiceCall::Connect));

    fake.push_event(main_event(SpiceChannelEvent::Opened));
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::display(0)));
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::display(1)));
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::display(1)));
    session.dispatch(&mut collector);

    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(
        drain(&mut session),
        vec![
            SessionEvent::Connected,
            SessionEvent::Initialized,
            SessionEvent::DisplayAdded(0),
            SessionEvent::DisplayAdded(1),
        ]
    );

    fake.push_event(SpiceEvent::ChannelDestroy(ChannelId::display(1)));
    fake.push_event(main_event(SpiceChannelEvent::Closed));
    session.dispatch(&mut collector);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::DisplayRemoved(1), SessionEvent::Disconnected]
    );
    assert_eq!(session.display_count(), 1);
}

#[test]
fn test_resize_reported_only_on_change() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_uri("spice://localhost:5900").unwrap();
    fake.push_event(main_event(SpiceChannelEvent::Opened));
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::display(0)));
    for _ in 0..2 {
        fake.push_event(SpiceEvent::PrimaryCreate {
            channel_id: 0,
            width: 1280,
            height: 720,
        });
    }
    session.dispatch(&mut collector);

    let resizes = drain(&mut session)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::DesktopResized { .. }))
        .count();
    assert_eq!(resizes, 1);
}

#[test]
fn test_oversized_surface_is_ignored() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_uri("spice://localhost:5900").unwrap();
    fake.push_event(main_event(SpiceChannelEvent::Opened));
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::display(0)));
    fake.push_event(SpiceEvent::PrimaryCreate {
        channel_id: 0,
        width: 800,
        height: 600,
    });
    fake.push_event(SpiceEvent::PrimaryCreate {
        channel_id: 0,
        width: u32::MAX,
        height: u32::MAX,
    });
    session.dispatch(&mut collector);

    let resizes: Vec<SessionEvent> = drain(&mut session)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::DesktopResized { .. }))
        .collect();
    assert_eq!(
        resizes,
        vec![SessionEvent::DesktopResized {
            nth: 0,
            width: 800,
            height: 600
        }]
    );
    assert_eq!(session.display(0).unwrap().desktop_size(), (800, 600));
}

#[test]
fn test_spice_auth_error_prompts_and_reconnects() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new().password("hunter2");

    session.configure(&ConnectionSpec::with_uri(
        SessionKind::Spice,
        "spice://vmhost:5900",
    ));
    session.open_uri("spice://vmhost:5900").unwrap();
    fake.push_event(main_event(SpiceChannelEvent::ErrorAuth));
    session.dispatch(&mut collector);

    let request = &collector.requests()[0];
    assert_eq!(request.kind, "SPICE");
    assert!(request.need_password && !request.need_username);

    let calls = fake.calls();
    assert!(calls.contains(&SpiceCall::SetProperty("password", "hunter2".to_string())));
    assert_eq!(calls.iter().filter(|c| **c == SpiceCall::Connect).count(), 2);
    assert_eq!(session.state(), SessionState::Connecting);
}

#[test]
fn test_spice_cancelled_auth_is_not_disconnect() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new().cancel();

    session.open_uri("spice://vmhost:5900").unwrap();
    fake.push_event(main_event(SpiceChannelEvent::ErrorAuth));
    fake.push_event(main_event(SpiceChannelEvent::Closed));
    session.dispatch(&mut collector);

    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(drain(&mut session), vec![SessionEvent::Cancelled]);
}

#[test]
fn test_spice_channel_fd_request() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.open_uri("spice://vmhost:5900").unwrap();
    let channel = ChannelId::new(SpiceChannel::Inputs, 0);
    fake.push_event(SpiceEvent::ChannelOpenFd(channel));
    session.dispatch(&mut collector);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::ChannelOpenRequest(channel)]
    );

    let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
    session
        .channel_open_fd(channel, crate::transport::Descriptor::from_stream(a))
        .unwrap();
    assert!(fake.calls().contains(&SpiceCall::ChannelOpenFd(channel)));
}

#[test]
fn test_spice_usb_auto_redirect_on_channel() {
    let fake = FakeSpice::new();
    fake.set_usb_devices(Vec::new());
    let mut session = spice_session(&fake);
    let mut collector = ScriptedCollector::new();

    session.set_auto_usbredir(true);
    session.open_uri("spice://vmhost:5900").unwrap();
    fake.push_event(SpiceEvent::ChannelNew(ChannelId::new(SpiceChannel::Usbredir, 0)));
    session.dispatch(&mut collector);

    assert!(session.auto_usbredir());
    assert!(fake.calls().contains(&SpiceCall::UsbAutoconnect(true)));
}

struct Pick(Vec<(String, bool)>);

impl UsbDeviceSelector for Pick {
    fn select(&mut self, _devices: &[UsbDevice]) -> Vec<(String, bool)> {
        self.0.clone()
    }
}

#[test]
fn test_usb_device_selection() {
    let fake = FakeSpice::new();
    fake.set_usb_devices(vec![
        UsbDevice::new("1-2", "Yubikey"),
        UsbDevice::new("1-3", "Webcam"),
    ]);
    let mut session = spice_session(&fake);
    assert!(session.has_usb());

    let mut pick = Pick(vec![("1-2".to_string(), true), ("9-9".to_string(), true)]);
    assert!(session.usb_device_selection(&mut pick));
    assert!(fake.calls().contains(&SpiceCall::Redirect("1-2".to_string(), true)));
    assert!(!fake.calls().iter().any(|c| matches!(c, SpiceCall::Redirect(id, _) if id == "9-9")));
}

#[test]
fn test_usb_redirect_failure_is_reported() {
    let fake = FakeSpice::new();
    fake.set_usb_devices(vec![UsbDevice::new("1-2", "Yubikey")]);
    fake.set_fail_redirect(true);
    let mut session = spice_session(&fake);

    let mut pick = Pick(vec![("1-2".to_string(), true)]);
    assert!(session.usb_device_selection(&mut pick));
    assert!(matches!(
        drain(&mut session).as_slice(),
        [SessionEvent::UsbFailed(msg)] if msg.contains("Yubikey")
    ));
}

#[test]
fn test_usb_selection_without_manager() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    assert!(!session.has_usb());
    assert!(!session.usb_device_selection(&mut Pick(Vec::new())));
}

#[test]
fn test_spice_smartcard() {
    let fake = FakeSpice::new();
    let mut session = spice_session(&fake);
    assert!(!session.smartcard_insert());

    fake.set_smartcard(true);
    assert!(session.smartcard_insert());
    assert!(session.smartcard_remove());
    assert!(fake.calls().contains(&SpiceCall::SmartcardInsert));
}

#[test]
fn test_registry_supports() {
    let registry = BackendRegistry::default();
    assert!(!registry.supports(SessionKind::Spice));
    assert!(registry.create(SessionKind::Spice).is_none());

    let registry = registry.with_spice(FakeSpice::new().factory());
    assert!(registry.supports(SessionKind::Spice));
    assert_eq!(
        registry.create(SessionKind::Spice).map(|b| b.kind()),
        Some(SessionKind::Spice)
    );
}

#[test]
fn test_builtin_registry_matches_features() {
    let registry = BackendRegistry::builtin();
    assert_eq!(
        registry.supports(SessionKind::Vnc),
        crate::vnc_client::is_embedded_vnc_available()
    );
    assert_eq!(
        registry.supports(SessionKind::Spice),
        crate::spice_client::is_embedded_spice_available()
    );
}

#[cfg(feature = "spice-embedded")]
#[test]
fn test_builtin_registry_opens_spice() {
    let mut backend = BackendRegistry::builtin()
        .create(SessionKind::Spice)
        .expect("built-in SPICE client");
    assert_eq!(backend.kind(), SessionKind::Spice);
    // no port configured: the client refuses before any I/O
    assert!(backend.connectable().open_uri("spice://vmhost").is_err());
}
