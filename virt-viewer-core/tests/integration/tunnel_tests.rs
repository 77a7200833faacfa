//! SSH tunnels spawned for guests behind a `qemu+ssh://` connection
//!
//! A shell script stands in for `ssh`: it ignores its arguments and relays
//! stdin back to stdout, so the far end of the tunnel is an echo server.

use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use virt_viewer_core::domain::{DomainKey, DomainSource};
use virt_viewer_core::models::{ConnectionSpec, SessionKind, SshRelay};
use virt_viewer_core::spice_client::{ChannelId, SpiceChannel, SpiceEvent};
use virt_viewer_core::testing::{
    FakeResolver, FakeSpice, FakeVnc, RecordingNotifier, ScriptedCollector, SpiceCall, VncCall,
};
use virt_viewer_core::transport::{Endpoint, TransportOpener};
use virt_viewer_core::{App, AppConfig, BackendRegistry};

const SSH_URI: &str = "qemu+ssh://admin@vmhost:2222/system";

const VNC_XML: &str = "<domain><name>web01</name><devices>\
    <graphics type='vnc' port='5900' listen='0.0.0.0'/></devices></domain>";

const SPICE_XML: &str = "<domain><name>web01</name><devices>\
    <graphics type='spice' port='5900' listen='0.0.0.0'/></devices></domain>";

fn fake_ssh(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("ssh");
    std::fs::write(&path, "#!/bin/sh\nexec cat\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn build_app(
    xml: &str,
    registry: BackendRegistry,
    ssh_program: &Path,
    notifier: &RecordingNotifier,
) -> App {
    let resolver = FakeResolver::new(Some(SSH_URI)).running("web01", xml);
    let source = DomainSource::new(resolver, DomainKey::parse("web01"));
    App::new(
        AppConfig::default(),
        registry,
        Box::new(source),
        Box::new(notifier.clone()),
        Box::new(ScriptedCollector::new()),
    )
    .with_opener(TransportOpener::new().with_ssh_program(ssh_program))
}

#[test]
fn test_tunnel_relays_bytes() {
    let dir = TempDir::new().unwrap();
    let opener = TransportOpener::new().with_ssh_program(fake_ssh(&dir));
    let spec = ConnectionSpec::with_host(SessionKind::Vnc, "localhost", 5900)
        .ssh_relay(SshRelay::new("vmhost").with_port(2222).with_user("admin"));

    let Endpoint::Descriptor(fd) = opener.open(&spec).unwrap() else {
        panic!("expected a tunnelled descriptor");
    };
    let tunnel = fd.tunnel().unwrap();
    assert_eq!(
        tunnel.argv()[1..],
        ["-p", "2222", "-l", "admin", "vmhost", "nc", "localhost", "5900"]
    );

    let (mut stream, _tunnel) = fd.into_parts();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(b"RFB 003.008\n").unwrap();
    let mut reply = [0u8; 12];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"RFB 003.008\n");
}

#[test]
fn test_guest_behind_ssh_is_opened_through_tunnel() {
    let dir = TempDir::new().unwrap();
    let vnc = FakeVnc::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(
        VNC_XML,
        BackendRegistry::default().with_vnc(vnc.factory()),
        &fake_ssh(&dir),
        &notifier,
    );

    app.start(Instant::now()).unwrap();
    assert!(app.is_active());
    assert!(app.connect_info().unwrap().uses_ssh_tunnel());
    assert!(vnc.calls().contains(&VncCall::OpenFd));
    assert!(!vnc.calls().iter().any(|c| matches!(c, VncCall::OpenHost(..))));
    assert!(notifier.errors().is_empty());
}

#[test]
fn test_missing_ssh_program_fails_start() {
    let dir = TempDir::new().unwrap();
    let vnc = FakeVnc::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(
        VNC_XML,
        BackendRegistry::default().with_vnc(vnc.factory()),
        &dir.path().join("no-such-ssh"),
        &notifier,
    );

    assert!(app.start(Instant::now()).is_err());
    let errors = notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Unable to connect to the graphic server localhost:5900"));
    assert!(errors[0].contains("SSH tunnel to vmhost failed"));
    assert!(vnc.calls().is_empty());
}

#[test]
fn test_spice_channel_gets_its_own_tunnel() {
    let dir = TempDir::new().unwrap();
    let spice = FakeSpice::new();
    let notifier = RecordingNotifier::new();
    let mut app = build_app(
        SPICE_XML,
        BackendRegistry::default().with_spice(spice.factory()),
        &fake_ssh(&dir),
        &notifier,
    );
    let now = Instant::now();
    app.start(now).unwrap();
    assert!(spice.calls().contains(&SpiceCall::OpenFd));

    let inputs = ChannelId::new(SpiceChannel::Inputs, 0);
    spice.push_event(SpiceEvent::ChannelOpenFd(inputs));
    assert!(app.iterate(now));
    assert!(spice.calls().contains(&SpiceCall::ChannelOpenFd(inputs)));
    assert!(notifier.errors().is_empty());
}
