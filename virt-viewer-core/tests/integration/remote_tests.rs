//! remote-viewer flows: `.vv` files, display URIs and the files kept
//! between runs

use std::time::Instant;

use virt_viewer_core::spice_client::{ChannelId, SpiceChannelEvent, SpiceEvent};
use virt_viewer_core::testing::{FakeSpice, FakeVnc, RecordingNotifier, ScriptedCollector, SpiceCall};
use virt_viewer_core::uri::{DisplayUri, parse_display_uri};
use virt_viewer_core::{
    App, AppConfig, BackendRegistry, ConfigManager, RecentConnections, SessionKind, Settings,
    UriSource, VvFile,
};

fn spice_app(source: UriSource, spice: &FakeSpice, notifier: &RecordingNotifier) -> App {
    App::new(
        AppConfig {
            program_name: "remote-viewer".to_string(),
            ..AppConfig::default()
        },
        BackendRegistry::default().with_spice(spice.factory()),
        Box::new(source),
        Box::new(notifier.clone()),
        Box::new(ScriptedCollector::new()),
    )
}

#[test]
fn test_vv_file_connects_with_password_and_is_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("console.vv");
    std::fs::write(
        &path,
        "[virt-viewer]\n\
         type=spice\n\
         host=vmhost\n\
         port=5900\n\
         password=s3cret\n\
         title=Build box\n\
         delete-this-file=1\n\
         some-future-key=ignored\n",
    )
    .unwrap();

    let file = VvFile::load(&path).unwrap();
    assert!(!path.exists());
    assert_eq!(file.title.as_deref(), Some("Build box"));

    let spec = file.connection_spec().unwrap();
    let spice = FakeSpice::new();
    let notifier = RecordingNotifier::new();
    let mut app = spice_app(UriSource::new(spec), &spice, &notifier);
    let now = Instant::now();
    app.start(now).unwrap();

    let calls = spice.calls();
    assert!(calls.contains(&SpiceCall::SetProperty("password", "s3cret".to_string())));
    assert!(calls.contains(&SpiceCall::SetProperty("host", "vmhost".to_string())));
    assert_eq!(calls.last(), Some(&SpiceCall::Connect));

    spice.push_event(SpiceEvent::ChannelEvent {
        channel: ChannelId::main(),
        event: SpiceChannelEvent::Opened,
    });
    spice.push_event(SpiceEvent::ChannelNew(ChannelId::display(0)));
    spice.push_event(SpiceEvent::PrimaryCreate {
        channel_id: 0,
        width: 1280,
        height: 720,
    });
    assert!(app.iterate(now));
    assert!(app.is_connected());
    assert_eq!(app.session().unwrap().display(0).unwrap().desktop_size(), (1280, 720));
    assert_eq!(app.window(0).unwrap().size(), Some((1280, 720)));
}

#[test]
fn test_refused_connection_reports_address_and_exits() {
    let spice = FakeSpice::new();
    let notifier = RecordingNotifier::new();
    let DisplayUri::Direct(spec) = parse_display_uri("spice://vmhost:5900").unwrap() else {
        panic!("expected a direct display URI");
    };
    let mut app = spice_app(UriSource::new(spec), &spice, &notifier);
    let now = Instant::now();
    app.start(now).unwrap();

    spice.push_event(SpiceEvent::ChannelEvent {
        channel: ChannelId::main(),
        event: SpiceChannelEvent::ErrorConnect,
    });
    assert!(!app.iterate(now));
    assert_eq!(notifier.errors().len(), 1);
    assert!(notifier.errors()[0].starts_with("Unable to connect to the graphic server"));
    assert!(notifier.errors()[0].ends_with("vmhost:5900"));
    assert!(app.is_quit());
}

#[test]
fn test_unsupported_protocol_is_reported() {
    let notifier = RecordingNotifier::new();
    let DisplayUri::Direct(spec) = parse_display_uri("spice://vmhost:5900").unwrap() else {
        panic!("expected a direct display URI");
    };
    let mut app = App::new(
        AppConfig::default(),
        BackendRegistry::default().with_vnc(FakeVnc::new().factory()),
        Box::new(UriSource::new(spec)),
        Box::new(notifier.clone()),
        Box::new(ScriptedCollector::new()),
    );

    assert!(app.start(Instant::now()).is_err());
    assert_eq!(
        notifier.errors(),
        vec!["Unsupported graphic type 'spice'".to_string()]
    );
    assert!(app.session().is_none());
}

#[test]
fn test_settings_and_recent_connections_persist() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ConfigManager::with_dirs(dir.path().join("config"), dir.path().join("data"));

    assert_eq!(manager.load_settings().unwrap(), Settings::default());
    let mut settings = Settings::default();
    settings.viewer.zoom = 125;
    settings.ssh.program = "/usr/local/bin/ssh".to_string();
    manager.save_settings(&settings).unwrap();
    assert_eq!(manager.load_settings().unwrap(), settings);

    let mut recent = RecentConnections::load(manager.recent_path()).unwrap();
    recent.add_session("spice://a:5900", SessionKind::Spice);
    recent.add_session("vnc://b:5901", SessionKind::Vnc);
    recent.add_session("spice://a:5900", SessionKind::Spice);
    recent.save().unwrap();

    let reloaded = RecentConnections::load(manager.recent_path()).unwrap();
    let uris: Vec<_> = reloaded.entries().iter().map(|e| e.uri.as_str()).collect();
    assert_eq!(uris, vec!["spice://a:5900", "vnc://b:5901"]);
    assert_eq!(reloaded.filtered(&["application/x-vnc"]).count(), 1);
}
