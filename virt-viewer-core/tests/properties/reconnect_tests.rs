//! Property-based tests for the reconnect poll

use std::time::Instant;

use proptest::prelude::*;
use virt_viewer_core::testing::{FakeVnc, RecordingNotifier, ScriptedCollector, ScriptedSource, VncCall};
use virt_viewer_core::{
    App, AppConfig, BackendRegistry, ConnectionSpec, RECONNECT_POLL_INTERVAL, SessionKind,
};

fn build_app(source: &ScriptedSource, vnc: &FakeVnc) -> App {
    App::new(
        AppConfig::default(),
        BackendRegistry::default().with_vnc(vnc.factory()),
        Box::new(source.clone()),
        Box::new(RecordingNotifier::new()),
        Box::new(ScriptedCollector::new()),
    )
}

fn opens(vnc: &FakeVnc) -> usize {
    vnc.calls()
        .iter()
        .filter(|c| matches!(c, VncCall::OpenHost(..)))
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A guest that needs `waits` polls before it shows up is resolved
    /// exactly `waits + 1` times and opened once, with at most one poll
    /// source alive at any point
    #[test]
    fn prop_poll_resolves_until_ready(waits in 0usize..12) {
        let mut source = ScriptedSource::new();
        for _ in 0..waits {
            source = source.waiting("Waiting for guest domain to start");
        }
        let source = source.ready(ConnectionSpec::with_host(SessionKind::Vnc, "vmhost", 5900));
        let vnc = FakeVnc::new();
        let mut app = build_app(&source, &vnc);
        let mut now = Instant::now();

        app.start(now).unwrap();
        prop_assert!(app.context().len() <= 1);
        for _ in 0..waits {
            prop_assert!(app.is_polling());
            now += RECONNECT_POLL_INTERVAL;
            prop_assert!(app.iterate(now));
            prop_assert!(app.context().len() <= 1);
        }

        prop_assert!(app.is_active());
        prop_assert!(!app.is_polling());
        prop_assert_eq!(source.resolves(), waits + 1);
        prop_assert_eq!(opens(&vnc), 1);

        // Further ticks do nothing once connected
        now += RECONNECT_POLL_INTERVAL;
        app.iterate(now);
        prop_assert_eq!(source.resolves(), waits + 1);
    }

    /// Starting the poll repeatedly never adds a second source
    #[test]
    fn prop_poll_started_once(starts in 1usize..10, stops in any::<bool>()) {
        let source = ScriptedSource::new().waiting("Waiting");
        let vnc = FakeVnc::new();
        let mut app = build_app(&source, &vnc);
        let now = Instant::now();

        for _ in 0..starts {
            app.start_reconnect_poll(now);
        }
        prop_assert_eq!(app.context().len(), 1);
        if stops {
            app.stop_reconnect_poll();
            prop_assert!(app.context().is_empty());
            prop_assert!(!app.is_polling());
        }
    }

    /// Ticks arriving before the interval elapsed do not resolve again
    #[test]
    fn prop_poll_respects_interval(early_ticks in 1u32..20) {
        let source = ScriptedSource::new().waiting("Waiting");
        let vnc = FakeVnc::new();
        let mut app = build_app(&source, &vnc);
        let start = Instant::now();

        app.start(start).unwrap();
        let step = RECONNECT_POLL_INTERVAL / (early_ticks + 1);
        for i in 1..=early_ticks {
            app.iterate(start + step * i);
        }
        prop_assert_eq!(source.resolves(), 1);

        app.iterate(start + RECONNECT_POLL_INTERVAL);
        prop_assert_eq!(source.resolves(), 2);
    }
}
