//! Property-based tests for the session state machine

use proptest::prelude::*;
use virt_viewer_core::testing::{FakeVnc, ScriptedCollector};
use virt_viewer_core::vnc_client::VncClientEvent;
use virt_viewer_core::{BackendRegistry, Session, SessionEvent, SessionKind, SessionState};

#[derive(Debug, Clone)]
enum Op {
    Open,
    Library(VncClientEvent),
    Close,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Open),
        1 => Just(Op::Library(VncClientEvent::Connected)),
        1 => (64u32..2048, 64u32..2048)
            .prop_map(|(width, height)| Op::Library(VncClientEvent::Initialized { width, height })),
        1 => Just(Op::Library(VncClientEvent::Disconnected)),
        1 => Just(Op::Library(VncClientEvent::Bell)),
        1 => Just(Op::Close),
    ]
}

fn new_session(vnc: &FakeVnc) -> Session {
    let backend = BackendRegistry::default()
        .with_vnc(vnc.factory())
        .create(SessionKind::Vnc)
        .unwrap();
    Session::new(backend)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every state the session passes through is reachable by an allowed
    /// transition, and close always returns it to idle with no displays
    #[test]
    fn prop_state_machine_holds(ops in prop::collection::vec(arb_op(), 1..40)) {
        let vnc = FakeVnc::new();
        let mut session = new_session(&vnc);
        let mut collector = ScriptedCollector::new();
        let mut closes = 0;

        for op in ops {
            let before = session.state();
            match op {
                Op::Open => {
                    let result = session.open_host("vmhost", 5900, None);
                    prop_assert_eq!(result.is_ok(), before == SessionState::Idle);
                }
                Op::Library(event) => {
                    vnc.push_event(event);
                    session.dispatch(&mut collector);
                }
                Op::Close => {
                    session.close();
                    closes += 1;
                    prop_assert_eq!(session.state(), SessionState::Idle);
                    prop_assert_eq!(session.display_count(), 0);
                }
            }
            let after = session.state();
            prop_assert!(
                before == after || before.can_transition_to(after),
                "illegal transition {:?} -> {:?}", before, after
            );
            if !before.is_active() && matches!(after, SessionState::Connected | SessionState::Initialized) {
                prop_assert!(false, "library event applied outside an attempt");
            }
            while let Some(event) = session.next_event() {
                if let SessionEvent::DisplayAdded(nth) = event {
                    prop_assert_eq!(nth, 0);
                }
            }
        }

        // One protocol object per attempt: the first plus one per close
        prop_assert_eq!(vnc.instances(), closes + 1);
    }

    /// Closing queues one removal per display and nothing else
    #[test]
    fn prop_close_removes_displays(width in 64u32..4096, height in 64u32..4096) {
        let vnc = FakeVnc::new();
        let mut session = new_session(&vnc);
        let mut collector = ScriptedCollector::new();

        session.open_host("vmhost", 5900, None).unwrap();
        vnc.push_event(VncClientEvent::Connected);
        vnc.push_event(VncClientEvent::Initialized { width, height });
        session.dispatch(&mut collector);
        prop_assert_eq!(session.state(), SessionState::Initialized);
        prop_assert_eq!(session.display(0).unwrap().desktop_size(), (width, height));

        session.close();
        let events: Vec<_> = std::iter::from_fn(|| session.next_event()).collect();
        prop_assert_eq!(events, vec![SessionEvent::DisplayRemoved(0)]);
    }
}
