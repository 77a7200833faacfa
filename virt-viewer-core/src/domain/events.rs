//! Lifecycle events handed from the management API to the App loop

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use super::DomainLifecycle;

/// Lifecycle event for one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    /// Domain name
    pub domain: String,
    /// What happened
    pub lifecycle: DomainLifecycle,
}

/// Receiving end of a lifecycle event feed
///
/// Events are produced on whatever thread the resolver uses and read from
/// the App loop without blocking.
#[derive(Debug)]
pub struct EventWatcher {
    rx: Receiver<DomainEvent>,
}

impl EventWatcher {
    /// Watcher fed through the returned sender
    #[must_use]
    pub fn channel() -> (Sender<DomainEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// Events received so far, without blocking
    pub fn drain(&self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Waits up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DomainEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}
