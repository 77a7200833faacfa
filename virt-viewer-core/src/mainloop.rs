//! Single-threaded source table
//!
//! The App never blocks and never runs a callback synchronously from inside
//! another one. Deferred work is scheduled here as either a periodic timeout
//! or a one-shot idle source, and picked up by the front-end loop through
//! [`MainContext::take_due`]. Time is passed in explicitly so the schedule can
//! be driven by tests.

use std::time::{Duration, Instant};

/// Handle of a scheduled source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

/// Work the App defers to a later loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Retry the initial connection while waiting for the guest
    ReconnectPoll,
    /// Reconnect after the user asked to retry authentication
    RetryAuth,
}

#[derive(Debug)]
struct Source {
    id: SourceId,
    task: Task,
    /// `None` for idle sources, which run once
    interval: Option<Duration>,
    due: Instant,
}

/// Timeouts and idle callbacks waiting to run
#[derive(Debug, Default)]
pub struct MainContext {
    next_id: u64,
    sources: Vec<Source>,
    quit: bool,
}

impl MainContext {
    /// Creates an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, task: Task, interval: Option<Duration>, due: Instant) -> SourceId {
        self.next_id += 1;
        let id = SourceId(self.next_id);
        self.sources.push(Source {
            id,
            task,
            interval,
            due,
        });
        id
    }

    /// Runs `task` every `interval`, first at `now + interval`
    pub fn timeout_add(&mut self, interval: Duration, now: Instant, task: Task) -> SourceId {
        self.add(task, Some(interval), now + interval)
    }

    /// Runs `task` once on the next iteration
    pub fn idle_add(&mut self, now: Instant, task: Task) -> SourceId {
        self.add(task, None, now)
    }

    /// Cancels a source; returns `false` if it already ran or was removed
    pub fn remove(&mut self, id: SourceId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.id != id);
        self.sources.len() != before
    }

    /// Whether a source is still scheduled
    #[must_use]
    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.iter().any(|s| s.id == id)
    }

    /// Number of scheduled sources
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing is scheduled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources due at `now`, in scheduling order
    ///
    /// Idle sources are removed; timeouts are rescheduled one interval
    /// later (a late tick does not cause a burst of catch-up ticks).
    pub fn take_due(&mut self, now: Instant) -> Vec<(SourceId, Task)> {
        let mut due = Vec::new();
        self.sources.retain_mut(|source| {
            if source.due > now {
                return true;
            }
            due.push((source.id, source.task));
            match source.interval {
                Some(interval) => {
                    source.due = now + interval;
                    true
                }
                None => false,
            }
        });
        due
    }

    /// Earliest deadline of any source
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sources.iter().map(|s| s.due).min()
    }

    /// Asks the front-end loop to stop
    pub fn quit(&mut self) {
        self.quit = true;
    }

    /// Whether [`MainContext::quit`] was called
    #[must_use]
    pub const fn is_quit(&self) -> bool {
        self.quit
    }
}
