//! The event sink consumed from collaborators (§6): a domain-level ledger
//! of warnings/build-file errors that `evaluate` consults for its
//! keep-going decision. This is deliberately separate from `tracing` (§10
//! of SPEC_FULL.md) — `tracing` is the operational trace a human watches
//! live, this is the accumulated-state a query's success/failure hinges
//! on.

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub enum Event {
    Warning(String),
    Error(String),
}

/// `EventHandler` (§6): `handle`, `hasErrors`, `resetErrors`. Required to
/// be thread-safe by contract (§5) — duplicate warnings from concurrent
/// producers are acceptable.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Event);
    fn has_errors(&self) -> bool;
    fn reset_errors(&self);
}

/// Default in-process implementation: an append-only, mutex-guarded log.
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventHandler for RecordingEventHandler {
    fn handle(&self, event: Event) {
        match &event {
            Event::Warning(msg) => tracing::warn!(%msg, "query event"),
            Event::Error(msg) => tracing::error!(%msg, "query event"),
        }
        self.events.lock().push(event);
    }

    fn has_errors(&self) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| matches!(e, Event::Error(_)))
    }

    fn reset_errors(&self) {
        self.events.lock().retain(|e| !matches!(e, Event::Error(_)));
    }
}
