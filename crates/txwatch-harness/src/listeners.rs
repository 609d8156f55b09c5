//! Listeners for observing fan-out in tests.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use txwatch_observability::{EventKind, ListenerResult, TransactionEvent, TransactionListener};

/// Keeps a copy of every event it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<TransactionEvent>>,
}

impl RecordingListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(TransactionEvent::kind).collect()
    }

    /// Events of one kind, in arrival order.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<TransactionEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<TransactionEvent> {
        self.events.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: &TransactionEvent) {
        self.events.lock().push(event.clone());
    }
}

impl TransactionListener for RecordingListener {
    fn on_begin(&self, event: &TransactionEvent) -> ListenerResult {
        self.push(event);
        Ok(())
    }

    fn on_commit(&self, event: &TransactionEvent) -> ListenerResult {
        self.push(event);
        Ok(())
    }

    fn on_rollback(&self, event: &TransactionEvent) -> ListenerResult {
        self.push(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Counts events per kind.
#[derive(Debug, Default)]
pub struct CountingListener {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl CountingListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn begins(&self) -> u64 {
        self.begins.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }
}

impl TransactionListener for CountingListener {
    fn on_begin(&self, _event: &TransactionEvent) -> ListenerResult {
        self.begins.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_commit(&self, _event: &TransactionEvent) -> ListenerResult {
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_rollback(&self, _event: &TransactionEvent) -> ListenerResult {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Returns an error from every hook.
#[derive(Debug, Clone)]
pub struct FailingListener {
    message: String,
}

impl FailingListener {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail(&self) -> ListenerResult {
        Err(self.message.clone().into())
    }
}

impl TransactionListener for FailingListener {
    fn on_begin(&self, _event: &TransactionEvent) -> ListenerResult {
        self.fail()
    }

    fn on_commit(&self, _event: &TransactionEvent) -> ListenerResult {
        self.fail()
    }

    fn on_rollback(&self, _event: &TransactionEvent) -> ListenerResult {
        self.fail()
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Panics in every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingListener;

impl TransactionListener for PanickingListener {
    fn on_begin(&self, _event: &TransactionEvent) -> ListenerResult {
        panic!("panicking listener: begin");
    }

    fn on_commit(&self, _event: &TransactionEvent) -> ListenerResult {
        panic!("panicking listener: commit");
    }

    fn on_rollback(&self, _event: &TransactionEvent) -> ListenerResult {
        panic!("panicking listener: rollback");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}
