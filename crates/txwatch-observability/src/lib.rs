//! Transaction lifecycle events and listener infrastructure.
//!
//! Provides the event snapshot handed to listeners, the listener trait, the
//! copy-on-write [`ListenerRegistry`] used for fan-out, and a bounded
//! [`RingBuffer`] shared by history and metrics.
//!
//! # Design Principles
//!
//! - **Snapshots only:** a [`TransactionEvent`] owns copies of everything it
//!   exposes. Listeners never see live tracker state.
//! - **Best-effort fan-out:** listeners run synchronously on the calling thread,
//!   in registration order. A failing or panicking listener is reported and
//!   skipped; its siblings are still notified.
//! - **Never on the lock:** events are published after the tracker has released
//!   its stack lock, so listeners may be slow or call back into the connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use txwatch_error::{Result, WatchError};
use txwatch_types::{CallSite, SavepointMarker, ScopeId};

mod log_listener;
mod registry;

pub use log_listener::LogListener;
pub use registry::{FailureHook, ListenerRegistry};

// ---------------------------------------------------------------------------
// TransactionEvent: the snapshot handed to listeners
// ---------------------------------------------------------------------------

/// Which lifecycle boundary an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Begin,
    Commit,
    Rollback,
}

impl EventKind {
    /// Name of the listener hook that receives this kind.
    pub const fn hook(self) -> &'static str {
        match self {
            Self::Begin => "on_begin",
            Self::Commit => "on_commit",
            Self::Rollback => "on_rollback",
        }
    }
}

/// Read-only snapshot of a transaction scope at a lifecycle boundary.
///
/// Constructed from a scope and then independent of it: statements and call
/// sites are copied at construction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionEvent {
    kind: EventKind,
    transaction_id: ScopeId,
    marker: SavepointMarker,
    statements: Vec<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    elapsed: Duration,
    started_at: SystemTime,
    origin: CallSite,
    completion: Option<CallSite>,
}

impl TransactionEvent {
    /// Assemble an event snapshot.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        kind: EventKind,
        transaction_id: ScopeId,
        marker: SavepointMarker,
        statements: Vec<String>,
        elapsed: Duration,
        started_at: SystemTime,
        origin: CallSite,
        completion: Option<CallSite>,
    ) -> Self {
        Self {
            kind,
            transaction_id,
            marker,
            statements,
            elapsed,
            started_at,
            origin,
            completion,
        }
    }

    /// Lifecycle boundary this event reports.
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Identity of the transaction scope.
    pub const fn transaction_id(&self) -> ScopeId {
        self.transaction_id
    }

    /// Savepoint marker of the scope (`Root` for the outermost transaction).
    pub const fn marker(&self) -> SavepointMarker {
        self.marker
    }

    /// Whether the scope was opened by an explicit savepoint.
    pub const fn is_savepoint(&self) -> bool {
        !self.marker.is_root()
    }

    /// Statements recorded in the scope, oldest first.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Time spent in the scope when the event was built.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// [`Self::elapsed`] in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        duration_millis(self.elapsed)
    }

    /// Wall-clock time the scope began.
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Where the scope began.
    pub const fn start_trace(&self) -> &CallSite {
        &self.origin
    }

    /// Where the scope completed.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TraceUnavailable`] for BEGIN events, which are
    /// built before the scope completes.
    pub fn end_trace(&self) -> Result<&CallSite> {
        self.completion
            .as_ref()
            .ok_or_else(|| WatchError::trace_unavailable(self.transaction_id.to_string()))
    }
}

#[allow(clippy::cast_possible_truncation)] // clamped to u64::MAX
fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

#[allow(clippy::trivially_copy_pass_by_ref)] // signature fixed by serde
fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration_millis(*duration))
}

// ---------------------------------------------------------------------------
// TransactionListener: lifecycle callbacks
// ---------------------------------------------------------------------------

/// Error type a listener may return from its hooks.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a listener hook.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Receives transaction lifecycle events.
///
/// Hooks are called synchronously on the thread that crossed the boundary,
/// after the tracker's state transition is final. Errors and panics are
/// isolated by the [`ListenerRegistry`].
pub trait TransactionListener: Send + Sync {
    /// A new transaction or savepoint scope began.
    ///
    /// # Errors
    ///
    /// An error is reported by the registry and does not affect the
    /// transaction or the other listeners.
    fn on_begin(&self, _event: &TransactionEvent) -> ListenerResult {
        Ok(())
    }

    /// A scope committed.
    ///
    /// # Errors
    ///
    /// Reported and isolated, as for [`Self::on_begin`].
    fn on_commit(&self, _event: &TransactionEvent) -> ListenerResult {
        Ok(())
    }

    /// A scope rolled back.
    ///
    /// # Errors
    ///
    /// Reported and isolated, as for [`Self::on_begin`].
    fn on_rollback(&self, _event: &TransactionEvent) -> ListenerResult {
        Ok(())
    }

    /// Name used when reporting failures of this listener.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpListener;

impl TransactionListener for NoOpListener {}

// ---------------------------------------------------------------------------
// RingBuffer: bounded history storage
// ---------------------------------------------------------------------------

/// Fixed-capacity FIFO; when full, the oldest entry is evicted.
///
/// Thread-safe via an internal `Mutex`.
pub struct RingBuffer<T> {
    entries: Mutex<RingBuf<T>>,
}

struct RingBuf<T> {
    buf: Vec<T>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl<T: Clone> RingBuf<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        let idx = (self.head + self.len) % self.capacity;
        if self.buf.len() < self.capacity {
            self.buf.push(entry);
        } else {
            self.buf[idx] = entry;
        }
        if self.len == self.capacity {
            self.head = (self.head + 1) % self.capacity;
        } else {
            self.len += 1;
        }
    }

    fn ordered(&self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.len);
        for i in 0..self.len {
            let idx = (self.head + i) % self.capacity;
            result.push(self.buf[idx].clone());
        }
        result
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(RingBuf::new(capacity)),
        }
    }

    /// Push an entry, evicting the oldest one when full.
    pub fn push(&self, entry: T) {
        self.entries.lock().push(entry);
    }

    /// Return all entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().ordered()
    }

    /// Clear all stored entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().capacity
    }
}

// ---------------------------------------------------------------------------
// TransactionMetrics: aggregated statistics
// ---------------------------------------------------------------------------

/// Aggregated lifecycle counters.
///
/// All counters are atomic; recording never blocks.
pub struct TransactionMetrics {
    /// BEGIN events (transactions and savepoints).
    pub begins: AtomicU64,
    /// COMMIT events.
    pub commits: AtomicU64,
    /// ROLLBACK events.
    pub rollbacks: AtomicU64,
    /// Statements carried by completed scopes.
    pub statements: AtomicU64,
    /// Sum of completed-scope cost in milliseconds.
    pub completed_cost_ms: AtomicU64,
    /// Largest completed-scope cost in milliseconds.
    pub max_cost_ms: AtomicU64,
    created_at: Instant,
}

impl TransactionMetrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            begins: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            statements: AtomicU64::new(0),
            completed_cost_ms: AtomicU64::new(0),
            max_cost_ms: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Record an event, updating all relevant counters.
    pub fn record(&self, event: &TransactionEvent) {
        match event.kind() {
            EventKind::Begin => {
                self.begins.fetch_add(1, Ordering::Relaxed);
                return;
            }
            EventKind::Commit => {
                self.commits.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::Rollback => {
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
            }
        }
        let cost = event.elapsed_ms();
        self.statements
            .fetch_add(event.statements().len() as u64, Ordering::Relaxed);
        self.completed_cost_ms.fetch_add(cost, Ordering::Relaxed);
        self.max_cost_ms.fetch_max(cost, Ordering::Relaxed);
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.begins.store(0, Ordering::Relaxed);
        self.commits.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
        self.statements.store(0, Ordering::Relaxed);
        self.completed_cost_ms.store(0, Ordering::Relaxed);
        self.max_cost_ms.store(0, Ordering::Relaxed);
    }

    /// Completed scopes per second since creation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completions_per_second(&self) -> f64 {
        let elapsed_secs = self.created_at.elapsed().as_secs_f64();
        if elapsed_secs < f64::EPSILON {
            return 0.0;
        }
        let completed =
            self.commits.load(Ordering::Relaxed) + self.rollbacks.load(Ordering::Relaxed);
        completed as f64 / elapsed_secs
    }

    /// Snapshot all metrics as a serializable summary.
    #[must_use]
    pub fn snapshot(&self) -> TransactionMetricsSnapshot {
        TransactionMetricsSnapshot {
            begins: self.begins.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            statements: self.statements.load(Ordering::Relaxed),
            completed_cost_ms: self.completed_cost_ms.load(Ordering::Relaxed),
            max_cost_ms: self.max_cost_ms.load(Ordering::Relaxed),
            completions_per_second: self.completions_per_second(),
            elapsed_secs: self.created_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for TransactionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of transaction metrics.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionMetricsSnapshot {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub statements: u64,
    pub completed_cost_ms: u64,
    pub max_cost_ms: u64,
    pub completions_per_second: f64,
    pub elapsed_secs: f64,
}

// ---------------------------------------------------------------------------
// MetricsListener: listener that records to both metrics and ring buffer
// ---------------------------------------------------------------------------

/// Listener that aggregates [`TransactionMetrics`] and keeps the most recent
/// completed events in a [`RingBuffer`].
pub struct MetricsListener {
    metrics: TransactionMetrics,
    recent: RingBuffer<TransactionEvent>,
}

impl MetricsListener {
    /// Create a metrics listener keeping up to `log_capacity` completed events.
    #[must_use]
    pub fn new(log_capacity: usize) -> Self {
        Self {
            metrics: TransactionMetrics::new(),
            recent: RingBuffer::new(log_capacity),
        }
    }

    /// Access the aggregated metrics.
    #[must_use]
    pub const fn metrics(&self) -> &TransactionMetrics {
        &self.metrics
    }

    /// Most recent completed events, oldest first.
    #[must_use]
    pub const fn recent(&self) -> &RingBuffer<TransactionEvent> {
        &self.recent
    }

    /// Reset both metrics and the recent-event log.
    pub fn reset(&self) {
        self.metrics.reset();
        self.recent.clear();
    }
}

impl TransactionListener for MetricsListener {
    fn on_begin(&self, event: &TransactionEvent) -> ListenerResult {
        self.metrics.record(event);
        Ok(())
    }

    fn on_commit(&self, event: &TransactionEvent) -> ListenerResult {
        self.metrics.record(event);
        self.recent.push(event.clone());
        Ok(())
    }

    fn on_rollback(&self, event: &TransactionEvent) -> ListenerResult {
        self.metrics.record(event);
        self.recent.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use txwatch_types::TraceCapture;

    use super::*;

    pub(crate) fn make_event(
        kind: EventKind,
        statements: &[&str],
        elapsed_ms: u64,
    ) -> TransactionEvent {
        let completion = match kind {
            EventKind::Begin => None,
            EventKind::Commit | EventKind::Rollback => {
                Some(CallSite::capture(TraceCapture::Location))
            }
        };
        TransactionEvent::new(
            kind,
            ScopeId::random(),
            SavepointMarker::Root,
            statements.iter().map(|s| (*s).to_owned()).collect(),
            Duration::from_millis(elapsed_ms),
            SystemTime::now(),
            CallSite::capture(TraceCapture::Location),
            completion,
        )
    }

    #[test]
    fn noop_listener_accepts_everything() {
        let listener = NoOpListener;
        let begin = make_event(EventKind::Begin, &[], 0);
        let commit = make_event(EventKind::Commit, &["a"], 1);
        let rollback = make_event(EventKind::Rollback, &[], 1);
        assert!(listener.on_begin(&begin).is_ok());
        assert!(listener.on_commit(&commit).is_ok());
        assert!(listener.on_rollback(&rollback).is_ok());
        assert!(listener.name().ends_with("NoOpListener"));
    }

    #[test]
    fn begin_event_has_no_end_trace() {
        let event = make_event(EventKind::Begin, &[], 0);
        let err = event.end_trace().unwrap_err();
        assert!(err.is_misuse());
        let id = event.transaction_id().to_string();
        assert!(err.to_string().contains(&id));
    }

    #[test]
    fn completed_event_exposes_both_traces() {
        let event = make_event(EventKind::Commit, &["insert"], 3);
        assert!(event.end_trace().is_ok());
        assert!(event.start_trace().file().ends_with("lib.rs"));
        assert_eq!(event.elapsed_ms(), 3);
        assert!(!event.is_savepoint());
    }

    #[test]
    fn event_clone_is_independent_snapshot() {
        let event = make_event(EventKind::Commit, &["a", "b"], 1);
        let copy = event.clone();
        drop(event);
        assert_eq!(copy.statements(), ["a", "b"]);
    }

    #[test]
    fn event_serializes_elapsed_as_millis() {
        let event = make_event(EventKind::Rollback, &["delete"], 42);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"elapsed_ms\":42"));
        assert!(json.contains("\"kind\":\"rollback\""));
        assert!(json.contains("\"statements\":[\"delete\"]"));
    }

    #[test]
    fn hook_names() {
        assert_eq!(EventKind::Begin.hook(), "on_begin");
        assert_eq!(EventKind::Commit.hook(), "on_commit");
        assert_eq!(EventKind::Rollback.hook(), "on_rollback");
    }

    #[test]
    fn ring_buffer_basic_push_and_snapshot() {
        let rb = RingBuffer::new(3);
        assert!(rb.is_empty());

        rb.push(1);
        rb.push(2);
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.snapshot(), vec![1, 2]);
    }

    #[test]
    fn ring_buffer_wraps_on_overflow() {
        let rb = RingBuffer::new(2);
        rb.push(1);
        rb.push(2);
        rb.push(3); // evicts 1

        assert_eq!(rb.len(), 2);
        assert_eq!(rb.snapshot(), vec![2, 3]);
    }

    #[test]
    fn ring_buffer_zero_capacity() {
        let rb = RingBuffer::new(0);
        rb.push(1);
        assert!(rb.is_empty());
        assert!(rb.snapshot().is_empty());
    }

    #[test]
    fn ring_buffer_stress_many_pushes() {
        let cap = 10;
        let rb = RingBuffer::new(cap);
        for i in 1..=200_u32 {
            rb.push(i);
        }
        assert_eq!(rb.len(), cap);
        let snap = rb.snapshot();
        assert_eq!(snap.first(), Some(&191));
        assert_eq!(snap.last(), Some(&200));
    }

    #[test]
    fn ring_buffer_clear_after_wrap() {
        let rb = RingBuffer::new(2);
        rb.push(1);
        rb.push(2);
        rb.push(3);
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.capacity(), 2);

        rb.push(4);
        assert_eq!(rb.snapshot(), vec![4]);
    }

    #[test]
    fn metrics_count_each_kind() {
        let m = TransactionMetrics::new();
        m.record(&make_event(EventKind::Begin, &[], 0));
        m.record(&make_event(EventKind::Begin, &[], 0));
        m.record(&make_event(EventKind::Commit, &["a", "b"], 5));
        m.record(&make_event(EventKind::Rollback, &["c"], 9));

        assert_eq!(m.begins.load(Ordering::Relaxed), 2);
        assert_eq!(m.commits.load(Ordering::Relaxed), 1);
        assert_eq!(m.rollbacks.load(Ordering::Relaxed), 1);
        assert_eq!(m.statements.load(Ordering::Relaxed), 3);
        assert_eq!(m.completed_cost_ms.load(Ordering::Relaxed), 14);
        assert_eq!(m.max_cost_ms.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn metrics_begin_does_not_count_statements() {
        let m = TransactionMetrics::new();
        m.record(&make_event(EventKind::Begin, &["early"], 100));
        assert_eq!(m.statements.load(Ordering::Relaxed), 0);
        assert_eq!(m.max_cost_ms.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn metrics_reset() {
        let m = TransactionMetrics::new();
        m.record(&make_event(EventKind::Commit, &["a"], 1));
        m.reset();
        let snap = m.snapshot();
        assert_eq!(snap.commits, 0);
        assert_eq!(snap.statements, 0);
        assert_eq!(snap.max_cost_ms, 0);
    }

    #[test]
    fn metrics_snapshot_serializable() {
        let m = TransactionMetrics::new();
        m.record(&make_event(EventKind::Commit, &["a"], 1));
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        assert!(json.contains("\"commits\":1"));
    }

    #[test]
    fn metrics_listener_keeps_completed_events_only() {
        let listener = MetricsListener::new(2);
        let events = [
            make_event(EventKind::Begin, &[], 0),
            make_event(EventKind::Commit, &["a"], 1),
            make_event(EventKind::Rollback, &["b"], 1),
            make_event(EventKind::Commit, &["c"], 1),
        ];
        listener.on_begin(&events[0]).unwrap();
        listener.on_commit(&events[1]).unwrap();
        listener.on_rollback(&events[2]).unwrap();
        listener.on_commit(&events[3]).unwrap();

        let recent = listener.recent().snapshot();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind(), EventKind::Rollback);
        assert_eq!(recent[1].statements(), ["c"]);
        assert_eq!(listener.metrics().begins.load(Ordering::Relaxed), 1);

        listener.reset();
        assert!(listener.recent().is_empty());
    }
}
