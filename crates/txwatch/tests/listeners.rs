//! Integration tests for listener fan-out through monitored connections.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use txwatch::{
    EventKind, LogListener, MetricsListener, MonitoredSource, TransactionListener, WatchError,
};
use txwatch_harness::{
    CountingListener, FailingListener, PanickingListener, RecordingListener, ScriptedFactory,
};

/// Thread-safe sink for failure-hook reports.
#[derive(Default)]
struct Collected(Mutex<Vec<WatchError>>);

impl Collected {
    fn push(&self, err: &WatchError) {
        self.0.lock().expect("collector lock").push(err.clone());
    }

    fn take(&self) -> Vec<WatchError> {
        std::mem::take(&mut *self.0.lock().expect("collector lock"))
    }
}

fn source_with(listeners: Vec<Arc<dyn TransactionListener>>) -> MonitoredSource<ScriptedFactory> {
    txwatch_harness::init_test_tracing();
    MonitoredSource::new(ScriptedFactory::new())
        .with_listeners(listeners)
}

// ===========================================================================
// 1. ISOLATION
// ===========================================================================

#[test]
fn failing_listener_does_not_stop_siblings_or_commit() {
    let before = Arc::new(CountingListener::new());
    let after = Arc::new(RecordingListener::new());
    let source = source_with(vec![
        Arc::clone(&before) as Arc<dyn TransactionListener>,
        Arc::new(FailingListener::new("sink unavailable")),
        Arc::clone(&after) as Arc<dyn TransactionListener>,
    ]);
    let conn = source.connect().expect("open");

    conn.execute("x").expect("execute");
    conn.commit().expect("commit still succeeds");

    assert_eq!(before.begins(), 1);
    assert_eq!(before.commits(), 1);
    assert_eq!(after.kinds(), [EventKind::Begin, EventKind::Commit]);
    assert_eq!(source.listeners().failure_count(), 2);
    assert_eq!(conn.tracker().depth(), 0);
}

#[test]
fn panicking_listener_does_not_corrupt_tracker() {
    let after = Arc::new(RecordingListener::new());
    let source = source_with(vec![
        Arc::new(PanickingListener) as Arc<dyn TransactionListener>,
        Arc::clone(&after) as Arc<dyn TransactionListener>,
    ]);
    let conn = source.connect().expect("open");

    conn.execute("a").expect("execute");
    let sp = conn.savepoint().expect("savepoint");
    conn.execute("b").expect("execute");
    conn.rollback_to(&sp).expect("rollback to");
    conn.commit().expect("commit");

    let expected = [
        EventKind::Begin,
        EventKind::Begin,
        EventKind::Rollback,
        EventKind::Commit,
    ];
    assert_eq!(after.kinds(), expected);
    assert_eq!(conn.tracker().depth(), 0);
    assert_eq!(conn.history().len(), 2);
    assert_eq!(source.listeners().failure_count(), 4);
}

#[test]
fn failure_hook_sees_each_isolated_failure() {
    let collected = Arc::new(Collected::default());
    let source = source_with(vec![
        Arc::new(FailingListener::new("nope")) as Arc<dyn TransactionListener>,
        Arc::new(PanickingListener),
    ]);
    let sink = Arc::clone(&collected);
    source
        .listeners()
        .set_failure_hook(Arc::new(move |err: &WatchError| sink.push(err)));
    let conn = source.connect().expect("open");

    conn.execute("x").expect("execute");

    let failures = collected.take();
    let failed = WatchError::listener_failed("failing", "on_begin", "nope");
    let panicked =
        WatchError::listener_panicked("panicking", "on_begin", "panicking listener: begin");
    assert_eq!(failures, [failed, panicked]);
    assert!(failures.iter().all(|f| !f.suggestion().is_empty()));
}

// ===========================================================================
// 2. REGISTRATION
// ===========================================================================

#[test]
fn listener_added_later_sees_only_later_events() {
    let source = source_with(Vec::new());
    let conn = source.connect().expect("open");
    conn.execute("before").expect("execute");

    let late = Arc::new(RecordingListener::new());
    source.add_listener(Arc::clone(&late) as Arc<dyn TransactionListener>);
    conn.commit().expect("commit");

    assert_eq!(late.kinds(), [EventKind::Commit]);
    assert_eq!(late.events()[0].statements(), ["before"]);
}

#[test]
fn listeners_are_shared_by_every_connection() {
    let counter = Arc::new(CountingListener::new());
    let source = source_with(vec![Arc::clone(&counter) as Arc<dyn TransactionListener>]);
    let a = source.connect().expect("open a");
    let b = source.connect().expect("open b");

    a.execute("a").expect("execute");
    b.execute("b").expect("execute");
    a.commit().expect("commit");
    b.rollback().expect("rollback");

    assert_eq!(counter.begins(), 2);
    assert_eq!(counter.commits(), 1);
    assert_eq!(counter.rollbacks(), 1);
}

// ===========================================================================
// 3. BUILT-IN LISTENERS
// ===========================================================================

#[test]
fn metrics_listener_aggregates_across_transactions() {
    let metrics = Arc::new(MetricsListener::new(4));
    let source = source_with(vec![Arc::clone(&metrics) as Arc<dyn TransactionListener>]);
    let conn = source.connect().expect("open");

    conn.execute("a").expect("execute");
    conn.execute("b").expect("execute");
    conn.commit().expect("commit");
    conn.execute("c").expect("execute");
    conn.rollback().expect("rollback");

    let snapshot = metrics.metrics().snapshot();
    assert_eq!(snapshot.begins, 2);
    assert_eq!(snapshot.commits, 1);
    assert_eq!(snapshot.rollbacks, 1);
    assert_eq!(snapshot.statements, 3);

    let recent = metrics.recent().snapshot();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].statements(), ["a", "b"]);

    let json = serde_json::to_value(&snapshot).expect("serialize snapshot");
    assert_eq!(json["commits"], 1);
}

#[test]
fn log_listener_accepts_every_event() {
    let log = Arc::new(
        LogListener::new()
            .with_slow_threshold(Duration::from_secs(60))
            .with_statements(true),
    );
    let source = source_with(vec![Arc::clone(&log) as Arc<dyn TransactionListener>]);
    let conn = source.connect().expect("open");

    conn.execute("a").expect("execute");
    conn.commit().expect("commit");

    assert_eq!(source.listeners().failure_count(), 0);
}

#[test]
fn events_serialize_for_export() {
    let recorder = Arc::new(RecordingListener::new());
    let source = source_with(vec![Arc::clone(&recorder) as Arc<dyn TransactionListener>]);
    let conn = source.connect().expect("open");
    conn.execute("INSERT 1").expect("execute");
    conn.commit().expect("commit");

    let commit = recorder.last().expect("commit event");
    let json = serde_json::to_value(&commit).expect("serialize event");
    assert_eq!(json["kind"], "commit");
    assert_eq!(json["statements"][0], "INSERT 1");
    assert_eq!(json["transaction_id"], commit.transaction_id().to_string());
    assert!(json["completion"].is_object());
}
