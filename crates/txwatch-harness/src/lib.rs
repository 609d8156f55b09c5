//! Test tooling for txwatch.
//!
//! A scripted in-memory resource with deterministic fault injection, listeners
//! that record what fan-out delivered, and a tracing initializer for tests.

pub mod listeners;
pub mod scripted;

pub use listeners::{CountingListener, FailingListener, PanickingListener, RecordingListener};
pub use scripted::{
    FaultSpec, Op, ScriptedError, ScriptedFactory, ScriptedPrepared, ScriptedResource,
    ScriptedSavepoint,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_TEST_FILTER: &str = "txwatch=debug,txwatch_core=debug,txwatch_observability=debug";

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to debug for the txwatch crates. Later calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
    // Another test may have installed a subscriber already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
