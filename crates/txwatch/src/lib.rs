//! Public API facade for txwatch.
//!
//! Wrap a database connection with [`MonitoredSource`] / [`MonitoredConnection`]
//! and register [`TransactionListener`]s to receive BEGIN, COMMIT and ROLLBACK
//! events carrying each transaction's statements, cost, and call sites.
//!
//! ```ignore
//! use std::sync::Arc;
//! use txwatch::prelude::*;
//!
//! let source = MonitoredSource::new(factory)
//!     .with_listeners([Arc::new(LogListener::new()) as Arc<dyn TransactionListener>]);
//! let conn = source.connect()?;
//! conn.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1")?;
//! conn.commit()?;
//! ```

pub use txwatch_core::{
    DEFAULT_HISTORY_CAPACITY, InFlightScope, MonitorConfig, MonitoredConnection, MonitoredPrepared,
    MonitoredSavepoint, MonitoredSource, MonitoredStatement, OpenError, ResourceFactory,
    ResourceRegistry, TransactionScope, TransactionTracker, TransactionalResource,
};
pub use txwatch_error::{ErrorClass, Result, WatchError};
pub use txwatch_observability::{
    EventKind, FailureHook, ListenerError, ListenerRegistry, ListenerResult, LogListener,
    MetricsListener, NoOpListener, RingBuffer, TransactionEvent, TransactionListener,
    TransactionMetrics, TransactionMetricsSnapshot,
};
pub use txwatch_types::{
    CallSite, ConnectionId, Outcome, SavepointMarker, ScopeId, ScopeState, TraceCapture,
};

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        EventKind, ListenerResult, LogListener, MetricsListener, MonitorConfig, MonitoredConnection,
        MonitoredSource, ResourceFactory, TransactionEvent, TransactionListener,
        TransactionalResource,
    };
}
