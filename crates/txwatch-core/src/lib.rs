//! Transaction tracking core.
//!
//! [`TransactionTracker`] is the per-connection state machine: a stack of
//! [`TransactionScope`]s resolved against savepoint markers, with exactly-once
//! completion and bounded history. [`MonitoredConnection`] wraps a
//! [`TransactionalResource`] and drives the tracker around every boundary;
//! [`MonitoredSource`] hands out connections that share listeners and a
//! [`ResourceRegistry`].

pub mod config;
pub mod monitor;
pub mod registry;
pub mod resource;
pub mod scope;
pub mod source;
pub mod tracker;

pub use config::{DEFAULT_HISTORY_CAPACITY, MonitorConfig};
pub use monitor::{MonitoredConnection, MonitoredPrepared, MonitoredSavepoint, MonitoredStatement};
pub use registry::{InFlightScope, ResourceRegistry};
pub use resource::{ResourceFactory, TransactionalResource};
pub use scope::TransactionScope;
pub use source::{MonitoredSource, OpenError};
pub use tracker::TransactionTracker;
