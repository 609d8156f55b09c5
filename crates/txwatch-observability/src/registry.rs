//! Listener registry and isolated fan-out.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use txwatch_error::WatchError;

use crate::{EventKind, ListenerResult, TransactionEvent, TransactionListener};

/// Callback invoked with every isolated listener failure.
pub type FailureHook = Arc<dyn Fn(&WatchError) + Send + Sync>;

type ListenerList = Arc<[Arc<dyn TransactionListener>]>;

/// Append-only, thread-safe collection of listeners.
///
/// Registration replaces the list wholesale, so a publish that is already
/// iterating keeps its snapshot and a listener registered mid-publish is only
/// seen by later events.
pub struct ListenerRegistry {
    listeners: RwLock<ListenerList>,
    failure_hook: RwLock<Option<FailureHook>>,
    failures: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::from(Vec::new())),
            failure_hook: RwLock::new(None),
            failures: AtomicU64::new(0),
        }
    }

    /// Append a listener. It receives events in registration order.
    pub fn register(&self, listener: Arc<dyn TransactionListener>) {
        let mut guard = self.listeners.write();
        let mut next: Vec<Arc<dyn TransactionListener>> = guard.iter().cloned().collect();
        tracing::debug!(
            listener = listener.name(),
            position = next.len(),
            "listener registered"
        );
        next.push(listener);
        *guard = next.into();
    }

    /// Append several listeners in iteration order, as one swap.
    pub fn extend<I>(&self, listeners: I)
    where
        I: IntoIterator<Item = Arc<dyn TransactionListener>>,
    {
        let mut guard = self.listeners.write();
        let mut next: Vec<Arc<dyn TransactionListener>> = guard.iter().cloned().collect();
        next.extend(listeners);
        tracing::debug!(total = next.len(), "listeners registered");
        *guard = next.into();
    }

    /// Current listener list.
    #[must_use]
    pub fn snapshot(&self) -> ListenerList {
        Arc::clone(&self.listeners.read())
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install a hook that receives every listener failure.
    pub fn set_failure_hook(&self, hook: FailureHook) {
        *self.failure_hook.write() = Some(hook);
    }

    /// Total listener failures (errors and panics) since creation.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every listener, in registration order.
    ///
    /// A listener that returns an error or panics is reported and skipped; the
    /// remaining listeners are still called. Returns how many listeners
    /// accepted the event.
    pub fn publish(&self, event: &TransactionEvent) -> usize {
        let listeners = self.snapshot();
        let mut delivered = 0;
        for listener in listeners.iter() {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| dispatch(listener.as_ref(), event)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => self.report(&WatchError::listener_failed(
                    listener.name(),
                    event.kind().hook(),
                    err.to_string(),
                )),
                Err(payload) => self.report(&WatchError::listener_panicked(
                    listener.name(),
                    event.kind().hook(),
                    panic_message(payload.as_ref()),
                )),
            }
        }
        delivered
    }

    fn report(&self, err: &WatchError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(error = %err, "transaction listener failed");
        let hook = self.failure_hook.read().clone();
        if let Some(hook) = hook {
            // A panicking hook must not take the publish loop down with it.
            if panic::catch_unwind(AssertUnwindSafe(|| hook(err))).is_err() {
                tracing::warn!("listener failure hook panicked");
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|l| l.name().to_owned())
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &names)
            .field("failures", &self.failure_count())
            .finish_non_exhaustive()
    }
}

fn dispatch(listener: &dyn TransactionListener, event: &TransactionEvent) -> ListenerResult {
    match event.kind() {
        EventKind::Begin => listener.on_begin(event),
        EventKind::Commit => listener.on_commit(event),
        EventKind::Rollback => listener.on_rollback(event),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
