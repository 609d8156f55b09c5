//! Per-connection transaction tracker.
//!
//! Owns the stack of active [`TransactionScope`]s (top = last element) and a
//! bounded history of completed ones. Every stack mutation happens under one
//! mutex; listener fan-out always happens after the lock is released.
//!
//! Resolution against a savepoint marker is permissive: completing with an
//! empty stack is a no-op, and a marker that is not on the stack subsumes the
//! whole stack. The tracker never returns an error to its callers.

use std::sync::Arc;

use parking_lot::Mutex;
use txwatch_observability::{EventKind, ListenerRegistry, RingBuffer};
use txwatch_types::{CallSite, Outcome, SavepointMarker, TraceCapture};

use crate::config::MonitorConfig;
use crate::scope::TransactionScope;

type ScopeRef = Arc<TransactionScope>;

/// Scope stack, history ring, and event publication for one connection.
pub struct TransactionTracker {
    stack: Mutex<Vec<ScopeRef>>,
    history: RingBuffer<ScopeRef>,
    listeners: Arc<ListenerRegistry>,
    trace_capture: TraceCapture,
}

impl TransactionTracker {
    #[must_use]
    pub fn new(listeners: Arc<ListenerRegistry>, config: &MonitorConfig) -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            history: RingBuffer::new(config.history_capacity),
            listeners,
            trace_capture: config.trace_capture,
        }
    }

    /// Top of the stack, creating and announcing an implicit root scope when
    /// no transaction is in progress.
    #[track_caller]
    pub fn current_scope(&self) -> ScopeRef {
        let mut stack = self.stack.lock();
        if let Some(top) = stack.last() {
            return Arc::clone(top);
        }
        let origin = CallSite::capture(self.trace_capture);
        let scope = Arc::new(TransactionScope::begin(SavepointMarker::Root, origin));
        stack.push(Arc::clone(&scope));
        drop(stack);

        // Only the call that pushed the scope announces it.
        tracing::debug!(
            txn = %scope.id(),
            marker = %scope.marker(),
            depth = 1_usize,
            "implicit transaction begun"
        );
        self.listeners.publish(&scope.event(EventKind::Begin));
        scope
    }

    /// Push a new scope for an explicitly created savepoint.
    #[track_caller]
    pub fn begin_explicit(&self, marker: SavepointMarker) -> ScopeRef {
        let origin = CallSite::capture(self.trace_capture);
        let scope = Arc::new(TransactionScope::begin(marker, origin));
        let depth = {
            let mut stack = self.stack.lock();
            stack.push(Arc::clone(&scope));
            stack.len()
        };
        tracing::debug!(txn = %scope.id(), marker = %marker, depth, "savepoint scope begun");
        self.listeners.publish(&scope.event(EventKind::Begin));
        scope
    }

    /// Complete the scope identified by `marker`.
    ///
    /// Scopes above it are subsumed: removed from the stack, with their
    /// statements placed (oldest subsumed first) ahead of the completing
    /// scope's own. [`SavepointMarker::Root`] targets the bottom of the stack,
    /// so the whole stack completes. A marker not on the stack does the same,
    /// with a warning.
    ///
    /// Returns the completed scope, or `None` when the stack was empty or the
    /// scope had already completed. Events are not published here; see
    /// [`Self::publish_commit`] and [`Self::publish_rollback`].
    #[track_caller]
    pub fn complete(&self, marker: SavepointMarker, outcome: Outcome) -> Option<ScopeRef> {
        let site = CallSite::capture(self.trace_capture);
        let (scope, subsumed) = {
            let mut stack = self.stack.lock();
            let idx = self.resolve(&stack, marker)?;
            let subsumed: Vec<ScopeRef> = stack.drain(idx + 1..).collect();
            let scope = stack.pop()?;
            let prefix: Vec<String> = subsumed.iter().flat_map(|s| s.statements()).collect();
            if !scope.complete(outcome, prefix, site) {
                tracing::debug!(txn = %scope.id(), "scope already complete");
                return None;
            }
            self.history.push(Arc::clone(&scope));
            drop(stack);
            (scope, subsumed.len())
        };
        tracing::debug!(
            txn = %scope.id(),
            marker = %marker,
            outcome = %outcome,
            subsumed,
            statements = scope.statement_count(),
            cost_ms = scope.cost_ms(),
            "transaction scope completed"
        );
        Some(scope)
    }

    /// Remove every scope above the one identified by `marker`, leaving that
    /// scope running. Statements of the removed scopes are discarded and no
    /// event is published.
    pub fn release(&self, marker: SavepointMarker) {
        let discarded: Vec<ScopeRef> = {
            let mut stack = self.stack.lock();
            let idx = stack.iter().rposition(|s| s.marker() == marker);
            if idx.is_none() && !stack.is_empty() {
                tracing::warn!(
                    marker = %marker,
                    depth = stack.len(),
                    "released savepoint not on stack; clearing stack"
                );
            }
            let from = idx.map_or(0, |i| i + 1);
            stack.drain(from..).collect()
        };
        let dropped: usize = discarded.iter().map(|s| s.statement_count()).sum();
        tracing::debug!(
            marker = %marker,
            scopes = discarded.len(),
            statements = dropped,
            "savepoint released"
        );
    }

    /// Discard every active scope without completing it or publishing an
    /// event. Returns how many scopes were dropped.
    pub fn clear(&self) -> usize {
        let discarded: Vec<ScopeRef> = self.stack.lock().drain(..).collect();
        if !discarded.is_empty() {
            let dropped: usize = discarded.iter().map(|s| s.statement_count()).sum();
            tracing::debug!(
                scopes = discarded.len(),
                statements = dropped,
                "active scopes discarded"
            );
        }
        discarded.len()
    }

    /// Record `statement` in the current scope, creating one if necessary.
    #[track_caller]
    pub fn attach(&self, statement: impl Into<String>) -> ScopeRef {
        let statement = statement.into();
        loop {
            let scope = self.current_scope();
            if scope.record(statement.as_str()) {
                tracing::trace!(txn = %scope.id(), sql = %statement, "statement attached");
                return scope;
            }
            // Completed between lookup and append; the stack has moved on.
        }
    }

    /// Remove all occurrences of `statements` from the top scope. Does nothing
    /// when no transaction is in progress.
    pub fn detach_batch(&self, statements: &[String]) -> usize {
        let top = self.stack.lock().last().cloned();
        let Some(scope) = top else {
            return 0;
        };
        let removed = scope.remove_all(statements);
        tracing::trace!(txn = %scope.id(), removed, "batch statements detached");
        removed
    }

    /// Publish COMMIT for a scope returned by [`Self::complete`].
    pub fn publish_commit(&self, scope: &TransactionScope) -> usize {
        self.listeners.publish(&scope.event(EventKind::Commit))
    }

    /// Publish ROLLBACK for a scope returned by [`Self::complete`].
    pub fn publish_rollback(&self, scope: &TransactionScope) -> usize {
        self.listeners.publish(&scope.event(EventKind::Rollback))
    }

    /// Number of active scopes.
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Active scopes, top first.
    pub fn active_scopes(&self) -> Vec<ScopeRef> {
        self.stack.lock().iter().rev().cloned().collect()
    }

    /// Completed scopes, oldest first.
    pub fn history(&self) -> Vec<ScopeRef> {
        self.history.snapshot()
    }

    pub const fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    fn resolve(&self, stack: &[ScopeRef], marker: SavepointMarker) -> Option<usize> {
        if stack.is_empty() {
            return None;
        }
        if marker.is_root() {
            return Some(0);
        }
        let found = stack.iter().rposition(|s| s.marker() == marker);
        if found.is_none() {
            tracing::warn!(
                marker = %marker,
                depth = stack.len(),
                capture = ?self.trace_capture,
                "savepoint not on stack; completing entire stack"
            );
        }
        Some(found.unwrap_or(0))
    }
}

impl std::fmt::Debug for TransactionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTracker")
            .field("depth", &self.depth())
            .field("history", &self.history.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
