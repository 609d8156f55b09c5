//! Transaction scope: one tracked transaction or savepoint span.
//!
//! A scope owns its statement list and timing. The list is internally
//! synchronized so statements can be appended without the tracker's stack
//! lock. Completion happens exactly once; afterwards the list and the end
//! instant are frozen.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use txwatch_error::{Result, WatchError};
use txwatch_observability::{EventKind, TransactionEvent};
use txwatch_types::{CallSite, Outcome, SavepointMarker, ScopeId, ScopeState};

#[derive(Debug)]
struct Completion {
    outcome: Outcome,
    ended: Instant,
    site: CallSite,
}

/// A tracked transaction or savepoint scope.
#[derive(Debug)]
pub struct TransactionScope {
    id: ScopeId,
    marker: SavepointMarker,
    started_at: SystemTime,
    begun: Instant,
    origin: CallSite,
    statements: RwLock<Vec<String>>,
    completion: OnceLock<Completion>,
}

impl TransactionScope {
    pub(crate) fn begin(marker: SavepointMarker, origin: CallSite) -> Self {
        Self {
            id: ScopeId::random(),
            marker,
            started_at: SystemTime::now(),
            begun: Instant::now(),
            origin,
            statements: RwLock::new(Vec::new()),
            completion: OnceLock::new(),
        }
    }

    pub const fn id(&self) -> ScopeId {
        self.id
    }

    pub const fn marker(&self) -> SavepointMarker {
        self.marker
    }

    /// Wall-clock time the scope began.
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Where the scope began.
    pub const fn origin(&self) -> &CallSite {
        &self.origin
    }

    pub fn state(&self) -> ScopeState {
        self.completion
            .get()
            .map_or(ScopeState::Running, |c| c.outcome.into())
    }

    pub fn is_complete(&self) -> bool {
        self.completion.get().is_some()
    }

    /// How the scope ended, if it has.
    pub fn outcome(&self) -> Option<Outcome> {
        self.completion.get().map(|c| c.outcome)
    }

    /// Where the scope completed.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TraceUnavailable`] while the scope is running.
    pub fn completion_site(&self) -> Result<&CallSite> {
        self.completion
            .get()
            .map(|c| &c.site)
            .ok_or_else(|| WatchError::trace_unavailable(self.id.to_string()))
    }

    /// Append a statement. Returns `false`, recording nothing, once the scope
    /// has completed.
    pub fn record(&self, statement: impl Into<String>) -> bool {
        let mut statements = self.statements.write();
        if self.is_complete() {
            return false;
        }
        statements.push(statement.into());
        drop(statements);
        true
    }

    /// Remove every occurrence of each text in `texts`. Returns how many
    /// entries were removed; a completed scope is left untouched.
    pub fn remove_all(&self, texts: &[String]) -> usize {
        let mut statements = self.statements.write();
        if self.is_complete() || texts.is_empty() {
            return 0;
        }
        let before = statements.len();
        statements.retain(|s| !texts.contains(s));
        before - statements.len()
    }

    /// Snapshot of the recorded statements, oldest first.
    pub fn statements(&self) -> Vec<String> {
        self.statements.read().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.read().len()
    }

    /// Time spent in the scope: frozen at completion, live while running.
    pub fn cost(&self) -> Duration {
        match self.completion.get() {
            Some(c) => c.ended.saturating_duration_since(self.begun),
            None => self.begun.elapsed(),
        }
    }

    /// [`Self::cost`] in whole milliseconds.
    #[allow(clippy::cast_possible_truncation)] // clamped to u64::MAX
    pub fn cost_ms(&self) -> u64 {
        self.cost().as_millis().min(u128::from(u64::MAX)) as u64
    }

    /// Finish the scope. `merged_prefix` (statements folded in from subsumed
    /// scopes, oldest first) is placed ahead of the scope's own statements.
    ///
    /// Returns `false` without touching anything if the scope already
    /// completed.
    pub(crate) fn complete(
        &self,
        outcome: Outcome,
        merged_prefix: Vec<String>,
        site: CallSite,
    ) -> bool {
        let mut statements = self.statements.write();
        if self.is_complete() {
            return false;
        }
        if !merged_prefix.is_empty() {
            let own = std::mem::replace(&mut *statements, merged_prefix);
            statements.extend(own);
        }
        let completion = Completion {
            outcome,
            ended: Instant::now(),
            site,
        };
        // Set while holding the write lock: no append can land after this.
        let done = self.completion.set(completion).is_ok();
        drop(statements);
        done
    }

    /// Build a listener snapshot of the scope.
    pub fn event(&self, kind: EventKind) -> TransactionEvent {
        TransactionEvent::new(
            kind,
            self.id,
            self.marker,
            self.statements(),
            self.cost(),
            self.started_at,
            self.origin.clone(),
            self.completion.get().map(|c| c.site.clone()),
        )
    }
}
