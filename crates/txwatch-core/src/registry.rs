//! Live-connection bookkeeping for a monitored source.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use txwatch_types::{ConnectionId, SavepointMarker, ScopeId};

use crate::tracker::TransactionTracker;

/// Diagnostic view of one active scope on a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightScope {
    pub connection: ConnectionId,
    pub transaction_id: ScopeId,
    pub marker: SavepointMarker,
    pub statements: usize,
    pub cost_ms: u64,
}

/// Tracks the monitored connections opened from one source until they close.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<ConnectionId, Arc<TransactionTracker>>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live connection and hand out its id.
    pub fn register(&self, tracker: Arc<TransactionTracker>) -> ConnectionId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = ConnectionId::from_nonzero(NonZeroU64::MIN.saturating_add(n));
        let live = {
            let mut map = self.live.lock();
            map.insert(id, tracker);
            map.len()
        };
        tracing::debug!(conn = %id, live, "connection registered");
        id
    }

    /// Forget a connection. Returns `false` if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let (removed, live) = {
            let mut map = self.live.lock();
            let removed = map.remove(&id).is_some();
            (removed, map.len())
        };
        if removed {
            tracing::debug!(conn = %id, live, "connection deregistered");
        } else {
            tracing::warn!(conn = %id, "deregister of unknown connection");
        }
        removed
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Ids of live connections, ascending.
    pub fn live_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.live.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.live.lock().contains_key(&id)
    }

    /// Every active scope across live connections, ordered by connection and
    /// then top of stack first.
    pub fn in_flight(&self) -> Vec<InFlightScope> {
        let mut trackers: Vec<(ConnectionId, Arc<TransactionTracker>)> = self
            .live
            .lock()
            .iter()
            .map(|(id, t)| (*id, Arc::clone(t)))
            .collect();
        trackers.sort_unstable_by_key(|(id, _)| *id);

        // Tracker stacks are read outside the registry lock.
        trackers
            .into_iter()
            .flat_map(|(connection, tracker)| {
                tracker
                    .active_scopes()
                    .into_iter()
                    .map(move |scope| InFlightScope {
                        connection,
                        transaction_id: scope.id(),
                        marker: scope.marker(),
                        statements: scope.statement_count(),
                        cost_ms: scope.cost_ms(),
                    })
            })
            .collect()
    }
}
