//! Monitored connection: wraps a [`TransactionalResource`] and drives the
//! tracker around each transaction boundary.
//!
//! Boundary operations delegate to the resource first and only transition the
//! tracker once the delegate succeeded. Resource errors come back unchanged.
//! Anything that does not touch transactions goes straight to the resource
//! through [`MonitoredConnection::resource`].

use std::sync::Arc;

use txwatch_types::{ConnectionId, Outcome, SavepointMarker};

use crate::registry::ResourceRegistry;
use crate::resource::TransactionalResource;
use crate::scope::TransactionScope;
use crate::tracker::TransactionTracker;

/// A resource wrapped with transaction tracking.
///
/// Closing consumes the connection. Dropping it without [`Self::close`]
/// still removes it from its source's registry, without closing the resource
/// through the monitor. Either way the tracker's active scopes are discarded,
/// so a handle obtained from [`Self::tracker`] outlives the connection only as
/// an empty stack plus its history.
pub struct MonitoredConnection<R> {
    resource: R,
    tracker: Arc<TransactionTracker>,
    id: ConnectionId,
    registry: Option<Arc<ResourceRegistry>>,
}

impl<R: TransactionalResource> MonitoredConnection<R> {
    pub(crate) fn new(
        resource: R,
        tracker: Arc<TransactionTracker>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        let id = registry.register(Arc::clone(&tracker));
        Self {
            resource,
            tracker,
            id,
            registry: Some(registry),
        }
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// The wrapped resource, for operations that are not monitored.
    pub const fn resource(&self) -> &R {
        &self.resource
    }

    pub const fn tracker(&self) -> &Arc<TransactionTracker> {
        &self.tracker
    }

    /// Active scopes, top first.
    pub fn in_flight(&self) -> Vec<Arc<TransactionScope>> {
        self.tracker.active_scopes()
    }

    /// Recently completed scopes, oldest first.
    pub fn history(&self) -> Vec<Arc<TransactionScope>> {
        self.tracker.history()
    }

    /// Create an ad-hoc statement handle.
    pub const fn statement(&self) -> MonitoredStatement<'_, R> {
        MonitoredStatement {
            conn: self,
            batch: Vec::new(),
        }
    }

    /// Execute `sql` directly; shorthand for `statement().execute(sql)`.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged.
    #[track_caller]
    pub fn execute(&self, sql: &str) -> Result<R::Output, R::Error> {
        self.tracker.attach(sql);
        self.resource.execute(sql)
    }

    /// Prepare `sql`. The text is recorded in the current scope once the
    /// resource accepted it.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; nothing is recorded.
    #[track_caller]
    pub fn prepare(&self, sql: &str) -> Result<MonitoredPrepared<'_, R>, R::Error> {
        let inner = self.resource.prepare(sql)?;
        let scope = self.tracker.attach(sql);
        Ok(MonitoredPrepared {
            conn: self,
            inner,
            sql: sql.to_owned(),
            scope,
        })
    }

    /// Commit the transaction and publish COMMIT for the completed scope.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; the tracker is left as it was.
    #[track_caller]
    pub fn commit(&self) -> Result<(), R::Error> {
        self.resource.commit()?;
        self.finish(SavepointMarker::Root, Outcome::Commit);
        Ok(())
    }

    /// Roll back the transaction and publish ROLLBACK for the completed scope.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; the tracker is left as it was.
    #[track_caller]
    pub fn rollback(&self) -> Result<(), R::Error> {
        self.resource.rollback()?;
        self.finish(SavepointMarker::Root, Outcome::Rollback);
        Ok(())
    }

    /// Create an unnamed savepoint and open a scope for it.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; no scope is opened.
    #[track_caller]
    pub fn savepoint(&self) -> Result<MonitoredSavepoint<R::Savepoint>, R::Error> {
        let inner = self.resource.savepoint(None)?;
        let marker = SavepointMarker::fresh();
        self.tracker.begin_explicit(marker);
        Ok(MonitoredSavepoint {
            inner,
            marker,
            name: None,
        })
    }

    /// Create a named savepoint and open a scope for it.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; no scope is opened.
    #[track_caller]
    pub fn savepoint_named(
        &self,
        name: &str,
    ) -> Result<MonitoredSavepoint<R::Savepoint>, R::Error> {
        let inner = self.resource.savepoint(Some(name))?;
        let marker = SavepointMarker::fresh();
        self.tracker.begin_explicit(marker);
        Ok(MonitoredSavepoint {
            inner,
            marker,
            name: Some(name.to_owned()),
        })
    }

    /// Roll back to `savepoint`, completing its scope (and everything opened
    /// after it) as ROLLBACK.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; the tracker is left as it was.
    #[track_caller]
    pub fn rollback_to(
        &self,
        savepoint: &MonitoredSavepoint<R::Savepoint>,
    ) -> Result<(), R::Error> {
        self.resource.rollback_to(&savepoint.inner)?;
        self.finish(savepoint.marker, Outcome::Rollback);
        Ok(())
    }

    /// Release `savepoint`. Scopes opened after it are dropped; no event is
    /// published.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged; the tracker is left as it was.
    pub fn release_savepoint(
        &self,
        savepoint: &MonitoredSavepoint<R::Savepoint>,
    ) -> Result<(), R::Error> {
        self.resource.release_savepoint(&savepoint.inner)?;
        self.tracker.release(savepoint.marker);
        Ok(())
    }

    /// Close the resource, discard any open scopes, and remove the connection
    /// from its registry. Open scopes are neither committed nor announced.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged. The connection is consumed either way
    /// and leaves the registry when dropped.
    pub fn close(mut self) -> Result<(), R::Error> {
        self.resource.close()?;
        let open = self.tracker.depth();
        if open > 0 {
            tracing::warn!(conn = %self.id, open, "connection closed with open transaction scopes");
        }
        self.deregister();
        Ok(())
    }
}

impl<R> MonitoredConnection<R> {
    #[track_caller]
    fn finish(&self, marker: SavepointMarker, outcome: Outcome) {
        let Some(scope) = self.tracker.complete(marker, outcome) else {
            return;
        };
        match outcome {
            Outcome::Commit => self.tracker.publish_commit(&scope),
            Outcome::Rollback => self.tracker.publish_rollback(&scope),
        };
    }

    fn deregister(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.deregister(self.id);
            self.tracker.clear();
        }
    }
}

impl<R> Drop for MonitoredConnection<R> {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl<R> std::fmt::Debug for MonitoredConnection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredConnection")
            .field("id", &self.id)
            .field("tracker", &self.tracker)
            .field("registered", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Ad-hoc statement handle. Statement text joins the current scope when it is
/// executed or queued.
pub struct MonitoredStatement<'c, R> {
    conn: &'c MonitoredConnection<R>,
    batch: Vec<String>,
}

impl<R: TransactionalResource> MonitoredStatement<'_, R> {
    /// Record `sql` in the current scope, then execute it.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged. The text stays recorded.
    #[track_caller]
    pub fn execute(&self, sql: &str) -> Result<R::Output, R::Error> {
        self.conn.tracker.attach(sql);
        self.conn.resource.execute(sql)
    }

    /// Queue `sql` for [`Self::execute_batch`], recording it immediately.
    #[track_caller]
    pub fn add_batch(&mut self, sql: impl Into<String>) {
        let sql = sql.into();
        self.conn.tracker.attach(sql.as_str());
        self.batch.push(sql);
    }

    /// Drop the queued batch and remove its texts from the current scope.
    pub fn clear_batch(&mut self) {
        let queued = std::mem::take(&mut self.batch);
        self.conn.tracker.detach_batch(&queued);
    }

    /// Texts queued by [`Self::add_batch`].
    pub fn batch(&self) -> &[String] {
        &self.batch
    }

    /// Run the queued batch. The queue is emptied whether or not it succeeds.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged.
    pub fn execute_batch(&mut self) -> Result<Vec<R::Output>, R::Error> {
        let result = self.conn.resource.execute_batch(&self.batch);
        self.batch.clear();
        result
    }
}

/// Prepared statement handle. Its text was recorded when it was prepared;
/// executing it only delegates.
pub struct MonitoredPrepared<'c, R: TransactionalResource> {
    conn: &'c MonitoredConnection<R>,
    inner: R::Prepared,
    sql: String,
    scope: Arc<TransactionScope>,
}

impl<R: TransactionalResource> MonitoredPrepared<'_, R> {
    /// Execute the prepared statement.
    ///
    /// # Errors
    ///
    /// The resource's error, unchanged.
    pub fn execute(&self) -> Result<R::Output, R::Error> {
        self.conn.resource.execute_prepared(&self.inner)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Scope the text was recorded in.
    pub const fn scope(&self) -> &Arc<TransactionScope> {
        &self.scope
    }

    pub const fn inner(&self) -> &R::Prepared {
        &self.inner
    }
}

/// Savepoint handle paired with the marker identifying its scope.
#[derive(Debug)]
pub struct MonitoredSavepoint<S> {
    inner: S,
    marker: SavepointMarker,
    name: Option<String>,
}

impl<S> MonitoredSavepoint<S> {
    pub const fn marker(&self) -> SavepointMarker {
        self.marker
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }
}
