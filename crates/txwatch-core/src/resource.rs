//! Capabilities consumed from the wrapped transactional resource.
//!
//! Methods take `&self`: a monitored connection may be shared across threads,
//! and any interior mutability (or the lack of thread safety) belongs to the
//! resource, exactly as with the unwrapped handle.

/// A connection-like resource that executes statements and manages
/// transactions and savepoints.
///
/// A transaction begins implicitly with the first statement. Every method may
/// fail with the resource's own error type, which the monitor hands back to
/// the caller unchanged.
pub trait TransactionalResource {
    type Error: std::error::Error;
    /// Result of executing a statement.
    type Output;
    /// Prepared statement handle.
    type Prepared;
    /// Savepoint handle.
    type Savepoint;

    /// Execute statement text directly.
    ///
    /// # Errors
    ///
    /// The statement was rejected or failed to run.
    fn execute(&self, sql: &str) -> Result<Self::Output, Self::Error>;

    /// Prepare statement text for later execution.
    ///
    /// # Errors
    ///
    /// The text could not be prepared.
    fn prepare(&self, sql: &str) -> Result<Self::Prepared, Self::Error>;

    /// Execute a previously prepared statement.
    ///
    /// # Errors
    ///
    /// The statement failed to run.
    fn execute_prepared(&self, prepared: &Self::Prepared) -> Result<Self::Output, Self::Error>;

    /// Execute a batch of statement texts in order.
    ///
    /// # Errors
    ///
    /// Any statement of the batch failed; how much of it ran is up to the
    /// resource.
    fn execute_batch(&self, batch: &[String]) -> Result<Vec<Self::Output>, Self::Error>;

    /// # Errors
    ///
    /// The transaction could not be committed.
    fn commit(&self) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// The transaction could not be rolled back.
    fn rollback(&self) -> Result<(), Self::Error>;

    /// Roll back to `savepoint`, keeping the enclosing transaction open.
    ///
    /// # Errors
    ///
    /// The savepoint is unknown to the resource or the rollback failed.
    fn rollback_to(&self, savepoint: &Self::Savepoint) -> Result<(), Self::Error>;

    /// Create a savepoint, optionally named.
    ///
    /// # Errors
    ///
    /// The savepoint could not be created.
    fn savepoint(&self, name: Option<&str>) -> Result<Self::Savepoint, Self::Error>;

    /// # Errors
    ///
    /// The savepoint is unknown to the resource or could not be released.
    fn release_savepoint(&self, savepoint: &Self::Savepoint) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// The resource failed to close cleanly.
    fn close(&self) -> Result<(), Self::Error>;
}

/// Opens fresh resources for a monitored source.
pub trait ResourceFactory {
    type Resource: TransactionalResource;

    /// Open a new resource.
    ///
    /// # Errors
    ///
    /// Whatever the underlying open fails with.
    fn open(&self) -> Result<Self::Resource, <Self::Resource as TransactionalResource>::Error>;
}

impl<F: ResourceFactory + ?Sized> ResourceFactory for &F {
    type Resource = F::Resource;

    fn open(&self) -> Result<Self::Resource, <Self::Resource as TransactionalResource>::Error> {
        (**self).open()
    }
}
