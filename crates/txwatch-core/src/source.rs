//! Monitored source: a resource factory whose connections share one listener
//! registry, one resource registry, and one configuration.

use std::sync::Arc;

use txwatch_observability::{ListenerRegistry, TransactionListener};

use crate::config::MonitorConfig;
use crate::monitor::MonitoredConnection;
use crate::registry::ResourceRegistry;
use crate::resource::{ResourceFactory, TransactionalResource};
use crate::tracker::TransactionTracker;

/// Error returned when the factory fails to open a resource.
pub type OpenError<F> = <<F as ResourceFactory>::Resource as TransactionalResource>::Error;

pub struct MonitoredSource<F> {
    factory: F,
    listeners: Arc<ListenerRegistry>,
    registry: Arc<ResourceRegistry>,
    config: MonitorConfig,
}

impl<F: ResourceFactory> MonitoredSource<F> {
    /// Wrap `factory` with default configuration and no listeners.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            listeners: Arc::new(ListenerRegistry::new()),
            registry: Arc::new(ResourceRegistry::new()),
            config: MonitorConfig::default(),
        }
    }

    /// Replace the configuration used for connections opened from now on.
    #[must_use]
    pub const fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_listeners<I>(self, listeners: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn TransactionListener>>,
    {
        self.listeners.extend(listeners);
        self
    }

    /// Register a listener. Connections already open see it from their next
    /// event on.
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.listeners.register(listener);
    }

    /// Open a resource from the factory and wrap it.
    ///
    /// # Errors
    ///
    /// The factory's error, unchanged.
    pub fn connect(&self) -> Result<MonitoredConnection<F::Resource>, OpenError<F>> {
        let resource = self.factory.open()?;
        Ok(self.wrap(resource))
    }

    /// Wrap an already open resource as a connection of this source.
    pub fn wrap<R: TransactionalResource>(&self, resource: R) -> MonitoredConnection<R> {
        let tracker = Arc::new(TransactionTracker::new(Arc::clone(&self.listeners), &self.config));
        let conn = MonitoredConnection::new(resource, tracker, Arc::clone(&self.registry));
        tracing::debug!(conn = %conn.id(), listeners = self.listeners.len(), "connection opened");
        conn
    }

    pub const fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub const fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub const fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F> std::fmt::Debug for MonitoredSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredSource")
            .field("listeners", &self.listeners)
            .field("live", &self.registry.live_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
