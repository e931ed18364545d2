use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, try_join_all};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::ListenerError;
use super::listener::Listener;
use crate::bus::BusFactory;
use crate::config::BusConfigurationStore;

/// Process-wide map from bus name to its listener.
///
/// Every trigger bound to the same bus receives the same `Arc<Listener>`,
/// so they all share one connection.
pub struct ListenerRegistry {
    store: Arc<BusConfigurationStore>,
    factory: Arc<dyn BusFactory>,
    listeners: Mutex<HashMap<String, Arc<Listener>>>,
}

impl ListenerRegistry {
    /// An empty registry building connections through `factory`.
    pub fn new(store: Arc<BusConfigurationStore>, factory: Arc<dyn BusFactory>) -> Self {
        Self {
            store,
            factory,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration shared by every listener.
    pub fn store(&self) -> &Arc<BusConfigurationStore> {
        &self.store
    }

    /// Return the listener for `bus_name`, creating it on first use.
    pub fn get_or_create_listener(&self, bus_name: &str) -> Result<Arc<Listener>, ListenerError> {
        let mut listeners = self
            .listeners
            .lock()
            .map_err(|_| ListenerError::LockPoisoned("get_or_create_listener"))?;

        let listener = listeners.entry(bus_name.to_string()).or_insert_with(|| {
            debug!(bus = %bus_name, "creating listener");
            Arc::new(Listener::new(
                bus_name,
                Arc::clone(&self.store),
                Arc::clone(&self.factory),
            ))
        });
        Ok(Arc::clone(listener))
    }

    /// The listener for `bus_name`, if one exists.
    pub fn listener(&self, bus_name: &str) -> Result<Option<Arc<Listener>>, ListenerError> {
        let listeners = self
            .listeners
            .lock()
            .map_err(|_| ListenerError::LockPoisoned("listener"))?;
        Ok(listeners.get(bus_name).cloned())
    }

    /// Every listener, ordered by bus name.
    pub fn listeners(&self) -> Result<Vec<Arc<Listener>>, ListenerError> {
        let listeners = self
            .listeners
            .lock()
            .map_err(|_| ListenerError::LockPoisoned("listeners"))?;
        let mut all: Vec<_> = listeners.values().cloned().collect();
        all.sort_by(|a, b| a.bus_name().cmp(b.bus_name()));
        Ok(all)
    }

    /// Start every listener concurrently; fails on the first error.
    pub async fn start_all(&self, cancel: CancellationToken) -> Result<(), ListenerError> {
        let listeners = self.listeners()?;
        try_join_all(listeners.iter().map(|l| l.start(cancel.clone()))).await?;
        Ok(())
    }

    /// Stop every listener, attempting all of them before reporting the
    /// first error.
    pub async fn stop_all(&self, cancel: CancellationToken) -> Result<(), ListenerError> {
        let listeners = self.listeners()?;
        join_all(listeners.iter().map(|l| l.stop(cancel.clone())))
            .await
            .into_iter()
            .collect()
    }
}
