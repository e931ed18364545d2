//! Bus configuration store.
//!
//! Holds one host configuration per bus and the trigger configuration
//! contributions per message type. Populated through `&mut self` during
//! bootstrap, then shared read-only behind an `Arc`.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::composer::{compose, CompositeConfiguration, TriggerConfiguration};
use super::error::ConfigurationError;
use crate::bus::{HandlerConfigurator, HostConfigurator, Message};

/// Service URI plus the function that configures the host.
pub struct HostConfiguration {
    service_uri: Url,
    configure: Arc<dyn Fn(&mut HostConfigurator) + Send + Sync>,
}

impl HostConfiguration {
    /// Pair a service URI with the function that configures its host.
    pub fn new<F>(service_uri: Url, configure: F) -> Self
    where
        F: Fn(&mut HostConfigurator) + Send + Sync + 'static,
    {
        Self {
            service_uri,
            configure: Arc::new(configure),
        }
    }

    /// Broker namespace this bus connects to.
    pub fn service_uri(&self) -> &Url {
        &self.service_uri
    }

    /// Apply the registered host configuration to `configurator`.
    pub fn configure_host(&self, configurator: &mut HostConfigurator) {
        (self.configure)(configurator)
    }

    /// A fresh `HostConfigurator` with this configuration applied.
    pub fn configurator(&self) -> HostConfigurator {
        let mut configurator = HostConfigurator::new(self.service_uri.clone());
        self.configure_host(&mut configurator);
        configurator
    }
}

impl fmt::Debug for HostConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfiguration")
            .field("service_uri", &self.service_uri.as_str())
            .finish_non_exhaustive()
    }
}

/// Declarative host settings.
///
/// ```json
/// {
///   "service_uri": "sb://orders.servicebus.windows.net",
///   "operation_timeout_ms": 30000,
///   "properties": { "transport": "amqp-websockets" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostSettings {
    pub service_uri: Url,
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Host settings for every bus, keyed by bus name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BusSettings {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSettings>,
}

type Contribution = Box<dyn Any + Send + Sync>;

#[derive(Default)]
struct TriggerSlots {
    global: Vec<Contribution>,
    buses: HashMap<String, Vec<Contribution>>,
}

/// Per-bus host configuration and per-message-type trigger configuration.
#[derive(Default)]
pub struct BusConfigurationStore {
    hosts: HashMap<String, Arc<HostConfiguration>>,
    triggers: HashMap<TypeId, TriggerSlots>,
}

impl BusConfigurationStore {
    /// An empty store with no hosts and no trigger configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from declarative settings.
    pub fn from_settings(settings: BusSettings) -> Result<Self, ConfigurationError> {
        let mut store = Self::new();
        for (bus, host) in settings.hosts {
            store.register_host_settings(&bus, host)?;
        }
        Ok(store)
    }

    /// Build a store from a JSON `BusSettings` document.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let settings: BusSettings = serde_json::from_str(json)?;
        Self::from_settings(settings)
    }

    /// Register the host configuration for a bus. Fails if one already exists.
    pub fn register_host<F>(
        &mut self,
        bus: &str,
        service_uri: Url,
        configure: F,
    ) -> Result<(), ConfigurationError>
    where
        F: Fn(&mut HostConfigurator) + Send + Sync + 'static,
    {
        if self.hosts.contains_key(bus) {
            return Err(ConfigurationError::DuplicateHost {
                bus: bus.to_string(),
            });
        }
        debug!(bus, service_uri = %service_uri, "host configuration registered");
        self.hosts.insert(
            bus.to_string(),
            Arc::new(HostConfiguration::new(service_uri, configure)),
        );
        Ok(())
    }

    /// Register a host from declarative settings.
    pub fn register_host_settings(
        &mut self,
        bus: &str,
        settings: HostSettings,
    ) -> Result<(), ConfigurationError> {
        let HostSettings {
            service_uri,
            operation_timeout_ms,
            properties,
        } = settings;
        self.register_host(bus, service_uri, move |host| {
            if let Some(ms) = operation_timeout_ms {
                host.operation_timeout(Duration::from_millis(ms));
            }
            for (key, value) in &properties {
                host.property(key.clone(), value.clone());
            }
        })
    }

    /// Host configuration for `bus`, if registered.
    pub fn host(&self, bus: &str) -> Option<Arc<HostConfiguration>> {
        self.hosts.get(bus).cloned()
    }

    /// Bus names with a registered host, sorted.
    pub fn buses(&self) -> Vec<&str> {
        let mut buses: Vec<&str> = self.hosts.keys().map(|s| s.as_str()).collect();
        buses.sort_unstable();
        buses
    }

    /// Add a configuration for `T` that applies on every bus.
    ///
    /// Repeated registrations accumulate and run in registration order.
    pub fn register_global_trigger_config<T, F>(&mut self, configure: F) -> &mut Self
    where
        T: Message,
        F: Fn(&mut HandlerConfigurator<T>) + Send + Sync + 'static,
    {
        self.triggers
            .entry(TypeId::of::<T>())
            .or_default()
            .global
            .push(Box::new(TriggerConfiguration::<T>::new(configure)));
        self
    }

    /// Add a configuration for `T` that applies only on `bus`.
    pub fn register_bus_trigger_config<T, F>(&mut self, bus: &str, configure: F) -> &mut Self
    where
        T: Message,
        F: Fn(&mut HandlerConfigurator<T>) + Send + Sync + 'static,
    {
        self.triggers
            .entry(TypeId::of::<T>())
            .or_default()
            .buses
            .entry(bus.to_string())
            .or_default()
            .push(Box::new(TriggerConfiguration::<T>::new(configure)));
        self
    }

    /// The composite configuration for `T` on `bus`: global contributions
    /// first, then bus-scoped ones.
    pub fn trigger_config<T: Message>(&self, bus: &str) -> CompositeConfiguration<T> {
        let Some(slots) = self.triggers.get(&TypeId::of::<T>()) else {
            return CompositeConfiguration::noop();
        };
        let global = fold::<T>(&slots.global);
        let scoped = slots.buses.get(bus).and_then(|c| fold::<T>(c));
        compose(global, scoped)
    }
}

fn fold<T: 'static>(contributions: &[Contribution]) -> Option<TriggerConfiguration<T>> {
    contributions
        .iter()
        .filter_map(|c| c.downcast_ref::<TriggerConfiguration<T>>())
        .cloned()
        .reduce(TriggerConfiguration::then)
}

impl fmt::Debug for BusConfigurationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfigurationStore")
            .field("buses", &self.buses())
            .field("trigger_types", &self.triggers.len())
            .finish()
    }
}
