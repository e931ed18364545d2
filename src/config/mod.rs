//! Bus configuration: host registration and trigger configuration.
//!
//! ## Example
//!
//! ```ignore
//! let mut store = BusConfigurationStore::new();
//! store.register_host("orders", Url::parse("sb://orders")?, |host| {
//!     host.operation_timeout(Duration::from_secs(30));
//! })?;
//! store
//!     .register_global_trigger_config::<OrderCreated, _>(|cfg| {
//!         cfg.max_delivery_count(5);
//!     })
//!     .register_bus_trigger_config::<OrderCreated, _>("orders", |cfg| {
//!         cfg.concurrent_message_limit(1);
//!     });
//! let store = Arc::new(store);
//! ```

mod composer;
mod error;
mod store;

pub use composer::{compose, CompositeConfiguration, TriggerConfiguration};
pub use error::ConfigurationError;
pub use store::{BusConfigurationStore, BusSettings, HostConfiguration, HostSettings};
