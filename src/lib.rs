//! Message-triggered functions over shared broker connections.
//!
//! Many functions can be triggered by messages on the same bus. They all
//! subscribe through one `Listener` per bus, which builds a single broker
//! connection on first `start` carrying every queue they registered.
//!
//! ```text
//! BusConfigurationStore ──► ListenerRegistry ──► Listener (one per bus)
//!        │                                          │ start: build once
//!        │ trigger_config::<T>()                    ▼
//!        └──────────► QueueSubscription ──► BusFactory / BusControl
//!                                                   │ delivery
//!                                                   ▼
//!                            DispatchAdapter<T> ──► FunctionExecutor<T>
//! ```

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod listener;
pub mod trigger;

pub use bus::{
    BrokerError, BusConfigurator, BusControl, BusFactory, ConsumeContext, DeliveryMetadata, Event,
    HandlerConfigurator, HostConfigurator, Message, ReceiveEndpointConfigurator,
};
#[cfg(feature = "in-memory")]
pub use bus::InMemoryBroker;
pub use config::{BusConfigurationStore, ConfigurationError};
pub use dispatch::{
    executor_fn, DeliveryError, DispatchAdapter, FunctionExecutor, ParameterMode, TriggerValue,
};
pub use listener::{
    Listener, ListenerError, ListenerRegistry, ListenerState, QueueSubscription, SessionUsage,
};
pub use trigger::{TriggerAttribute, TriggerBindingProvider, TriggerListener};
