//! Broker client abstractions.
//!
//! The broker client is an external dependency: it owns the network
//! connection, message decoding and redelivery. This module defines the
//! narrow seam the listener runtime drives it through.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  BusConfigurator (per bus)                  │
//! │  HostConfigurator + one ReceiveEndpointConfigurator/queue   │
//! │  each endpoint holds EndpointHandlers keyed by message type │
//! └─────────────────────────────────────────────────────────────┘
//!                            │  BusFactory::create()
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BusControl (connection)                  │
//! │  start(cancel) / stop()                                     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌──────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │InMemoryBroker│    │ Service Bus │    │      RabbitMQ       │
//! │  (included)  │    │ (external)  │    │     (external)      │
//! └──────────────┘    └─────────────┘    └─────────────────────┘
//! ```

mod configurator;
mod context;
mod control;
mod error;
#[cfg(feature = "in-memory")]
mod in_memory;
mod message;

pub use configurator::{
    BusConfigurator, EndpointHandler, HandlerConfigurator, HandlerSettings, HostConfigurator,
    ReceiveEndpointConfigurator,
};
pub use context::{ConsumeContext, DeliveryMetadata};
pub use control::{BusControl, BusFactory};
pub use error::BrokerError;
#[cfg(feature = "in-memory")]
pub use in_memory::{DeadLetter, InMemoryBroker, InMemoryBus, DEFAULT_MAX_DELIVERY_COUNT};
pub use message::{Event, Message};
