//! Broker client seam: connection construction and lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::configurator::BusConfigurator;
use super::error::BrokerError;

/// A constructed broker connection.
///
/// Implementations might include:
/// - `InMemoryBus` - For testing and single-process scenarios
/// - Azure Service Bus, RabbitMQ or AMQP 1.0 clients
#[async_trait]
pub trait BusControl: Send + Sync {
    /// Connect and provision every receive endpoint, then begin delivering.
    ///
    /// Must return `BrokerError::Cancelled` if `cancel` fires before the
    /// connection is ready.
    async fn start(&self, cancel: CancellationToken) -> Result<(), BrokerError>;

    /// Stop receiving and wait for in-flight deliveries to drain.
    ///
    /// Callers may abandon the returned future and call `stop` again.
    async fn stop(&self) -> Result<(), BrokerError>;
}

/// Builds connections from a fully-populated `BusConfigurator`.
///
/// Construction is synchronous and performs no I/O; the slow part happens
/// in `BusControl::start`.
pub trait BusFactory: Send + Sync {
    fn create(&self, configuration: BusConfigurator) -> Result<Arc<dyn BusControl>, BrokerError>;
}
