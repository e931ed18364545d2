//! Configurators handed to host, endpoint and handler configuration functions.
//!
//! A connection is described by one `BusConfigurator`: the host settings
//! plus one `ReceiveEndpointConfigurator` per queue. Each endpoint carries
//! the type-erased handlers attached to it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use url::Url;

use super::context::{ConsumeContext, DeliveryMetadata};
use super::message::{Event, Message};
use crate::dispatch::DeliveryError;

/// Host-level connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfigurator {
    service_uri: Url,
    operation_timeout: Option<Duration>,
    properties: BTreeMap<String, String>,
}

impl HostConfigurator {
    /// Host settings for the broker at `service_uri`.
    pub fn new(service_uri: Url) -> Self {
        Self {
            service_uri,
            operation_timeout: None,
            properties: BTreeMap::new(),
        }
    }

    /// Broker namespace or connection URI.
    pub fn service_uri(&self) -> &Url {
        &self.service_uri
    }

    /// Set the timeout applied to broker management operations.
    pub fn operation_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Timeout for management operations, if one was set.
    pub fn get_operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    /// Set a free-form broker client property.
    pub fn property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Client properties, ordered by key.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

/// Consumer settings for one message type on one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Maximum number of concurrent deliveries for this handler.
    pub concurrent_message_limit: Option<usize>,
    /// Delivery attempts before the broker dead-letters a message.
    pub max_delivery_count: Option<u32>,
    /// Free-form settings forwarded to the broker client.
    pub properties: BTreeMap<String, String>,
}

/// Typed view over `HandlerSettings` used by trigger configurations.
///
/// Every setter overwrites, so when several configurations run in sequence
/// the last one to touch a setting wins.
pub struct HandlerConfigurator<T> {
    settings: HandlerSettings,
    _message: PhantomData<fn() -> T>,
}

impl<T> Default for HandlerConfigurator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandlerConfigurator<T> {
    /// An empty configurator; every setting unset.
    pub fn new() -> Self {
        Self {
            settings: HandlerSettings::default(),
            _message: PhantomData,
        }
    }

    /// Cap concurrent deliveries for this handler.
    pub fn concurrent_message_limit(&mut self, limit: usize) -> &mut Self {
        self.settings.concurrent_message_limit = Some(limit);
        self
    }

    /// Attempts before the message is dead-lettered.
    pub fn max_delivery_count(&mut self, count: u32) -> &mut Self {
        self.settings.max_delivery_count = Some(count);
        self
    }

    /// Set a free-form handler property.
    pub fn property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.settings.properties.insert(key.into(), value.into());
        self
    }

    /// Settings accumulated so far.
    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Consume the configurator, keeping its settings.
    pub fn into_settings(self) -> HandlerSettings {
        self.settings
    }
}

type DeliveryCallback =
    Arc<dyn Fn(&Event, DeliveryMetadata) -> BoxFuture<'static, Result<(), DeliveryError>> + Send + Sync>;

/// A handler attached to a receive endpoint, erased over its message type.
#[derive(Clone)]
pub struct EndpointHandler {
    message_type: &'static str,
    settings: HandlerSettings,
    callback: DeliveryCallback,
}

impl EndpointHandler {
    /// Message type this handler consumes.
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Consumer settings composed for this handler.
    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Decode the event and run the handler once.
    ///
    /// The outcome decides acknowledgment: `Ok` acknowledges, `Err` leaves
    /// the message to the broker's redelivery.
    pub async fn deliver(
        &self,
        event: &Event,
        metadata: DeliveryMetadata,
    ) -> Result<(), DeliveryError> {
        (self.callback)(event, metadata).await
    }
}

impl fmt::Debug for EndpointHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointHandler")
            .field("message_type", &self.message_type)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Configuration for one receive endpoint (queue).
#[derive(Debug, Clone)]
pub struct ReceiveEndpointConfigurator {
    queue_name: String,
    requires_session: bool,
    handlers: Vec<EndpointHandler>,
}

impl ReceiveEndpointConfigurator {
    /// An endpoint for `queue_name` with no handlers.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            requires_session: false,
            handlers: Vec::new(),
        }
    }

    /// Queue this endpoint receives from.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Mark the endpoint session-aware.
    pub fn set_requires_session(&mut self, requires_session: bool) -> &mut Self {
        self.requires_session = requires_session;
        self
    }

    /// Whether messages must carry a session id.
    pub fn requires_session(&self) -> bool {
        self.requires_session
    }

    /// Attach a handler for messages of type `T`.
    ///
    /// `configure` receives a fresh `HandlerConfigurator<T>`; the settings it
    /// leaves behind travel with the handler.
    pub fn handler<T, F, Fut>(
        &mut self,
        callback: F,
        configure: impl FnOnce(&mut HandlerConfigurator<T>),
    ) -> &mut Self
    where
        T: Message,
        F: Fn(ConsumeContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        let mut configurator = HandlerConfigurator::<T>::new();
        configure(&mut configurator);

        let callback = Arc::new(callback);
        let deliver: DeliveryCallback = Arc::new(move |event: &Event, metadata: DeliveryMetadata| {
            let decoded = event.decode::<T>();
            let callback = Arc::clone(&callback);
            async move {
                let message = decoded.map_err(|e| DeliveryError::Decode {
                    message_type: T::MESSAGE_TYPE,
                    reason: e.to_string(),
                })?;
                (*callback)(ConsumeContext::new(message, metadata)).await
            }
            .boxed()
        });

        self.handlers.push(EndpointHandler {
            message_type: T::MESSAGE_TYPE,
            settings: configurator.into_settings(),
            callback: deliver,
        });
        self
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> &[EndpointHandler] {
        &self.handlers
    }

    /// Every handler registered for a message type, in registration order.
    pub fn handlers_for<'a>(
        &'a self,
        message_type: &'a str,
    ) -> impl Iterator<Item = &'a EndpointHandler> + 'a {
        self.handlers
            .iter()
            .filter(move |h| h.message_type == message_type)
    }
}

/// Everything needed to construct one broker connection.
#[derive(Debug, Clone)]
pub struct BusConfigurator {
    host: HostConfigurator,
    endpoints: Vec<ReceiveEndpointConfigurator>,
}

impl BusConfigurator {
    /// A connection description with no endpoints yet.
    pub fn new(host: HostConfigurator) -> Self {
        Self {
            host,
            endpoints: Vec::new(),
        }
    }

    /// Host-level settings.
    pub fn host(&self) -> &HostConfigurator {
        &self.host
    }

    /// Declare a receive endpoint and configure it.
    pub fn receive_endpoint(
        &mut self,
        queue_name: &str,
        configure: impl FnOnce(&mut ReceiveEndpointConfigurator),
    ) -> &mut Self {
        let mut endpoint = ReceiveEndpointConfigurator::new(queue_name);
        configure(&mut endpoint);
        self.endpoints.push(endpoint);
        self
    }

    /// Receive endpoints in declaration order.
    pub fn endpoints(&self) -> &[ReceiveEndpointConfigurator] {
        &self.endpoints
    }

    /// Split into host settings and endpoints for a broker client.
    pub fn into_parts(self) -> (HostConfigurator, Vec<ReceiveEndpointConfigurator>) {
        (self.host, self.endpoints)
    }
}
