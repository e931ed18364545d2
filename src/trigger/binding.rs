//! Binding trigger attributes to shared bus listeners.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::attribute::TriggerAttribute;
use super::resolver::NameResolver;
use crate::bus::Message;
use crate::dispatch::{DispatchAdapter, FunctionExecutor, ParameterMode};
use crate::listener::{Listener, ListenerError, ListenerRegistry, SessionUsage};

/// Trigger kind reported in parameter descriptors.
pub const TRIGGER_KIND: &str = "BusTrigger";

/// Host-facing description of a triggered parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: &'static str,
    pub message_type: &'static str,
    pub description: String,
}

impl ParameterDescriptor {
    /// Why the function ran, for invocation logs.
    pub fn trigger_reason(&self) -> String {
        format!("Received message {}", self.message_type)
    }
}

pub(crate) fn describe_parameter<T: Message>(parameter: &str) -> ParameterDescriptor {
    ParameterDescriptor {
        name: parameter.to_string(),
        kind: TRIGGER_KIND,
        message_type: T::MESSAGE_TYPE,
        description: format!("Reception of a {} message", T::MESSAGE_TYPE),
    }
}

/// Turns trigger attributes into bindings against a shared listener registry.
#[derive(Clone)]
pub struct TriggerBindingProvider {
    registry: Arc<ListenerRegistry>,
    resolver: Arc<dyn NameResolver>,
}

impl TriggerBindingProvider {
    pub fn new(registry: Arc<ListenerRegistry>, resolver: Arc<dyn NameResolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Resolve `attribute` and bind it for message type `T`.
    pub fn bind<T: Message>(
        &self,
        attribute: &TriggerAttribute,
        mode: ParameterMode,
    ) -> TriggerBinding<T> {
        let bus_name = self.resolver.resolve_whole_string(&attribute.bus);
        let queue_name = self.resolver.resolve_whole_string(&attribute.queue_name);
        debug!(
            bus = %bus_name,
            queue = %queue_name,
            message_type = T::MESSAGE_TYPE,
            ?mode,
            "trigger bound"
        );

        TriggerBinding {
            registry: Arc::clone(&self.registry),
            bus_name,
            queue_name,
            mode,
            session_usage: SessionUsage::from_flag(attribute.use_session),
            _message: PhantomData,
        }
    }
}

impl fmt::Debug for TriggerBindingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerBindingProvider").finish_non_exhaustive()
    }
}

/// A resolved trigger for message type `T`.
pub struct TriggerBinding<T: Message> {
    registry: Arc<ListenerRegistry>,
    bus_name: String,
    queue_name: String,
    mode: ParameterMode,
    session_usage: SessionUsage,
    _message: PhantomData<fn() -> T>,
}

impl<T: Message> TriggerBinding<T> {
    /// Bus name after `%NAME%` resolution.
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Queue name after `%NAME%` resolution.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// How the function receives the message.
    pub fn mode(&self) -> ParameterMode {
        self.mode
    }

    /// Whether the queue is read through sessions.
    pub fn session_usage(&self) -> SessionUsage {
        self.session_usage
    }

    /// Describe the bound parameter for host diagnostics.
    pub fn describe(&self, parameter: &str) -> ParameterDescriptor {
        describe_parameter::<T>(parameter)
    }

    /// Subscribe `executor` on the bus listener and return a per-function
    /// handle onto it.
    ///
    /// Must be called before the bus listener starts.
    pub fn create_listener(
        &self,
        executor: Arc<dyn FunctionExecutor<T>>,
    ) -> Result<TriggerListener, ListenerError> {
        let listener = self.registry.get_or_create_listener(&self.bus_name)?;
        listener.subscribe::<T>(
            self.queue_name.clone(),
            self.session_usage,
            DispatchAdapter::new(self.mode, executor),
        )?;
        Ok(TriggerListener {
            listener,
            queue_name: self.queue_name.clone(),
            message_type: T::MESSAGE_TYPE,
        })
    }
}

impl<T: Message> fmt::Debug for TriggerBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerBinding")
            .field("message_type", &T::MESSAGE_TYPE)
            .field("bus_name", &self.bus_name)
            .field("queue_name", &self.queue_name)
            .field("mode", &self.mode)
            .field("session_usage", &self.session_usage)
            .finish()
    }
}

/// One function's view of a shared bus listener.
///
/// Every function on the same bus holds the same `Listener`, so starting or
/// stopping any of them affects the whole connection.
#[derive(Debug, Clone)]
pub struct TriggerListener {
    listener: Arc<Listener>,
    queue_name: String,
    message_type: &'static str,
}

impl TriggerListener {
    /// The shared listener this function is subscribed on.
    pub fn bus_listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    /// Queue the function is subscribed on.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Message type the function is triggered by.
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Start the shared bus listener.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), ListenerError> {
        self.listener.start(cancel).await
    }

    /// Stop the shared bus listener; see `Listener::stop`.
    pub async fn stop(&self, cancel: CancellationToken) -> Result<(), ListenerError> {
        self.listener.stop(cancel).await
    }

    /// Stop without a deadline.
    pub async fn cancel(&self) -> Result<(), ListenerError> {
        self.listener.stop(CancellationToken::new()).await
    }
}
