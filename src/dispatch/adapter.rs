//! Dispatch adapter: shapes the handler parameter and invokes the function.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::DeliveryError;
use super::executor::FunctionExecutor;
use crate::bus::{ConsumeContext, Message};

/// What a triggered function receives as its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterMode {
    /// The decoded message only.
    #[default]
    Message,
    /// The decoded message wrapped with its delivery metadata.
    ConsumeContext,
}

/// The parameter value built for one delivery.
#[derive(Debug)]
pub enum TriggerValue<T> {
    Message(Arc<T>),
    Context(ConsumeContext<T>),
}

impl<T> TriggerValue<T> {
    /// The decoded message, whatever the mode.
    pub fn message(&self) -> &T {
        match self {
            TriggerValue::Message(message) => message,
            TriggerValue::Context(context) => context.message(),
        }
    }

    pub fn context(&self) -> Option<&ConsumeContext<T>> {
        match self {
            TriggerValue::Message(_) => None,
            TriggerValue::Context(context) => Some(context),
        }
    }

    pub fn mode(&self) -> ParameterMode {
        match self {
            TriggerValue::Message(_) => ParameterMode::Message,
            TriggerValue::Context(_) => ParameterMode::ConsumeContext,
        }
    }
}

/// Binds deliveries for message type `T` to a triggered function.
///
/// The adapter never retries and never acknowledges: a function failure is
/// returned as `DeliveryError::HandlerFailed` and the broker decides what
/// happens to the message.
pub struct DispatchAdapter<T: Message> {
    mode: ParameterMode,
    executor: Arc<dyn FunctionExecutor<T>>,
}

impl<T: Message> Clone for DispatchAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<T: Message> fmt::Debug for DispatchAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchAdapter")
            .field("message_type", &T::MESSAGE_TYPE)
            .field("mode", &self.mode)
            .finish()
    }
}

impl<T: Message> DispatchAdapter<T> {
    pub fn new(mode: ParameterMode, executor: Arc<dyn FunctionExecutor<T>>) -> Self {
        Self { mode, executor }
    }

    pub fn mode(&self) -> ParameterMode {
        self.mode
    }

    /// Build the parameter for `context` and run the function once.
    pub async fn dispatch(&self, context: ConsumeContext<T>) -> Result<(), DeliveryError> {
        let cancel = context.cancellation_token().child_token();
        let message_id = context.metadata().message_id.clone();
        let value = self.bind(context);

        debug!(
            message_type = T::MESSAGE_TYPE,
            %message_id,
            mode = ?self.mode,
            "invoking triggered function"
        );

        self.executor
            .try_execute(value, cancel)
            .await
            .map_err(|source| {
                warn!(
                    message_type = T::MESSAGE_TYPE,
                    %message_id,
                    error = %source,
                    "triggered function failed"
                );
                DeliveryError::HandlerFailed {
                    message_type: T::MESSAGE_TYPE,
                    source,
                }
            })
    }

    fn bind(&self, context: ConsumeContext<T>) -> TriggerValue<T> {
        match self.mode {
            ParameterMode::Message => TriggerValue::Message(context.message_arc()),
            ParameterMode::ConsumeContext => TriggerValue::Context(context),
        }
    }
}
