//! The triggered-function seam.
//!
//! A `FunctionExecutor<T>` runs the user function bound to a trigger.
//! Hosts that only know message types at runtime implement
//! `DynamicExecutor` instead and downcast the trigger value themselves.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::adapter::TriggerValue;
use crate::bus::Message;

/// Error returned by a triggered function.
pub type FunctionError = Box<dyn Error + Send + Sync>;

/// Runs the function bound to a trigger for message type `T`.
#[async_trait]
pub trait FunctionExecutor<T: Message>: Send + Sync {
    async fn try_execute(
        &self,
        value: TriggerValue<T>,
        cancel: CancellationToken,
    ) -> Result<(), FunctionError>;
}

/// Closure-backed `FunctionExecutor`.
pub struct FnExecutor<F> {
    function: F,
}

/// Wrap an async closure as a `FunctionExecutor`.
///
/// ```ignore
/// let executor = executor_fn(|value: TriggerValue<OrderCreated>, _cancel| async move {
///     println!("order {}", value.message().id);
///     Ok(())
/// });
/// ```
pub fn executor_fn<T, F, Fut>(function: F) -> FnExecutor<F>
where
    T: Message,
    F: Fn(TriggerValue<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
{
    FnExecutor { function }
}

#[async_trait]
impl<T, F, Fut> FunctionExecutor<T> for FnExecutor<F>
where
    T: Message,
    F: Fn(TriggerValue<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
{
    async fn try_execute(
        &self,
        value: TriggerValue<T>,
        cancel: CancellationToken,
    ) -> Result<(), FunctionError> {
        (self.function)(value, cancel).await
    }
}

/// Input handed to a `DynamicExecutor`.
pub struct TriggeredFunctionData {
    /// `Message::MESSAGE_TYPE` of the trigger value.
    pub message_type: &'static str,
    /// A boxed `TriggerValue<T>`.
    pub trigger_value: Box<dyn Any + Send>,
    /// Delivery facts as strings (message ID, queue, delivery count).
    pub trigger_details: HashMap<String, String>,
}

impl TriggeredFunctionData {
    /// Recover the typed trigger value.
    pub fn downcast<T: Message>(self) -> Result<TriggerValue<T>, Self> {
        let Self {
            message_type,
            trigger_value,
            trigger_details,
        } = self;
        match trigger_value.downcast::<TriggerValue<T>>() {
            Ok(value) => Ok(*value),
            Err(trigger_value) => Err(Self {
                message_type,
                trigger_value,
                trigger_details,
            }),
        }
    }
}

/// A function executor that receives type-erased trigger values.
#[async_trait]
pub trait DynamicExecutor: Send + Sync {
    async fn try_execute(
        &self,
        input: TriggeredFunctionData,
        cancel: CancellationToken,
    ) -> Result<(), FunctionError>;
}

/// Adapts a `DynamicExecutor` to any `FunctionExecutor<T>`.
#[derive(Clone)]
pub struct ErasedExecutor {
    inner: Arc<dyn DynamicExecutor>,
}

impl ErasedExecutor {
    pub fn new(inner: Arc<dyn DynamicExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Message> FunctionExecutor<T> for ErasedExecutor {
    async fn try_execute(
        &self,
        value: TriggerValue<T>,
        cancel: CancellationToken,
    ) -> Result<(), FunctionError> {
        let mut trigger_details = HashMap::new();
        if let Some(context) = value.context() {
            let metadata = context.metadata();
            trigger_details.insert("message_id".to_string(), metadata.message_id.clone());
            trigger_details.insert("queue".to_string(), metadata.queue.clone());
            trigger_details.insert(
                "delivery_count".to_string(),
                metadata.delivery_count.to_string(),
            );
        }

        let input = TriggeredFunctionData {
            message_type: T::MESSAGE_TYPE,
            trigger_value: Box::new(value),
            trigger_details,
        };
        self.inner.try_execute(input, cancel).await
    }
}
