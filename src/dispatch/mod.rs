//! Dispatch: from a broker delivery to a triggered function call.
//!
//! ```text
//!  ConsumeContext<T> ──► DispatchAdapter<T> ──► FunctionExecutor<T>
//!                        Message mode:  TriggerValue::Message(Arc<T>)
//!                        Context mode:  TriggerValue::Context(ctx)
//! ```
//!
//! A function error becomes `DeliveryError::HandlerFailed` and is returned
//! to the broker, which owns redelivery and dead-lettering.

mod adapter;
mod error;
mod executor;

pub use adapter::{DispatchAdapter, ParameterMode, TriggerValue};
pub use error::DeliveryError;
pub use executor::{
    executor_fn, DynamicExecutor, ErasedExecutor, FnExecutor, FunctionError, FunctionExecutor,
    TriggeredFunctionData,
};
