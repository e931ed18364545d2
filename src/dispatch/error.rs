use thiserror::Error;

use super::executor::FunctionError;

/// Error type for a single delivery attempt.
///
/// Returning any of these from a delivery leaves the message to the
/// broker's own redelivery and dead-letter handling.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The payload could not be decoded into the handler's message type.
    #[error("failed to decode {message_type} payload: {reason}")]
    Decode {
        message_type: &'static str,
        reason: String,
    },
    /// The triggered function reported failure.
    #[error("function for {message_type} failed: {source}")]
    HandlerFailed {
        message_type: &'static str,
        #[source]
        source: FunctionError,
    },
    /// No handler is bound for this message type on the queue.
    #[error("no handler for {message_type} on queue {queue}")]
    NoHandler { queue: String, message_type: String },
}
