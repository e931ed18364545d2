//! Delivery metadata and the consume context handed to handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Broker-side facts about one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryMetadata {
    /// Broker message ID
    pub message_id: String,
    /// Queue the message was received from
    pub queue: String,
    /// Transport headers
    pub headers: Vec<(String, String)>,
    /// Session key when the endpoint is session-aware
    pub session_id: Option<String>,
    /// 1 on first delivery, incremented on every redelivery
    pub delivery_count: u32,
    /// Fires when the connection shuts down mid-delivery
    pub cancellation: CancellationToken,
}

impl DeliveryMetadata {
    /// Look up a header by key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A decoded message together with its delivery metadata.
///
/// The message is shared, so cloning a context is cheap.
#[derive(Debug)]
pub struct ConsumeContext<T> {
    message: Arc<T>,
    metadata: DeliveryMetadata,
}

impl<T> Clone for ConsumeContext<T> {
    fn clone(&self) -> Self {
        Self {
            message: Arc::clone(&self.message),
            metadata: self.metadata.clone(),
        }
    }
}

impl<T> ConsumeContext<T> {
    pub fn new(message: T, metadata: DeliveryMetadata) -> Self {
        Self {
            message: Arc::new(message),
            metadata,
        }
    }

    /// The decoded message.
    pub fn message(&self) -> &T {
        &self.message
    }

    /// Shared handle to the decoded message.
    pub fn message_arc(&self) -> Arc<T> {
        Arc::clone(&self.message)
    }

    pub fn metadata(&self) -> &DeliveryMetadata {
        &self.metadata
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.metadata.headers
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.metadata.cancellation
    }
}
