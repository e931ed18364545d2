//! Message envelope carried by the broker and the typed message trait.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed message that handlers can subscribe to.
///
/// `MESSAGE_TYPE` is the routing key the broker uses to pick the handler
/// on an endpoint shared by several message types.
pub trait Message: DeserializeOwned + Send + Sync + 'static {
    /// Stable type name (e.g., "OrderCreated").
    const MESSAGE_TYPE: &'static str;
}

/// A message as the broker transports it.
#[derive(Clone, Debug)]
pub struct Event {
    /// Unique identifier for this message
    pub id: String,
    /// Message type, matched against `Message::MESSAGE_TYPE`
    pub event_type: String,
    /// JSON payload
    pub payload: Vec<u8>,
    /// Transport headers (correlation IDs, etc.)
    pub headers: Vec<(String, String)>,
    /// Session key for session-aware queues
    pub session_id: Option<String>,
}

impl Event {
    /// Create a new event with the given type and payload.
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            headers: Vec::new(),
            session_id: None,
        }
    }

    /// Create an event carrying a JSON-serialized typed message.
    pub fn encode<T: Message + Serialize>(
        id: impl Into<String>,
        message: &T,
    ) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(message)?;
        Ok(Self::new(id, T::MESSAGE_TYPE, bytes))
    }

    /// Decode the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Create an event with a string payload.
    pub fn with_string_payload(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, event_type, payload.into().into_bytes())
    }

    /// Add a header to the event.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Assign the session key.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
