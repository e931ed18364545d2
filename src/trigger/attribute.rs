use serde::Deserialize;

/// Declares that a function is triggered by messages on a bus queue.
///
/// `bus` and `queue_name` may contain `%NAME%` tokens, resolved through a
/// `NameResolver` when the trigger is bound.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggerAttribute {
    pub bus: String,
    pub queue_name: String,
    #[serde(default)]
    pub use_session: bool,
}

impl TriggerAttribute {
    pub fn new(bus: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            bus: bus.into(),
            queue_name: queue_name.into(),
            use_session: false,
        }
    }

    pub fn use_session(mut self, use_session: bool) -> Self {
        self.use_session = use_session;
        self
    }
}
