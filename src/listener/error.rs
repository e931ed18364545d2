use thiserror::Error;

use crate::bus::BrokerError;
use crate::config::ConfigurationError;

/// Error type for listener registration and lifecycle operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host configuration missing or invalid. Fatal.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The broker could not connect or provision endpoints.
    #[error("bus {bus}: {source}")]
    Connection {
        bus: String,
        #[source]
        source: BrokerError,
    },
    /// `start` was cancelled before the connection became ready.
    #[error("bus {bus}: start cancelled")]
    Cancelled { bus: String },
    /// A subscription arrived after the connection was built.
    #[error("bus {bus}: cannot subscribe to queue {queue} once the listener has started")]
    AlreadyStarted { bus: String, queue: String },
    /// `stop` did not finish draining before the caller's deadline.
    #[error("bus {bus}: shutdown did not complete before the deadline")]
    ShutdownTimeout { bus: String },
    /// A listener mutex was poisoned by a panicking thread.
    #[error("listener lock poisoned during {0}")]
    LockPoisoned(&'static str),
}
