//! Listener registry and connection lifecycle.
//!
//! One `Listener` per bus owns one broker connection. Triggers register
//! queue subscriptions on it before the first `start`; the connection is
//! then built once with every queue's receive endpoint.

mod error;
#[allow(clippy::module_inception)]
mod listener;
mod registry;
mod subscription;

pub use error::ListenerError;
pub use listener::{Listener, ListenerState};
pub use registry::ListenerRegistry;
pub use subscription::{QueueSubscription, SessionUsage};
