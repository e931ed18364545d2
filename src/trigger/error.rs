use thiserror::Error;

use crate::listener::ListenerError;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("no message type registered under {0}")]
    UnknownMessageType(String),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}
