//! Errors raised by the broker client.

use thiserror::Error;

/// Error type for broker connection operations.
///
/// `Clone` so one readiness outcome can be observed by every caller
/// awaiting the same connection start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Connecting or authenticating to the broker failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Creating or binding a receive endpoint failed
    #[error("endpoint provisioning failed: {0}")]
    Provisioning(String),
    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,
    /// The connection has been shut down
    #[error("connection closed")]
    Closed,
}
