//! Error types for bus configuration.

use thiserror::Error;

/// Configuration problems. Always fatal at startup and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A host configuration was registered twice for the same bus.
    #[error("host configuration already registered for bus {bus}")]
    DuplicateHost { bus: String },
    /// A bus was started without a host configuration.
    #[error("no host configuration registered for bus {bus}")]
    HostConfigurationMissing { bus: String },
    /// Declarative settings could not be parsed.
    #[error("invalid bus settings: {0}")]
    InvalidSettings(String),
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        ConfigurationError::InvalidSettings(err.to_string())
    }
}
