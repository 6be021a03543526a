//! Error types for Conduit operations
//!
//! Per-call failures are never surfaced through this type: they become
//! [`ToolResult`](crate::tools::ToolResult) values carrying `is_error = true`.
//! `ConduitError` covers administrative failures only (configuration,
//! registration, shutdown).

use std::time::Duration;

use crate::tools::RegistryError;

/// Result type for Conduit operations
pub type Result<T> = std::result::Result<T, ConduitError>;

/// Error types for the Conduit runtime
#[derive(Debug, thiserror::Error)]
pub enum ConduitError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tool registration failed
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Workers did not drain before the shutdown timeout elapsed
    #[error("Executor shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for ConduitError {
    fn from(s: String) -> Self {
        ConduitError::Other(s)
    }
}

impl From<&str> for ConduitError {
    fn from(s: &str) -> Self {
        ConduitError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for ConduitError {
    fn from(err: anyhow::Error) -> Self {
        ConduitError::Other(err.to_string())
    }
}
