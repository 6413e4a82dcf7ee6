//! Core error types for Sigil.

use thiserror::Error;

/// Core error type for model and codec operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A cache mode name that does not map to a known policy.
    #[error("Unsupported cache mode: {0}")]
    UnsupportedCacheMode(String),

    /// An HTTP method name that does not map to a known verb.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Invalid data in a body or parameter.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
