//! Store error types.

use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown settings key.
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    /// A setting value could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    Parse {
        /// Setting name.
        key: String,
        /// What was wrong.
        message: String,
    },

    /// Keychain access failed.
    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),
}

impl StoreError {
    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Keychain(keyring::Error::PlatformFailure(_))
        )
    }

    pub(crate) fn parse(key: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
