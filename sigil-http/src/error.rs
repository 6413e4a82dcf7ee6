//! Engine error types.

use sigil_core::{FailureKind, TransportFailure, WebMethod};
use thiserror::Error;

// ============================================================================
// Main Client Error
// ============================================================================

/// Error type for client operations.
///
/// These errors stop a call before or outside any network attempt. Attempt
/// failures are captured on the result instead, see [`TransportError`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credentials are incomplete for the requested flow.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Core model or codec error.
    #[error("Core error: {0}")]
    Core(#[from] sigil_core::CoreError),

    /// The endpoint could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The signature could not be produced.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// A periodic task is already running for this request.
    #[error("Task already has a registered timed task")]
    TaskAlreadyRegistered,

    /// Streaming only supports GET and POST.
    #[error("Streaming is not supported for {0} requests")]
    UnsupportedStreamMethod(WebMethod),

    /// Stream options were set on a call that does not stream.
    #[error("Request has stream options; use Client::stream")]
    StreamOptionsOnPlainCall,

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A background call panicked or was aborted.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ============================================================================
// Validation Error
// ============================================================================

/// A credential field required by an OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    /// Request-token endpoint.
    RequestTokenUrl,
    /// Access-token endpoint.
    AccessTokenUrl,
    /// Consumer key.
    ConsumerKey,
    /// Consumer secret.
    ConsumerSecret,
    /// Token.
    Token,
    /// Token secret.
    TokenSecret,
    /// xAuth username and password.
    ClientCredentials,
}

impl CredentialField {
    /// Returns the field as named in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestTokenUrl => "a request token URL",
            Self::AccessTokenUrl => "an access token URL",
            Self::ConsumerKey => "a consumer key",
            Self::ConsumerSecret => "a consumer secret",
            Self::Token => "a token",
            Self::TokenSecret => "a token secret",
            Self::ClientCredentials => "user credentials",
        }
    }
}

impl std::fmt::Display for CredentialField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Credentials failed validation before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is blank.
    #[error("You must specify {0}")]
    MissingField(CredentialField),

    /// PLAINTEXT signatures would expose the secrets.
    #[error("PLAINTEXT signatures require an https URL, got {0}")]
    InsecurePlaintext(String),

    /// RSA-SHA1 was selected without a private key.
    #[error("RSA-SHA1 signatures require a private key")]
    MissingRsaKey,
}

// ============================================================================
// Transport Error
// ============================================================================

/// Error raised by a transport during one attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not connect.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The transport's own timeout fired.
    #[error("Request timed out")]
    Timeout,

    /// The request failed.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The body could not be read.
    #[error("Body error: {0}")]
    Body(String),

    /// An upload could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The mock transport could not answer.
    #[error("Mock error: {0}")]
    Mock(String),
}

impl TransportError {
    /// Converts into the failure recorded on a result.
    pub fn to_failure(&self) -> TransportFailure {
        let (kind, status) = match self {
            Self::Connect(_) => (FailureKind::Connect, None),
            Self::Timeout => (FailureKind::Timeout, None),
            Self::Request(e) if e.is_timeout() => (FailureKind::Timeout, None),
            Self::Request(e) if e.is_connect() => (FailureKind::Connect, None),
            Self::Request(e) if e.is_body() || e.is_decode() => {
                (FailureKind::Body, e.status().map(|s| s.as_u16()))
            }
            Self::Request(e) => (FailureKind::Request, e.status().map(|s| s.as_u16())),
            Self::Body(_) => (FailureKind::Body, None),
            Self::Io(_) => (FailureKind::Io, None),
            Self::Mock(_) => (FailureKind::Mock, None),
        };
        TransportFailure {
            kind,
            message: self.to_string(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = ValidationError::MissingField(CredentialField::ConsumerSecret);
        assert_eq!(err.to_string(), "You must specify a consumer secret");

        let err = ValidationError::MissingField(CredentialField::ClientCredentials);
        assert_eq!(err.to_string(), "You must specify user credentials");

        let err = ValidationError::MissingField(CredentialField::AccessTokenUrl);
        assert_eq!(err.to_string(), "You must specify an access token URL");
    }

    #[test]
    fn test_transport_error_to_failure() {
        let failure = TransportError::Timeout.to_failure();
        assert!(failure.is_timeout());

        let failure = TransportError::Mock("bad status".into()).to_failure();
        assert_eq!(failure.kind, FailureKind::Mock);
        assert!(failure.message.contains("bad status"));
    }
}
