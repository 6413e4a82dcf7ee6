//! Attempt results.
//!
//! A [`QueryResult`] records one network attempt. Transport failures and HTTP
//! status are tracked independently: a request can time out (status 0 with a
//! failure) or succeed at the transport level with a 500.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::method::WebMethod;

// ============================================================================
// Transport Failure
// ============================================================================

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Could not connect.
    Connect,
    /// The watchdog or transport timed out.
    Timeout,
    /// The request could not be sent.
    Request,
    /// The body could not be read.
    Body,
    /// Local I/O, such as reading an upload.
    Io,
    /// The mock transport rejected the request.
    Mock,
}

/// A transport failure captured on a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
    /// Status code, if the failure carried one.
    pub status: Option<u16>,
}

impl TransportFailure {
    /// Creates a failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Creates the failure recorded when the watchdog fires.
    pub fn timeout() -> Self {
        Self::new(FailureKind::Timeout, "The request timed out")
    }

    /// Returns true for timeouts.
    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// ============================================================================
// Query Result
// ============================================================================

/// The outcome of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// HTTP status code, 0 when no response arrived.
    pub status_code: u16,
    /// HTTP reason phrase.
    pub status_description: String,
    /// Raw body.
    pub content: String,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Content-Length, or the body length when the header was absent.
    pub content_length: Option<u64>,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Transport failure, if any.
    pub exception: Option<TransportFailure>,
    /// True if the watchdog fired.
    pub timed_out: bool,
    /// Attempts made for the logical call so far.
    pub times_tried: u32,
    /// When the attempt started.
    pub request_date: Option<DateTime<Utc>>,
    /// URI the request was sent to.
    pub request_uri: Option<String>,
    /// Method sent on the wire.
    pub request_method: Option<WebMethod>,
    /// When the response completed.
    pub response_date: Option<DateTime<Utc>>,
    /// Final URI after redirects.
    pub response_uri: Option<String>,
    /// True if produced by the mock transport.
    pub is_mock: bool,
    /// True if a rate-limit rule suppressed the attempt.
    pub skipped: bool,
}

impl QueryResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the result delivered when the watchdog wins the race.
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            exception: Some(TransportFailure::timeout()),
            response_date: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Creates the result of a tick suppressed by a rate-limit rule.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Returns true for 2xx responses without a transport failure.
    pub fn is_success(&self) -> bool {
        self.exception.is_none() && (200..300).contains(&self.status_code)
    }

    /// Returns the first header value for `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_out_has_zero_status() {
        let result = QueryResult::timed_out();
        assert!(result.timed_out);
        assert_eq!(result.status_code, 0);
        assert!(result.exception.as_ref().is_some_and(TransportFailure::is_timeout));
        assert!(!result.is_success());
    }

    #[test]
    fn test_success_requires_no_exception() {
        let mut result = QueryResult {
            status_code: 200,
            ..QueryResult::default()
        };
        assert!(result.is_success());

        result.exception = Some(TransportFailure::new(FailureKind::Body, "truncated"));
        assert!(!result.is_success());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let result = QueryResult {
            headers: vec![("Content-Type".into(), "text/plain".into())],
            ..QueryResult::default()
        };
        assert_eq!(result.header("content-type"), Some("text/plain"));
        assert_eq!(result.header("x-missing"), None);
    }
}
