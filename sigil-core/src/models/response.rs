//! Caller-facing responses.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::method::WebMethod;
use super::result::{QueryResult, TransportFailure};
use crate::error::CoreError;

// ============================================================================
// Response
// ============================================================================

/// The final outcome of a logical call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code, 0 when no response arrived.
    pub status_code: u16,
    /// HTTP reason phrase.
    pub status_description: String,
    /// Raw body.
    pub content: String,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Body length.
    pub content_length: Option<u64>,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Body decoded by the configured deserializer.
    pub entity: Option<serde_json::Value>,
    /// Why decoding failed, if it did.
    pub entity_error: Option<String>,
    /// Transport failure of the final attempt.
    pub exception: Option<TransportFailure>,
    /// True if the final attempt timed out.
    pub timed_out: bool,
    /// Total attempts, including retries.
    pub times_tried: u32,
    /// When the final attempt started.
    pub request_date: Option<DateTime<Utc>>,
    /// URI requested.
    pub request_uri: Option<String>,
    /// Method sent on the wire.
    pub request_method: Option<WebMethod>,
    /// When the final attempt completed.
    pub response_date: Option<DateTime<Utc>>,
    /// Final URI after redirects.
    pub response_uri: Option<String>,
    /// True if produced by the mock transport.
    pub is_mock: bool,
    /// True if a rate-limit rule suppressed this tick.
    pub skipped_due_to_rate_limiting: bool,
}

impl Response {
    /// Builds a response from the final attempt.
    pub fn from_result(result: QueryResult) -> Self {
        Self {
            status_code: result.status_code,
            status_description: result.status_description,
            content: result.content,
            content_type: result.content_type,
            content_length: result.content_length,
            headers: result.headers,
            entity: None,
            entity_error: None,
            exception: result.exception,
            timed_out: result.timed_out,
            times_tried: result.times_tried,
            request_date: result.request_date,
            request_uri: result.request_uri,
            request_method: result.request_method,
            response_date: result.response_date,
            response_uri: result.response_uri,
            is_mock: result.is_mock,
            skipped_due_to_rate_limiting: result.skipped,
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

    /// Converts the decoded entity into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidData`] when no entity was decoded, or
    /// [`CoreError::Serialization`] when it does not fit `T`.
    pub fn entity_as<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        let value = self.entity.clone().ok_or_else(|| {
            CoreError::InvalidData(
                self.entity_error
                    .clone()
                    .unwrap_or_else(|| "response has no entity".to_string()),
            )
        })?;
        Ok(serde_json::from_value(value)?)
    }
}

// ============================================================================
// Typed Response
// ============================================================================

/// A response paired with its entity decoded as `T`.
#[derive(Debug, Clone)]
pub struct TypedResponse<T> {
    /// The untyped response.
    pub response: Response,
    /// The decoded entity, `None` when the body was empty or undecodable.
    pub entity: Option<T>,
}

impl<T: DeserializeOwned> TypedResponse<T> {
    /// Decodes the entity of `response`.
    pub fn new(response: Response) -> Self {
        let entity = response.entity_as::<T>().ok();
        Self { response, entity }
    }
}

impl<T> Deref for TypedResponse<T> {
    type Target = Response;

    fn deref(&self) -> &Self::Target {
        &self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Status {
        id: u64,
        text: String,
    }

    #[test]
    fn test_from_result_carries_flags() {
        let result = QueryResult {
            status_code: 503,
            times_tried: 3,
            is_mock: true,
            ..QueryResult::default()
        };
        let response = Response::from_result(result);
        assert_eq!(response.status_code, 503);
        assert_eq!(response.times_tried, 3);
        assert!(response.is_mock);
        assert!(!response.is_success());
        assert!(!response.skipped_due_to_rate_limiting);
    }

    #[test]
    fn test_typed_response_decodes_entity() {
        let response = Response {
            status_code: 200,
            entity: Some(serde_json::json!({"id": 7, "text": "hi"})),
            ..Response::default()
        };
        let typed = TypedResponse::<Status>::new(response);
        assert_eq!(
            typed.entity,
            Some(Status {
                id: 7,
                text: "hi".into()
            })
        );
        assert_eq!(typed.status_code, 200);
    }

    #[test]
    fn test_entity_as_reports_decode_error() {
        let response = Response {
            entity_error: Some("expected value at line 1".into()),
            ..Response::default()
        };
        let err = response.entity_as::<Status>().unwrap_err();
        assert!(err.to_string().contains("expected value"));
    }
}
