//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sigil_core::Response;
use sigil_http::StreamEnd;

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for a completed call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOutput {
    pub status: u16,
    pub status_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub headers: Vec<HeaderOutput>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<serde_json::Value>,
    pub times_tried: u32,
    pub timed_out: bool,
    pub is_mock: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_datetime_opt")]
    pub response_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A response header.
#[derive(Debug, Serialize)]
pub struct HeaderOutput {
    pub name: String,
    pub value: String,
}

/// One stream callback.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum StreamOutput {
    /// A batch of lines.
    Batch { lines: Vec<String> },
    /// The stream ended.
    End {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Signature details for a call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOutput {
    pub flow: String,
    pub method: String,
    pub url: String,
    pub signature_method: String,
    pub signature_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    pub oauth_parameters: Vec<HeaderOutput>,
}

// ============================================================================
// Serialization helpers
// ============================================================================

#[allow(clippy::ref_option)]
fn serialize_datetime_opt<S>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match dt {
        Some(dt) => s.serialize_str(&dt.to_rfc3339()),
        None => s.serialize_none(),
    }
}

/// Short name and optional detail for a stream end.
pub fn stream_end_parts(reason: &StreamEnd) -> (&'static str, Option<String>) {
    match reason {
        StreamEnd::Closed => ("closed", None),
        StreamEnd::Elapsed => ("elapsed", None),
        StreamEnd::Cancelled => ("cancelled", None),
        StreamEnd::NonData => ("non_data", None),
        StreamEnd::Failed(failure) => ("failed", Some(failure.to_string())),
        StreamEnd::Rejected { status, .. } => ("rejected", Some(status.to_string())),
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats a response.
    pub fn format_response(&self, response: &Response) -> Result<String> {
        self.format(&Self::response_to_output(response))
    }

    /// Formats a stream batch.
    pub fn format_batch(&self, lines: &[String]) -> Result<String> {
        self.format(&StreamOutput::Batch {
            lines: lines.to_vec(),
        })
    }

    /// Formats the end of a stream.
    pub fn format_stream_end(&self, reason: &StreamEnd) -> Result<String> {
        let (reason, detail) = stream_end_parts(reason);
        self.format(&StreamOutput::End {
            reason: reason.to_string(),
            detail,
        })
    }

    /// Converts a response to output.
    pub fn response_to_output(response: &Response) -> ResponseOutput {
        ResponseOutput {
            status: response.status_code,
            status_description: response.status_description.clone(),
            method: response.request_method.map(|m| m.to_string()),
            uri: response
                .response_uri
                .clone()
                .or_else(|| response.request_uri.clone()),
            content_type: response.content_type.clone(),
            headers: response
                .headers
                .iter()
                .map(|(name, value)| HeaderOutput {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            content: response.content.clone(),
            entity: response.entity.clone(),
            times_tried: response.times_tried,
            timed_out: response.timed_out,
            is_mock: response.is_mock,
            skipped: response.skipped_due_to_rate_limiting,
            response_date: response.response_date,
            error: response
                .exception
                .as_ref()
                .map(ToString::to_string)
                .or_else(|| response.entity_error.clone()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
