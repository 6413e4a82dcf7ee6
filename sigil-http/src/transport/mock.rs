//! Mock transport.
//!
//! Answers `mock://` requests from the control parameters the query
//! appended to the URL, without touching the network.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::StatusCode;
use sigil_core::models::expectations::keys;
use tracing::debug;
use url::Url;

use super::{Transport, WireRequest, WireResponse, WireStream};
use crate::error::TransportError;

const DEFAULT_SCHEME: &str = "http";

/// Transport that replays expectations encoded in the URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTransport;

impl MockTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }

    fn answer(request: &WireRequest) -> Result<WireResponse, TransportError> {
        let control = |key: &str| {
            request
                .url
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };

        let status = match control(keys::STATUS_CODE) {
            Some(code) => code
                .parse::<u16>()
                .map_err(|_| TransportError::Mock(format!("invalid status code '{code}'")))?,
            None => 200,
        };
        let reason = control(keys::STATUS_DESCRIPTION).unwrap_or_else(|| {
            StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string()
        });

        let mut headers = Vec::new();
        if let Some(content_type) = control(keys::CONTENT_TYPE) {
            headers.push(("Content-Type".to_string(), content_type));
        }
        let repeated = |key: &str| -> Vec<String> {
            request
                .url
                .query_pairs()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .collect()
        };
        headers.extend(
            repeated(keys::HEADER_NAMES)
                .into_iter()
                .zip(repeated(keys::HEADER_VALUES)),
        );

        let scheme = control(keys::SCHEME).unwrap_or_else(|| DEFAULT_SCHEME.to_string());
        Ok(WireResponse {
            status,
            reason,
            headers,
            body: control(keys::CONTENT).unwrap_or_default(),
            url: original_url(&request.url, &scheme),
            is_mock: true,
        })
    }
}

/// Restores the requested scheme and strips the control parameters.
fn original_url(url: &Url, scheme: &str) -> String {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !keys::is_mock_key(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut clean = url.clone();
    clean.set_query(None);
    if !kept.is_empty() {
        clean.query_pairs_mut().extend_pairs(kept);
    }

    let rest = &clean.as_str()[clean.scheme().len()..];
    format!("{scheme}{rest}")
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let response = Self::answer(&request)?;
        debug!(status = response.status, url = %response.url, "Mock response");
        Ok(response)
    }

    async fn open_stream(&self, request: WireRequest) -> Result<WireStream, TransportError> {
        let response = Self::answer(&request)?;
        let lines: Vec<Result<String, TransportError>> =
            response.body.lines().map(|l| Ok(l.to_string())).collect();

        debug!(status = response.status, lines = lines.len(), "Mock stream");
        Ok(WireStream {
            status: response.status,
            reason: response.reason,
            headers: response.headers,
            url: response.url,
            is_mock: true,
            lines: stream::iter(lines).boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::WireBody;
    use sigil_core::WebMethod;

    fn request(url: &str) -> WireRequest {
        WireRequest {
            method: WebMethod::Get,
            url: Url::parse(url).unwrap(),
            headers: Vec::new(),
            body: WireBody::Empty,
            proxy: None,
            follow_redirects: true,
        }
    }

    #[tokio::test]
    async fn test_answers_from_control_parameters() {
        let response = MockTransport::new()
            .send(request(
                "mock://api.example.com/items?page=2&mockScheme=https&mockStatusCode=201\
                 &mockContent=%7B%22ok%22%3Atrue%7D&mockContentType=application%2Fjson\
                 &mockHeaderNames=X-A&mockHeaderValues=1\
                 &mockHeaderNames=Cache-Control&mockHeaderValues=no-cache%2C%20no-store",
            ))
            .await
            .unwrap();

        assert!(response.is_mock);
        assert_eq!(response.status, 201);
        assert_eq!(response.reason, "Created");
        assert_eq!(response.body, r#"{"ok":true}"#);
        assert_eq!(response.url, "https://api.example.com/items?page=2");
        assert!(response.headers.contains(&("X-A".into(), "1".into())));
        assert!(
            response
                .headers
                .contains(&("Cache-Control".into(), "no-cache, no-store".into()))
        );
        assert!(
            response
                .headers
                .contains(&("Content-Type".into(), "application/json".into()))
        );
    }

    #[tokio::test]
    async fn test_defaults_to_ok() {
        let response = MockTransport::new()
            .send(request("mock://api.example.com/"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert!(response.body.is_empty());
        assert_eq!(response.url, "http://api.example.com/");
    }

    #[tokio::test]
    async fn test_invalid_status_is_error() {
        let err = MockTransport::new()
            .send(request("mock://api.example.com/?mockStatusCode=abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Mock(_)));
    }

    #[tokio::test]
    async fn test_stream_splits_lines() {
        let stream = MockTransport::new()
            .open_stream(request("mock://h/s?mockContent=a%0Ab%0Ac"))
            .await
            .unwrap();
        let lines: Vec<String> = stream.lines.map(Result::unwrap).collect().await;
        assert_eq!(lines, vec!["a", "b", "c"]);
    }
}
