//! Transports.
//!
//! A [`Transport`] moves one fully shaped [`WireRequest`] over the network
//! and hands back either a buffered [`WireResponse`] or a line-oriented
//! [`WireStream`]. The client owns a [`TransportSet`] built once at
//! construction; `mock://` URLs are routed to the [`MockTransport`], and
//! everything else goes to the primary transport.
//!
//! - [`http`] - `reqwest`-backed transport
//! - [`mock`] - Answers from expectations encoded in the URL

pub mod http;
pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use sigil_core::models::MOCK_SCHEME;
use sigil_core::{FilePart, WebMethod};
use url::Url;

use crate::error::TransportError;
use crate::query::Query;

pub use http::{DEFAULT_USER_AGENT, HttpTransport};
pub use mock::MockTransport;

// ============================================================================
// Wire Types
// ============================================================================

/// A request ready to send.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method.
    pub method: WebMethod,
    /// Full URL, query included.
    pub url: Url,
    /// Headers in send order.
    pub headers: Vec<(String, String)>,
    /// Body.
    pub body: WireBody,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Follow redirects.
    pub follow_redirects: bool,
}

impl WireRequest {
    /// Returns the first header value for `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WireBody {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes with their content type.
    Bytes {
        /// Body bytes.
        content: Vec<u8>,
        /// Content-Type header value.
        content_type: String,
    },
    /// A multipart form.
    Multipart(MultipartBody),
}

/// Parts of a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    /// Text fields.
    pub fields: Vec<(String, String)>,
    /// File parts, read when the body is sent.
    pub files: Vec<FilePart>,
    /// Raw bytes sent as an `application/octet-stream` part named `content`.
    pub content: Option<Vec<u8>>,
}

/// A buffered response.
#[derive(Debug, Clone, Default)]
pub struct WireResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Headers.
    pub headers: Vec<(String, String)>,
    /// Body text.
    pub body: String,
    /// Final URL.
    pub url: String,
    /// True if produced by the mock transport.
    pub is_mock: bool,
}

/// Lines read from a streaming body.
pub type LineStream = BoxStream<'static, Result<String, TransportError>>;

/// An open streaming response.
pub struct WireStream {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Headers.
    pub headers: Vec<(String, String)>,
    /// Final URL.
    pub url: String,
    /// True if produced by the mock transport.
    pub is_mock: bool,
    /// Body lines, without terminators.
    pub lines: LineStream,
}

impl fmt::Debug for WireStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireStream")
            .field("status", &self.status)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Sends wire requests.
///
/// Non-2xx statuses are not errors; errors are reserved for requests that
/// produced no response at all.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and buffers the whole body.
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;

    /// Sends the request and returns the body as a line stream.
    async fn open_stream(&self, request: WireRequest) -> Result<WireStream, TransportError>;
}

// ============================================================================
// Transport Set
// ============================================================================

/// The transports a client routes between.
#[derive(Clone)]
pub struct TransportSet {
    primary: Arc<dyn Transport>,
    mock: Arc<dyn Transport>,
}

impl TransportSet {
    /// Pairs a primary transport with the mock transport.
    pub fn new(primary: Arc<dyn Transport>) -> Self {
        Self {
            primary,
            mock: Arc::new(MockTransport::new()),
        }
    }

    /// Returns the transport responsible for `url`.
    pub fn for_url(&self, url: &Url) -> Arc<dyn Transport> {
        if url.scheme() == MOCK_SCHEME {
            Arc::clone(&self.mock)
        } else {
            Arc::clone(&self.primary)
        }
    }

    /// Returns the transport responsible for `query`.
    ///
    /// Queries carrying mock control parameters are rewritten to `mock://`
    /// on the wire, so they go to the mock transport.
    pub fn for_query(&self, query: &Query) -> Arc<dyn Transport> {
        if query.mock.is_some() {
            Arc::clone(&self.mock)
        } else {
            Arc::clone(&self.primary)
        }
    }
}

impl fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSet").finish_non_exhaustive()
    }
}
