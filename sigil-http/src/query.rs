//! Queries.
//!
//! A [`Query`] is one prepared call: merged parameters and headers, the
//! resolved method, authentication material, and the body. It knows how to
//! place all of that on the wire and how to run a single attempt against a
//! [`Transport`], racing it against a watchdog timer.
//!
//! ## Parameter Placement
//!
//! - GET/DELETE/HEAD/OPTIONS: every parameter goes in the query string
//! - POST/PUT: parameters are form-encoded into the body
//! - With an entity or raw content: that is the body, parameters go in the URL
//! - Multipart: parameters become text fields next to the files
//!
//! OAuth protocol parameters follow the same rules under
//! [`ParameterHandling::UrlOrPostParameters`], and travel in the
//! `Authorization` header otherwise.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use sigil_core::{
    Cache, Expiration, PostParameter, QueryResult, StreamOptions, TransportFailure, WebMethod,
    WebParameter, WebParameterCollection,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::encoding::{query_pairs, url_encode};
use crate::auth::{AuthInfo, OAuthWorkflow, ParameterHandling, SignatureTreatment};
use crate::error::ClientError;
use crate::transport::{LineStream, MultipartBody, Transport, WireBody, WireRequest, WireResponse};

/// Watchdog timeout when neither the request nor the client sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const OCTET_STREAM: &str = "application/octet-stream";

// ============================================================================
// Query Parts
// ============================================================================

/// Authentication material carried by a query.
#[derive(Debug, Clone, Default)]
pub enum QueryAuth {
    /// Unauthenticated.
    #[default]
    None,
    /// A literal `Authorization` header value.
    Header(String),
    /// An OAuth signature.
    OAuth {
        /// The current signature.
        info: AuthInfo,
        /// Kept for protected resources, which re-sign before every attempt.
        workflow: Option<OAuthWorkflow>,
    },
}

/// A serialized entity body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedEntity {
    /// Body text.
    pub content: String,
    /// Content type reported by the serializer.
    pub content_type: String,
}

/// Where and how a successful body is cached.
#[derive(Clone)]
pub struct CacheStore {
    /// Target cache.
    pub cache: Arc<dyn Cache>,
    /// Resolved key.
    pub key: String,
    /// Resolved expiration.
    pub expiration: Expiration,
}

impl CacheStore {
    fn store(&self, content: &str) {
        self.cache
            .insert(&self.key, content.to_string(), self.expiration);
        debug!(key = %self.key, expiration = ?self.expiration, "Stored response in cache");
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("key", &self.key)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Attempt Signal
// ============================================================================

/// One-shot completion shared by the transport task and the watchdog.
///
/// Whichever side calls [`complete`](Self::complete) first delivers its
/// result; the other side's call is a no-op.
struct AttemptSignal {
    completed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<QueryResult>>>,
}

impl AttemptSignal {
    fn new() -> (Arc<Self>, oneshot::Receiver<QueryResult>) {
        let (sender, receiver) = oneshot::channel();
        let signal = Self {
            completed: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        };
        (Arc::new(signal), receiver)
    }

    fn complete(&self, result: QueryResult) -> bool {
        if self
            .completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if let Some(sender) = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = sender.send(result);
        }
        true
    }
}

// ============================================================================
// Stream Events
// ============================================================================

/// Why a stream stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    /// The server closed the connection.
    Closed,
    /// The duration budget ran out.
    Elapsed,
    /// The caller cancelled.
    Cancelled,
    /// The non-data detector matched a line.
    NonData,
    /// The transport failed.
    Failed(TransportFailure),
    /// The server answered with a non-2xx status.
    Rejected {
        /// Status code.
        status: u16,
    },
}

/// Something delivered to a streaming callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A batch of non-blank lines.
    Batch {
        /// Lines in arrival order.
        lines: Vec<String>,
    },
    /// The stream ended; always the last event.
    End {
        /// Why.
        reason: StreamEnd,
    },
}

// ============================================================================
// Query
// ============================================================================

/// One prepared call.
#[derive(Debug, Clone)]
pub struct Query {
    /// Endpoint without query string.
    pub url: Url,
    /// Method.
    pub method: WebMethod,
    /// Parameters, including those folded in from the endpoint's query.
    pub parameters: WebParameterCollection,
    /// Headers.
    pub headers: Vec<(String, String)>,
    /// Authentication.
    pub auth: QueryAuth,
    /// Serialized entity.
    pub entity: Option<SerializedEntity>,
    /// Raw body bytes.
    pub post_content: Option<Vec<u8>>,
    /// Multipart fields and files.
    pub post_parameters: Vec<PostParameter>,
    /// User agent.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Watchdog timeout.
    pub timeout: Duration,
    /// Mock control parameters; routes the call to the mock transport.
    pub mock: Option<WebParameterCollection>,
    /// Result of the latest attempt.
    pub result: QueryResult,
}

impl Query {
    /// Creates a query for `url`.
    ///
    /// The URL's own query parameters are moved into the parameter set.
    pub fn new(url: &Url, method: WebMethod, parameters: WebParameterCollection) -> Self {
        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);

        let mut merged: WebParameterCollection = query_pairs(url).into_iter().collect();
        merged.extend(parameters.iter().map(|p| (p.name.clone(), p.value.clone())));

        Self {
            url: base,
            method,
            parameters: merged,
            headers: Vec::new(),
            auth: QueryAuth::None,
            entity: None,
            post_content: None,
            post_parameters: Vec::new(),
            user_agent: None,
            proxy: None,
            follow_redirects: true,
            timeout: DEFAULT_TIMEOUT,
            mock: None,
            result: QueryResult::new(),
        }
    }

    /// Attaches an OAuth signature.
    #[must_use]
    pub fn with_oauth(mut self, info: AuthInfo, workflow: Option<OAuthWorkflow>) -> Self {
        self.auth = QueryAuth::OAuth { info, workflow };
        self
    }

    /// Attaches a literal `Authorization` header value.
    #[must_use]
    pub fn with_authorization_header(mut self, value: impl Into<String>) -> Self {
        self.auth = QueryAuth::Header(value.into());
        self
    }

    /// Attaches mock control parameters.
    #[must_use]
    pub fn with_mock(mut self, control: WebParameterCollection) -> Self {
        self.mock = Some(control);
        self
    }

    /// Returns true if the call uploads multipart content.
    pub fn is_multipart(&self) -> bool {
        !self.post_parameters.is_empty()
    }

    /// Returns the method the wire request is sent with.
    ///
    /// Multipart uploads go out as POST unless the query is a PUT.
    pub fn wire_method(&self) -> WebMethod {
        if self.is_multipart() {
            self.method.for_upload()
        } else {
            self.method
        }
    }

    // ------------------------------------------------------------------------
    // Signing
    // ------------------------------------------------------------------------

    /// Re-signs a protected-resource query with a fresh timestamp and nonce.
    ///
    /// The signature covers [`wire_method`](Self::wire_method), so an upload
    /// is signed as the POST it is sent as. Other queries are left as they are.
    ///
    /// # Errors
    ///
    /// Returns the workflow's validation or signing error.
    pub fn resign(&mut self) -> Result<(), ClientError> {
        let method = self.wire_method();
        if let QueryAuth::OAuth {
            info,
            workflow: Some(workflow),
        } = &mut self.auth
        {
            *info = workflow.build_protected_resource_info(method, &self.parameters, &self.url)?;
        }
        Ok(())
    }

    /// Returns the `Authorization` header value, if the query sends one.
    pub fn authorization_header(&self) -> Option<String> {
        match &self.auth {
            QueryAuth::None => None,
            QueryAuth::Header(value) => Some(value.clone()),
            QueryAuth::OAuth { info, .. }
                if info.parameter_handling == ParameterHandling::HttpAuthorizationHeader =>
            {
                Some(oauth_header(
                    &self.protocol_parameters(),
                    info.realm.as_deref(),
                    info.signature_treatment,
                ))
            }
            QueryAuth::OAuth { .. } => None,
        }
    }

    fn signature_treatment(&self) -> SignatureTreatment {
        match &self.auth {
            QueryAuth::OAuth { info, .. } => info.signature_treatment,
            _ => SignatureTreatment::Escaped,
        }
    }

    fn oauth_in_header(&self) -> bool {
        matches!(
            &self.auth,
            QueryAuth::OAuth { info, .. }
                if info.parameter_handling == ParameterHandling::HttpAuthorizationHeader
        )
    }

    /// `oauth_*` parameters of the call; the signature's own win by name.
    fn protocol_parameters(&self) -> WebParameterCollection {
        let QueryAuth::OAuth { info, .. } = &self.auth else {
            return WebParameterCollection::new();
        };
        let mut protocol: WebParameterCollection = self
            .parameters
            .oauth()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        let signed: WebParameterCollection = info
            .parameters
            .oauth()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        protocol.merge(&signed);
        protocol
    }

    /// Everything except `oauth_*`: request parameters plus xAuth fields.
    fn regular_parameters(&self) -> Vec<WebParameter> {
        let QueryAuth::OAuth { info, .. } = &self.auth else {
            return self.parameters.iter().cloned().collect();
        };
        self.parameters
            .non_oauth()
            .chain(info.parameters.non_oauth())
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------------
    // Wire
    // ------------------------------------------------------------------------

    /// Places parameters, headers, and body on a wire request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the mock rewrite produces an
    /// unparseable URL.
    pub fn build_wire_request(&self) -> Result<WireRequest, ClientError> {
        let treatment = self.signature_treatment();
        let mut parameters = self.regular_parameters();
        if !self.oauth_in_header() {
            parameters.extend(self.protocol_parameters().iter().cloned());
        }

        let mut headers: Vec<(String, String)> = self.headers.clone();
        let content_type = take_header(&mut headers, "Content-Type");
        if let Some(authorization) = self.authorization_header() {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Authorization"));
            headers.push(("Authorization".to_string(), authorization));
        }
        if let Some(user_agent) = &self.user_agent {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("User-Agent"));
            headers.push(("User-Agent".to_string(), user_agent.clone()));
        }

        let method = self.wire_method();
        let mut query = String::new();
        let body = if self.is_multipart() {
            WireBody::Multipart(self.multipart_body(&parameters))
        } else if let Some(entity) = &self.entity {
            query = encode_pairs(&parameters, treatment);
            WireBody::Bytes {
                content: entity.content.clone().into_bytes(),
                content_type: content_type.unwrap_or_else(|| entity.content_type.clone()),
            }
        } else if let Some(content) = self.post_content.as_ref().filter(|_| method.carries_body()) {
            query = encode_pairs(&parameters, treatment);
            WireBody::Bytes {
                content: content.clone(),
                content_type: content_type.unwrap_or_else(|| OCTET_STREAM.to_string()),
            }
        } else if method.carries_body() {
            if parameters.is_empty() {
                WireBody::Empty
            } else {
                WireBody::Bytes {
                    content: encode_pairs(&parameters, treatment).into_bytes(),
                    content_type: content_type.unwrap_or_else(|| FORM_CONTENT_TYPE.to_string()),
                }
            }
        } else {
            query = encode_pairs(&parameters, treatment);
            WireBody::Empty
        };

        let mut url = self.url.clone();
        if let Some(control) = &self.mock {
            let control: Vec<WebParameter> = control.iter().cloned().collect();
            let control = encode_pairs(&control, SignatureTreatment::Escaped);
            if !control.is_empty() {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&control);
            }
        }
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        if self.mock.is_some() {
            url = to_mock_url(&url)?;
        }

        Ok(WireRequest {
            method,
            url,
            headers,
            body,
            proxy: self.proxy.clone(),
            follow_redirects: self.follow_redirects,
        })
    }

    fn multipart_body(&self, parameters: &[WebParameter]) -> MultipartBody {
        let mut body = MultipartBody {
            fields: parameters
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
            files: Vec::new(),
            content: self.post_content.clone(),
        };
        for part in &self.post_parameters {
            match part {
                PostParameter::Field { name, value } => body.fields.push((name.clone(), value.clone())),
                PostParameter::File(file) => body.files.push(file.clone()),
            }
        }
        body
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Runs one attempt, racing the transport against the watchdog.
    ///
    /// Exactly one result is delivered. If the watchdog wins, the transport
    /// task is aborted and the result has `timed_out` set and status 0. A
    /// successful body is written to `store` before the result is delivered.
    ///
    /// # Errors
    ///
    /// Returns an error only if the wire request cannot be built; transport
    /// failures are recorded on the result.
    #[instrument(skip(self, transport, store), fields(method = %self.method, url = %self.url))]
    pub async fn execute(
        &mut self,
        transport: Arc<dyn Transport>,
        store: Option<CacheStore>,
    ) -> Result<QueryResult, ClientError> {
        let wire = self.build_wire_request()?;
        let request_date = Utc::now();
        let request_uri = wire.url.to_string();
        let request_method = wire.method;
        let (signal, receiver) = AttemptSignal::new();

        let io_signal = Arc::clone(&signal);
        let io = tokio::spawn(async move {
            let result = match transport.send(wire).await {
                Ok(response) => result_from_response(response),
                Err(e) => {
                    warn!(error = %e, "Attempt failed");
                    QueryResult {
                        exception: Some(e.to_failure()),
                        response_date: Some(Utc::now()),
                        ..QueryResult::default()
                    }
                }
            };
            if let Some(store) = store.as_ref().filter(|_| result.is_success()) {
                store.store(&result.content);
            }
            io_signal.complete(result);
        });

        let timeout = self.timeout;
        let abort = io.abort_handle();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if signal.complete(QueryResult::timed_out()) {
                abort.abort();
                warn!(timeout_secs = timeout.as_secs_f64(), "Attempt timed out");
            }
        });

        let mut result = receiver.await.unwrap_or_else(|_| QueryResult {
            exception: Some(TransportFailure::new(
                sigil_core::FailureKind::Request,
                "attempt abandoned",
            )),
            ..QueryResult::default()
        });
        watchdog.abort();

        result.request_date = Some(request_date);
        result.request_uri = Some(request_uri);
        result.request_method = Some(request_method);
        debug!(
            status = result.status_code,
            timed_out = result.timed_out,
            failed = result.exception.is_some(),
            "Attempt complete"
        );

        self.result = result.clone();
        Ok(result)
    }

    /// Reads the response body line by line, delivering batches.
    ///
    /// Blank lines are skipped. Pending lines are always flushed before the
    /// final [`StreamEvent::End`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnsupportedStreamMethod`] for methods other
    /// than GET and POST, or a wire-building error; both before any I/O.
    #[instrument(skip_all, fields(method = %self.method, url = %self.url))]
    pub async fn stream<F>(
        &mut self,
        transport: Arc<dyn Transport>,
        options: &StreamOptions,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<StreamEnd, ClientError>
    where
        F: FnMut(StreamEvent),
    {
        if !matches!(self.method, WebMethod::Get | WebMethod::Post) {
            return Err(ClientError::UnsupportedStreamMethod(self.method));
        }
        let wire = self.build_wire_request()?;
        self.result = QueryResult {
            request_date: Some(Utc::now()),
            request_uri: Some(wire.url.to_string()),
            request_method: Some(wire.method),
            ..QueryResult::default()
        };

        // The budget covers connecting as well as reading.
        let deadline = options
            .duration
            .map(|budget| tokio::time::Instant::now() + budget);
        let mut pending = Vec::with_capacity(options.results_per_callback);
        let end = tokio::select! {
            () = cancel.cancelled() => StreamEnd::Cancelled,
            () = sleep_until(deadline) => StreamEnd::Elapsed,
            opened = transport.open_stream(wire) => match opened {
                Err(e) => StreamEnd::Failed(e.to_failure()),
                Ok(stream) => {
                    self.result.status_code = stream.status;
                    self.result.status_description = stream.reason;
                    self.result.headers = stream.headers;
                    self.result.response_uri = Some(stream.url);
                    self.result.is_mock = stream.is_mock;
                    if (200..300).contains(&stream.status) {
                        read_lines(stream.lines, options, deadline, cancel, &mut pending, &mut on_event)
                            .await
                    } else {
                        StreamEnd::Rejected { status: stream.status }
                    }
                }
            },
        };

        if !pending.is_empty() {
            on_event(StreamEvent::Batch {
                lines: mem::take(&mut pending),
            });
        }
        self.result.response_date = Some(Utc::now());
        if let StreamEnd::Failed(failure) = &end {
            self.result.exception = Some(failure.clone());
        }

        debug!(reason = ?end, "Stream ended");
        on_event(StreamEvent::End { reason: end.clone() });
        Ok(end)
    }
}

async fn read_lines<F>(
    mut lines: LineStream,
    options: &StreamOptions,
    deadline: Option<tokio::time::Instant>,
    cancel: &CancellationToken,
    pending: &mut Vec<String>,
    on_event: &mut F,
) -> StreamEnd
where
    F: FnMut(StreamEvent),
{
    let per_callback = options.results_per_callback.max(1);

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return StreamEnd::Cancelled,
            () = sleep_until(deadline) => return StreamEnd::Elapsed,
            next = lines.next() => next,
        };

        match next {
            None => return StreamEnd::Closed,
            Some(Err(e)) => return StreamEnd::Failed(e.to_failure()),
            Some(Ok(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if (options.non_data_detector)(&line) {
                    return StreamEnd::NonData;
                }
                pending.push(line);
                if pending.len() >= per_callback {
                    on_event(StreamEvent::Batch {
                        lines: mem::take(pending),
                    });
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Merging
// ============================================================================

/// Merges client defaults with request parameters; the request wins by name.
pub fn merge_parameters(
    client: &WebParameterCollection,
    request: &WebParameterCollection,
) -> WebParameterCollection {
    let mut merged = client.clone();
    merged.merge(request);
    merged
}

/// Merges client default headers with request headers; the request wins by
/// name, ignoring case.
pub fn merge_headers(
    client: &[(String, String)],
    request: &[(String, String)],
) -> Vec<(String, String)> {
    client
        .iter()
        .filter(|(name, _)| !request.iter().any(|(r, _)| r.eq_ignore_ascii_case(name)))
        .chain(request)
        .cloned()
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn take_header(headers: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let position = headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
    Some(headers.remove(position).1)
}

fn encode_value(parameter: &WebParameter, treatment: SignatureTreatment) -> String {
    if treatment == SignatureTreatment::Unescaped && parameter.name == "oauth_signature" {
        parameter.value.clone()
    } else {
        url_encode(&parameter.value)
    }
}

fn encode_pairs(parameters: &[WebParameter], treatment: SignatureTreatment) -> String {
    parameters
        .iter()
        .map(|p| format!("{}={}", url_encode(&p.name), encode_value(p, treatment)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Formats `OAuth realm="...", oauth_a="...", ...`.
fn oauth_header(
    protocol: &WebParameterCollection,
    realm: Option<&str>,
    treatment: SignatureTreatment,
) -> String {
    let mut parameters: Vec<&WebParameter> =
        protocol.oauth().filter(|p| !p.value.is_empty()).collect();
    parameters.sort_by(|a, b| a.name.cmp(&b.name));

    let mut parts = Vec::with_capacity(parameters.len() + 1);
    if let Some(realm) = realm.filter(|r| !r.trim().is_empty()) {
        parts.push(format!("realm=\"{}\"", url_encode(realm)));
    }
    parts.extend(
        parameters
            .iter()
            .map(|p| format!("{}=\"{}\"", p.name, encode_value(p, treatment))),
    );
    format!("OAuth {}", parts.join(", "))
}

fn to_mock_url(url: &Url) -> Result<Url, ClientError> {
    let rest = &url.as_str()[url.scheme().len()..];
    Ok(Url::parse(&format!(
        "{}{rest}",
        sigil_core::models::MOCK_SCHEME
    ))?)
}

fn result_from_response(response: WireResponse) -> QueryResult {
    let header = |name: &str| {
        response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };
    let content_type = header("Content-Type");
    let content_length = header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .or(Some(response.body.len() as u64));

    QueryResult {
        status_code: response.status,
        status_description: response.reason,
        content_type,
        content_length,
        content: response.body,
        headers: response.headers,
        response_date: Some(Utc::now()),
        response_uri: Some(response.url),
        is_mock: response.is_mock,
        ..QueryResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OAuthCredentials, Stamp};
    use crate::error::TransportError;
    use crate::transport::{MockTransport, WireStream};
    use async_trait::async_trait;
    use sigil_core::FilePart;
    use std::sync::atomic::AtomicU32;

    fn signed_query(method: WebMethod, handling: ParameterHandling) -> Query {
        let credentials = OAuthCredentials::protected_resource("ck", "cs", "tk", "ts")
            .with_parameter_handling(handling);
        let url = Url::parse("https://api.example.com/1/items?x=1").unwrap();
        let params: WebParameterCollection = [("status", "a b")].into_iter().collect();
        let mut workflow = credentials.workflow();
        workflow.stamp = Some(Stamp::new("1700000000", "abcdef"));
        let info = workflow
            .build_protected_resource_info(method, &params, &url)
            .unwrap();
        Query::new(&url, method, params).with_oauth(info, Some(workflow))
    }

    #[test]
    fn test_new_folds_url_query() {
        let url = Url::parse("https://h/p?a=1&b=two#frag").unwrap();
        let query = Query::new(&url, WebMethod::Get, WebParameterCollection::new());
        assert_eq!(query.url.as_str(), "https://h/p");
        assert_eq!(query.parameters.get("a"), Some("1"));
        assert_eq!(query.parameters.get("b"), Some("two"));
    }

    #[test]
    fn test_authorization_header_format() {
        let query = signed_query(WebMethod::Get, ParameterHandling::HttpAuthorizationHeader);
        let header = query.authorization_header().unwrap();

        assert!(header.starts_with("OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"abcdef\""));
        assert!(header.contains("oauth_token=\"tk\""));
        assert!(header.contains("oauth_signature=\""));
        assert!(!header.contains("realm"));
        assert!(!header.ends_with(','));

        let names: Vec<&str> = header["OAuth ".len()..]
            .split(", ")
            .map(|p| p.split('=').next().unwrap())
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_realm_leads_header() {
        let mut query = signed_query(WebMethod::Get, ParameterHandling::HttpAuthorizationHeader);
        if let QueryAuth::OAuth { info, .. } = &mut query.auth {
            info.realm = Some("Photos".into());
        }
        assert!(
            query
                .authorization_header()
                .unwrap()
                .starts_with("OAuth realm=\"Photos\", oauth_consumer_key=")
        );
    }

    #[test]
    fn test_get_header_mode_keeps_oauth_out_of_url() {
        let query = signed_query(WebMethod::Get, ParameterHandling::HttpAuthorizationHeader);
        let wire = query.build_wire_request().unwrap();

        let url = wire.url.as_str();
        assert!(url.starts_with("https://api.example.com/1/items?"));
        assert!(url.contains("x=1"));
        assert!(url.contains("status=a%20b"));
        assert!(!url.contains("oauth_"));
        assert!(wire.header("Authorization").unwrap().starts_with("OAuth "));
        assert_eq!(wire.body, WireBody::Empty);
    }

    #[test]
    fn test_post_url_mode_puts_everything_in_body() {
        let query = signed_query(WebMethod::Post, ParameterHandling::UrlOrPostParameters);
        let wire = query.build_wire_request().unwrap();

        assert!(wire.header("Authorization").is_none());
        assert!(wire.url.query().is_none());
        let WireBody::Bytes {
            content,
            content_type,
        } = wire.body
        else {
            panic!("expected form body");
        };
        let body = String::from_utf8(content).unwrap();
        assert_eq!(content_type, FORM_CONTENT_TYPE);
        assert!(body.contains("status=a%20b"));
        assert!(body.contains("oauth_signature="));
        assert!(body.contains("oauth_consumer_key=ck"));
    }

    #[test]
    fn test_unescaped_signature_is_raw() {
        let mut query = signed_query(WebMethod::Get, ParameterHandling::UrlOrPostParameters);
        if let QueryAuth::OAuth { info, .. } = &mut query.auth {
            info.signature_treatment = SignatureTreatment::Unescaped;
            info.parameters.set("oauth_signature", "a+b/c=");
        }
        let wire = query.build_wire_request().unwrap();
        assert!(wire.url.as_str().contains("oauth_signature=a+b/c="));
    }

    #[test]
    fn test_entity_moves_parameters_to_url() {
        let url = Url::parse("https://h/items").unwrap();
        let mut query = Query::new(&url, WebMethod::Put, [("v", "2")].into_iter().collect());
        query.entity = Some(SerializedEntity {
            content: r#"{"a":1}"#.into(),
            content_type: "application/json".into(),
        });

        let wire = query.build_wire_request().unwrap();
        assert_eq!(wire.url.as_str(), "https://h/items?v=2");
        assert_eq!(
            wire.body,
            WireBody::Bytes {
                content: br#"{"a":1}"#.to_vec(),
                content_type: "application/json".into(),
            }
        );
    }

    #[test]
    fn test_multipart_forces_post_unless_put() {
        let url = Url::parse("https://h/upload").unwrap();
        let mut query = Query::new(&url, WebMethod::Get, [("album", "1")].into_iter().collect());
        query.post_parameters = vec![
            PostParameter::field("caption", "cat"),
            PostParameter::File(FilePart::new("photo", "/tmp/cat.jpg")),
        ];
        query.post_content = Some(b"raw".to_vec());

        let wire = query.build_wire_request().unwrap();
        assert_eq!(wire.method, WebMethod::Post);
        let WireBody::Multipart(body) = &wire.body else {
            panic!("expected multipart body");
        };
        assert!(body.fields.contains(&("album".into(), "1".into())));
        assert!(body.fields.contains(&("caption".into(), "cat".into())));
        assert_eq!(body.files.len(), 1);
        assert_eq!(body.content.as_deref(), Some(&b"raw"[..]));

        query.method = WebMethod::Put;
        assert_eq!(query.build_wire_request().unwrap().method, WebMethod::Put);
    }

    #[test]
    fn test_upload_signed_with_sent_method() {
        let mut query = signed_query(WebMethod::Get, ParameterHandling::HttpAuthorizationHeader);
        query.post_parameters = vec![PostParameter::File(FilePart::new("photo", "/tmp/cat.jpg"))];
        query.resign().unwrap();

        let wire = query.build_wire_request().unwrap();
        assert_eq!(wire.method, WebMethod::Post);
        let QueryAuth::OAuth { info, .. } = &query.auth else {
            panic!("expected OAuth query");
        };
        assert_eq!(info.method, wire.method);
        assert!(info.signature_base.starts_with("POST&"));
    }

    #[test]
    fn test_mock_rewrites_scheme_and_appends_control() {
        let url = Url::parse("https://api.example.com/items").unwrap();
        let control: WebParameterCollection =
            [("mockScheme", "https"), ("mockStatusCode", "204")].into_iter().collect();
        let query = Query::new(&url, WebMethod::Post, [("a", "1")].into_iter().collect())
            .with_mock(control);

        let wire = query.build_wire_request().unwrap();
        assert_eq!(wire.url.scheme(), "mock");
        assert!(wire.url.as_str().contains("mockStatusCode=204"));
        assert!(!wire.url.as_str().contains("a=1"));
    }

    #[test]
    fn test_resign_changes_nonce() {
        let mut query = signed_query(WebMethod::Get, ParameterHandling::HttpAuthorizationHeader);
        if let QueryAuth::OAuth {
            workflow: Some(workflow),
            ..
        } = &mut query.auth
        {
            workflow.stamp = None;
        }
        let before = query.authorization_header().unwrap();
        query.resign().unwrap();
        let after = query.authorization_header().unwrap();
        assert_ne!(before, after);
        assert!(!after.contains("oauth_nonce=\"abcdef\""));
    }

    #[test]
    fn test_merge_request_wins() {
        let client: WebParameterCollection = [("a", "1"), ("b", "1")].into_iter().collect();
        let request: WebParameterCollection = [("b", "2")].into_iter().collect();
        let merged = merge_parameters(&client, &request);
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("2"));

        let headers = merge_headers(
            &[("Accept".into(), "text/plain".into())],
            &[("accept".into(), "application/json".into())],
        );
        assert_eq!(headers, vec![("accept".into(), "application/json".into())]);
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    struct HangingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for HangingTransport {
        async fn send(&self, _request: WireRequest) -> Result<WireResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn open_stream(&self, _request: WireRequest) -> Result<WireStream, TransportError> {
            std::future::pending().await
        }
    }

    fn mock_query(control: &[(&str, &str)]) -> Query {
        let url = Url::parse("http://api.example.com/feed").unwrap();
        Query::new(&url, WebMethod::Get, WebParameterCollection::new())
            .with_mock(control.iter().copied().collect())
    }

    #[tokio::test]
    async fn test_watchdog_delivers_single_timeout() {
        let transport = Arc::new(HangingTransport {
            calls: AtomicU32::new(0),
        });
        let url = Url::parse("http://api.example.com/slow").unwrap();
        let mut query = Query::new(&url, WebMethod::Get, WebParameterCollection::new());
        query.timeout = Duration::from_millis(50);

        let result = query.execute(transport.clone(), None).await.unwrap();

        assert!(result.timed_out);
        assert_eq!(result.status_code, 0);
        assert!(result.exception.as_ref().is_some_and(TransportFailure::is_timeout));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(query.result.timed_out);
    }

    #[test]
    fn test_attempt_signal_completes_once() {
        let (signal, mut receiver) = AttemptSignal::new();
        assert!(signal.complete(QueryResult::timed_out()));
        assert!(!signal.complete(QueryResult::new()));
        assert!(receiver.try_recv().unwrap().timed_out);
    }

    #[tokio::test]
    async fn test_execute_mock() {
        let mut query = mock_query(&[("mockStatusCode", "201"), ("mockContent", "made")]);
        let result = query
            .execute(Arc::new(MockTransport::new()), None)
            .await
            .unwrap();

        assert!(result.is_mock);
        assert_eq!(result.status_code, 201);
        assert_eq!(result.content, "made");
        assert_eq!(result.content_length, Some(4));
        assert_eq!(result.request_method, Some(WebMethod::Get));
    }

    #[tokio::test]
    async fn test_stream_batches_and_flushes() {
        let body: String = (1..=25).map(|i| format!("line {i}\n\n")).collect();
        let mut query = mock_query(&[("mockContent", body.as_str())]);
        let mut events = Vec::new();

        let end = query
            .stream(
                Arc::new(MockTransport::new()),
                &StreamOptions::new(),
                &CancellationToken::new(),
                |event| events.push(event),
            )
            .await
            .unwrap();

        assert_eq!(end, StreamEnd::Closed);
        let sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Batch { lines } => Some(lines.len()),
                StreamEvent::End { .. } => None,
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::End {
                reason: StreamEnd::Closed
            })
        );
    }

    #[tokio::test]
    async fn test_stream_stops_on_non_data() {
        let mut query = mock_query(&[("mockContent", "a\nb\n<html><body>down</body>\nc")]);
        let mut events = Vec::new();

        let end = query
            .stream(
                Arc::new(MockTransport::new()),
                &StreamOptions::new(),
                &CancellationToken::new(),
                |event| events.push(event),
            )
            .await
            .unwrap();

        assert_eq!(end, StreamEnd::NonData);
        assert_eq!(
            events[0],
            StreamEvent::Batch {
                lines: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_rejects_non_2xx_and_bad_methods() {
        let mut query = mock_query(&[("mockStatusCode", "401")]);
        let end = query
            .stream(
                Arc::new(MockTransport::new()),
                &StreamOptions::new(),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(end, StreamEnd::Rejected { status: 401 });

        query.method = WebMethod::Delete;
        let err = query
            .stream(
                Arc::new(MockTransport::new()),
                &StreamOptions::new(),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedStreamMethod(WebMethod::Delete)));
    }

    #[tokio::test]
    async fn test_stream_cancel_and_elapsed() {
        let url = Url::parse("http://api.example.com/firehose").unwrap();
        let transport = Arc::new(HangingTransport {
            calls: AtomicU32::new(0),
        });

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut query = Query::new(&url, WebMethod::Get, WebParameterCollection::new());
        let end = query
            .stream(transport.clone(), &StreamOptions::new(), &cancel, |_| {})
            .await
            .unwrap();
        assert_eq!(end, StreamEnd::Cancelled);

        let mut query = mock_query(&[("mockContent", "a")]);
        let options = StreamOptions::new().with_duration(Duration::ZERO);
        let mut events = Vec::new();
        let end = query
            .stream(
                Arc::new(MockTransport::new()),
                &options,
                &CancellationToken::new(),
                |e| events.push(e),
            )
            .await
            .unwrap();
        assert!(matches!(end, StreamEnd::Elapsed | StreamEnd::Closed));
        assert!(matches!(events.last(), Some(StreamEvent::End { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_duration_covers_connect() {
        let url = Url::parse("http://api.example.com/firehose").unwrap();
        let transport = Arc::new(HangingTransport {
            calls: AtomicU32::new(0),
        });
        let mut query = Query::new(&url, WebMethod::Get, WebParameterCollection::new());
        let options = StreamOptions::new().with_duration(Duration::from_millis(50));
        let mut events = Vec::new();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            query.stream(transport, &options, &CancellationToken::new(), |e| events.push(e)),
        )
        .await;

        assert_eq!(outcome.unwrap().unwrap(), StreamEnd::Elapsed);
        assert_eq!(
            events,
            vec![StreamEvent::End {
                reason: StreamEnd::Elapsed
            }]
        );
        assert!(query.result.response_date.is_some());
    }
}
