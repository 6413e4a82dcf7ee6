//! Per-call requests.
//!
//! A [`Request`] names a path relative to the client's endpoint plus every
//! per-call override. Anything set here wins over the client's defaults.
//! Clones share their [`RequestId`] and attempt bookkeeping, so a clone
//! handed to `begin_request` still reports through the original.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use sigil_core::{
    Cache, CacheOptions, Deserializer, FilePart, MockExpectations, PostParameter, Serializer,
    StreamOptions, TaskOptions, WebMethod, WebParameterCollection,
};

use crate::error::ClientError;
use crate::retry::{RetryPolicy, RetryState};
use crate::strategy::CredentialStrategy;

/// Derives a cache key from the request URL.
pub type CacheKeyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Request Id
// ============================================================================

/// Process-unique request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ============================================================================
// Task State
// ============================================================================

/// Tick bookkeeping for periodic requests.
#[derive(Debug, Default)]
pub struct TaskState {
    ticks: AtomicU32,
    skipped: AtomicU32,
}

impl TaskState {
    /// Records a tick; `skipped` marks one suppressed by a rate-limit rule.
    pub fn record_tick(&self, skipped: bool) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if skipped {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Returns the ticks run so far, skipped ones included.
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Returns the ticks suppressed by a rate-limit rule.
    pub fn skipped(&self) -> u32 {
        self.skipped.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Request
// ============================================================================

/// One call against the client's endpoint.
#[derive(Clone)]
pub struct Request {
    /// Path appended to the client's authority and version path.
    pub path: Option<String>,
    /// Method; falls back to the client default, then GET.
    pub method: Option<WebMethod>,
    /// Query or form parameters.
    pub parameters: WebParameterCollection,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Multipart fields and files.
    pub post_parameters: Vec<PostParameter>,
    /// Entity serialized into the body.
    pub entity: Option<Value>,
    /// Raw body bytes.
    pub post_content: Option<Vec<u8>>,
    /// Credentials override.
    pub credentials: Option<Arc<dyn CredentialStrategy>>,
    /// Cache override.
    pub cache: Option<Arc<dyn Cache>>,
    /// Cache options override.
    pub cache_options: Option<CacheOptions>,
    /// Cache key function override.
    pub cache_key: Option<CacheKeyFn>,
    /// Retry policy override.
    pub retry_policy: Option<RetryPolicy>,
    /// Periodic re-execution, honored by `begin_request`.
    pub task_options: Option<TaskOptions>,
    /// Streaming options, honored by `stream`.
    pub stream_options: Option<StreamOptions>,
    /// Watchdog timeout override.
    pub timeout: Option<Duration>,
    /// Proxy override.
    pub proxy: Option<String>,
    /// User agent override.
    pub user_agent: Option<String>,
    /// Entity serializer override.
    pub serializer: Option<Arc<dyn Serializer>>,
    /// Response deserializer override.
    pub deserializer: Option<Arc<dyn Deserializer>>,
    /// Canned answer; non-empty expectations route the call to the mock transport.
    pub expectations: MockExpectations,
    id: RequestId,
    retry_state: Arc<RetryState>,
    task_state: Arc<TaskState>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            path: None,
            method: None,
            parameters: WebParameterCollection::new(),
            headers: Vec::new(),
            post_parameters: Vec::new(),
            entity: None,
            post_content: None,
            credentials: None,
            cache: None,
            cache_options: None,
            cache_key: None,
            retry_policy: None,
            task_options: None,
            stream_options: None,
            timeout: None,
            proxy: None,
            user_agent: None,
            serializer: None,
            deserializer: None,
            expectations: MockExpectations::default(),
            id: RequestId::next(),
            retry_state: Arc::new(RetryState::new()),
            task_state: Arc::new(TaskState::default()),
        }
    }
}

impl Request {
    /// Creates a request for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path).with_method(WebMethod::Get)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(path).with_method(WebMethod::Post)
    }

    /// Returns the request's identity, shared by its clones.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns attempt bookkeeping.
    pub fn retry_state(&self) -> &Arc<RetryState> {
        &self.retry_state
    }

    /// Returns tick bookkeeping.
    pub fn task_state(&self) -> &Arc<TaskState> {
        &self.task_state
    }

    /// Returns true if the call uploads multipart content.
    pub fn is_multipart(&self) -> bool {
        !self.post_parameters.is_empty()
    }

    /// Returns true if the call should be answered by the mock transport.
    pub fn expects_mock(&self) -> bool {
        !self.expectations.is_empty()
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    /// Sets the method.
    #[must_use]
    pub fn with_method(mut self, method: WebMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.add(name, value);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a multipart text field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.post_parameters.push(PostParameter::field(name, value));
        self
    }

    /// Adds a multipart file.
    #[must_use]
    pub fn with_file(mut self, file: FilePart) -> Self {
        self.post_parameters.push(PostParameter::File(file));
        self
    }

    /// Sets the entity.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Core`] if the value cannot be represented as JSON.
    pub fn with_entity<T: Serialize>(mut self, entity: &T) -> Result<Self, ClientError> {
        self.entity = Some(serde_json::to_value(entity).map_err(sigil_core::CoreError::from)?);
        Ok(self)
    }

    /// Sets raw body bytes.
    #[must_use]
    pub fn with_post_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.post_content = Some(content.into());
        self
    }

    /// Overrides the client's credentials.
    #[must_use]
    pub fn with_credentials<C: CredentialStrategy + 'static>(mut self, credentials: C) -> Self {
        self.credentials = Some(Arc::new(credentials));
        self
    }

    /// Sets the cache and its options.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>, options: CacheOptions) -> Self {
        self.cache = Some(cache);
        self.cache_options = Some(options);
        self
    }

    /// Sets the cache options, using the client's cache.
    #[must_use]
    pub fn with_cache_options(mut self, options: CacheOptions) -> Self {
        self.cache_options = Some(options);
        self
    }

    /// Sets the cache key function.
    #[must_use]
    pub fn with_cache_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.cache_key = Some(Arc::new(key));
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets periodic options.
    #[must_use]
    pub fn with_task_options(mut self, options: TaskOptions) -> Self {
        self.task_options = Some(options);
        self
    }

    /// Sets streaming options.
    #[must_use]
    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.stream_options = Some(options);
        self
    }

    /// Sets the watchdog timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the proxy URL.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the entity serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Sets the response deserializer.
    #[must_use]
    pub fn with_deserializer(mut self, deserializer: Arc<dyn Deserializer>) -> Self {
        self.deserializer = Some(deserializer);
        self
    }

    // ------------------------------------------------------------------------
    // Mock Expectations
    // ------------------------------------------------------------------------

    /// Expects a status code.
    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expectations.status_code = Some(status);
        self
    }

    /// Expects a reason phrase.
    #[must_use]
    pub fn expect_status_description(mut self, description: impl Into<String>) -> Self {
        self.expectations.status_description = Some(description.into());
        self
    }

    /// Expects a raw body.
    #[must_use]
    pub fn expect_content(mut self, content: impl Into<String>) -> Self {
        self.expectations.content = Some(content.into());
        self
    }

    /// Expects a content type.
    #[must_use]
    pub fn expect_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.expectations.content_type = Some(content_type.into());
        self
    }

    /// Expects an entity, serialized into the body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Core`] if the value cannot be represented as JSON.
    pub fn expect_entity<T: Serialize>(mut self, entity: &T) -> Result<Self, ClientError> {
        self.expectations.entity =
            Some(serde_json::to_value(entity).map_err(sigil_core::CoreError::from)?);
        Ok(self)
    }

    /// Expects a response header.
    #[must_use]
    pub fn expect_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.expectations.headers.push((name.into(), value.into()));
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("parameters", &self.parameters.len())
            .field("post_parameters", &self.post_parameters.len())
            .field("has_entity", &self.entity.is_some())
            .field("credentials", &self.credentials)
            .field("task_options", &self.task_options)
            .field("stream_options", &self.stream_options)
            .field("expects_mock", &self.expects_mock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_shared_by_clones() {
        let a = Request::get("/a");
        let b = Request::get("/a");
        assert_ne!(a.id(), b.id());

        let clone = a.clone();
        assert_eq!(clone.id(), a.id());
        clone.retry_state().record_attempt();
        assert_eq!(a.retry_state().iterations(), 1);
    }

    #[test]
    fn test_builders() {
        let request = Request::post("/statuses/update")
            .with_parameter("status", "hi")
            .with_header("X-Trace", "1")
            .with_field("caption", "cat")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.method, Some(WebMethod::Post));
        assert_eq!(request.parameters.get("status"), Some("hi"));
        assert!(request.is_multipart());
        assert!(!request.expects_mock());
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_expectations_mark_mock() {
        #[derive(Serialize)]
        struct Status {
            id: u32,
        }

        let request = Request::get("/x")
            .expect_status(404)
            .expect_entity(&Status { id: 7 })
            .unwrap();
        assert!(request.expects_mock());
        assert_eq!(request.expectations.status_code, Some(404));
        assert_eq!(request.expectations.entity, Some(serde_json::json!({"id": 7})));
    }

    #[test]
    fn test_task_state_counts() {
        let request = Request::get("/x");
        request.task_state().record_tick(false);
        request.task_state().record_tick(true);
        assert_eq!(request.task_state().ticks(), 2);
        assert_eq!(request.task_state().skipped(), 1);
    }
}
