//! Call pipeline.
//!
//! A [`Call`] is one logical request resolved against the client's
//! configuration. [`Call::run`] dispatches it, re-dispatching internally
//! while the retry policy asks for another attempt, and builds the final
//! [`Response`] from the last result.
//!
//! Dispatch order per attempt:
//!
//! 1. Cache lookup (first attempt only)
//! 2. Multipart upload
//! 3. Plain call
//!
//! Periodic re-execution sits on top of this in [`crate::task`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use sigil_core::{
    Cache, CacheOptions, Deserializer, JsonCodec, QueryResult, Response, Serializer, WebParameter,
};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::query::{CacheStore, DEFAULT_TIMEOUT, Query, SerializedEntity, merge_headers, merge_parameters};
use crate::request::Request;
use crate::retry::RetryPolicy;
use crate::transport::TransportSet;

// ============================================================================
// Branch
// ============================================================================

/// The path one attempt took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Answered from the cache without I/O.
    Cached,
    /// Multipart upload.
    MultiPart,
    /// Everything else.
    Plain,
}

impl Branch {
    /// Returns the branch name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::MultiPart => "multipart",
            Self::Plain => "plain",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Cache Plan
// ============================================================================

/// The cache a call reads from and writes to.
#[derive(Clone)]
struct CachePlan {
    cache: Arc<dyn Cache>,
    options: CacheOptions,
    key: String,
}

impl CachePlan {
    fn lookup(&self) -> Option<String> {
        self.cache.get(&self.key)
    }

    fn store(&self) -> Result<CacheStore, ClientError> {
        Ok(CacheStore {
            cache: Arc::clone(&self.cache),
            key: self.key.clone(),
            expiration: self.options.expiration(Utc::now())?,
        })
    }
}

// ============================================================================
// Call
// ============================================================================

/// One logical call, resolved and ready to dispatch.
pub struct Call {
    request: Request,
    query: Query,
    transports: TransportSet,
    cache: Option<CachePlan>,
    retry_policy: Option<RetryPolicy>,
    deserializer: Option<Arc<dyn Deserializer>>,
}

impl Call {
    /// Resolves `request` against `config`.
    ///
    /// Request settings win over client settings. The endpoint is built, the
    /// entity serialized, and the query signed; everything that can fail
    /// without I/O fails here.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for an unusable endpoint,
    /// [`ClientError::Core`] for serialization or cache option errors, and
    /// [`ClientError::Validation`] for incomplete credentials.
    pub fn prepare(
        config: &ClientConfig,
        transports: &TransportSet,
        request: &Request,
    ) -> Result<Self, ClientError> {
        let mut pass = request.clone();
        let mut method = pass.method.or(config.method).unwrap_or_default();
        if !pass.post_parameters.is_empty() {
            // Signed with the method the upload is sent with.
            method = method.for_upload();
        }
        let url = config.endpoint(pass.path.as_deref())?;

        pass.parameters = merge_parameters(&config.parameters, &pass.parameters);
        let headers = merge_headers(&config.headers, &pass.headers);

        let serializer: Arc<dyn Serializer> = pass
            .serializer
            .clone()
            .or_else(|| config.serializer.clone())
            .unwrap_or_else(|| Arc::new(JsonCodec));
        let entity = pass
            .entity
            .as_ref()
            .map(|entity| {
                Ok::<_, ClientError>(SerializedEntity {
                    content: serializer.serialize(entity)?,
                    content_type: serializer.content_type().to_string(),
                })
            })
            .transpose()?;

        let credentials = pass.credentials.clone().or_else(|| config.credentials.clone());
        let mut query = match credentials {
            Some(credentials) => {
                debug!(kind = %credentials.kind(), "Building authenticated query");
                credentials.get_query(&url, &mut pass, method)?
            }
            None => Query::new(&url, method, pass.parameters.clone()),
        };

        query.headers = headers;
        query.entity = entity;
        query.post_content = pass.post_content.clone();
        query.post_parameters = pass.post_parameters.clone();
        query.user_agent = pass.user_agent.clone().or_else(|| config.user_agent.clone());
        query.proxy = pass.proxy.clone().or_else(|| config.proxy.clone());
        query.follow_redirects = config.follow_redirects;
        query.timeout = pass.timeout.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT);

        if pass.expects_mock() {
            let expectations = &pass.expectations;
            let content = match (&expectations.content, &expectations.entity) {
                (Some(content), _) => Some(content.clone()),
                (None, Some(entity)) => Some(serializer.serialize(entity)?),
                (None, None) => None,
            };
            let control =
                expectations.to_parameters(url.scheme(), query.method, content.as_deref());
            query = query.with_mock(control);
        }

        let cache = match (
            pass.cache.clone().or_else(|| config.cache.clone()),
            pass.cache_options.or(config.cache_options),
        ) {
            (Some(cache), Some(options)) => {
                let source = cache_source(&query);
                let key = match pass.cache_key.as_ref().or(config.cache_key.as_ref()) {
                    Some(key_fn) => key_fn(source.as_str()),
                    None => source.to_string(),
                };
                // Validates the mode/duration pair before any I/O.
                options.expiration(Utc::now())?;
                Some(CachePlan {
                    cache,
                    options,
                    key,
                })
            }
            _ => None,
        };

        let retry_policy = pass
            .retry_policy
            .clone()
            .or_else(|| config.retry_policy.clone());
        let deserializer = pass
            .deserializer
            .clone()
            .or_else(|| config.deserializer.clone());

        Ok(Self {
            request: pass,
            query,
            transports: transports.clone(),
            cache,
            retry_policy,
            deserializer,
        })
    }

    /// Returns the prepared query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the pass's copy of the request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consumes the call, returning its query.
    pub fn into_query(self) -> Query {
        self.query
    }

    /// Runs the call to completion.
    ///
    /// The first dispatch may be answered from the cache. Every later one is
    /// internal: it skips the lookup but still stores a successful body.
    ///
    /// # Errors
    ///
    /// Returns an error only when a re-sign or wire build fails; transport
    /// failures are reported on the response.
    #[instrument(skip(self), fields(request = %self.request.id(), url = %self.query.url))]
    pub async fn run(&mut self) -> Result<Response, ClientError> {
        let state = Arc::clone(self.request.retry_state());
        state.reset();
        let budget = self.retry_policy.as_ref().map_or(0, |p| p.retry_count);
        let mut retries = 0;

        loop {
            let attempt = state.record_attempt();
            let internal = attempt > 1;
            let (branch, mut result) = self.dispatch(internal).await?;
            result.times_tried = attempt;
            self.query.result = result.clone();
            debug!(branch = %branch, attempt, status = result.status_code, "Dispatched");

            let policy = self
                .retry_policy
                .as_ref()
                .filter(|_| branch != Branch::Cached && retries < budget);
            let Some(policy) = policy.filter(|p| p.should_retry(&result)) else {
                if attempt > 1 {
                    info!(attempts = attempt, status = result.status_code, "Call completed after retries");
                }
                return Ok(self.build_response(result));
            };

            retries += 1;
            let delay = policy.delay_for_retry(retries);
            info!(
                retry = retries,
                remaining = budget - retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                timed_out = result.timed_out,
                "Retrying call"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn dispatch(&mut self, internal: bool) -> Result<(Branch, QueryResult), ClientError> {
        if !internal {
            if let Some(content) = self.cache.as_ref().and_then(CachePlan::lookup) {
                debug!("Cache hit");
                return Ok((Branch::Cached, cached_result(&self.query, content)));
            }
        }

        self.query.resign()?;
        let branch = if self.query.is_multipart() {
            Branch::MultiPart
        } else {
            Branch::Plain
        };
        let store = self.cache.as_ref().map(CachePlan::store).transpose()?;
        let transport = self.transports.for_query(&self.query);
        let result = self.query.execute(transport, store).await?;
        Ok((branch, result))
    }

    /// Builds the caller-facing response, decoding the entity if configured.
    pub fn build_response(&self, result: QueryResult) -> Response {
        build_response(result, self.deserializer.as_deref())
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.request.id())
            .field("url", &self.query.url.as_str())
            .field("method", &self.query.method)
            .field("cached", &self.cache.is_some())
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a response from `result`, decoding a non-empty body.
pub fn build_response(result: QueryResult, deserializer: Option<&dyn Deserializer>) -> Response {
    let mut response = Response::from_result(result);
    if let Some(deserializer) = deserializer.filter(|_| !response.content.is_empty()) {
        match deserializer.deserialize(&response.content) {
            Ok(entity) => response.entity = Some(entity),
            Err(e) => {
                debug!(error = %e, "Entity decode failed");
                response.entity_error = Some(e.to_string());
            }
        }
    }
    response
}

/// The URL a cache key derives from: endpoint plus non-OAuth parameters.
fn cache_source(query: &Query) -> Url {
    let mut url = query.url.clone();
    let parameters: Vec<&WebParameter> = query.parameters.non_oauth().collect();
    if !parameters.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(parameters.iter().map(|p| (p.name.as_str(), p.value.as_str())));
    }
    url
}

fn cached_result(query: &Query, content: String) -> QueryResult {
    let now = Utc::now();
    QueryResult {
        status_code: 200,
        status_description: "OK".to_string(),
        content_length: Some(content.len() as u64),
        content,
        request_date: Some(now),
        request_uri: Some(query.url.to_string()),
        request_method: Some(query.method),
        response_date: Some(now),
        response_uri: Some(query.url.to_string()),
        ..QueryResult::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
