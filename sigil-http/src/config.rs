//! Client configuration.
//!
//! [`ClientConfig`] holds the defaults every call starts from. Anything a
//! [`Request`](crate::Request) sets overrides the matching value here.

use std::sync::Arc;
use std::time::Duration;

use sigil_core::{
    Cache, CacheOptions, Deserializer, Serializer, StreamOptions, TaskOptions, WebMethod,
    WebParameterCollection,
};
use url::Url;

use crate::client::Client;
use crate::error::ClientError;
use crate::request::CacheKeyFn;
use crate::retry::RetryPolicy;
use crate::strategy::CredentialStrategy;
use crate::transport::{HttpTransport, Transport, TransportSet};

// ============================================================================
// Client Config
// ============================================================================

/// Defaults shared by every call a client makes.
#[derive(Clone)]
pub struct ClientConfig {
    /// Scheme and host, e.g. `https://api.example.com`.
    pub authority: Option<String>,
    /// Path segment between the authority and the request path, e.g. `1.1`.
    pub version_path: Option<String>,
    /// Path used when a request sets none.
    pub path: Option<String>,
    /// Default method.
    pub method: Option<WebMethod>,
    /// Default credentials.
    pub credentials: Option<Arc<dyn CredentialStrategy>>,
    /// Entity serializer.
    pub serializer: Option<Arc<dyn Serializer>>,
    /// Response deserializer.
    pub deserializer: Option<Arc<dyn Deserializer>>,
    /// Response cache.
    pub cache: Option<Arc<dyn Cache>>,
    /// Cache options.
    pub cache_options: Option<CacheOptions>,
    /// Cache key function.
    pub cache_key: Option<CacheKeyFn>,
    /// Retry policy.
    pub retry_policy: Option<RetryPolicy>,
    /// Watchdog timeout.
    pub timeout: Option<Duration>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// User agent.
    pub user_agent: Option<String>,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Parameters sent with every call.
    pub parameters: WebParameterCollection,
    /// Headers sent with every call.
    pub headers: Vec<(String, String)>,
    /// Default periodic options.
    pub task_options: Option<TaskOptions>,
    /// Default streaming options.
    pub stream_options: Option<StreamOptions>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authority: None,
            version_path: None,
            path: None,
            method: None,
            credentials: None,
            serializer: None,
            deserializer: None,
            cache: None,
            cache_options: None,
            cache_key: None,
            retry_policy: None,
            timeout: None,
            proxy: None,
            user_agent: None,
            follow_redirects: true,
            parameters: WebParameterCollection::new(),
            headers: Vec::new(),
            task_options: None,
            stream_options: None,
        }
    }
}

impl ClientConfig {
    /// Builds the endpoint for `path`: authority, version path, then path.
    ///
    /// A path that is already an absolute URL is used as is.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when the joined string does not
    /// parse, e.g. a relative path without an authority.
    pub fn endpoint(&self, path: Option<&str>) -> Result<Url, ClientError> {
        let path = path.or(self.path.as_deref()).unwrap_or_default();
        if path.contains("://") {
            return Ok(Url::parse(path)?);
        }

        let mut joined = self
            .authority
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        for segment in [self.version_path.as_deref(), Some(path)].into_iter().flatten() {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                joined.push('/');
                joined.push_str(segment);
            }
        }
        Ok(Url::parse(&joined)?)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("authority", &self.authority)
            .field("version_path", &self.version_path)
            .field("method", &self.method)
            .field("credentials", &self.credentials)
            .field("has_cache", &self.cache.is_some())
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client Builder
// ============================================================================

/// Builder for constructing a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the authority.
    #[must_use]
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.config.authority = Some(authority.into());
        self
    }

    /// Sets the version path.
    #[must_use]
    pub fn version_path(mut self, version_path: impl Into<String>) -> Self {
        self.config.version_path = Some(version_path.into());
        self
    }

    /// Sets the default path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = Some(path.into());
        self
    }

    /// Sets the default method.
    #[must_use]
    pub fn method(mut self, method: WebMethod) -> Self {
        self.config.method = Some(method);
        self
    }

    /// Sets the default credentials.
    #[must_use]
    pub fn credentials<C: CredentialStrategy + 'static>(mut self, credentials: C) -> Self {
        self.config.credentials = Some(Arc::new(credentials));
        self
    }

    /// Sets the default credentials from a shared strategy.
    #[must_use]
    pub fn shared_credentials(mut self, credentials: Arc<dyn CredentialStrategy>) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    /// Sets the entity serializer.
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.config.serializer = Some(serializer);
        self
    }

    /// Sets the response deserializer.
    #[must_use]
    pub fn deserializer(mut self, deserializer: Arc<dyn Deserializer>) -> Self {
        self.config.deserializer = Some(deserializer);
        self
    }

    /// Sets the cache and its options.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>, options: CacheOptions) -> Self {
        self.config.cache = Some(cache);
        self.config.cache_options = Some(options);
        self
    }

    /// Sets the cache key function.
    #[must_use]
    pub fn cache_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.config.cache_key = Some(Arc::new(key));
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = Some(policy);
        self
    }

    /// Sets the watchdog timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Sets the proxy URL.
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Sets whether redirects are followed.
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Adds a parameter sent with every call.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.parameters.add(name, value);
        self
    }

    /// Adds a header sent with every call.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Sets default periodic options.
    #[must_use]
    pub fn task_options(mut self, options: TaskOptions) -> Self {
        self.config.task_options = Some(options);
        self
    }

    /// Sets default streaming options.
    #[must_use]
    pub fn stream_options(mut self, options: StreamOptions) -> Self {
        self.config.stream_options = Some(options);
        self
    }

    /// Replaces the HTTP transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns the configuration built so far.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the default transport cannot be
    /// initialized.
    pub fn build(self) -> Result<Client, ClientError> {
        let primary: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        Ok(Client::from_parts(self.config, TransportSet::new(primary)))
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
