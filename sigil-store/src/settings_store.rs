//! User preferences store.
//!
//! Settings are client defaults persisted as JSON: the endpoint, timeouts,
//! retry and cache behavior, and the non-secret half of the OAuth
//! credentials. Secrets live in the keychain, see [`crate::keychain`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigil_core::{CacheMode, CacheOptions};
use sigil_http::{ClientBuilder, ParameterHandling, RetryPolicy, SignatureMethod};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::cache::MemoryCache;
use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Profile used when none is named.
pub const DEFAULT_PROFILE: &str = "default";

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scheme and host requests are resolved against.
    pub authority: Option<String>,

    /// Path segment between authority and request path.
    pub version_path: Option<String>,

    /// Watchdog timeout in seconds; the client default applies when unset.
    pub timeout_secs: Option<u64>,

    /// Retries after the first attempt, spent on timeouts and 5xx responses.
    pub retry_count: u32,

    /// User agent override.
    pub user_agent: Option<String>,

    /// Proxy URL.
    pub proxy: Option<String>,

    /// Follow redirects.
    pub follow_redirects: bool,

    /// Response cache mode; `None` disables caching.
    pub cache_mode: Option<CacheMode>,

    /// Cache duration in seconds for timed modes.
    pub cache_secs: u64,

    /// Log level.
    pub log_level: LogLevel,

    /// Keychain profile holding the secrets.
    pub profile: String,

    /// OAuth consumer key.
    pub consumer_key: Option<String>,

    /// OAuth access token.
    pub token: Option<String>,

    /// Signature method.
    pub signature_method: SignatureMethod,

    /// Where OAuth parameters travel.
    pub parameter_handling: ParameterHandling,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            authority: None,
            version_path: None,
            timeout_secs: None,
            retry_count: 0,
            user_agent: None,
            proxy: None,
            follow_redirects: true,
            cache_mode: None,
            cache_secs: 300,
            log_level: LogLevel::default(),
            profile: DEFAULT_PROFILE.to_string(),
            consumer_key: None,
            token: None,
            signature_method: SignatureMethod::default(),
            parameter_handling: ParameterHandling::default(),
        }
    }
}

impl Settings {
    /// Names accepted by [`set`](Self::set).
    pub const KEYS: &'static [&'static str] = &[
        "authority",
        "version_path",
        "timeout_secs",
        "retry_count",
        "user_agent",
        "proxy",
        "follow_redirects",
        "cache_mode",
        "cache_secs",
        "log_level",
        "profile",
        "consumer_key",
        "token",
        "signature_method",
        "parameter_handling",
    ];

    /// Sets a field from its string form.
    ///
    /// An empty value clears optional fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownKey`] for names outside [`Self::KEYS`],
    /// or [`StoreError::Parse`] when the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = value.trim();
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match key {
            "authority" => self.authority = optional(value),
            "version_path" => self.version_path = optional(value),
            "user_agent" => self.user_agent = optional(value),
            "proxy" => self.proxy = optional(value),
            "consumer_key" => self.consumer_key = optional(value),
            "token" => self.token = optional(value),
            "profile" => {
                self.profile = optional(value).unwrap_or_else(|| DEFAULT_PROFILE.to_string());
            }
            "timeout_secs" => {
                self.timeout_secs = if value.is_empty() {
                    None
                } else {
                    Some(parse_number(key, value)?)
                };
            }
            "retry_count" => self.retry_count = parse_number(key, value)?,
            "cache_secs" => self.cache_secs = parse_number(key, value)?,
            "follow_redirects" => {
                self.follow_redirects = value
                    .parse()
                    .map_err(|_| StoreError::parse(key, "expected true or false"))?;
            }
            "cache_mode" => {
                self.cache_mode = match value {
                    "" | "off" => None,
                    mode => Some(
                        mode.parse()
                            .map_err(|e: sigil_core::CoreError| StoreError::parse(key, e.to_string()))?,
                    ),
                };
            }
            "log_level" => {
                self.log_level = value
                    .parse()
                    .map_err(|e: String| StoreError::parse(key, e))?;
            }
            "signature_method" => {
                self.signature_method = value
                    .parse()
                    .map_err(|e: sigil_http::ClientError| StoreError::parse(key, e.to_string()))?;
            }
            "parameter_handling" => {
                self.parameter_handling = value
                    .parse()
                    .map_err(|e: sigil_http::ClientError| StoreError::parse(key, e.to_string()))?;
            }
            other => return Err(StoreError::UnknownKey(other.to_string())),
        }
        debug!(key = key, "Setting updated");
        Ok(())
    }

    /// Returns the cache options, if caching is enabled.
    pub fn cache_options(&self) -> Option<CacheOptions> {
        self.cache_mode.map(|mode| CacheOptions {
            mode,
            duration: Duration::from_secs(self.cache_secs),
        })
    }

    /// Returns the retry policy, if retries are enabled.
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        (self.retry_count > 0).then(|| {
            RetryPolicy::new(self.retry_count)
                .on_timeout()
                .on_server_error()
        })
    }

    /// Builds a client builder carrying these defaults.
    ///
    /// Credentials are not set; they need the keychain secrets.
    pub fn to_builder(&self) -> ClientBuilder {
        let mut builder = ClientBuilder::new().follow_redirects(self.follow_redirects);
        if let Some(authority) = &self.authority {
            builder = builder.authority(authority);
        }
        if let Some(version_path) = &self.version_path {
            builder = builder.version_path(version_path);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy);
        }
        if let Some(policy) = self.retry_policy() {
            builder = builder.retry_policy(policy);
        }
        if let Some(options) = self.cache_options() {
            builder = builder.cache(Arc::new(MemoryCache::new()), options);
        }
        builder
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::parse(key, format!("'{value}' is not a number")))
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Error level logging.
    Error,
    /// Warning level logging.
    #[default]
    Warn,
    /// Info level logging.
    Info,
    /// Debug level logging.
    Debug,
    /// Trace level logging.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Persistent settings store with change notifications.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
    version: Arc<RwLock<u64>>,
}

impl SettingsStore {
    /// Creates a store with default settings backed by `path`.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
            version: Arc::new(RwLock::new(0)),
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be loaded from disk.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path.
    ///
    /// A missing or unreadable file yields defaults.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for callers that persist later.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings = if path.exists() {
            info!(path = %path.display(), "Loading settings");
            load_json(&path).await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            })
        } else {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };
        Ok(Self::with_settings(path, settings))
    }

    /// Returns the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings and notifies subscribers.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        {
            let mut settings = self.settings.write().await;
            f(&mut settings);
        }
        self.notify_change().await;
    }

    /// Sets one field by name and notifies subscribers.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::set`]; nothing changes on error.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        {
            let mut settings = self.settings.write().await;
            let mut updated = settings.clone();
            updated.set(key, value)?;
            *settings = updated;
        }
        self.notify_change().await;
        Ok(())
    }

    /// Restores defaults and notifies subscribers.
    pub async fn reset(&self) {
        self.update(|s| *s = Settings::default()).await;
        info!("Settings reset to defaults");
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await;
        save_json(&self.path, &*settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Subscribes to settings changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    async fn notify_change(&self) {
        let mut version = self.version.write().await;
        *version += 1;
        let _ = self.notify.send(*version);
    }
}

// ============================================================================
// Tests
// ============================================================================
