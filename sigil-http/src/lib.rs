// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Sigil HTTP
//!
//! Request engine for Sigil: OAuth 1.0a signing, retries, caching,
//! streaming, and periodic calls over a pluggable transport.
//!
//! ## Building Calls
//!
//! - [`client::Client`] - Runs requests; one-shot, background, periodic, or streamed
//! - [`config::ClientBuilder`] - Client-wide defaults
//! - [`request::Request`] - Per-call overrides
//!
//! ## Authentication
//!
//! The [`auth`] module signs calls:
//!
//! - [`auth::OAuthCredentials`] - The four OAuth 1.0a flows
//! - [`auth::BasicAuthCredentials`] - HTTP Basic
//! - [`strategy::CredentialStrategy`] - Trait for custom schemes
//!
//! ## Pipeline
//!
//! - [`pipeline::Call`] - Cache, multipart, and plain dispatch with retries
//! - [`query::Query`] - Parameter placement and the per-attempt watchdog
//! - [`retry::RetryPolicy`] - When to try again
//! - [`task::PeriodicTask`] - Timer-driven re-execution with rate-limit gates
//! - [`transport`] - The HTTP and mock transports
//!
//! ## Example
//!
//! ```ignore
//! use sigil_http::{Client, OAuthCredentials, Request, RetryPolicy};
//!
//! let client = Client::builder()
//!     .authority("https://api.example.com")
//!     .credentials(OAuthCredentials::protected_resource("ck", "cs", "t", "ts"))
//!     .retry_policy(RetryPolicy::new(2).on_timeout())
//!     .build()?;
//!
//! let response = client.request(&Request::get("/1/statuses/home.json")).await?;
//! ```

// Core modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod request;
pub mod retry;
pub mod strategy;
pub mod task;
pub mod transport;

// Re-exports
pub use auth::{
    AuthInfo, BasicAuthCredentials, OAuthCredentials, OAuthType, OAuthWorkflow,
    ParameterHandling, RsaKey, SignatureMethod, SignatureTreatment,
};
pub use client::{Client, RequestHandle};
pub use config::{ClientBuilder, ClientConfig};
pub use error::{ClientError, CredentialField, TransportError, ValidationError};
pub use pipeline::{Branch, Call};
pub use query::{DEFAULT_TIMEOUT, Query, StreamEnd, StreamEvent};
pub use request::{CacheKeyFn, Request, RequestId};
pub use retry::{Backoff, RetryCondition, RetryPolicy, RetryState};
pub use strategy::{CredentialKind, CredentialStrategy};
pub use task::{PeriodicTask, TaskEnd, TaskRegistry};
pub use transport::{HttpTransport, MockTransport, Transport};
