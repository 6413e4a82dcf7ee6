//! Domain models for Sigil.
//!
//! These are plain data types shared by the engine, the store, and the CLI.
//! Nothing here performs I/O.
//!
//! ## Submodules
//!
//! - [`method`] - HTTP verbs
//! - [`params`] - Parameters, collections, and multipart parts
//! - [`result`] - Per-attempt results and transport failures
//! - [`response`] - Caller-facing responses
//! - [`options`] - Cache, task, and stream options
//! - [`expectations`] - Mock expectations

pub mod expectations;
mod method;
mod options;
mod params;
mod response;
mod result;

pub use expectations::{DEFAULT_MOCK_CONTENT_TYPE, MOCK_SCHEME, MockExpectations};
pub use method::WebMethod;
pub use options::{
    CacheMode, CacheOptions, DEFAULT_RESULTS_PER_CALLBACK, Expiration, NonDataDetector,
    RateLimitPredicate, RateLimitRule, RateLimitStatus, RateLimitStatusFn, StreamOptions,
    TaskOptions, html_detector,
};
pub use params::{FilePart, OAUTH_PREFIX, PostParameter, WebParameter, WebParameterCollection};
pub use response::{Response, TypedResponse};
pub use result::{FailureKind, QueryResult, TransportFailure};
