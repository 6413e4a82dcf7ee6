// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Sigil Core
//!
//! Core types, models, and traits for the Sigil HTTP engine.
//!
//! This crate provides the foundational abstractions used across all other
//! Sigil crates, including:
//!
//! - Request-side models (methods, parameters, multipart parts)
//! - Result and response models
//! - Cache, task, and stream options
//! - Codec and cache traits
//!
//! ## Key Types
//!
//! ### Request Side
//! - [`WebMethod`] - HTTP verbs
//! - [`WebParameterCollection`] - Ordered parameters with merge semantics
//! - [`PostParameter`] - Multipart fields and files
//! - [`MockExpectations`] - Canned answers for the mock transport
//!
//! ### Result Side
//! - [`QueryResult`] - One attempt's outcome
//! - [`Response`] - The final outcome handed to callers
//! - [`TransportFailure`] - A captured transport error
//!
//! ### Options
//! - [`CacheOptions`] - Absolute, sliding, or no expiration
//! - [`TaskOptions`] - Periodic re-execution with [`RateLimitRule`] gates
//! - [`StreamOptions`] - Batch size, duration, non-data detection

pub mod error;
pub mod models;
pub mod traits;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Request side
    FilePart,
    MockExpectations,
    OAUTH_PREFIX,
    PostParameter,
    WebMethod,
    WebParameter,
    WebParameterCollection,
    // Result side
    FailureKind,
    QueryResult,
    Response,
    TransportFailure,
    TypedResponse,
    // Options
    CacheMode,
    CacheOptions,
    Expiration,
    NonDataDetector,
    RateLimitRule,
    RateLimitStatus,
    StreamOptions,
    TaskOptions,
    html_detector,
};

// Re-export traits
pub use traits::{Cache, Deserializer, JsonCodec, Serializer};
