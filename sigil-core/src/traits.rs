//! Trait definitions for Sigil.
//!
//! These are the seams the engine is pluggable at:
//! - [`Cache`] - Response body storage with per-entry expiration
//! - [`Serializer`] / [`Deserializer`] - Entity codecs

use crate::error::CoreError;
use crate::models::Expiration;

/// Storage for raw response bodies.
///
/// Implementations must be safe to share across concurrent calls. Expired
/// entries must never be returned from [`get`](Cache::get).
pub trait Cache: Send + Sync {
    /// Returns the stored body for `key`, refreshing sliding entries.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` with the given expiration.
    fn insert(&self, key: &str, value: String, expiration: Expiration);

    /// Removes `key`.
    fn remove(&self, key: &str);
}

/// Turns a request entity into a body.
pub trait Serializer: Send + Sync {
    /// Content type of the produced body.
    fn content_type(&self) -> &str;

    /// Serializes the entity.
    ///
    /// # Errors
    ///
    /// Returns an error when the entity cannot be represented.
    fn serialize(&self, entity: &serde_json::Value) -> Result<String, CoreError>;
}

/// Turns a response body into an entity.
pub trait Deserializer: Send + Sync {
    /// Deserializes the body.
    ///
    /// # Errors
    ///
    /// Returns an error when the body is malformed.
    fn deserialize(&self, content: &str) -> Result<serde_json::Value, CoreError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Serializer for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn serialize(&self, entity: &serde_json::Value) -> Result<String, CoreError> {
        Ok(serde_json::to_string(entity)?)
    }
}

impl Deserializer for JsonCodec {
    fn deserialize(&self, content: &str) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::from_str(content)?)
    }
}
