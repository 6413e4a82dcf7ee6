//! Credential strategy trait and types.
//!
//! A strategy turns a resolved endpoint and a request into a [`Query`]
//! carrying whatever authentication material the scheme needs. The client
//! picks the request's credentials first, then its own, and builds an
//! unauthenticated query when neither is set.

use std::fmt;

use serde::{Deserialize, Serialize};
use sigil_core::WebMethod;
use url::Url;

use crate::error::ClientError;
use crate::query::Query;
use crate::request::Request;

// ============================================================================
// Credential Kind
// ============================================================================

/// The authentication scheme a strategy implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// OAuth 1.0a signatures.
    OAuth,
    /// HTTP Basic.
    Basic,
}

impl CredentialKind {
    /// Returns the display name for this kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OAuth => "OAuth 1.0a",
            Self::Basic => "Basic",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Credential Strategy Trait
// ============================================================================

/// Builds an authenticated [`Query`] for one pipeline pass.
///
/// `request` is the pass's own copy; a strategy may adjust it (xAuth forces
/// POST) without affecting the caller's request.
///
/// ## Implementing a Strategy
///
/// ```ignore
/// #[derive(Debug)]
/// struct ApiKey(String);
///
/// impl CredentialStrategy for ApiKey {
///     fn kind(&self) -> CredentialKind {
///         CredentialKind::Basic
///     }
///
///     fn get_query(&self, url: &Url, request: &mut Request, method: WebMethod)
///         -> Result<Query, ClientError>
///     {
///         Ok(Query::new(url, method, request.parameters.clone())
///             .with_authorization_header(format!("Key {}", self.0)))
///     }
/// }
/// ```
pub trait CredentialStrategy: Send + Sync + fmt::Debug {
    /// Returns the scheme this strategy implements.
    fn kind(&self) -> CredentialKind;

    /// Builds the query for `url`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when required credential fields are
    /// missing; no I/O has happened at that point.
    fn get_query(
        &self,
        url: &Url,
        request: &mut Request,
        method: WebMethod,
    ) -> Result<Query, ClientError>;
}
