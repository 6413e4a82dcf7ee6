//! Authentication.
//!
//! - [`encoding`] - Percent-encoding and signature base strings
//! - [`signature`] - HMAC-SHA1, RSA-SHA1, and PLAINTEXT signing
//! - [`workflow`] - The OAuth 1.0a signing workflow
//! - [`oauth`] - OAuth credentials as a [`CredentialStrategy`](crate::CredentialStrategy)
//! - [`basic`] - HTTP Basic credentials

pub mod basic;
pub mod encoding;
pub mod oauth;
pub mod signature;
pub mod workflow;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

pub use basic::BasicAuthCredentials;
pub use oauth::OAuthCredentials;
pub use signature::{RsaKey, SignatureMethod, SignatureTreatment};
pub use workflow::{AuthInfo, OAuthWorkflow, Stamp};

/// The OAuth 1.0a flow a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OAuthType {
    /// Obtain a request token.
    RequestToken,
    /// Exchange a verified request token for an access token.
    AccessToken,
    /// Exchange user credentials for an access token (xAuth).
    ClientAuthentication,
    /// Call a protected resource with an access token.
    #[default]
    ProtectedResource,
}

impl OAuthType {
    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestToken => "request_token",
            Self::AccessToken => "access_token",
            Self::ClientAuthentication => "client_authentication",
            Self::ProtectedResource => "protected_resource",
        }
    }
}

impl fmt::Display for OAuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "request_token" => Ok(Self::RequestToken),
            "access_token" => Ok(Self::AccessToken),
            "client_authentication" | "client_auth" | "xauth" => Ok(Self::ClientAuthentication),
            "protected_resource" | "protected" => Ok(Self::ProtectedResource),
            other => Err(ClientError::Signing(format!("unknown OAuth flow '{other}'"))),
        }
    }
}

/// Where OAuth protocol parameters are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterHandling {
    /// In an `Authorization: OAuth ...` header.
    #[default]
    HttpAuthorizationHeader,
    /// In the query string, or the form body for POST/PUT.
    UrlOrPostParameters,
}

impl FromStr for ParameterHandling {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "header" | "http_authorization_header" => Ok(Self::HttpAuthorizationHeader),
            "url" | "query" | "url_or_post_parameters" => Ok(Self::UrlOrPostParameters),
            other => Err(ClientError::Signing(format!(
                "unknown parameter handling '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_type_parse() {
        assert_eq!("xauth".parse::<OAuthType>().unwrap(), OAuthType::ClientAuthentication);
        assert_eq!(
            "Request-Token".parse::<OAuthType>().unwrap(),
            OAuthType::RequestToken
        );
        assert!("implicit".parse::<OAuthType>().is_err());
        assert_eq!(OAuthType::default(), OAuthType::ProtectedResource);
    }

    #[test]
    fn test_parameter_handling_parse() {
        assert_eq!(
            "url".parse::<ParameterHandling>().unwrap(),
            ParameterHandling::UrlOrPostParameters
        );
        assert_eq!(
            "header".parse::<ParameterHandling>().unwrap(),
            ParameterHandling::HttpAuthorizationHeader
        );
    }
}
