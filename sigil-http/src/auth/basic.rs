//! HTTP Basic credentials.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sigil_core::WebMethod;
use url::Url;

use crate::error::ClientError;
use crate::query::Query;
use crate::request::Request;
use crate::strategy::{CredentialKind, CredentialStrategy};

/// Username and password sent as `Authorization: Basic ...`.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuthCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl BasicAuthCredentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the header value.
    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl CredentialStrategy for BasicAuthCredentials {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Basic
    }

    fn get_query(
        &self,
        url: &Url,
        request: &mut Request,
        method: WebMethod,
    ) -> Result<Query, ClientError> {
        Ok(Query::new(url, method, request.parameters.clone())
            .with_authorization_header(self.header_value()))
    }
}

impl fmt::Debug for BasicAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
