//! OAuth 1.0a credentials.

use std::fmt;

use sigil_core::{WebMethod, WebParameterCollection};
use tracing::debug;
use url::Url;

use super::signature::{RsaKey, SignatureMethod, SignatureTreatment};
use super::workflow::{AuthInfo, OAuthWorkflow};
use super::{OAuthType, ParameterHandling};
use crate::error::ClientError;
use crate::query::Query;
use crate::request::Request;
use crate::strategy::{CredentialKind, CredentialStrategy};

/// OAuth 1.0a credentials for one flow.
///
/// The flow decides which fields are required and which endpoint the call's
/// URL stands for: the request-token URL, the access-token URL, or a
/// protected resource.
#[derive(Clone, Default)]
pub struct OAuthCredentials {
    /// Flow to sign for.
    pub flow: OAuthType,
    /// Consumer key.
    pub consumer_key: Option<String>,
    /// Consumer secret.
    pub consumer_secret: Option<String>,
    /// Request or access token.
    pub token: Option<String>,
    /// Token secret.
    pub token_secret: Option<String>,
    /// Verifier for the access-token exchange.
    pub verifier: Option<String>,
    /// Callback for the request-token call.
    pub callback_url: Option<String>,
    /// xAuth username.
    pub client_username: Option<String>,
    /// xAuth password.
    pub client_password: Option<String>,
    /// Protocol version.
    pub version: Option<String>,
    /// Authorization header realm.
    pub realm: Option<String>,
    /// Signature method.
    pub signature_method: SignatureMethod,
    /// Signature treatment.
    pub signature_treatment: SignatureTreatment,
    /// Parameter placement.
    pub parameter_handling: ParameterHandling,
    /// Private key for RSA-SHA1.
    pub rsa_key: Option<RsaKey>,
}

impl OAuthCredentials {
    /// Creates empty credentials for `flow`.
    pub fn new(flow: OAuthType) -> Self {
        Self {
            flow,
            ..Self::default()
        }
    }

    /// Credentials for calling protected resources.
    pub fn protected_resource(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self::new(OAuthType::ProtectedResource)
            .with_consumer(consumer_key, consumer_secret)
            .with_token(token, token_secret)
    }

    /// Credentials for obtaining a request token.
    pub fn request_token(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Self {
        Self::new(OAuthType::RequestToken).with_consumer(consumer_key, consumer_secret)
    }

    /// Credentials for exchanging a verified request token.
    pub fn access_token(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self::new(OAuthType::AccessToken)
            .with_consumer(consumer_key, consumer_secret)
            .with_token(token, token_secret)
    }

    /// Credentials for an xAuth exchange.
    pub fn client_auth(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut credentials = Self::new(OAuthType::ClientAuthentication)
            .with_consumer(consumer_key, consumer_secret);
        credentials.client_username = Some(username.into());
        credentials.client_password = Some(password.into());
        credentials
    }

    /// Sets the consumer key and secret.
    #[must_use]
    pub fn with_consumer(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.consumer_key = Some(key.into());
        self.consumer_secret = Some(secret.into());
        self
    }

    /// Sets the token and its secret.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, secret: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(secret.into());
        self
    }

    /// Sets the verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.verifier = Some(verifier.into());
        self
    }

    /// Sets the callback URL.
    #[must_use]
    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback_url = Some(callback.into());
        self
    }

    /// Sets the realm.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Sets the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the signature method.
    #[must_use]
    pub fn with_signature_method(mut self, method: SignatureMethod) -> Self {
        self.signature_method = method;
        self
    }

    /// Sets the signature treatment.
    #[must_use]
    pub fn with_signature_treatment(mut self, treatment: SignatureTreatment) -> Self {
        self.signature_treatment = treatment;
        self
    }

    /// Sets parameter placement.
    #[must_use]
    pub fn with_parameter_handling(mut self, handling: ParameterHandling) -> Self {
        self.parameter_handling = handling;
        self
    }

    /// Sets the RSA key and switches to RSA-SHA1.
    #[must_use]
    pub fn with_rsa_key(mut self, key: RsaKey) -> Self {
        self.rsa_key = Some(key);
        self.signature_method = SignatureMethod::RsaSha1;
        self
    }

    /// Builds a workflow from these credentials.
    pub fn workflow(&self) -> OAuthWorkflow {
        OAuthWorkflow {
            version: self.version.clone(),
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
            token: self.token.clone(),
            token_secret: self.token_secret.clone(),
            callback_url: self.callback_url.clone(),
            verifier: self.verifier.clone(),
            client_username: self.client_username.clone(),
            client_password: self.client_password.clone(),
            realm: self.realm.clone(),
            signature_method: self.signature_method,
            signature_treatment: self.signature_treatment,
            parameter_handling: self.parameter_handling,
            rsa_key: self.rsa_key.clone(),
            ..OAuthWorkflow::default()
        }
    }

    /// Signs a call to `url` for this flow.
    ///
    /// Returns the signature together with the workflow that produced it.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a required field is missing.
    pub fn sign(
        &self,
        url: &Url,
        method: WebMethod,
        parameters: &WebParameterCollection,
    ) -> Result<(AuthInfo, OAuthWorkflow), ClientError> {
        let mut workflow = self.workflow();
        let info = match self.flow {
            OAuthType::RequestToken => {
                workflow.request_token_url = Some(url.clone());
                workflow.build_request_token_info(method, parameters)?
            }
            OAuthType::AccessToken => {
                workflow.access_token_url = Some(url.clone());
                workflow.build_access_token_info(method, parameters)?
            }
            OAuthType::ClientAuthentication => {
                workflow.access_token_url = Some(url.clone());
                workflow.build_client_auth_info(parameters)?
            }
            OAuthType::ProtectedResource => {
                workflow.build_protected_resource_info(method, parameters, url)?
            }
        };
        Ok((info, workflow))
    }
}

impl CredentialStrategy for OAuthCredentials {
    fn kind(&self) -> CredentialKind {
        CredentialKind::OAuth
    }

    fn get_query(
        &self,
        url: &Url,
        request: &mut Request,
        method: WebMethod,
    ) -> Result<Query, ClientError> {
        let method = if self.flow == OAuthType::ClientAuthentication {
            request.method = Some(WebMethod::Post);
            WebMethod::Post
        } else {
            method
        };

        let (info, workflow) = self.sign(url, method, &request.parameters)?;
        debug!(flow = %self.flow, method = %method, "Built OAuth query");

        let resign = (self.flow == OAuthType::ProtectedResource).then_some(workflow);
        Ok(Query::new(url, method, request.parameters.clone()).with_oauth(info, resign))
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("OAuthCredentials")
            .field("flow", &self.flow)
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &redact(&self.consumer_secret))
            .field("token", &self.token)
            .field("token_secret", &redact(&self.token_secret))
            .field("client_username", &self.client_username)
            .field("client_password", &redact(&self.client_password))
            .field("signature_method", &self.signature_method)
            .field("parameter_handling", &self.parameter_handling)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryAuth;

    #[test]
    fn test_client_auth_forces_post_on_pass_copy() {
        let credentials = OAuthCredentials::client_auth("key", "secret", "ada", "hunter2");
        let url = Url::parse("https://api.example.com/oauth/access_token").unwrap();
        let mut request = Request::get("/oauth/access_token");

        let query = credentials
            .get_query(&url, &mut request, WebMethod::Get)
            .unwrap();

        assert_eq!(query.method, WebMethod::Post);
        assert_eq!(request.method, Some(WebMethod::Post));
        match &query.auth {
            QueryAuth::OAuth { info, workflow } => {
                assert_eq!(info.flow, OAuthType::ClientAuthentication);
                assert!(workflow.is_none());
            }
            other => panic!("expected OAuth auth, got {other:?}"),
        }
    }

    #[test]
    fn test_protected_resource_keeps_workflow() {
        let credentials = OAuthCredentials::protected_resource("k", "s", "t", "ts");
        let url = Url::parse("https://api.example.com/1/home?count=5").unwrap();
        let mut request = Request::get("/1/home");

        let query = credentials
            .get_query(&url, &mut request, WebMethod::Get)
            .unwrap();

        assert!(matches!(
            &query.auth,
            QueryAuth::OAuth {
                workflow: Some(_),
                ..
            }
        ));
        assert_eq!(query.parameters.get("count"), Some("5"));
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn test_missing_secret_fails_before_io() {
        let credentials = OAuthCredentials::new(OAuthType::ProtectedResource)
            .with_consumer("k", "")
            .with_token("t", "ts");
        let url = Url::parse("https://api.example.com/").unwrap();
        let err = credentials
            .get_query(&url, &mut Request::get("/"), WebMethod::Get)
            .unwrap_err();
        assert_eq!(err.to_string(), "You must specify a consumer secret");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = OAuthCredentials::protected_resource("k", "very-secret", "t", "ts");
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("***"));
    }
}
