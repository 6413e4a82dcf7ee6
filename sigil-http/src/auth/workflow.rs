//! OAuth 1.0a signing workflow.
//!
//! [`OAuthWorkflow`] validates the credentials a flow needs, assembles the
//! protocol parameters, and signs them together with the request parameters.
//! The result is an [`AuthInfo`] that a [`Query`](crate::Query) places on the
//! wire.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sigil_core::{WebMethod, WebParameterCollection};
use tracing::{debug, instrument};
use url::Url;

use super::encoding::{query_pairs, signature_base};
use super::signature::{RsaKey, SignatureMethod, SignatureTreatment, sign};
use super::{OAuthType, ParameterHandling};
use crate::error::{ClientError, CredentialField, ValidationError};

/// Protocol version sent when none is configured.
pub const DEFAULT_VERSION: &str = "1.0";

const NONCE_LEN: usize = 16;

// ============================================================================
// Stamp
// ============================================================================

/// Timestamp and nonce of one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    /// Seconds since the Unix epoch.
    pub timestamp: String,
    /// Random lowercase alphanumeric string.
    pub nonce: String,
}

impl Stamp {
    /// Creates a fixed stamp.
    pub fn new(timestamp: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            nonce: nonce.into(),
        }
    }

    /// Creates a stamp for the current second with a fresh nonce.
    pub fn generate() -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self {
            timestamp: Utc::now().timestamp().to_string(),
            nonce,
        }
    }
}

// ============================================================================
// Auth Info
// ============================================================================

/// A signed set of protocol parameters.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Flow that produced this signature.
    pub flow: OAuthType,
    /// Method the signature covers.
    pub method: WebMethod,
    /// Protocol parameters, `oauth_signature` included.
    pub parameters: WebParameterCollection,
    /// The string that was signed.
    pub signature_base: String,
    /// Signature method used.
    pub signature_method: SignatureMethod,
    /// Whether the signature is encoded on the wire.
    pub signature_treatment: SignatureTreatment,
    /// Where the protocol parameters go.
    pub parameter_handling: ParameterHandling,
    /// Authorization header realm.
    pub realm: Option<String>,
}

impl AuthInfo {
    /// Returns the signature.
    pub fn signature(&self) -> Option<&str> {
        self.parameters.get("oauth_signature")
    }
}

// ============================================================================
// Workflow
// ============================================================================

/// Builds signed [`AuthInfo`] for each OAuth flow.
#[derive(Clone, Default)]
pub struct OAuthWorkflow {
    /// Protocol version, `1.0` when unset.
    pub version: Option<String>,
    /// Consumer key.
    pub consumer_key: Option<String>,
    /// Consumer secret.
    pub consumer_secret: Option<String>,
    /// Request or access token.
    pub token: Option<String>,
    /// Token secret.
    pub token_secret: Option<String>,
    /// Callback sent with the request-token call.
    pub callback_url: Option<String>,
    /// Verifier sent with the access-token call.
    pub verifier: Option<String>,
    /// xAuth username.
    pub client_username: Option<String>,
    /// xAuth password.
    pub client_password: Option<String>,
    /// Request-token endpoint.
    pub request_token_url: Option<Url>,
    /// Access-token endpoint.
    pub access_token_url: Option<Url>,
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
    /// Fixed stamp; a fresh one is generated per signature when unset.
    pub stamp: Option<Stamp>,
}

/// Which optional protocol parameters a flow sends.
#[derive(Clone, Copy, Default)]
struct ProtocolParts {
    token: bool,
    callback: bool,
    verifier: bool,
    xauth: bool,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

fn require(value: Option<&String>, field: CredentialField) -> Result<&str, ValidationError> {
    present(value).ok_or(ValidationError::MissingField(field))
}

impl OAuthWorkflow {
    /// Creates an empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs a request-token call with the consumer secret only.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the URL, consumer key, or consumer
    /// secret is missing.
    #[instrument(skip(self, parameters), fields(flow = "request_token"))]
    pub fn build_request_token_info(
        &self,
        method: WebMethod,
        parameters: &WebParameterCollection,
    ) -> Result<AuthInfo, ClientError> {
        let url = self
            .request_token_url
            .as_ref()
            .ok_or(ValidationError::MissingField(CredentialField::RequestTokenUrl))?;
        require(self.consumer_key.as_ref(), CredentialField::ConsumerKey)?;
        require(self.consumer_secret.as_ref(), CredentialField::ConsumerSecret)?;

        let parts = ProtocolParts {
            callback: true,
            ..ProtocolParts::default()
        };
        self.sign_flow(OAuthType::RequestToken, method, url, parameters, parts, "")
    }

    /// Signs an access-token exchange with the consumer and token secrets.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the URL, consumer key, consumer
    /// secret, or token is missing.
    #[instrument(skip(self, parameters), fields(flow = "access_token"))]
    pub fn build_access_token_info(
        &self,
        method: WebMethod,
        parameters: &WebParameterCollection,
    ) -> Result<AuthInfo, ClientError> {
        let url = self
            .access_token_url
            .as_ref()
            .ok_or(ValidationError::MissingField(CredentialField::AccessTokenUrl))?;
        require(self.consumer_key.as_ref(), CredentialField::ConsumerKey)?;
        require(self.consumer_secret.as_ref(), CredentialField::ConsumerSecret)?;
        require(self.token.as_ref(), CredentialField::Token)?;

        let parts = ProtocolParts {
            token: true,
            verifier: true,
            ..ProtocolParts::default()
        };
        let token_secret = present(self.token_secret.as_ref()).unwrap_or_default();
        self.sign_flow(OAuthType::AccessToken, method, url, parameters, parts, token_secret)
    }

    /// Signs an xAuth exchange of user credentials for an access token.
    ///
    /// Always signs as POST, with the consumer secret only.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the URL, consumer key, consumer
    /// secret, username, or password is missing.
    #[instrument(skip(self, parameters), fields(flow = "client_auth"))]
    pub fn build_client_auth_info(
        &self,
        parameters: &WebParameterCollection,
    ) -> Result<AuthInfo, ClientError> {
        let url = self
            .access_token_url
            .as_ref()
            .ok_or(ValidationError::MissingField(CredentialField::AccessTokenUrl))?;
        require(self.consumer_key.as_ref(), CredentialField::ConsumerKey)?;
        require(self.consumer_secret.as_ref(), CredentialField::ConsumerSecret)?;
        if present(self.client_username.as_ref()).is_none()
            || present(self.client_password.as_ref()).is_none()
        {
            return Err(ValidationError::MissingField(CredentialField::ClientCredentials).into());
        }

        let parts = ProtocolParts {
            xauth: true,
            ..ProtocolParts::default()
        };
        self.sign_flow(
            OAuthType::ClientAuthentication,
            WebMethod::Post,
            url,
            parameters,
            parts,
            "",
        )
    }

    /// Signs a protected-resource call.
    ///
    /// The URL's query parameters are folded into a copy of `parameters`
    /// before signing; `parameters` itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the consumer key, consumer secret,
    /// token, or token secret is missing.
    #[instrument(skip(self, parameters, url), fields(flow = "protected_resource", url = %url))]
    pub fn build_protected_resource_info(
        &self,
        method: WebMethod,
        parameters: &WebParameterCollection,
        url: &Url,
    ) -> Result<AuthInfo, ClientError> {
        require(self.consumer_key.as_ref(), CredentialField::ConsumerKey)?;
        require(self.consumer_secret.as_ref(), CredentialField::ConsumerSecret)?;
        require(self.token.as_ref(), CredentialField::Token)?;
        let token_secret = require(self.token_secret.as_ref(), CredentialField::TokenSecret)?;

        let parts = ProtocolParts {
            token: true,
            ..ProtocolParts::default()
        };
        self.sign_flow(
            OAuthType::ProtectedResource,
            method,
            url,
            parameters,
            parts,
            token_secret,
        )
    }

    fn sign_flow(
        &self,
        flow: OAuthType,
        method: WebMethod,
        url: &Url,
        parameters: &WebParameterCollection,
        parts: ProtocolParts,
        token_secret: &str,
    ) -> Result<AuthInfo, ClientError> {
        if self.signature_method == SignatureMethod::PlainText && url.scheme() != "https" {
            return Err(ValidationError::InsecurePlaintext(url.to_string()).into());
        }

        let stamp = self.stamp.clone().unwrap_or_else(Stamp::generate);
        let mut protocol = self.protocol_parameters(&stamp, parts);

        let mut signing = parameters.clone();
        signing.extend(query_pairs(url));
        signing.extend(protocol.iter().map(|p| (p.name.clone(), p.value.clone())));

        let base = signature_base(method, url, &signing);
        let consumer_secret = present(self.consumer_secret.as_ref()).unwrap_or_default();
        let signature = sign(
            self.signature_method,
            &base,
            consumer_secret,
            token_secret,
            self.rsa_key.as_ref(),
        )?;
        protocol.add("oauth_signature", signature);

        debug!(
            flow = ?flow,
            method = %method,
            signature_method = %self.signature_method,
            parameters = signing.len(),
            "Signed request"
        );

        Ok(AuthInfo {
            flow,
            method,
            parameters: protocol,
            signature_base: base,
            signature_method: self.signature_method,
            signature_treatment: self.signature_treatment,
            parameter_handling: self.parameter_handling,
            realm: self.realm.clone(),
        })
    }

    fn protocol_parameters(&self, stamp: &Stamp, parts: ProtocolParts) -> WebParameterCollection {
        let mut params = WebParameterCollection::new();
        params.add(
            "oauth_consumer_key",
            present(self.consumer_key.as_ref()).unwrap_or_default(),
        );
        params.add("oauth_nonce", stamp.nonce.as_str());
        params.add("oauth_signature_method", self.signature_method.as_str());
        params.add("oauth_timestamp", stamp.timestamp.as_str());
        params.add(
            "oauth_version",
            present(self.version.as_ref()).unwrap_or(DEFAULT_VERSION),
        );

        if parts.token {
            if let Some(token) = present(self.token.as_ref()) {
                params.add("oauth_token", token);
            }
        }
        if parts.callback {
            if let Some(callback) = present(self.callback_url.as_ref()) {
                params.add("oauth_callback", callback);
            }
        }
        if parts.verifier {
            if let Some(verifier) = present(self.verifier.as_ref()) {
                params.add("oauth_verifier", verifier);
            }
        }
        if parts.xauth {
            params.add("x_auth_mode", "client_auth");
            params.add(
                "x_auth_password",
                present(self.client_password.as_ref()).unwrap_or_default(),
            );
            params.add(
                "x_auth_username",
                present(self.client_username.as_ref()).unwrap_or_default(),
            );
        }
        params
    }
}

impl fmt::Debug for OAuthWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthWorkflow")
            .field("consumer_key", &self.consumer_key)
            .field("token", &self.token)
            .field("signature_method", &self.signature_method)
            .field("parameter_handling", &self.parameter_handling)
            .field("request_token_url", &self.request_token_url)
            .field("access_token_url", &self.access_token_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protected_workflow() -> OAuthWorkflow {
        OAuthWorkflow {
            consumer_key: Some("dpf43f3p2l4k3l03".into()),
            consumer_secret: Some("kd94hf93k423kf44".into()),
            token: Some("nnch734d00sl2jdk".into()),
            token_secret: Some("pfkkdhi9sl3r4s00".into()),
            stamp: Some(Stamp::new("1191242096", "kllo9940pd9333jh")),
            ..OAuthWorkflow::default()
        }
    }

    #[test]
    fn test_protected_resource_appendix_signature() {
        let url = Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
            .unwrap();
        let info = protected_workflow()
            .build_protected_resource_info(WebMethod::Get, &WebParameterCollection::new(), &url)
            .unwrap();

        assert_eq!(info.signature(), Some("tR3+Ty81lMeYAr/Fid0kMTYa/WM="));
        assert_eq!(info.parameters.get("oauth_version"), Some("1.0"));
        assert!(!info.parameters.contains("file"));
    }

    #[test]
    fn test_signing_is_deterministic_and_parameter_sensitive() {
        let url = Url::parse("https://api.example.com/1/statuses").unwrap();
        let workflow = protected_workflow();
        let params: WebParameterCollection = [("status", "hello world")].into_iter().collect();

        let first = workflow
            .build_protected_resource_info(WebMethod::Post, &params, &url)
            .unwrap();
        let second = workflow
            .build_protected_resource_info(WebMethod::Post, &params, &url)
            .unwrap();
        assert_eq!(first.signature(), second.signature());

        let changed: WebParameterCollection = [("status", "hello world!")].into_iter().collect();
        let third = workflow
            .build_protected_resource_info(WebMethod::Post, &changed, &url)
            .unwrap();
        assert_ne!(first.signature(), third.signature());
    }

    #[test]
    fn test_protected_resource_leaves_parameters_untouched() {
        let url = Url::parse("https://api.example.com/search?q=a%20b").unwrap();
        let params: WebParameterCollection =
            [("since", "2024-01-01 00:00"), ("tag", "r&d")].into_iter().collect();
        let before = params.clone();

        protected_workflow()
            .build_protected_resource_info(WebMethod::Get, &params, &url)
            .unwrap();

        assert_eq!(params, before);
    }

    #[test]
    fn test_protected_resource_requires_token_secret() {
        let mut workflow = protected_workflow();
        workflow.token_secret = Some("   ".into());
        let url = Url::parse("https://api.example.com/").unwrap();

        let err = workflow
            .build_protected_resource_info(WebMethod::Get, &WebParameterCollection::new(), &url)
            .unwrap_err();
        assert_eq!(err.to_string(), "You must specify a token secret");
    }

    #[test]
    fn test_request_token_sends_callback_without_token() {
        let workflow = OAuthWorkflow {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            token: Some("stale".into()),
            callback_url: Some("https://app.example.com/cb?x=1".into()),
            request_token_url: Some(Url::parse("https://api.example.com/oauth/request_token").unwrap()),
            ..OAuthWorkflow::default()
        };

        let info = workflow
            .build_request_token_info(WebMethod::Post, &WebParameterCollection::new())
            .unwrap();

        assert_eq!(
            info.parameters.get("oauth_callback"),
            Some("https://app.example.com/cb?x=1")
        );
        assert!(!info.parameters.contains("oauth_token"));
        assert_eq!(info.flow, OAuthType::RequestToken);
    }

    #[test]
    fn test_request_token_requires_url() {
        let workflow = OAuthWorkflow {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            ..OAuthWorkflow::default()
        };
        let err = workflow
            .build_request_token_info(WebMethod::Get, &WebParameterCollection::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "You must specify a request token URL");
    }

    #[test]
    fn test_access_token_includes_verifier() {
        let workflow = OAuthWorkflow {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            token: Some("request-token".into()),
            verifier: Some("8675309".into()),
            access_token_url: Some(Url::parse("https://api.example.com/oauth/access_token").unwrap()),
            ..OAuthWorkflow::default()
        };

        let info = workflow
            .build_access_token_info(WebMethod::Post, &WebParameterCollection::new())
            .unwrap();

        assert_eq!(info.parameters.get("oauth_verifier"), Some("8675309"));
        assert_eq!(info.parameters.get("oauth_token"), Some("request-token"));
    }

    #[test]
    fn test_client_auth_signs_as_post_with_xauth_parameters() {
        let workflow = OAuthWorkflow {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            client_username: Some("ada".into()),
            client_password: Some("hunter2".into()),
            access_token_url: Some(Url::parse("https://api.example.com/oauth/access_token").unwrap()),
            ..OAuthWorkflow::default()
        };

        let info = workflow
            .build_client_auth_info(&WebParameterCollection::new())
            .unwrap();

        assert_eq!(info.method, WebMethod::Post);
        assert!(info.signature_base.starts_with("POST&"));
        assert_eq!(info.parameters.get("x_auth_mode"), Some("client_auth"));
        assert_eq!(info.parameters.get("x_auth_username"), Some("ada"));
        assert!(!info.parameters.contains("oauth_token"));
    }

    #[test]
    fn test_client_auth_requires_both_credentials() {
        let workflow = OAuthWorkflow {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            client_username: Some("ada".into()),
            access_token_url: Some(Url::parse("https://api.example.com/oauth/access_token").unwrap()),
            ..OAuthWorkflow::default()
        };
        let err = workflow
            .build_client_auth_info(&WebParameterCollection::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::MissingField(
                CredentialField::ClientCredentials
            ))
        ));
    }

    #[test]
    fn test_plaintext_requires_https() {
        let mut workflow = protected_workflow();
        workflow.signature_method = SignatureMethod::PlainText;
        let params = WebParameterCollection::new();

        let http = Url::parse("http://api.example.com/").unwrap();
        assert!(matches!(
            workflow.build_protected_resource_info(WebMethod::Get, &params, &http),
            Err(ClientError::Validation(ValidationError::InsecurePlaintext(_)))
        ));

        let https = Url::parse("https://api.example.com/").unwrap();
        let info = workflow
            .build_protected_resource_info(WebMethod::Get, &params, &https)
            .unwrap();
        assert_eq!(info.signature(), Some("kd94hf93k423kf44&pfkkdhi9sl3r4s00"));
    }

    #[test]
    fn test_generated_stamp_shape() {
        let stamp = Stamp::generate();
        assert_eq!(stamp.nonce.len(), NONCE_LEN);
        assert!(stamp.nonce.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(stamp.timestamp.parse::<i64>().unwrap() > 1_600_000_000);
    }
}
