//! Credential flags shared by the calling commands.
//!
//! Flags win over settings; secrets missing from the flags are read from the
//! keychain profile.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use sigil_core::WebMethod;
use sigil_http::{
    BasicAuthCredentials, ClientBuilder, CredentialStrategy, OAuthCredentials, OAuthType,
    ParameterHandling, Request, RsaKey, SignatureMethod,
};
use sigil_store::keychain::{self, SecretKind};
use sigil_store::{Settings, SettingsStore};
use tracing::{debug, warn};

/// Authentication flags.
#[derive(Args, Debug, Default, Clone)]
pub struct AuthArgs {
    /// OAuth consumer key.
    #[arg(long)]
    pub consumer_key: Option<String>,

    /// OAuth consumer secret.
    #[arg(long)]
    pub consumer_secret: Option<String>,

    /// OAuth token (request or access token).
    #[arg(long)]
    pub token: Option<String>,

    /// OAuth token secret.
    #[arg(long)]
    pub token_secret: Option<String>,

    /// OAuth verifier, for the access-token exchange.
    #[arg(long)]
    pub verifier: Option<String>,

    /// OAuth callback URL, for the request-token call.
    #[arg(long)]
    pub callback: Option<String>,

    /// OAuth flow: request-token, access-token, client-auth, protected-resource.
    #[arg(long)]
    pub oauth_type: Option<OAuthType>,

    /// Signature method: HMAC-SHA1, PLAINTEXT, RSA-SHA1.
    #[arg(long)]
    pub signature_method: Option<SignatureMethod>,

    /// Where OAuth parameters travel: header or url.
    #[arg(long)]
    pub parameter_handling: Option<ParameterHandling>,

    /// OAuth realm.
    #[arg(long)]
    pub realm: Option<String>,

    /// PEM file holding the RSA private key for RSA-SHA1.
    #[arg(long)]
    pub rsa_key: Option<std::path::PathBuf>,

    /// xAuth user credentials as user:pass.
    #[arg(long, value_name = "USER:PASS")]
    pub xauth: Option<String>,

    /// HTTP Basic credentials as user:pass.
    #[arg(long, value_name = "USER:PASS", conflicts_with = "consumer_key")]
    pub basic: Option<String>,

    /// Keychain profile for secrets.
    #[arg(long)]
    pub profile: Option<String>,
}

impl AuthArgs {
    /// Resolves the credential strategy, if any credentials are configured.
    pub fn credentials(&self, settings: &Settings) -> Result<Option<Arc<dyn CredentialStrategy>>> {
        if let Some(basic) = &self.basic {
            let (user, pass) = split_user_pass(basic)?;
            return Ok(Some(Arc::new(BasicAuthCredentials::new(user, pass))));
        }

        let profile = self.profile.as_deref().unwrap_or(&settings.profile);
        let Some(consumer_key) = self.consumer_key.clone().or_else(|| settings.consumer_key.clone())
        else {
            debug!("No consumer key configured, sending unsigned requests");
            return Ok(None);
        };

        let flow = self.oauth_type.unwrap_or_else(|| {
            if self.xauth.is_some() {
                OAuthType::ClientAuthentication
            } else if self.verifier.is_some() {
                OAuthType::AccessToken
            } else {
                OAuthType::ProtectedResource
            }
        });

        let mut credentials = OAuthCredentials::new(flow);
        credentials.consumer_key = Some(consumer_key);
        credentials.consumer_secret = self
            .consumer_secret
            .clone()
            .or_else(|| keychain_secret(profile, SecretKind::ConsumerSecret));
        credentials.token = self.token.clone().or_else(|| settings.token.clone());
        credentials.token_secret = self
            .token_secret
            .clone()
            .or_else(|| keychain_secret(profile, SecretKind::TokenSecret));
        credentials.verifier.clone_from(&self.verifier);
        credentials.callback_url.clone_from(&self.callback);
        credentials.realm.clone_from(&self.realm);
        credentials.signature_method = self.signature_method.unwrap_or(settings.signature_method);
        credentials.parameter_handling =
            self.parameter_handling.unwrap_or(settings.parameter_handling);

        if let Some(xauth) = &self.xauth {
            let (user, pass) = split_user_pass(xauth)?;
            credentials.client_username = Some(user.to_string());
            credentials.client_password = Some(pass.to_string());
        } else if flow == OAuthType::ClientAuthentication {
            credentials.client_password = keychain_secret(profile, SecretKind::Password);
        }

        if let Some(path) = &self.rsa_key {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("reading RSA key {}", path.display()))?;
            credentials = credentials.with_rsa_key(RsaKey::from_pem(&pem)?);
        }

        debug!(flow = %flow, profile = profile, "Resolved OAuth credentials");
        Ok(Some(Arc::new(credentials)))
    }
}

fn keychain_secret(profile: &str, kind: SecretKind) -> Option<String> {
    match keychain::get_secret(profile, kind) {
        Ok(secret) => secret,
        Err(e) => {
            warn!(profile = profile, kind = %kind, error = %e, "Keychain unavailable");
            None
        }
    }
}

fn split_user_pass(value: &str) -> Result<(&str, &str)> {
    match value.split_once(':') {
        Some((user, pass)) if !user.is_empty() => Ok((user, pass)),
        _ => bail!("expected USER:PASS, got '{value}'"),
    }
}

// ============================================================================
// Request Flags
// ============================================================================

/// Flags describing the call itself.
#[derive(Args, Debug, Default, Clone)]
pub struct CallArgs {
    /// URL, or a path resolved against the configured authority.
    pub url: String,

    /// HTTP method.
    #[arg(long, short = 'X')]
    pub method: Option<WebMethod>,

    /// Parameter as name=value; repeatable.
    #[arg(long = "param", short = 'p', value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Header as Name:Value; repeatable.
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Watchdog timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl CallArgs {
    /// Builds the request these flags describe.
    pub fn request(&self) -> Request {
        let mut request = Request::new(&self.url);
        if let Some(method) = self.method {
            request = request.with_method(method);
        }
        for (name, value) in &self.params {
            request = request.with_parameter(name, value);
        }
        for (name, value) in &self.headers {
            request = request.with_header(name, value);
        }
        if let Some(secs) = self.timeout {
            request = request.with_timeout(std::time::Duration::from_secs(secs));
        }
        request
    }
}

/// Parses `name=value`.
pub fn parse_param(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{value}'"))
}

/// Parses `Name:Value`, trimming the space after the colon.
pub fn parse_header(value: &str) -> Result<(String, String), String> {
    value
        .split_once(':')
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| (name.trim().to_string(), value.trim_start().to_string()))
        .ok_or_else(|| format!("expected NAME:VALUE, got '{value}'"))
}

/// Loads settings and prepares a client builder with the resolved credentials.
pub async fn client_builder(auth: &AuthArgs) -> Result<ClientBuilder> {
    let store = SettingsStore::load_default().await?;
    let settings = store.get().await;
    let mut builder = settings.to_builder();
    if let Some(credentials) = auth.credentials(&settings)? {
        builder = builder.shared_credentials(credentials);
    }
    Ok(builder)
}

// ============================================================================
// Tests
// ============================================================================
