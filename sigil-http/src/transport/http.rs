//! `reqwest`-backed transport.
//!
//! One `reqwest::Client` is built per proxy/redirect combination and reused
//! for every request that asks for it.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, RequestBuilder, header};
use sigil_core::WebMethod;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};

use super::{LineStream, MultipartBody, Transport, WireBody, WireRequest, WireResponse, WireStream};
use crate::error::{ClientError, TransportError};

/// User agent sent when a request does not set its own.
pub const DEFAULT_USER_AGENT: &str = concat!("sigil/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 10;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: Option<String>,
    follow_redirects: bool,
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// Transport over real HTTP.
#[derive(Debug, Default)]
pub struct HttpTransport {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl HttpTransport {
    /// Creates the transport and builds its default client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, ClientError> {
        let transport = Self::default();
        transport.client_for(&ClientKey {
            proxy: None,
            follow_redirects: true,
        })?;
        Ok(transport)
    }

    fn client_for(&self, key: &ClientKey) -> Result<Client, reqwest::Error> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        let policy = if key.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        let mut builder = Client::builder().user_agent(DEFAULT_USER_AGENT).redirect(policy);
        if let Some(proxy) = &key.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;

        debug!(proxy = ?key.proxy, follow_redirects = key.follow_redirects, "Built HTTP client");
        clients.insert(key.clone(), client.clone());
        Ok(client)
    }

    async fn prepare(&self, request: WireRequest) -> Result<RequestBuilder, TransportError> {
        let client = self.client_for(&ClientKey {
            proxy: request.proxy.clone(),
            follow_redirects: request.follow_redirects,
        })?;

        let mut builder = client.request(to_method(request.method), request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        Ok(match request.body {
            WireBody::Empty => builder,
            WireBody::Bytes {
                content,
                content_type,
            } => builder
                .header(header::CONTENT_TYPE, content_type)
                .body(content),
            WireBody::Multipart(body) => builder.multipart(build_form(body).await?),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        debug!("Sending request");
        let response = self.prepare(request).await?.send().await?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let headers = collect_headers(response.headers());
        let url = response.url().to_string();
        let body = response.text().await?;

        debug!(status = %status, bytes = body.len(), "Response received");
        Ok(WireResponse {
            status: status.as_u16(),
            reason,
            headers,
            body,
            url,
            is_mock: false,
        })
    }

    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn open_stream(&self, request: WireRequest) -> Result<WireStream, TransportError> {
        debug!("Opening stream");
        let response = self.prepare(request).await?.send().await?;

        let status = response.status();
        debug!(status = %status, "Stream opened");
        Ok(WireStream {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers: collect_headers(response.headers()),
            url: response.url().to_string(),
            is_mock: false,
            lines: line_stream(response),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn to_method(method: WebMethod) -> Method {
    match method {
        WebMethod::Get => Method::GET,
        WebMethod::Post => Method::POST,
        WebMethod::Put => Method::PUT,
        WebMethod::Delete => Method::DELETE,
        WebMethod::Head => Method::HEAD,
        WebMethod::Options => Method::OPTIONS,
    }
}

fn collect_headers(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

async fn build_form(body: MultipartBody) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in body.fields {
        form = form.text(name, value);
    }
    for file in body.files {
        let bytes = tokio::fs::read(&file.path).await?;
        let mime = file.content_type.as_deref().unwrap_or(OCTET_STREAM);
        let part = Part::bytes(bytes)
            .file_name(file.file_name)
            .mime_str(mime)?;
        form = form.part(file.name, part);
    }
    if let Some(content) = body.content {
        form = form.part("content", Part::bytes(content).mime_str(OCTET_STREAM)?);
    }
    Ok(form)
}

fn line_stream(response: reqwest::Response) -> LineStream {
    let bytes = Box::pin(response.bytes_stream().map_err(io::Error::other));
    let lines = BufReader::new(StreamReader::new(bytes)).lines();

    stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(TransportError::Body(e.to_string())), lines)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_format() {
        assert!(DEFAULT_USER_AGENT.starts_with("sigil/"));
    }

    #[test]
    fn test_clients_are_cached_per_key() {
        let transport = HttpTransport::new().unwrap();
        let key = ClientKey {
            proxy: None,
            follow_redirects: false,
        };
        transport.client_for(&key).unwrap();
        transport.client_for(&key).unwrap();

        let clients = transport.clients.lock().unwrap();
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let transport = HttpTransport::default();
        let key = ClientKey {
            proxy: Some("http://[::1".into()),
            follow_redirects: true,
        };
        assert!(transport.client_for(&key).is_err());
    }

    #[tokio::test]
    async fn test_form_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello").unwrap();

        let body = MultipartBody {
            fields: vec![("title".into(), "Note".into())],
            files: vec![sigil_core::FilePart::new("upload", &path)],
            content: None,
        };
        assert!(build_form(body).await.is_ok());

        let missing = MultipartBody {
            files: vec![sigil_core::FilePart::new("upload", dir.path().join("gone"))],
            ..MultipartBody::default()
        };
        assert!(matches!(
            build_form(missing).await,
            Err(TransportError::Io(_))
        ));
    }
}
