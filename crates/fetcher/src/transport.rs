//! The injected HTTP transport behind the fetch engine.
//!
//! The engine only ever sees [`Transport`]; the production implementation
//! wraps a reqwest client pool, and tests substitute a scripted fake.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use webgrip_core::config::FetcherConfig;
use webgrip_core::Error;

use crate::error::{classify_reqwest, ErrorKind};
use crate::types::FetchRequest;

/// A transport-level failure, already classified.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            kind: classify_reqwest(&err),
            message: err.to_string(),
        }
    }
}

/// Response body as a stream of byte chunks; chunk sizes are whatever the
/// transport produces, the engine re-chunks for disk writes.
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// What a single executed request hands back before the body is consumed.
pub struct TransportReply {
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<TransportReply, TransportError>;
}

/// reqwest-backed transport. Owns one connection pool per TLS stance so a
/// per-request `verify_tls` flag never rebuilds a client.
pub struct HttpTransport {
    verified: Client,
    unverified: Client,
    proxy: Option<String>,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(config: &FetcherConfig) -> webgrip_core::Result<Self> {
        let verified = build_client(&config.user_agent, config.proxy.as_deref(), true)
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        let unverified = build_client(&config.user_agent, config.proxy.as_deref(), false)
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            verified,
            unverified,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Pooled client for the request, or a one-off when the request carries
    /// a proxy override different from the engine's.
    fn client_for(&self, request: &FetchRequest) -> std::result::Result<Client, TransportError> {
        match &request.proxy {
            Some(proxy) if self.proxy.as_deref() != Some(proxy.as_str()) => {
                build_client(&self.user_agent, Some(proxy), request.verify_tls).map_err(|e| {
                    TransportError::new(
                        ErrorKind::ClientProtocol,
                        format!("Failed to build proxied client: {}", e),
                    )
                })
            }
            _ => Ok(if request.verify_tls {
                self.verified.clone()
            } else {
                self.unverified.clone()
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<TransportReply, TransportError> {
        let client = self.client_for(request)?;

        let mut req = client.get(&request.url).timeout(request.timeout);
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let response = req.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_length = response.content_length();
        let headers = header_map(response.headers());
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(TransportReply {
            final_url,
            status,
            headers,
            content_length,
            body,
        })
    }
}

fn build_client(
    user_agent: &str,
    proxy: Option<&str>,
    verify_tls: bool,
) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .danger_accept_invalid_certs(!verify_tls);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in headers {
        if let Ok(text) = value.to_str() {
            map.insert(key.as_str().to_string(), text.to_string());
        }
    }
    map
}
