//! # EZEvent Net
//!
//! `reqwest`-backed implementation of the worker's [`Network`] capability.
//! Responses are buffered in full; transport failures become
//! [`SwError::Network`] and HTTP error statuses are returned as responses.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ezevent_sw::{Network, Request, Response, SwError, SwResult};
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Errors that can occur while building the client.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("ezevent-sw/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Live network access through `reqwest`.
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a new network client.
    pub fn new(config: HttpConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        info!(user_agent = %config.user_agent, "HttpNetwork initialized");
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: Request) -> SwResult<Response> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");
        let url = request.url.to_string();

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| SwError::network(&url, format!("bad method: {e}")))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SwError::network(&url, e.to_string()))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| SwError::network(&url, e.to_string()))?;

        trace!(url = %final_url, status = %status, body_len = body.len(), "Response received");

        Ok(Response {
            url: final_url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            from_cache: false,
        })
    }
}
