//! Network access for the worker.

use std::time::Duration;

use async_trait::async_trait;
use url::Origin;

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::http::{Request, RequestMode, Response, ResponseType};

/// Abstraction over the network so handlers can be driven by fakes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issues `request` and returns the response, or an error if no response
    /// was received at all. Non-2xx statuses are responses, not errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Origin,
}

/// Builds a configured HTTP client.
fn build_http_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30));
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    builder.build()
}

impl HttpFetcher {
    /// Creates a fetcher for a worker running at `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig, origin: Origin) -> Result<Self> {
        Ok(Self::with_client(build_http_client(config)?, origin))
    }

    /// Creates a fetcher around an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, origin: Origin) -> Self {
        Self { client, origin }
    }

    /// How the response to `request` is exposed to the page.
    fn response_type(&self, request: &Request) -> ResponseType {
        if request.url.origin() == self.origin {
            ResponseType::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let kind = self.response_type(request);
        if request.mode == RequestMode::SameOrigin && kind != ResponseType::Basic {
            return Err(Error::Network(format!(
                "cross-origin request to {} in same-origin mode",
                request.url
            )));
        }

        let resp = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        if kind == ResponseType::Opaque {
            return Ok(Response::opaque());
        }

        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            kind,
            headers,
            body,
        })
    }
}
