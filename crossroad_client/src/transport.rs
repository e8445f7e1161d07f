//! Transport adapter.
//!
//! One request name in, one raw response body out. No retries: the caller
//! decides what a failure means.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use crossroad_shared::{config::ClientConfig, error::TransportError, net::RequestBody};
use tracing::debug;

/// Sends a named request to the simulation server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request_name: &str) -> Result<String, TransportError>;
}

/// HTTP POST transport with a JSON `{"request": ...}` body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("build http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let timeout = cfg
            .request_timeout_secs
            .filter(|secs| *secs > 0.0)
            .map(Duration::try_from_secs_f32)
            .transpose()
            .context("request timeout")?;
        Self::new(cfg.server_url.clone(), timeout)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request_name: &str) -> Result<String, TransportError> {
        debug!(request = %request_name, url = %self.url, "POST");
        let fail = |e: reqwest::Error| TransportError::new(request_name, e.to_string());

        let response = self
            .client
            .post(&self.url)
            .json(&RequestBody::new(request_name))
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?;

        response.text().await.map_err(fail)
    }
}
