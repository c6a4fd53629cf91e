//! HTTP client with built-in retry logic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use std::time::Duration;

use super::retry::{RetryPolicy, is_transient_status};
use super::{HttpGetter, HttpResponse};

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Builds a client with the given user agent and per-request timeout.
    pub fn build(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(client))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Single request attempt, reading the whole body.
    async fn get_once(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpGetter for HttpClient {
    /// Performs a GET request, retrying transport errors and transient
    /// statuses. The last response is returned as-is once attempts run out.
    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!("GET {}...", url);

        let attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            match self.get_once(url).await {
                Ok(response) if is_transient_status(response.status) && attempt < attempts => {
                    warn!(
                        "GET {}: attempt {}/{} returned {}, retrying in {:?}...",
                        url, attempt, attempts, response.status, self.retry.delay
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < attempts => {
                    warn!(
                        "GET {}: attempt {}/{} failed ({:#}), retrying in {:?}...",
                        url, attempt, attempts, e, self.retry.delay
                    );
                }
                Err(e) => return Err(e.context(format!("GET {} failed after {} attempts", url, attempt))),
            }

            attempt += 1;
            tokio::time::sleep(self.retry.delay).await;
        }
    }
}
