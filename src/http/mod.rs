//! HTTP access for the tracker: the `HttpGetter` seam, its reqwest-backed
//! implementation with retry logic, and URL resolution helpers.

mod client;
mod retry;
mod urls;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;

pub use client::HttpClient;
pub use retry::{DEFAULT_MAX_RETRIES, RETRY_DELAY_MS, RetryPolicy, is_transient_status};
pub use urls::{is_absolute_url, join_url_path, resolve_chart_url};

/// Response returned by an [`HttpGetter`].
///
/// Non-success statuses are not errors at this level; callers inspect
/// `status` themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

/// The only network seam used by the tracker.
///
/// Errors are reserved for transport failures (DNS, connection, timeouts).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpGetter: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}
