use log::debug;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use super::{Chart, ParseError, load_archive};
use crate::http::HttpGetter;

/// Why a remote chart could not be loaded.
#[derive(Debug, Error)]
pub enum ChartLoadError {
    #[error("{0}")]
    Fetch(String),
    #[error("unexpected status code received: {}", .0.as_u16())]
    UnexpectedStatus(StatusCode),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Fetches chart archives over HTTP and parses them.
pub struct ChartLoader<G: HttpGetter> {
    http: Arc<G>,
}

impl<G: HttpGetter> Clone for ChartLoader<G> {
    fn clone(&self) -> Self {
        Self {
            http: Arc::clone(&self.http),
        }
    }
}

impl<G: HttpGetter> ChartLoader<G> {
    pub fn new(http: Arc<G>) -> Self {
        Self { http }
    }

    /// Loads the chart archive located at the (absolute) url provided.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, url: &str) -> Result<Chart, ChartLoadError> {
        let response = self
            .http
            .get(url)
            .await
            .map_err(|e| ChartLoadError::Fetch(format!("{:#}", e)))?;

        if !response.is_ok() {
            return Err(ChartLoadError::UnexpectedStatus(response.status));
        }

        debug!("Fetched {} bytes from {}", response.body.len(), url);
        Ok(load_archive(&response.body)?)
    }
}
