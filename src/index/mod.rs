//! Repository index (`index.yaml`) loading.

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{ChartRepository, ChartVersion};
use crate::http::{HttpGetter, join_url_path};

/// File name of a Helm repository index.
pub const INDEX_FILE: &str = "index.yaml";

/// Parsed repository index: chart name to published versions.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

impl IndexFile {
    /// Parses an index document, normalizing its entries.
    ///
    /// Versions without a name inherit the entry key; versions without a
    /// version string cannot be keyed and are dropped.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut index: IndexFile =
            serde_yaml::from_slice(data).context("Failed to parse repository index")?;

        for (name, versions) in index.entries.iter_mut() {
            versions.retain_mut(|cv| {
                if cv.name.trim().is_empty() {
                    cv.name = name.clone();
                }
                if cv.version.trim().is_empty() {
                    warn!("Skipping {} entry without a version", name);
                    return false;
                }
                true
            });
        }
        index.entries.retain(|_, versions| !versions.is_empty());

        Ok(index)
    }

    /// Total number of chart versions in the index.
    pub fn version_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Fetches repository indexes.
pub struct IndexLoader<G: HttpGetter> {
    http: Arc<G>,
}

impl<G: HttpGetter> IndexLoader<G> {
    pub fn new(http: Arc<G>) -> Self {
        Self { http }
    }

    /// Loads `<repository url>/index.yaml`.
    #[tracing::instrument(skip(self), fields(repo = %repo.name))]
    pub async fn load(&self, repo: &ChartRepository) -> Result<IndexFile> {
        let url = join_url_path(&repo.url, INDEX_FILE)?;
        debug!("Loading index for {} from {}", repo.name, url);

        let response = self
            .http
            .get(&url)
            .await
            .with_context(|| format!("Failed to fetch index {}", url))?;

        if !response.is_ok() {
            bail!(
                "unexpected status code received fetching index {}: {}",
                url,
                response.status.as_u16()
            );
        }

        let index = IndexFile::parse(&response.body)?;
        debug!(
            "Index for {} lists {} chart(s), {} version(s)",
            repo.name,
            index.entries.len(),
            index.version_count()
        );
        Ok(index)
    }
}
