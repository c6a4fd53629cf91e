use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::CATALOG_FILE;
use crate::http::{HttpClient, RetryPolicy};
use crate::runtime::Runtime;
use crate::tracker::TrackerOptions;

/// Environment variable overriding the data root.
pub const ROOT_ENV: &str = "CHART_TRACKER_ROOT";

/// Directory holding stored logo images, relative to the data root.
pub const IMAGES_DIR: &str = "images";

/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub fn user_agent() -> String {
    format!("chart-tracker/{}", env!("CHART_TRACKER_VERSION"))
}

/// Settings shared by all commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root: PathBuf,
    pub user_agent: String,
    pub timeout: Duration,
    /// Attempts per HTTP request.
    pub retries: usize,
    pub tracker: TrackerOptions,
}

impl Config {
    pub fn new<R: Runtime>(runtime: &R, root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(path) => path,
            None => default_root(runtime)?,
        };
        debug!("Using data root {}", root.display());

        Ok(Self {
            root,
            user_agent: user_agent(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: RetryPolicy::default().max_attempts,
            tracker: TrackerOptions::default(),
        })
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn http_client(&self) -> Result<HttpClient> {
        let retry = RetryPolicy {
            max_attempts: self.retries,
            ..Default::default()
        };
        Ok(HttpClient::build(&self.user_agent, self.timeout)?.with_retry_policy(retry))
    }
}

/// Resolves the data root: `$CHART_TRACKER_ROOT`, then the platform data
/// directory, then `~/.chart-tracker`.
#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if let Ok(root) = runtime.env_var(ROOT_ENV)
        && !root.trim().is_empty()
    {
        return Ok(PathBuf::from(root));
    }
    if let Some(data_dir) = runtime.data_dir() {
        return Ok(data_dir.join("chart-tracker"));
    }
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(".chart-tracker"))
}
