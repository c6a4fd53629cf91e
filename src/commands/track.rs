use anyhow::{Result, bail};
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::config::Config;
use crate::catalog::{CatalogError, FileCatalog, RepositoryStore};
use crate::images::FsImageStore;
use crate::runtime::Runtime;
use crate::tracker::{RunSummary, Tracker};

/// Tracks the repositories named in `filter`, or all of them when empty.
#[tracing::instrument(skip(runtime, config, cancel))]
pub async fn track<R: Runtime + Clone + 'static>(
    runtime: R,
    config: &Config,
    filter: &[String],
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let catalog = Arc::new(FileCatalog::open(runtime.clone(), config.catalog_path())?);
    let images = Arc::new(FsImageStore::new(runtime, config.images_dir()));
    let http = Arc::new(config.http_client()?);

    let mut repos = catalog.repositories().await?;
    if !filter.is_empty() {
        if let Some(unknown) = filter.iter().find(|name| !repos.iter().any(|r| &r.name == *name)) {
            bail!(CatalogError::RepositoryNotFound(unknown.clone()));
        }
        repos.retain(|r| filter.contains(&r.name));
    }

    if repos.is_empty() {
        println!("No repositories to track.");
        return Ok(RunSummary::default());
    }

    info!(
        "Tracking {} repositories with {} worker(s)",
        repos.len(),
        config.tracker.workers
    );
    let tracker = Tracker::new(
        http,
        Arc::clone(&catalog),
        Arc::clone(&catalog),
        images,
        config.tracker,
    );
    let summary = tracker.run(&repos, cancel).await;

    println!(
        "Tracked {} repositories: {} registered, {} unregistered, {} error(s)",
        summary.repositories, summary.register_jobs, summary.unregister_jobs, summary.errors
    );
    if summary.cancelled {
        bail!("Tracking run cancelled");
    }
    Ok(summary)
}
