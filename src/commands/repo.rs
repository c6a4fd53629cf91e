use anyhow::{Context, Result};
use log::info;

use super::config::Config;
use crate::catalog::{FileCatalog, RepositoryStore};
use crate::runtime::Runtime;

/// Starts tracking a chart repository.
#[tracing::instrument(skip(runtime, config))]
pub async fn repo_add<R: Runtime>(runtime: R, config: &Config, name: &str, url: &str) -> Result<()> {
    let catalog = FileCatalog::open(runtime, config.catalog_path())?;
    let repo = catalog
        .add_repository(name, url)
        .await
        .with_context(|| format!("Failed to add repository {}", name))?;

    info!("Added repository {} with id {}", repo, repo.repository_id);
    println!("Added repository {} ({})", repo.name, repo.url);
    Ok(())
}

/// Prints the tracked repositories.
#[tracing::instrument(skip(runtime, config))]
pub async fn repo_list<R: Runtime>(runtime: R, config: &Config) -> Result<()> {
    let catalog = FileCatalog::open(runtime, config.catalog_path())?;
    let repos = catalog.repositories().await?;

    if repos.is_empty() {
        println!("No repositories.");
        return Ok(());
    }
    for repo in repos {
        println!("{} {}", repo.name, repo.url);
    }
    Ok(())
}

/// Stops tracking a repository, dropping its packages.
#[tracing::instrument(skip(runtime, config))]
pub async fn repo_remove<R: Runtime>(runtime: R, config: &Config, name: &str) -> Result<()> {
    let catalog = FileCatalog::open(runtime, config.catalog_path())?;
    let repo = catalog
        .remove_repository(name)
        .await
        .with_context(|| format!("Failed to remove repository {}", name))?;

    println!("Removed repository {}", repo.name);
    Ok(())
}
