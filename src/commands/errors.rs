use anyhow::Result;

use super::config::Config;
use crate::catalog::{FileCatalog, RepositoryStore};
use crate::runtime::Runtime;

/// Prints the errors reported by the last tracking run of a repository.
#[tracing::instrument(skip(runtime, config))]
pub async fn errors<R: Runtime>(runtime: R, config: &Config, repo_name: &str) -> Result<()> {
    let catalog = FileCatalog::open(runtime, config.catalog_path())?;
    let repo = catalog.repository_by_name(repo_name).await?;
    let errors = catalog.last_tracking_errors(&repo.repository_id).await;

    if errors.is_empty() {
        println!("No tracking errors for {}.", repo.name);
        return Ok(());
    }
    for error in errors {
        println!("{}", error);
    }
    Ok(())
}
