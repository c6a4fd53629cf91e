use anyhow::Result;

use super::config::Config;
use crate::catalog::{FileCatalog, RepositoryStore};
use crate::runtime::Runtime;

/// Prints the packages registered for a repository.
#[tracing::instrument(skip(runtime, config))]
pub async fn packages<R: Runtime>(runtime: R, config: &Config, repo_name: &str) -> Result<()> {
    let catalog = FileCatalog::open(runtime, config.catalog_path())?;
    let repo = catalog.repository_by_name(repo_name).await?;
    let packages = catalog.packages(&repo.repository_id).await;

    if packages.is_empty() {
        println!("No packages registered for {}.", repo.name);
        return Ok(());
    }

    for package in packages {
        let mut line = format!("{} {}", package.name, package.version);
        if package.signed {
            line.push_str(" [signed]");
        }
        if package.deprecated {
            line.push_str(" [deprecated]");
        }
        println!("{}", line);
    }
    Ok(())
}
