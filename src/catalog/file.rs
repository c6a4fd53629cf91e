use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::Mutex;

use super::{CatalogError, PackageManager, RepositoryStore};
use crate::domain::{ChartRepository, Package, package_key};
use crate::runtime::Runtime;

/// File name of the catalog document inside the data root.
pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackingErrors {
    errors: Vec<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CatalogState {
    #[serde(default)]
    repositories: Vec<ChartRepository>,
    #[serde(default)]
    packages: Vec<Package>,
    #[serde(default)]
    tracking_errors: BTreeMap<String, TrackingErrors>,
}

impl CatalogState {
    fn repository(&self, repository_id: &str) -> Option<&ChartRepository> {
        self.repositories
            .iter()
            .find(|r| r.repository_id == repository_id)
    }
}

/// Catalog persisted as a single JSON document.
///
/// Every mutation rewrites the whole document while holding the state lock,
/// and is rolled back in memory when the write fails. Writes therefore cost
/// O(catalog size) and registrations are serialized; a first run over a large
/// repository performs one full rewrite per new package.
pub struct FileCatalog<R: Runtime> {
    runtime: R,
    path: PathBuf,
    state: Mutex<CatalogState>,
}

impl<R: Runtime> FileCatalog<R> {
    /// Opens the catalog at `path`, starting empty if the file does not exist.
    #[tracing::instrument(skip(runtime))]
    pub fn open(runtime: R, path: PathBuf) -> Result<Self> {
        let state = if runtime.exists(&path) {
            let content = runtime
                .read_to_string(&path)
                .with_context(|| format!("Failed to read catalog {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse catalog {:?}", path))?
        } else {
            debug!("No catalog at {:?}, starting empty", path);
            CatalogState::default()
        };

        Ok(Self {
            runtime,
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &CatalogState) -> Result<(), CatalogError> {
        let write = || -> Result<()> {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
                && !self.runtime.exists(parent)
            {
                self.runtime.create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(state)?;
            self.runtime
                .write_atomic(&self.path, content.as_bytes())
                .with_context(|| format!("Failed to save catalog to {:?}", self.path))
        };
        blocking(write).map_err(|e| CatalogError::DatabaseFailure(format!("{:#}", e)))
    }

    /// Applies `mutate` to a copy of the state and commits it once persisted.
    ///
    /// Used by the repository level operations, which are rare.
    async fn update<T, F>(&self, mutate: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&mut CatalogState) -> Result<T, CatalogError>,
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let result = mutate(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(result)
    }

    /// Adds a repository to track. Names are unique.
    #[tracing::instrument(skip(self))]
    pub async fn add_repository(&self, name: &str, url: &str) -> Result<ChartRepository, CatalogError> {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(CatalogError::InvalidInput(format!(
                "invalid repository name: {:?}",
                name
            )));
        }
        let parsed = url::Url::parse(url.trim())
            .map_err(|e| CatalogError::InvalidInput(format!("invalid repository url {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CatalogError::InvalidInput(format!(
                "unsupported repository url scheme: {}",
                parsed.scheme()
            )));
        }

        let repo = ChartRepository::new(uuid::Uuid::new_v4().to_string(), name, url.trim());
        let added = repo.clone();
        self.update(move |state| {
            if state.repositories.iter().any(|r| r.name == repo.name) {
                return Err(CatalogError::RepositoryExists(repo.name));
            }
            state.repositories.push(repo);
            Ok(())
        })
        .await?;
        Ok(added)
    }

    /// Removes a repository together with its packages and tracking errors.
    #[tracing::instrument(skip(self))]
    pub async fn remove_repository(&self, name: &str) -> Result<ChartRepository, CatalogError> {
        self.update(|state| {
            let index = state
                .repositories
                .iter()
                .position(|r| r.name == name)
                .ok_or_else(|| CatalogError::RepositoryNotFound(name.to_string()))?;
            let repo = state.repositories.remove(index);
            state
                .packages
                .retain(|p| p.repository_id() != Some(repo.repository_id.as_str()));
            state.tracking_errors.remove(&repo.repository_id);
            Ok(repo)
        })
        .await
    }

    /// Packages registered for a repository, sorted by name then version.
    pub async fn packages(&self, repository_id: &str) -> Vec<Package> {
        let state = self.state.lock().await;
        let mut packages: Vec<Package> = state
            .packages
            .iter()
            .filter(|p| p.repository_id() == Some(repository_id))
            .cloned()
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        packages
    }

    /// Errors reported by the last tracking run of a repository.
    pub async fn last_tracking_errors(&self, repository_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .tracking_errors
            .get(repository_id)
            .map(|t| t.errors.clone())
            .unwrap_or_default()
    }
}

/// Runs blocking file I/O without stalling the other tasks of a
/// multi-threaded runtime.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[async_trait]
impl<R: Runtime> PackageManager for FileCatalog<R> {
    #[tracing::instrument(skip(self, package), fields(name = %package.name, version = %package.version))]
    async fn register(&self, package: &Package) -> Result<(), CatalogError> {
        if package.name.trim().is_empty() || package.version.trim().is_empty() {
            return Err(CatalogError::InvalidInput(
                "package name and version are required".to_string(),
            ));
        }
        let repository_id = package
            .repository_id()
            .ok_or_else(|| CatalogError::InvalidInput("package has no repository".to_string()))?
            .to_string();

        let mut state = self.state.lock().await;
        if state.repository(&repository_id).is_none() {
            return Err(CatalogError::RepositoryNotFound(repository_id));
        }

        match state.packages.iter().position(|p| p.same_identity(package)) {
            Some(index) if state.packages[index] == *package => {
                debug!("{}@{} is unchanged", package.name, package.version);
                Ok(())
            }
            Some(index) => {
                let previous = std::mem::replace(&mut state.packages[index], package.clone());
                self.persist(&state).inspect_err(|_| state.packages[index] = previous)
            }
            None => {
                state.packages.push(package.clone());
                self.persist(&state).inspect_err(|_| {
                    state.packages.pop();
                })
            }
        }
    }

    #[tracing::instrument(skip(self, package), fields(name = %package.name, version = %package.version))]
    async fn unregister(&self, package: &Package) -> Result<(), CatalogError> {
        let mut state = self.state.lock().await;
        let Some(index) = state.packages.iter().position(|p| p.same_identity(package)) else {
            debug!("{}@{} is not registered", package.name, package.version);
            return Ok(());
        };

        let removed = state.packages.remove(index);
        self.persist(&state)
            .inspect_err(|_| state.packages.insert(index, removed))
    }
}

#[async_trait]
impl<R: Runtime> RepositoryStore for FileCatalog<R> {
    async fn repositories(&self) -> Result<Vec<ChartRepository>, CatalogError> {
        Ok(self.state.lock().await.repositories.clone())
    }

    async fn repository_by_name(&self, name: &str) -> Result<ChartRepository, CatalogError> {
        self.state
            .lock()
            .await
            .repositories
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::RepositoryNotFound(name.to_string()))
    }

    async fn packages_digest(
        &self,
        repository_id: &str,
    ) -> Result<HashMap<String, String>, CatalogError> {
        let state = self.state.lock().await;
        if state.repository(repository_id).is_none() {
            return Err(CatalogError::RepositoryNotFound(repository_id.to_string()));
        }
        Ok(state
            .packages
            .iter()
            .filter(|p| p.repository_id() == Some(repository_id))
            .map(|p| (package_key(&p.name, &p.version), p.digest.clone()))
            .collect())
    }

    async fn set_last_tracking_errors(
        &self,
        repository_id: &str,
        errors: &[String],
    ) -> Result<(), CatalogError> {
        let mut state = self.state.lock().await;
        if state.repository(repository_id).is_none() {
            return Err(CatalogError::RepositoryNotFound(repository_id.to_string()));
        }

        let entry = TrackingErrors {
            errors: errors.to_vec(),
            updated_at: Utc::now(),
        };
        let previous = state.tracking_errors.insert(repository_id.to_string(), entry);
        self.persist(&state).inspect_err(|_| match previous {
            Some(previous) => {
                state.tracking_errors.insert(repository_id.to_string(), previous);
            }
            None => {
                state.tracking_errors.remove(repository_id);
            }
        })
    }
}
