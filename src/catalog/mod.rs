//! The package catalog: the store the tracker reconciles repositories into.
//!
//! The tracker only sees the [`PackageManager`] and [`RepositoryStore`]
//! traits. [`FileCatalog`] is the bundled implementation, persisting the
//! whole catalog as one JSON document.

mod file;

pub use file::{CATALOG_FILE, FileCatalog};

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{ChartRepository, Package};

/// Failures reported by catalog operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("database failure: {0}")]
    DatabaseFailure(String),
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),
    #[error("repository already exists: {0}")]
    RepositoryExists(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Registers and unregisters catalog entries.
///
/// Both operations are idempotent: registering the same (repository, name,
/// version) twice leaves a single entry, unregistering a missing entry is a
/// no-op.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn register(&self, package: &Package) -> Result<(), CatalogError>;
    async fn unregister(&self, package: &Package) -> Result<(), CatalogError>;
}

/// Repository-level queries needed around a tracking run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn repositories(&self) -> Result<Vec<ChartRepository>, CatalogError>;

    async fn repository_by_name(&self, name: &str) -> Result<ChartRepository, CatalogError>;

    /// Digest of every registered version of the repository, keyed by
    /// `<name>@<version>`.
    async fn packages_digest(
        &self,
        repository_id: &str,
    ) -> Result<HashMap<String, String>, CatalogError>;

    /// Replaces the errors reported by the last tracking run.
    async fn set_last_tracking_errors(
        &self,
        repository_id: &str,
        errors: &[String],
    ) -> Result<(), CatalogError>;
}
