use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::catalog::RepositoryStore;
use crate::domain::ChartRepository;

/// Collects errors hit while tracking repositories so that they can be
/// reported to the repository owners once the run is over.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorsCollector: Send + Sync {
    fn append(&self, repository_id: &str, message: String);
}

/// Errors recorded during a single tracking run, grouped by repository.
#[derive(Debug, Default)]
pub struct RunErrors {
    errors: Mutex<HashMap<String, Vec<String>>>,
}

impl RunErrors {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<String>>> {
        // A panicking worker cannot leave the map half-updated
        self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Errors recorded for the repository, in the order they were appended.
    pub fn errors(&self, repository_id: &str) -> Vec<String> {
        self.lock().get(repository_id).cloned().unwrap_or_default()
    }

    /// Total number of errors recorded.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes all recorded errors, leaving the collector empty.
    pub fn drain(&self) -> HashMap<String, Vec<String>> {
        std::mem::take(&mut *self.lock())
    }

    /// Stores the errors of every repository provided, replacing the ones of
    /// the previous run. Repositories without errors get an empty list.
    #[tracing::instrument(skip_all)]
    pub async fn flush<S: RepositoryStore + ?Sized>(&self, store: &S, repos: &[ChartRepository]) {
        let mut errors = self.drain();
        for repo in repos {
            let repo_errors = errors.remove(&repo.repository_id).unwrap_or_default();
            debug!(
                "Storing {} tracking error(s) for {}",
                repo_errors.len(),
                repo.name
            );
            if let Err(e) = store
                .set_last_tracking_errors(&repo.repository_id, &repo_errors)
                .await
            {
                warn!("Failed to store tracking errors for {}: {}", repo.name, e);
            }
        }
    }
}

impl ErrorsCollector for RunErrors {
    fn append(&self, repository_id: &str, message: String) {
        debug!("Recording error for repository {}: {}", repository_id, message);
        self.lock()
            .entry(repository_id.to_string())
            .or_default()
            .push(message);
    }
}
