//! The tracking run: diff every repository index against the catalog and
//! dispatch the resulting jobs to a pool of workers.

mod dispatcher;
mod errors;
mod pool;
mod worker;

pub use dispatcher::{LogoPolicy, compute_jobs};
pub use errors::{ErrorsCollector, RunErrors};
pub use pool::{DEFAULT_QUEUE_CAPACITY, PoolError, PoolStats, WorkerPool};
pub use worker::{Collaborators, JobError, Worker};

use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{PackageManager, RepositoryStore};
use crate::domain::{ChartRepository, JobKind};
use crate::http::HttpGetter;
use crate::images::ImageStore;
use crate::index::IndexLoader;

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub logo_policy: LogoPolicy,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            logo_policy: LogoPolicy::default(),
        }
    }
}

/// Outcome of a tracking run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories: usize,
    /// Repositories whose index or catalog state could not be loaded.
    pub failed_repositories: usize,
    pub register_jobs: usize,
    pub unregister_jobs: usize,
    /// Errors recorded for the repository owners.
    pub errors: usize,
    pub stats: PoolStats,
    pub cancelled: bool,
}

/// Keeps the catalog in sync with the repositories it tracks.
pub struct Tracker<G, P, S, I> {
    http: Arc<G>,
    packages: Arc<P>,
    store: Arc<S>,
    images: Arc<I>,
    options: TrackerOptions,
}

impl<G, P, S, I> Tracker<G, P, S, I>
where
    G: HttpGetter + 'static,
    P: PackageManager + 'static,
    S: RepositoryStore,
    I: ImageStore + 'static,
{
    pub fn new(
        http: Arc<G>,
        packages: Arc<P>,
        store: Arc<S>,
        images: Arc<I>,
        options: TrackerOptions,
    ) -> Self {
        Self {
            http,
            packages,
            store,
            images,
            options,
        }
    }

    /// Tracks the repositories provided.
    ///
    /// Failures are recorded per repository and stored in the catalog once
    /// all jobs are done; they never stop the run. A cancelled run leaves the
    /// previously stored errors untouched.
    #[tracing::instrument(skip_all, fields(repos = repos.len()))]
    pub async fn run(&self, repos: &[ChartRepository], cancel: CancellationToken) -> RunSummary {
        let errors = Arc::new(RunErrors::new());
        let pool = WorkerPool::start(
            self.options.workers,
            self.options.queue_capacity,
            Collaborators {
                http: Arc::clone(&self.http),
                packages: Arc::clone(&self.packages),
                images: Arc::clone(&self.images),
                errors: Arc::clone(&errors),
            },
            cancel.clone(),
        );
        let index_loader = IndexLoader::new(Arc::clone(&self.http));

        let mut summary = RunSummary {
            repositories: repos.len(),
            ..Default::default()
        };

        'repos: for repo in repos {
            if cancel.is_cancelled() {
                break;
            }
            let repo = Arc::new(repo.clone());

            let index = match index_loader.load(&repo).await {
                Ok(index) => index,
                Err(e) => {
                    warn!("Failed to load index of {}: {:#}", repo, e);
                    errors.append(
                        &repo.repository_id,
                        format!("error loading repository index: {:#}", e),
                    );
                    summary.failed_repositories += 1;
                    continue;
                }
            };

            let digests = match self.store.packages_digest(&repo.repository_id).await {
                Ok(digests) => digests,
                Err(e) => {
                    warn!("Failed to get packages digest of {}: {}", repo, e);
                    errors.append(
                        &repo.repository_id,
                        format!("error getting packages digest: {}", e),
                    );
                    summary.failed_repositories += 1;
                    continue;
                }
            };

            let jobs = compute_jobs(&repo, &index, &digests, self.options.logo_policy);
            info!("Tracking {}: {} job(s)", repo, jobs.len());

            for job in jobs {
                let kind = job.kind();
                if pool.submit(job).await.is_err() {
                    break 'repos;
                }
                match kind {
                    JobKind::Register => summary.register_jobs += 1,
                    JobKind::Unregister => summary.unregister_jobs += 1,
                }
            }
        }

        summary.stats = pool.finish().await;
        summary.errors = errors.len();
        summary.cancelled = cancel.is_cancelled();

        if summary.cancelled {
            warn!("Tracking run cancelled, tracking errors not stored");
        } else {
            errors.flush(self.store.as_ref(), repos).await;
        }

        info!(
            "Tracking done: {} job(s) handled, {} failed, {} fault(s), {} error(s) recorded",
            summary.stats.handled, summary.stats.failed, summary.stats.faulted, summary.errors
        );
        summary
    }
}
