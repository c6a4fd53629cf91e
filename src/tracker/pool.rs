use log::{debug, error, warn};
use std::ops::AddAssign;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::ErrorsCollector;
use super::worker::{Collaborators, JobError, Worker};
use crate::catalog::PackageManager;
use crate::domain::Job;
use crate::http::HttpGetter;
use crate::images::ImageStore;

/// Default capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("tracking run cancelled")]
    Cancelled,
    #[error("worker pool is closed")]
    Closed,
}

/// Counters for the jobs processed by a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub handled: usize,
    pub failed: usize,
    pub faulted: usize,
}

impl AddAssign for PoolStats {
    fn add_assign(&mut self, other: Self) {
        self.handled += other.handled;
        self.failed += other.failed;
        self.faulted += other.faulted;
    }
}

/// A fixed number of workers draining a bounded job queue.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<PoolStats>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawns `size` workers sharing the collaborators provided.
    pub fn start<G, P, I, E>(
        size: usize,
        capacity: usize,
        ctx: Collaborators<G, P, I, E>,
        cancel: CancellationToken,
    ) -> Self
    where
        G: HttpGetter + 'static,
        P: PackageManager + 'static,
        I: ImageStore + 'static,
        E: ErrorsCollector + 'static,
    {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue: SharedQueue = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|id| {
                let worker = Worker::new(id, ctx.clone());
                tokio::spawn(run_worker(worker, Arc::clone(&queue), cancel.clone()))
            })
            .collect();
        debug!("Started {} worker(s)", size);

        Self {
            sender,
            workers,
            cancel,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job, waiting while the queue is full. Fails once the run has
    /// been cancelled.
    pub async fn submit(&self, job: Job) -> Result<(), PoolError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PoolError::Cancelled),
            sent = self.sender.send(job) => sent.map_err(|_| PoolError::Closed),
        }
    }

    /// Closes the queue and waits for the workers to drain it.
    pub async fn finish(self) -> PoolStats {
        drop(self.sender);

        let mut stats = PoolStats::default();
        for handle in self.workers {
            match handle.await {
                Ok(worker_stats) => stats += worker_stats,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }
        stats
    }
}

async fn next_job(queue: &SharedQueue) -> Option<Job> {
    queue.lock().await.recv().await
}

async fn run_worker<G, P, I, E>(
    worker: Worker<G, P, I, E>,
    queue: SharedQueue,
    cancel: CancellationToken,
) -> PoolStats
where
    G: HttpGetter,
    P: PackageManager,
    I: ImageStore,
    E: ErrorsCollector,
{
    let mut stats = PoolStats::default();

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = next_job(&queue) => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Worker {} abandoned {}", worker.id(), job);
                break;
            }
            result = worker.handle_guarded(&job) => result,
        };

        stats.handled += 1;
        match result {
            Ok(()) => {}
            Err(JobError::Fault(msg)) => {
                stats.faulted += 1;
                error!(
                    "Worker {} fault handling {} (repository {}): {}",
                    worker.id(),
                    job,
                    job.repo().repository_id,
                    msg
                );
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Worker {} failed to {}: {}", worker.id(), job, e);
            }
        }
    }

    debug!("Worker {} stopped after {} job(s)", worker.id(), stats.handled);
    stats
}
