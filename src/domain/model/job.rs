use std::fmt;
use std::sync::Arc;

use super::{ChartRepository, ChartVersion};

/// What a job asks the worker to do with a chart version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Register,
    Unregister,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Register => write!(f, "register"),
            JobKind::Unregister => write!(f, "unregister"),
        }
    }
}

/// One unit of work for a single chart version.
///
/// Jobs are built by the dispatcher and handed to exactly one worker. They
/// expose no mutators; the repository is shared by all jobs of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    kind: JobKind,
    repo: Arc<ChartRepository>,
    chart_version: ChartVersion,
    get_logo: bool,
}

impl Job {
    pub fn register(repo: Arc<ChartRepository>, chart_version: ChartVersion, get_logo: bool) -> Self {
        Self {
            kind: JobKind::Register,
            repo,
            chart_version,
            get_logo,
        }
    }

    pub fn unregister(repo: Arc<ChartRepository>, name: &str, version: &str) -> Self {
        Self {
            kind: JobKind::Unregister,
            repo,
            chart_version: ChartVersion::new(name, version),
            get_logo: false,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn repo(&self) -> &ChartRepository {
        &self.repo
    }

    pub fn chart_version(&self) -> &ChartVersion {
        &self.chart_version
    }

    pub fn get_logo(&self) -> bool {
        self.get_logo
    }

    /// Catalog key of the chart version this job is about.
    pub fn key(&self) -> String {
        self.chart_version.key()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}@{} ({})",
            self.kind, self.chart_version.name, self.chart_version.version, self.repo.name
        )
    }
}
