use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::domain::{ChartRepository, ChartVersion, Job, parse_package_key};
use crate::index::IndexFile;

/// When the logo of a chart version should be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogoPolicy {
    /// Fetch the logo of the newest version of a chart when it is registered.
    #[default]
    Latest,
    /// Fetch the logo only the first time a chart is registered.
    New,
    /// Never fetch logos.
    Never,
}

impl fmt::Display for LogoPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoPolicy::Latest => write!(f, "latest"),
            LogoPolicy::New => write!(f, "new"),
            LogoPolicy::Never => write!(f, "never"),
        }
    }
}

/// Computes the jobs needed to bring the catalog in sync with the index.
///
/// `digests` maps `<name>@<version>` to the digest stored in the catalog for
/// the repository. Register jobs are returned first, then unregister jobs for
/// the catalog keys the index no longer lists.
pub fn compute_jobs(
    repo: &Arc<ChartRepository>,
    index: &IndexFile,
    digests: &HashMap<String, String>,
    policy: LogoPolicy,
) -> Vec<Job> {
    let known_charts: HashSet<&str> = digests
        .keys()
        .filter_map(|key| parse_package_key(key).map(|(name, _)| name))
        .collect();

    let mut indexed: HashSet<String> = HashSet::new();
    let mut jobs = Vec::new();

    for (name, versions) in &index.entries {
        let newest = newest_version(versions);

        for (i, cv) in versions.iter().enumerate() {
            let key = cv.key();
            if !indexed.insert(key.clone()) {
                warn!("Duplicate entry {} in index of {}", key, repo.name);
                continue;
            }

            if digests.get(&key) == Some(&cv.digest) {
                continue;
            }

            let get_logo = match policy {
                LogoPolicy::Latest => Some(i) == newest,
                LogoPolicy::New => Some(i) == newest && !known_charts.contains(name.as_str()),
                LogoPolicy::Never => false,
            };
            jobs.push(Job::register(Arc::clone(repo), cv.clone(), get_logo));
        }
    }

    let mut removed: Vec<&String> = digests.keys().filter(|k| !indexed.contains(*k)).collect();
    removed.sort();
    for key in removed {
        match parse_package_key(key) {
            Some((name, version)) => jobs.push(Job::unregister(Arc::clone(repo), name, version)),
            None => warn!("Ignoring malformed catalog key {} in {}", key, repo.name),
        }
    }

    debug!("Computed {} job(s) for {}", jobs.len(), repo.name);
    jobs
}

/// Position of the newest version. Versions are compared as semver where
/// possible; otherwise the index order (newest first) decides.
fn newest_version(versions: &[ChartVersion]) -> Option<usize> {
    versions
        .iter()
        .enumerate()
        .filter_map(|(i, cv)| parse_semver(&cv.version).map(|v| (i, v)))
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        .map(|(i, _)| i)
        .or(if versions.is_empty() { None } else { Some(0) })
}

fn parse_semver(version: &str) -> Option<semver::Version> {
    let version = version.trim();
    semver::Version::parse(version.strip_prefix('v').unwrap_or(version)).ok()
}
