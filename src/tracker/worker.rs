use anyhow::{Context, Result, bail};
use futures_util::FutureExt;
use log::{debug, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use super::errors::ErrorsCollector;
use crate::catalog::{CatalogError, PackageManager};
use crate::chart::{Chart, ChartLoader, LICENSE_FILE, README_FILE};
use crate::domain::{Job, JobKind, Maintainer, Package};
use crate::http::{HttpGetter, is_absolute_url, resolve_chart_url};
use crate::images::{DataUrl, ImageError, ImageStore, is_data_url};
use crate::license;

/// Why a job did not complete. Errors worth showing to the repository owner
/// have already been recorded when a handler returns one of these.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid chart url for package {name} version {version}")]
    InvalidUrl { name: String, version: String },
    #[error("error registering package {name} version {version}: {source}")]
    Register {
        name: String,
        version: String,
        source: CatalogError,
    },
    #[error("error unregistering package {name} version {version}: {source}")]
    Unregister {
        name: String,
        version: String,
        source: CatalogError,
    },
    #[error("unexpected fault: {0}")]
    Fault(String),
}

/// Services shared by all the workers of a pool.
pub struct Collaborators<G, P, I, E> {
    pub http: Arc<G>,
    pub packages: Arc<P>,
    pub images: Arc<I>,
    pub errors: Arc<E>,
}

impl<G, P, I, E> Clone for Collaborators<G, P, I, E> {
    fn clone(&self) -> Self {
        Self {
            http: Arc::clone(&self.http),
            packages: Arc::clone(&self.packages),
            images: Arc::clone(&self.images),
            errors: Arc::clone(&self.errors),
        }
    }
}

/// Handles register and unregister jobs.
pub struct Worker<G, P, I, E>
where
    G: HttpGetter,
    P: PackageManager,
    I: ImageStore,
    E: ErrorsCollector,
{
    id: usize,
    loader: ChartLoader<G>,
    ctx: Collaborators<G, P, I, E>,
}

impl<G, P, I, E> Worker<G, P, I, E>
where
    G: HttpGetter,
    P: PackageManager,
    I: ImageStore,
    E: ErrorsCollector,
{
    pub fn new(id: usize, ctx: Collaborators<G, P, I, E>) -> Self {
        Self {
            id,
            loader: ChartLoader::new(Arc::clone(&ctx.http)),
            ctx,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Handles the job, turning a panic into [`JobError::Fault`].
    pub async fn handle_guarded(&self, job: &Job) -> Result<(), JobError> {
        match AssertUnwindSafe(self.handle(job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(JobError::Fault(panic_message(panic.as_ref()))),
        }
    }

    #[tracing::instrument(skip(self, job), fields(worker = self.id, job = %job))]
    pub async fn handle(&self, job: &Job) -> Result<(), JobError> {
        match job.kind() {
            JobKind::Register => self.handle_register(job).await,
            JobKind::Unregister => self.handle_unregister(job).await,
        }
    }

    fn record(&self, job: &Job, message: String) {
        self.ctx.errors.append(&job.repo().repository_id, message);
    }

    async fn handle_register(&self, job: &Job) -> Result<(), JobError> {
        let repo = job.repo();
        let cv = job.chart_version();

        let url = match cv.archive_url().map(|u| resolve_chart_url(&repo.url, u)) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                debug!("Cannot resolve chart url of {}: {:#}", job, e);
                return Err(self.invalid_url(job));
            }
            None => return Err(self.invalid_url(job)),
        };

        let chart = match self.loader.load(&url).await {
            Ok(chart) => chart,
            Err(e) => {
                self.record(job, format!("error loading chart {}: {}", url, e));
                return Ok(());
            }
        };

        let mut package = self.build_package(job, &chart, &url);

        if job.get_logo()
            && let Some(icon) = chart.metadata.icon.as_deref()
        {
            package.logo_url = Some(icon.to_string());
            package.logo_image_id = self.store_logo(job, icon).await;
        }

        package.signed = self.is_signed(&url).await;

        if let Err(e) = self.ctx.packages.register(&package).await {
            let err = JobError::Register {
                name: package.name,
                version: package.version,
                source: e,
            };
            self.record(job, err.to_string());
            return Err(err);
        }

        info!("Registered {}@{} from {}", package.name, package.version, repo.name);
        Ok(())
    }

    async fn handle_unregister(&self, job: &Job) -> Result<(), JobError> {
        let cv = job.chart_version();
        let package = Package::identity(job.repo(), &cv.name, &cv.version);

        if let Err(e) = self.ctx.packages.unregister(&package).await {
            let err = JobError::Unregister {
                name: package.name,
                version: package.version,
                source: e,
            };
            self.record(job, err.to_string());
            return Err(err);
        }

        info!("Unregistered {}@{} from {}", cv.name, cv.version, job.repo().name);
        Ok(())
    }

    fn invalid_url(&self, job: &Job) -> JobError {
        let cv = job.chart_version();
        let err = JobError::InvalidUrl {
            name: cv.name.clone(),
            version: cv.version.clone(),
        };
        self.record(job, err.to_string());
        err
    }

    fn build_package(&self, job: &Job, chart: &Chart, url: &str) -> Package {
        let md = &chart.metadata;
        let cv = job.chart_version();

        let maintainers = md
            .maintainers
            .iter()
            .filter(|m| !m.email.trim().is_empty())
            .map(|m| Maintainer {
                name: m.name.clone(),
                email: m.email.clone(),
            })
            .collect();

        Package {
            name: md.name.clone(),
            version: md.version.clone(),
            digest: cv.digest.clone(),
            description: md.description.clone(),
            keywords: md.keywords.clone(),
            home_url: md.home.clone(),
            app_version: md.app_version.clone(),
            content_url: url.to_string(),
            created_at: cv.created_unix(),
            readme: chart.file_text(README_FILE),
            license: chart.file(LICENSE_FILE).and_then(|f| license::detect(&f.data)),
            maintainers,
            deprecated: md.deprecated,
            repository: Some(job.repo().clone()),
            ..Default::default()
        }
    }

    /// Fetches the logo and saves it. Returns the image id when stored.
    async fn store_logo(&self, job: &Job, icon: &str) -> Option<String> {
        let data = match self.get_image(icon).await {
            Ok(data) => data,
            Err(e) => {
                self.record(job, format!("error getting logo image {}: {:#}", icon, e));
                return None;
            }
        };

        match self.ctx.images.save_image(&data).await {
            Ok(image_id) => Some(image_id),
            Err(ImageError::UnsupportedFormat) => {
                debug!("Logo of {} has an unsupported format", job);
                None
            }
            Err(e) => {
                warn!("Failed to save logo of {}: {}", job, e);
                None
            }
        }
    }

    async fn get_image(&self, icon: &str) -> Result<Vec<u8>> {
        if is_data_url(icon) {
            return Ok(DataUrl::decode(icon)?.data);
        }
        if !is_absolute_url(icon) {
            bail!("invalid image url");
        }

        let response = self.ctx.http.get(icon).await.context("Failed to fetch image")?;
        if !response.is_ok() {
            bail!(
                "unexpected status code received: {}",
                response.status.as_u16()
            );
        }
        Ok(response.body)
    }

    /// Checks for a provenance file next to the chart archive.
    async fn is_signed(&self, chart_url: &str) -> bool {
        let prov_url = format!("{}.prov", chart_url);
        match self.ctx.http.get(&prov_url).await {
            Ok(response) => response.is_ok(),
            Err(e) => {
                warn!("Failed to check provenance file {}: {:#}", prov_url, e);
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockPackageManager;
    use crate::domain::{ChartRepository, ChartVersion};
    use crate::http::{HttpResponse, MockHttpGetter};
    use crate::images::MockImageStore;
    use crate::tracker::errors::{MockErrorsCollector, RunErrors};
    use crate::tracker::testing::FakePackages;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use mockall::predicate::eq;
    use reqwest::StatusCode;
    use std::io::Write;

    const CHART_URL: &str = "https://charts.example.com/nginx-1.0.0.tgz";
    const ICON_URL: &str = "https://charts.example.com/nginx.png";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn create_tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let mut tar_builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_path(name).unwrap();
            header.set_mode(0o644);
            header.set_cksum();
            tar_builder.append(&header, content.as_bytes()).unwrap();
        }
        let tar = tar_builder.into_inner().unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap()
    }

    fn nginx_chart() -> Vec<u8> {
        create_tar_gz(&[
            (
                "nginx/Chart.yaml",
                "apiVersion: v2\nname: nginx\nversion: 1.0.0\ndescription: Web server\n\
                 keywords: [web, proxy]\nhome: https://nginx.org\nappVersion: 1.25\n\
                 icon: https://charts.example.com/nginx.png\n\
                 maintainers:\n  - name: alice\n    email: alice@example.com\n  - name: bob\n",
            ),
            ("nginx/README.md", "# NGINX"),
            ("nginx/LICENSE", "Apache License\nVersion 2.0, January 2004"),
        ])
    }

    fn repo() -> Arc<ChartRepository> {
        Arc::new(ChartRepository::new("repo-1", "stable", "https://charts.example.com"))
    }

    fn register_job(get_logo: bool) -> Job {
        let mut cv = ChartVersion::new("nginx", "1.0.0");
        cv.digest = "D1".to_string();
        cv.urls = vec!["nginx-1.0.0.tgz".to_string()];
        Job::register(repo(), cv, get_logo)
    }

    fn ok(body: Vec<u8>) -> Result<HttpResponse> {
        Ok(HttpResponse::new(StatusCode::OK, body))
    }

    fn not_found() -> Result<HttpResponse> {
        Ok(HttpResponse::new(StatusCode::NOT_FOUND, Vec::new()))
    }

    fn worker<E: ErrorsCollector>(
        http: MockHttpGetter,
        packages: MockPackageManager,
        images: MockImageStore,
        errors: E,
    ) -> Worker<MockHttpGetter, MockPackageManager, MockImageStore, E> {
        Worker::new(
            0,
            Collaborators {
                http: Arc::new(http),
                packages: Arc::new(packages),
                images: Arc::new(images),
                errors: Arc::new(errors),
            },
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_register_builds_package_from_chart() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .times(1)
            .returning(|_| ok(nginx_chart()));
        http.expect_get()
            .with(eq(ICON_URL))
            .times(1)
            .returning(|_| ok(PNG.to_vec()));
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .times(1)
            .returning(|_| ok(b"-----BEGIN PGP SIGNED MESSAGE-----".to_vec()));

        let mut images = MockImageStore::new();
        images
            .expect_save_image()
            .times(1)
            .returning(|_| Ok("image-1".to_string()));

        let mut packages = MockPackageManager::new();
        packages
            .expect_register()
            .withf(|p: &Package| {
                p.name == "nginx"
                    && p.version == "1.0.0"
                    && p.digest == "D1"
                    && p.description.as_deref() == Some("Web server")
                    && p.keywords == vec!["web", "proxy"]
                    && p.home_url.as_deref() == Some("https://nginx.org")
                    && p.app_version.as_deref() == Some("1.25")
                    && p.content_url == CHART_URL
                    && p.logo_url.as_deref() == Some(ICON_URL)
                    && p.logo_image_id.as_deref() == Some("image-1")
                    && p.readme.as_deref() == Some("# NGINX")
                    && p.license.as_deref() == Some("Apache-2.0")
                    && p.maintainers
                        == vec![Maintainer {
                            name: "alice".to_string(),
                            email: "alice@example.com".to_string(),
                        }]
                    && p.signed
                    && p.repository_id() == Some("repo-1")
            })
            .times(1)
            .returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(http, packages, images, errors);

        worker.handle(&register_job(true)).await.unwrap();
        assert!(worker.ctx.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_chart_not_found_records_error() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .times(1)
            .returning(|_| not_found());

        // Strict mocks: neither registration nor image storage may happen
        let packages = MockPackageManager::new();
        let images = MockImageStore::new();

        let mut errors = MockErrorsCollector::new();
        errors
            .expect_append()
            .withf(|id, msg| {
                id == "repo-1"
                    && msg == "error loading chart https://charts.example.com/nginx-1.0.0.tgz: unexpected status code received: 404"
            })
            .times(1)
            .return_const(());

        let worker = worker(http, packages, images, errors);
        assert!(worker.handle(&register_job(true)).await.is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_malformed_archive_records_error() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .times(1)
            .returning(|_| ok(b"<html>oops</html>".to_vec()));

        let errors = RunErrors::new();
        let worker = worker(http, MockPackageManager::new(), MockImageStore::new(), errors);

        assert!(worker.handle(&register_job(false)).await.is_ok());
        let recorded = worker.ctx.errors.errors("repo-1");
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("error loading chart"));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_missing_url_records_error() {
        let job = Job::register(repo(), ChartVersion::new("nginx", "1.0.0"), false);

        let errors = RunErrors::new();
        let worker = worker(
            MockHttpGetter::new(),
            MockPackageManager::new(),
            MockImageStore::new(),
            errors,
        );

        let result = worker.handle(&job).await;
        assert!(matches!(result, Err(JobError::InvalidUrl { .. })));
        assert_eq!(
            worker.ctx.errors.errors("repo-1"),
            vec!["invalid chart url for package nginx version 1.0.0"]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_register_unparseable_repository_url() {
        let bad_repo = Arc::new(ChartRepository::new("repo-1", "stable", "not a url"));
        let mut cv = ChartVersion::new("nginx", "1.0.0");
        cv.urls = vec!["nginx-1.0.0.tgz".to_string()];
        let job = Job::register(bad_repo, cv, false);

        let errors = RunErrors::new();
        let worker = worker(
            MockHttpGetter::new(),
            MockPackageManager::new(),
            MockImageStore::new(),
            errors,
        );

        assert!(matches!(
            worker.handle(&job).await,
            Err(JobError::InvalidUrl { .. })
        ));
        assert_eq!(worker.ctx.errors.errors("repo-1").len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_register_with_failing_logo_save_still_registers() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .returning(|_| ok(nginx_chart()));
        http.expect_get()
            .with(eq(ICON_URL))
            .returning(|_| ok(PNG.to_vec()));
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .returning(|_| not_found());

        let mut images = MockImageStore::new();
        images
            .expect_save_image()
            .times(1)
            .returning(|_| Err(ImageError::Storage("disk full".to_string())));

        let mut packages = MockPackageManager::new();
        packages
            .expect_register()
            .withf(|p: &Package| {
                p.logo_url.as_deref() == Some(ICON_URL) && p.logo_image_id.is_none() && !p.signed
            })
            .times(1)
            .returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(http, packages, images, errors);

        worker.handle(&register_job(true)).await.unwrap();
        assert!(worker.ctx.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_with_unfetchable_logo_records_error() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .returning(|_| ok(nginx_chart()));
        http.expect_get()
            .with(eq(ICON_URL))
            .returning(|_| not_found());
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .returning(|_| not_found());

        let mut packages = MockPackageManager::new();
        packages.expect_register().times(1).returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(http, packages, MockImageStore::new(), errors);

        worker.handle(&register_job(true)).await.unwrap();
        let recorded = worker.ctx.errors.errors("repo-1");
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("error getting logo image"));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_without_logo_flag_skips_icon() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .returning(|_| ok(nginx_chart()));
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .returning(|_| not_found());

        let mut packages = MockPackageManager::new();
        packages
            .expect_register()
            .withf(|p: &Package| p.logo_url.is_none() && p.logo_image_id.is_none())
            .times(1)
            .returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(http, packages, MockImageStore::new(), errors);

        worker.handle(&register_job(false)).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_inline_logo_is_decoded_without_fetch() {
        let chart = create_tar_gz(&[(
            "nginx/Chart.yaml",
            "name: nginx\nversion: 1.0.0\nicon: \"data:image/png;base64,iVBORw0KGgoAAAANSUhEUg==\"\n",
        )]);

        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .returning(move |_| ok(chart.clone()));
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .returning(|_| not_found());

        let mut images = MockImageStore::new();
        images
            .expect_save_image()
            .withf(|data: &[u8]| data.starts_with(b"\x89PNG"))
            .times(1)
            .returning(|_| Ok("inline".to_string()));

        let mut packages = MockPackageManager::new();
        packages
            .expect_register()
            .withf(|p: &Package| p.logo_image_id.as_deref() == Some("inline"))
            .times(1)
            .returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(http, packages, images, errors);

        worker.handle(&register_job(true)).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_provenance_probe_error_means_unsigned() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .returning(|_| ok(nginx_chart()));
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let mut packages = MockPackageManager::new();
        packages
            .expect_register()
            .withf(|p: &Package| !p.signed)
            .times(1)
            .returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(http, packages, MockImageStore::new(), errors);

        worker.handle(&register_job(false)).await.unwrap();
        assert!(worker.ctx.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_failure_is_recorded_and_returned() {
        let mut http = MockHttpGetter::new();
        http.expect_get()
            .with(eq(CHART_URL))
            .returning(|_| ok(nginx_chart()));
        http.expect_get()
            .with(eq("https://charts.example.com/nginx-1.0.0.tgz.prov"))
            .returning(|_| not_found());

        let mut packages = MockPackageManager::new();
        packages
            .expect_register()
            .times(1)
            .returning(|_| Err(CatalogError::DatabaseFailure("locked".to_string())));

        let errors = RunErrors::new();
        let worker = worker(http, packages, MockImageStore::new(), errors);

        let result = worker.handle(&register_job(false)).await;
        assert!(matches!(result, Err(JobError::Register { .. })));
        assert_eq!(
            worker.ctx.errors.errors("repo-1"),
            vec!["error registering package nginx version 1.0.0: database failure: locked"]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_unregister() {
        let mut packages = MockPackageManager::new();
        packages
            .expect_unregister()
            .withf(|p: &Package| {
                p.name == "nginx" && p.version == "0.9.0" && p.repository_id() == Some("repo-1")
            })
            .times(1)
            .returning(|_| Ok(()));

        let errors = RunErrors::new();
        let worker = worker(MockHttpGetter::new(), packages, MockImageStore::new(), errors);

        worker
            .handle(&Job::unregister(repo(), "nginx", "0.9.0"))
            .await
            .unwrap();
        assert!(worker.ctx.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_unregister_failure_is_recorded() {
        let mut packages = MockPackageManager::new();
        packages
            .expect_unregister()
            .returning(|_| Err(CatalogError::DatabaseFailure("locked".to_string())));

        let errors = RunErrors::new();
        let worker = worker(MockHttpGetter::new(), packages, MockImageStore::new(), errors);

        let result = worker.handle(&Job::unregister(repo(), "nginx", "0.9.0")).await;
        assert!(matches!(result, Err(JobError::Unregister { .. })));
        assert_eq!(
            worker.ctx.errors.errors("repo-1"),
            vec!["error unregistering package nginx version 0.9.0: database failure: locked"]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_panic_becomes_fault() {
        let worker = Worker::new(
            0,
            Collaborators {
                http: Arc::new(MockHttpGetter::new()),
                packages: Arc::new(FakePackages::default()),
                images: Arc::new(MockImageStore::new()),
                errors: Arc::new(RunErrors::new()),
            },
        );

        let result = worker
            .handle_guarded(&Job::unregister(repo(), "nginx", "panic"))
            .await;
        match result {
            Err(JobError::Fault(msg)) => assert!(msg.contains("catalog exploded")),
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42), "unknown panic");
    }
}
