//! URL helpers for repository-relative chart locations.

use anyhow::{Context, Result};
use url::Url;

/// Returns true when `s` is an absolute URL with a host, e.g.
/// `https://charts.example.com/nginx-1.0.0.tgz`.
pub fn is_absolute_url(s: &str) -> bool {
    Url::parse(s.trim()).is_ok_and(|u| u.has_host())
}

/// Joins `rel` onto the path of `base`, the way a file path would be joined:
/// `https://h/charts` + `a/b.tgz` is `https://h/charts/a/b.tgz`. `.` and `..`
/// segments are resolved, never escaping the root.
pub fn join_url_path(base: &str, rel: &str) -> Result<String> {
    let mut url = Url::parse(base.trim()).with_context(|| format!("invalid url: {}", base))?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in url.path().split('/').chain(rel.trim().split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let path = format!("/{}", segments.join("/"));
    url.set_path(&path);
    Ok(url.to_string())
}

/// Resolves a chart archive URL as listed in an index against the repository
/// URL. Absolute URLs are returned unchanged.
pub fn resolve_chart_url(repo_url: &str, chart_url: &str) -> Result<String> {
    if is_absolute_url(chart_url) {
        return Ok(chart_url.trim().to_string());
    }
    join_url_path(repo_url, chart_url)
}
