use flate2::read::GzDecoder;
use log::debug;
use std::io::Read;
use std::path::{Component, Path};
use tar::Archive;

use super::{Chart, ChartFile, ChartMetadata, ParseError};

/// Largest single file accepted from a chart archive.
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Largest total of decompressed file contents accepted from a chart archive.
pub const MAX_ARCHIVE_SIZE: u64 = 100 * 1024 * 1024;

const CHART_YAML: &str = "Chart.yaml";

/// Parses a gzipped tar chart archive held in memory.
///
/// Charts are packaged with a single top-level directory named after the
/// chart; that directory is stripped from every file name.
#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn load_archive(bytes: &[u8]) -> Result<Chart, ParseError> {
    read_archive(bytes, MAX_ARCHIVE_SIZE)
}

fn read_archive(bytes: &[u8], max_total: u64) -> Result<Chart, ParseError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));

    let mut metadata: Option<ChartMetadata> = None;
    let mut files = Vec::new();
    let mut entries_seen = 0usize;
    let mut total = 0u64;

    for entry in archive.entries()? {
        let mut entry = entry?;
        entries_seen += 1;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(name) = strip_chart_root(&path) else {
            continue;
        };

        let size = entry.header().size()?;
        if size > MAX_FILE_SIZE {
            return Err(ParseError::FileTooLarge {
                path: name,
                limit: MAX_FILE_SIZE,
            });
        }
        total = total.saturating_add(size);
        if total > max_total {
            return Err(ParseError::ArchiveTooLarge { limit: max_total });
        }

        let mut data = Vec::with_capacity(size as usize);
        entry.read_to_end(&mut data)?;

        if name == CHART_YAML {
            metadata = Some(serde_yaml::from_slice(&data)?);
        } else {
            files.push(ChartFile { name, data });
        }
    }

    if entries_seen == 0 {
        return Err(ParseError::Empty);
    }

    let metadata = metadata.ok_or(ParseError::MissingChartYaml)?;
    if metadata.name.trim().is_empty() {
        return Err(ParseError::MissingField("name"));
    }
    if metadata.version.trim().is_empty() {
        return Err(ParseError::MissingField("version"));
    }

    debug!(
        "Loaded chart {}@{} with {} file(s)",
        metadata.name,
        metadata.version,
        files.len()
    );

    Ok(Chart { metadata, files })
}

/// Drops the leading chart directory and rejects paths that try to escape it.
fn strip_chart_root(path: &Path) -> Option<String> {
    let mut components = path.components();
    match components.next()? {
        Component::Normal(_) => {}
        _ => return None,
    }

    let mut parts = Vec::new();
    for component in components {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::Builder;

    fn create_tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let mut tar_builder = Builder::new(Vec::new());
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

    #[test]
    fn test_load_archive_reads_metadata_and_files() {
        let bytes = create_tar_gz(&[
            (
                "nginx/Chart.yaml",
                "apiVersion: v2\nname: nginx\nversion: 1.0.0\nicon: https://example.com/i.png\n",
            ),
            ("nginx/README.md", "# NGINX"),
            ("nginx/LICENSE", "MIT License"),
            ("nginx/templates/deployment.yaml", "kind: Deployment"),
        ]);

        let chart = load_archive(&bytes).unwrap();

        assert_eq!(chart.metadata.name, "nginx");
        assert_eq!(chart.metadata.version, "1.0.0");
        assert_eq!(chart.file_text("README.md").unwrap(), "# NGINX");
        assert_eq!(chart.file_text("LICENSE").unwrap(), "MIT License");
        assert!(chart.file("templates/deployment.yaml").is_some());
        assert!(chart.file("Chart.yaml").is_none());
    }

    #[test]
    fn test_subchart_metadata_does_not_override_parent() {
        let bytes = create_tar_gz(&[
            ("app/charts/db/Chart.yaml", "name: db\nversion: 9.9.9\n"),
            ("app/Chart.yaml", "name: app\nversion: 1.0.0\n"),
        ]);

        let chart = load_archive(&bytes).unwrap();
        assert_eq!(chart.metadata.name, "app");
        assert!(chart.file("charts/db/Chart.yaml").is_some());
    }

    #[test]
    fn test_missing_chart_yaml() {
        let bytes = create_tar_gz(&[("nginx/README.md", "# NGINX")]);
        assert!(matches!(load_archive(&bytes), Err(ParseError::MissingChartYaml)));
    }

    #[test]
    fn test_missing_version() {
        let bytes = create_tar_gz(&[("nginx/Chart.yaml", "name: nginx\n")]);
        assert!(matches!(
            load_archive(&bytes),
            Err(ParseError::MissingField("version"))
        ));
    }

    #[test]
    fn test_invalid_chart_yaml() {
        let bytes = create_tar_gz(&[("nginx/Chart.yaml", "name: [unterminated\n")]);
        assert!(matches!(
            load_archive(&bytes),
            Err(ParseError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_not_a_gzip_archive() {
        let result = load_archive(b"<html>not found</html>");
        assert!(matches!(result, Err(ParseError::Archive(_))));
    }

    #[test]
    fn test_total_size_limit() {
        let bytes = create_tar_gz(&[
            ("nginx/Chart.yaml", "name: nginx\nversion: 1.0.0\n"),
            ("nginx/a.txt", "0123456789"),
            ("nginx/b.txt", "0123456789"),
        ]);

        assert!(read_archive(&bytes, 1024).is_ok());
        let err = read_archive(&bytes, 40).unwrap_err();
        assert!(matches!(err, ParseError::ArchiveTooLarge { limit: 40 }));
        assert_eq!(
            err.to_string(),
            "chart archive exceeds the maximum decompressed size of 40 bytes"
        );
    }

    #[test]
    fn test_empty_archive() {
        let bytes = create_tar_gz(&[]);
        assert!(matches!(load_archive(&bytes), Err(ParseError::Empty)));
    }

    #[test]
    fn test_strip_chart_root() {
        assert_eq!(
            strip_chart_root(Path::new("nginx/README.md")).as_deref(),
            Some("README.md")
        );
        assert_eq!(
            strip_chart_root(Path::new("nginx/./templates/a.yaml")).as_deref(),
            Some("templates/a.yaml")
        );
        assert_eq!(strip_chart_root(Path::new("README.md")), None);
        assert_eq!(strip_chart_root(Path::new("nginx/../../etc/passwd")), None);
    }
}
