//! Chart archives: metadata model, `.tgz` parsing and remote loading.

mod archive;
mod loader;
mod metadata;

pub use archive::{MAX_FILE_SIZE, load_archive};
pub use loader::{ChartLoadError, ChartLoader};
pub use metadata::{ChartMaintainer, ChartMetadata};

use thiserror::Error;

/// Conventional name of the readme file shipped inside a chart.
pub const README_FILE: &str = "README.md";

/// Conventional name of the license file shipped inside a chart.
pub const LICENSE_FILE: &str = "LICENSE";

/// A file embedded in a chart archive, path relative to the chart root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// A parsed chart archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub files: Vec<ChartFile>,
}

impl Chart {
    /// Returns the top-level file with the given name, ignoring case.
    pub fn file(&self, name: &str) -> Option<&ChartFile> {
        self.files
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Returns the given file as text, lossily decoded.
    pub fn file_text(&self, name: &str) -> Option<String> {
        self.file(name)
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }
}

/// Reasons a chart archive cannot be parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read chart archive: {0}")]
    Archive(#[from] std::io::Error),
    #[error("chart archive is empty")]
    Empty,
    #[error("Chart.yaml file is missing")]
    MissingChartYaml,
    #[error("invalid Chart.yaml: {0}")]
    InvalidMetadata(#[from] serde_yaml::Error),
    #[error("Chart.yaml: {0} is required")]
    MissingField(&'static str),
    #[error("file {path} exceeds the maximum size of {limit} bytes")]
    FileTooLarge { path: String, limit: u64 },
    #[error("chart archive exceeds the maximum decompressed size of {limit} bytes")]
    ArchiveTooLarge { limit: u64 },
}
