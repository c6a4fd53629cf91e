//! File system operations (read, atomic write, directories).

use anyhow::{Context, Result, anyhow};
use log::warn;
use std::fs;
use std::path::Path;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).context("Failed to read file to string")
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).context("Failed to create directory")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_atomic_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("Invalid file path: {:?}", path))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp-{}", uuid::Uuid::new_v4().simple()));
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write temporary file {:?}", tmp_path))?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove temporary file {:?}: {}", tmp_path, cleanup);
            }
            return Err(e).with_context(|| format!("Failed to move {:?} into place", tmp_path));
        }
        Ok(())
    }
}
