use async_trait::async_trait;
use image::ImageFormat;
use log::debug;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use super::{ImageError, ImageStore};
use crate::runtime::Runtime;

/// Image formats accepted as logos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Raster(ImageFormat),
    Svg,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Raster(format) => format.extensions_str().first().copied().unwrap_or("img"),
            ImageKind::Svg => "svg",
        }
    }
}

/// Sniffs the image format from its leading bytes.
pub fn detect_image_kind(data: &[u8]) -> Option<ImageKind> {
    if let Ok(format) = image::guess_format(data) {
        return Some(ImageKind::Raster(format));
    }

    let head = &data[..data.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
        return Some(ImageKind::Svg);
    }

    None
}

/// Stores images as files named after the SHA-256 of their content.
pub struct FsImageStore<R: Runtime> {
    runtime: R,
    dir: PathBuf,
}

impl<R: Runtime> FsImageStore<R> {
    pub fn new(runtime: R, dir: PathBuf) -> Self {
        Self { runtime, dir }
    }

    /// Path where the image with the given id is stored.
    pub fn image_path(&self, image_id: &str) -> PathBuf {
        self.dir.join(image_id)
    }
}

#[async_trait]
impl<R: Runtime> ImageStore for FsImageStore<R> {
    #[tracing::instrument(skip(self, data), fields(len = data.len()))]
    async fn save_image(&self, data: &[u8]) -> Result<String, ImageError> {
        let kind = detect_image_kind(data).ok_or(ImageError::UnsupportedFormat)?;

        let image_id = format!("{:x}", Sha256::digest(data));
        let path = self.image_path(&image_id);

        if self.runtime.exists(&path) {
            debug!("Image {} already stored", image_id);
            return Ok(image_id);
        }

        if !self.runtime.exists(&self.dir) {
            self.runtime
                .create_dir_all(&self.dir)
                .map_err(|e| ImageError::Storage(format!("{:#}", e)))?;
        }

        self.runtime
            .write_atomic(&path, data)
            .map_err(|e| ImageError::Storage(format!("{:#}", e)))?;

        debug!("Stored {} image {}", kind.extension(), image_id);
        Ok(image_id)
    }
}
