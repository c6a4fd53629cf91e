//! Content-addressed storage for chart logos.

mod data_url;
mod store;

pub use data_url::{DataUrl, DataUrlError, is_data_url};
pub use store::{FsImageStore, ImageKind, detect_image_kind};

use async_trait::async_trait;
use thiserror::Error;

/// Why an image could not be stored.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The bytes are not an image format the store understands. Callers
    /// treat this as "no logo" rather than a failure.
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("image storage failed: {0}")]
    Storage(String),
}

/// Storage backend for logo images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Saves the image and returns its identifier. Saving identical bytes
    /// twice returns the same identifier.
    async fn save_image(&self, data: &[u8]) -> Result<String, ImageError>;
}
