//! Menu image storage on local disk.
//!
//! Images are written under the upload directory as
//! `<unix-millis>-<uuid>.<ext>` and served back under [`IMAGE_ROUTE`].

use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// URL prefix the upload directory is served under
pub const IMAGE_ROUTE: &str = "/api/Images";

/// Supported image formats
const SUPPORTED_FORMATS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Empty file provided")]
    Empty,

    #[error("File too large. Maximum size is {max} bytes")]
    TooLarge { max: usize },

    #[error("Unsupported file format '{0}'. Supported: png, jpg, jpeg, gif, webp")]
    UnsupportedFormat(String),

    #[error("Failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the client sent something unacceptable (as opposed to a disk failure)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

/// An image file received in a multipart form
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedImage {
    /// Resolve the file extension from the file name, falling back to the content type
    fn extension(&self) -> Option<String> {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        from_name.or_else(|| {
            let mime = self.content_type.as_deref()?;
            mime_guess::get_mime_extensions_str(mime)?
                .iter()
                .find(|ext| SUPPORTED_FORMATS.contains(*ext))
                .map(|ext| ext.to_string())
        })
    }
}

/// Image store rooted at the configured upload directory
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    max_file_size: usize,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Validate and write an image, returning its public path
    pub async fn save(&self, image: &UploadedImage) -> Result<String, UploadError> {
        if image.data.is_empty() {
            return Err(UploadError::Empty);
        }
        if image.data.len() > self.max_file_size {
            return Err(UploadError::TooLarge {
                max: self.max_file_size,
            });
        }

        let ext = image.extension().unwrap_or_default();
        if !SUPPORTED_FORMATS.contains(&ext.as_str()) {
            return Err(UploadError::UnsupportedFormat(ext));
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let filename = format!(
            "{}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            ext
        );
        tokio::fs::write(self.dir.join(&filename), &image.data).await?;

        tracing::info!(
            original_name = image.file_name.as_deref().unwrap_or("-"),
            size = image.data.len(),
            file = %filename,
            "Image stored"
        );

        Ok(format!("{}/{}", IMAGE_ROUTE, filename))
    }

    /// Map a public path back to a file inside the upload directory.
    ///
    /// Anything that is not a plain file name under [`IMAGE_ROUTE`] yields `None`.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path
            .strip_prefix(IMAGE_ROUTE)?
            .strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// Delete a previously stored image. Failures are logged and ignored.
    pub async fn remove(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(path = %public_path, "Refusing to remove image outside upload directory");
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove image");
        }
    }
}
