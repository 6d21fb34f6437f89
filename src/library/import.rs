//! Photo files on their way into the repository.

use std::path::Path;

use tokio::fs;

use crate::domain::photo::{ExifInfo, PhotoInfo};
use crate::error::{Error, Result};

/// A photo file to import, with the metadata extracted by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoImport {
    pub file_name: String,
    pub content: Vec<u8>,
    pub exif: ExifInfo,

    /// Base64-encoded thumbnail, empty when none was produced
    pub thumbnail: String,
}

impl PhotoImport {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            exif: ExifInfo::default(),
            thumbnail: String::new(),
        }
    }

    pub fn with_exif(mut self, exif: ExifInfo) -> Self {
        self.exif = exif;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = thumbnail.into();
        self
    }

    /// Read a file from disk. EXIF and thumbnail are left empty.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::validation(format!("'{}' has no file name", path.display())))?;
        let content = fs::read(path).await?;
        Ok(Self::new(file_name, content))
    }

    /// Record for this import under `id`
    pub(crate) fn record(&self, id: &str) -> PhotoInfo {
        PhotoInfo::new(id, &self.file_name, self.exif.clone(), &self.thumbnail)
    }
}
