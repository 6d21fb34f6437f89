//! Photo records as stored in the metadata store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Read-only view over the EXIF tags extracted from a photo file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExifInfo {
    tags: BTreeMap<String, String>,
}

impl ExifInfo {
    /// Build from tag name → value pairs
    pub fn new(tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self {
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get the value of a tag
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    /// All tags in name order
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// A photo known to the repository.
///
/// The `id` is assigned once at import and never changes; every other
/// component refers to the photo through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoInfo {
    /// Opaque identifier, unique within the repository
    pub id: String,

    /// File name including its extension
    pub file_name: String,

    /// EXIF tags read at import
    #[serde(default)]
    pub exif_info: ExifInfo,

    /// Base64-encoded thumbnail (may be empty)
    #[serde(default)]
    pub thumbnail: String,
}

impl PhotoInfo {
    pub fn new(
        id: impl Into<String>,
        file_name: impl Into<String>,
        exif_info: ExifInfo,
        thumbnail: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            exif_info,
            thumbnail: thumbnail.into(),
        }
    }

    /// Extension chain under which the original file is stored (".jpg"),
    /// or an empty chain when the file name has no extension
    pub fn original_extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }

    /// File name without its final extension
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exif_lookup() {
        let exif = ExifInfo::new([("Model", "X100V"), ("ISO", "200")]);
        assert_eq!(exif.get("Model"), Some("X100V"));
        assert_eq!(exif.get("FNumber"), None);
        assert_eq!(exif.tags().len(), 2);
    }

    #[test]
    fn test_original_extension() {
        let photo = PhotoInfo::new("id1", "IMG_0001.JPG", ExifInfo::default(), "");
        assert_eq!(photo.original_extension(), ".JPG");
        assert_eq!(photo.stem(), "IMG_0001");

        let bare = PhotoInfo::new("id2", "README", ExifInfo::default(), "");
        assert_eq!(bare.original_extension(), "");
        assert_eq!(bare.stem(), "README");

        let trailing_dot = PhotoInfo::new("id3", "photo.", ExifInfo::default(), "");
        assert_eq!(trailing_dot.original_extension(), "");
    }

    #[test]
    fn test_photo_serialization() {
        let photo = PhotoInfo::new(
            "abc",
            "a.jpg",
            ExifInfo::new([("Make", "Fujifilm")]),
            "dGh1bWI=",
        );
        let json = serde_json::to_string(&photo).unwrap();
        assert!(json.contains(r#""exif_info":{"Make":"Fujifilm"}"#));

        let parsed: PhotoInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, photo);
    }
}
