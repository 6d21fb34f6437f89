//! Raw field providers and the per-run extraction cache.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::photo::PhotoInfo;
use crate::domain::policy::ClassificationFieldType;
use crate::error::{Error, Result};

/// Supplies the PROPERTY and CONTENT fields of a photo
#[async_trait]
pub trait FieldSource: Send + Sync {
    /// A named property of the record, `None` when the name is unknown
    async fn property(&self, photo: &PhotoInfo, name: &str) -> Result<Option<String>>;

    /// Original binary content of the photo
    async fn content(&self, photo: &PhotoInfo) -> Result<Vec<u8>>;
}

/// Properties every record has, independent of any store
pub fn record_property(photo: &PhotoInfo, name: &str) -> Option<String> {
    match name {
        "id" => Some(photo.id.clone()),
        "file_name" => Some(photo.file_name.clone()),
        "stem" => Some(photo.stem().to_string()),
        "extension" => Some(photo.original_extension()),
        "thumbnail" => Some(photo.thumbnail.clone()),
        _ => None,
    }
}

/// Field source backed by the record alone; it has no binary content
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFields;

#[async_trait]
impl FieldSource for RecordFields {
    async fn property(&self, photo: &PhotoInfo, name: &str) -> Result<Option<String>> {
        Ok(record_property(photo, name))
    }

    async fn content(&self, photo: &PhotoInfo) -> Result<Vec<u8>> {
        Err(Error::NotFound(format!(
            "content of photo {} (no content source)",
            photo.id
        )))
    }
}

/// Cache key of one extracted raw value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub photo_id: String,
    pub field_type: ClassificationFieldType,

    /// Empty for field types that ignore the name
    pub field_name: String,
}

impl FieldKey {
    pub fn new(photo_id: &str, field_type: ClassificationFieldType, field_name: &str) -> Self {
        Self {
            photo_id: photo_id.to_string(),
            field_type,
            field_name: if field_type.uses_field_name() {
                field_name.to_string()
            } else {
                String::new()
            },
        }
    }
}

/// Extracted raw values for the duration of one pipeline run
#[derive(Debug, Default)]
pub struct FieldCache {
    values: HashMap<FieldKey, String>,
    hits: usize,
    misses: usize,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &FieldKey) -> Option<&str> {
        match self.values.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.as_str())
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: FieldKey, value: String) {
        self.misses += 1;
        self.values.insert(key, value);
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of values actually extracted
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
