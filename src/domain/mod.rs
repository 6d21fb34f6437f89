//! Domain types for the photo library.
//!
//! This module contains the core data structures:
//! - Photo: imported photo records and their EXIF tags
//! - Policy: persisted classification / reorder policies
//! - Classification: pipeline output (tree and label paths)

pub mod canonical;
pub mod classification;
pub mod photo;
pub mod policy;

// Re-export commonly used types
pub use canonical::CanonicalForm;
pub use classification::{ClassificationGroup, ClassificationResult, ClassificationTree};
pub use photo::{ExifInfo, PhotoInfo};
pub use policy::{
    ClassificationFieldType, ClassificationPolicy, ClassificationReorderPolicy, Policies,
    PolicyFunction, ReorderItem, ReorderPolicy,
};
