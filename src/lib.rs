//! phototree - Policy-driven photo classification
//!
//! A local photo-library core: photos are imported into a repository,
//! classified by user-authored policies into an ordered tree, and exported.
//!
//! # Architecture
//!
//! - A `Policies` document lists classification levels. Each level maps a
//!   photo field to a label and orders the resulting sibling groups; a
//!   trailing reorder orders the photos inside every leaf.
//! - Policy functions are either built-in strategies or Rhai scripts run
//!   under strict resource limits.
//! - Photo files live in a content-addressed, sharded file store; records
//!   and policies live in a SQLite metadata store. A `Repository` binds
//!   both to one root directory.
//!
//! # Modules
//!
//! - `core`: Pipeline (Strategy, Evaluator, PipelineEngine)
//! - `domain`: Data structures (PhotoInfo, Policies, ClassificationTree)
//! - `files`: Id encoding and the sharded FileManager
//! - `storage`: MetadataStore trait and its SQLite implementation
//! - `repository`: Open/close lifecycle over both stores
//! - `library`: Use cases (import, classify, export)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Import photos
//! phototree import ~/Pictures/*.jpg
//!
//! # Store policies and classify
//! phototree policies set by-camera.json
//! phototree classify
//!
//! # Export the tree with copies of the photos
//! phototree export ./sorted
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod files;
pub mod library;
pub mod repository;
pub mod storage;

// Re-export main types at crate root for convenience
pub use crate::core::{EvaluationError, EvaluationLimits, Evaluator, PipelineEngine, PipelineOutput};
pub use domain::{
    CanonicalForm, ClassificationFieldType, ClassificationGroup, ClassificationPolicy,
    ClassificationReorderPolicy, ClassificationResult, ClassificationTree, ExifInfo, PhotoInfo,
    Policies, PolicyFunction, ReorderItem, ReorderPolicy,
};
pub use error::{Error, Result, Stage};
pub use files::{ExtensionChain, FileManager};
pub use library::{ClassificationOutcome, ExportOptions, PhotoImport, PhotoLibrary};
pub use repository::Repository;
pub use storage::{MetadataStore, SqliteMetadataStore};
