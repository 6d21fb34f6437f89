//! Classification / reorder pipeline.
//!
//! This module contains:
//! - Strategy: closed set of built-in and scripted policy functions
//! - Evaluator: bounded execution of one compiled function
//! - Classify / Reorder: the two policy kinds applied to photos and items
//! - Engine: builds the ordered classification tree

pub mod classify;
pub mod engine;
pub mod evaluator;
pub mod fields;
pub mod limits;
pub mod reorder;
pub mod strategy;

// Re-export commonly used types
pub use classify::LevelClassifier;
pub use engine::{PipelineEngine, PipelineOutput, RunStats};
pub use evaluator::{CompiledFunction, EvaluationError, Evaluator};
pub use fields::{record_property, FieldCache, FieldKey, FieldSource, RecordFields};
pub use limits::EvaluationLimits;
pub use reorder::{check_permutation, Reorderer};
pub use strategy::{Role, Strategy, REGEX_FALLBACK_LABEL};
