//! Error taxonomy shared by the pipeline, the file store and the repository.

use std::fmt;

use thiserror::Error;

use crate::core::evaluator::EvaluationError;

/// Result alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Where in a pipeline run an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A classification level (0-based)
    Level(usize),

    /// The reorder applied to photos inside each leaf group
    TrailingReorder,

    /// Evaluation outside of a pipeline run (e.g. a standalone reorder)
    Standalone,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Level(index) => write!(f, "level {}", index),
            Stage::TrailingReorder => write!(f, "trailing reorder"),
            Stage::Standalone => write!(f, "standalone evaluation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed policy document or argument
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Evaluation failed at {stage} for {subject}: {source}")]
    Evaluation {
        stage: Stage,
        subject: String,
        #[source]
        source: EvaluationError,
    },

    /// Reorder output was not a permutation of its input
    #[error("Policy contract violated at {stage}: {detail}")]
    PolicyContractViolation { stage: Stage, detail: String },

    #[error("Photo {photo_id} has no field '{field}'")]
    MissingField { photo_id: String, field: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The store was used before `open` or after `close`
    #[error("{0} is not opened")]
    NotOpened(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn evaluation(
        stage: Stage,
        subject: impl Into<String>,
        source: EvaluationError,
    ) -> Self {
        Error::Evaluation {
            stage,
            subject: subject.into(),
            source,
        }
    }

    /// True for errors caused by missing data rather than failures
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Level(2).to_string(), "level 2");
        assert_eq!(Stage::TrailingReorder.to_string(), "trailing reorder");
    }

    #[test]
    fn test_evaluation_error_carries_context() {
        let err = Error::evaluation(
            Stage::Level(1),
            "photo abc",
            EvaluationError::Timeout { limit_ms: 10 },
        );
        let message = err.to_string();
        assert!(message.contains("level 1"));
        assert!(message.contains("photo abc"));
        assert!(message.contains("10ms"));
    }
}
