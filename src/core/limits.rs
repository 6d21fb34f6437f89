//! Resource limits for user-authored policy scripts.
//!
//! Prevents runaway evaluation through configurable limits on:
//! - Wall-clock time per call
//! - Number of interpreter operations
//! - Call depth
//! - String and array sizes

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits applied to every scripted policy evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationLimits {
    /// Wall-clock budget per call in milliseconds (default: 1000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum interpreter operations per call, 0 = unlimited (default: 1M)
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum function call depth (default: 32)
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum string length in bytes (default: 64MB, fits CONTENT input)
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length (default: 100k)
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,
}

fn default_timeout_ms() -> u64 {
    1000
}
fn default_max_operations() -> u64 {
    1_000_000
}
fn default_max_call_levels() -> usize {
    32
}
fn default_max_string_size() -> usize {
    64 * 1024 * 1024
} // 64MB
fn default_max_array_size() -> usize {
    100_000
}

impl Default for EvaluationLimits {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
        }
    }
}

impl EvaluationLimits {
    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }
}
