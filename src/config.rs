//! Configuration for phototree.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PHOTOTREE_REPOSITORY, PHOTOTREE_EVAL_TIMEOUT_MS)
//! 2. Config file (.phototree/config.yaml)
//! 3. Defaults (~/.phototree/repository)
//!
//! Config file discovery:
//! - Searches current directory and parents for .phototree/config.yaml
//! - Paths in config file are relative to the directory containing .phototree/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::limits::EvaluationLimits;

pub const CONFIG_DIR: &str = ".phototree";
pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_REPOSITORY: &str = "PHOTOTREE_REPOSITORY";
pub const ENV_EVAL_TIMEOUT_MS: &str = "PHOTOTREE_EVAL_TIMEOUT_MS";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,

    /// Repository root (relative to the project directory)
    #[serde(default)]
    pub repository: Option<String>,

    /// Script evaluation limits; omitted keys keep their defaults
    #[serde(default)]
    pub evaluation: EvaluationLimits,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Repository root directory
    pub repository: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub limits: EvaluationLimits,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let current = std::env::current_dir().ok()?;
    find_config_file_from(&current)
}

fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Default repository root (~/.phototree/repository)
pub fn default_repository() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR)
        .join("repository"))
}

/// Merge all sources. `env` looks up an environment variable.
fn resolve(config_file: Option<PathBuf>, env: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig> {
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let repository = if let Some(env_repo) = env(ENV_REPOSITORY) {
        PathBuf::from(env_repo)
    } else if let Some(repo_path) = file.as_ref().and_then(|f| f.repository.as_deref()) {
        // Base directory is the parent of .phototree/ (i.e., grandparent of config.yaml)
        let base_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));
        resolve_path(base_dir, repo_path)
    } else {
        default_repository()?
    };

    let mut limits = file.map(|f| f.evaluation).unwrap_or_default();
    if let Some(timeout) = env(ENV_EVAL_TIMEOUT_MS) {
        limits.timeout_ms = timeout
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", ENV_EVAL_TIMEOUT_MS, timeout))?;
    }

    Ok(ResolvedConfig {
        repository,
        config_file,
        limits,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    resolve(find_config_file(), |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the repository root directory.
pub fn repository_dir() -> Result<PathBuf> {
    Ok(config()?.repository.clone())
}

/// Get the evaluation limits for policy scripts.
pub fn evaluation_limits() -> Result<EvaluationLimits> {
    Ok(config()?.limits.clone())
}
