//! Export of a classification run to a plain directory tree.
//!
//! ```text
//! <dest>/
//! ├── manifest.json               # tree, label paths, timestamp
//! └── <label>/<label>/...         # one directory per group
//!     └── <file_name>             # copied originals
//! ```
//!
//! Sibling groups whose labels sanitize to the same directory name ("a/b"
//! and "a_b") get ` (n)` suffixes in tree order, so every group keeps its
//! own directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{info, instrument};

use super::{ClassificationOutcome, PhotoLibrary};
use crate::domain::classification::{ClassificationGroup, ClassificationResult, ClassificationTree};
use crate::domain::photo::PhotoInfo;
use crate::error::{Error, Result};
use crate::files::ExtensionChain;

pub const MANIFEST_FILE: &str = "manifest.json";

/// What an export writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub manifest: bool,
    pub photos: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            manifest: true,
            photos: true,
        }
    }
}

/// Summary of a finished export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub dest: PathBuf,
    pub manifest: Option<PathBuf>,
    pub photos_copied: usize,
}

#[derive(Serialize)]
struct Manifest<'a> {
    exported_at: DateTime<Utc>,
    photo_count: usize,
    tree: &'a ClassificationTree,
    results: &'a [ClassificationResult],
}

/// Directory name for a label. Path separators and characters rejected by
/// common filesystems become `_`; labels that would not name a directory
/// (empty, `.`, `..`) become `_`.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();

    match trimmed {
        "" | "." | ".." => "_".to_string(),
        name => name.to_string(),
    }
}

/// `name`, or `name (n)` when a sibling already uses it
fn unique_folder(used: &mut HashSet<String>, name: String) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{} ({})", name, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Directory of every leaf below `group`, in tree order
fn leaf_dirs<'a>(group: &'a ClassificationGroup, dir: &Path, out: &mut Vec<(PathBuf, &'a ClassificationGroup)>) {
    if group.is_leaf() {
        out.push((dir.to_path_buf(), group));
        return;
    }
    let mut used = HashSet::new();
    for child in &group.children {
        let name = unique_folder(&mut used, sanitize_label(&child.label));
        leaf_dirs(child, &dir.join(name), out);
    }
}

/// `name`, or `stem (n).ext` when `name` is already taken in `dir`
fn unique_target(taken: &mut HashSet<PathBuf>, dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if taken.insert(candidate.clone()) {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

impl PhotoLibrary {
    /// Classify every photo and write the result below `dest`
    #[instrument(skip(self, dest), fields(dest = %dest.as_ref().display()))]
    pub async fn export(&self, dest: impl AsRef<Path>, options: ExportOptions) -> Result<ExportReport> {
        let dest = dest.as_ref();
        let outcome = self.classify_all().await?;
        fs::create_dir_all(dest).await?;

        let manifest = if options.manifest {
            Some(write_manifest(dest, &outcome).await?)
        } else {
            None
        };

        let photos_copied = if options.photos {
            self.copy_photos(dest, &outcome).await?
        } else {
            0
        };

        info!(photos_copied, manifest = manifest.is_some(), "Export completed");
        Ok(ExportReport {
            dest: dest.to_path_buf(),
            manifest,
            photos_copied,
        })
    }

    async fn copy_photos(&self, dest: &Path, outcome: &ClassificationOutcome) -> Result<usize> {
        let records: HashMap<String, PhotoInfo> = self
            .list_photos()?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let files = self.repository().files()?;

        let mut leaves = Vec::new();
        if !outcome.tree.is_empty() {
            leaf_dirs(&outcome.tree.root, dest, &mut leaves);
        }

        let mut taken = HashSet::new();
        let mut copied = 0;
        for (dir, leaf) in leaves {
            fs::create_dir_all(&dir).await?;

            for id in &leaf.photo_ids {
                let record = records
                    .get(id)
                    .ok_or_else(|| Error::NotFound(format!("photo {} removed during export", id)))?;
                let chain = ExtensionChain::new(record.original_extension())?;
                let target = unique_target(&mut taken, &dir, &record.file_name);
                fs::copy(files.path(id, &chain)?, &target).await?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

async fn write_manifest(dest: &Path, outcome: &ClassificationOutcome) -> Result<PathBuf> {
    let manifest = Manifest {
        exported_at: Utc::now(),
        photo_count: outcome.results.len(),
        tree: &outcome.tree,
        results: &outcome.results,
    };
    let path = dest.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("2021"), "2021");
        assert_eq!(sanitize_label("a/b"), "a_b");
        assert_eq!(sanitize_label("C:\\x"), "C__x");
        assert_eq!(sanitize_label(""), "_");
        assert_eq!(sanitize_label(".."), "_");
        assert_eq!(sanitize_label("  Fuji X100V "), "Fuji X100V");
    }

    fn group(label: &str, children: Vec<ClassificationGroup>) -> ClassificationGroup {
        ClassificationGroup {
            label: label.to_string(),
            path: Vec::new(),
            children,
            photo_ids: Vec::new(),
        }
    }

    #[test]
    fn test_colliding_labels_get_distinct_dirs() {
        let root = group(
            "",
            vec![
                group("a/b", Vec::new()),
                group("a_b", vec![group("", Vec::new()), group(".", Vec::new())]),
                group("x", Vec::new()),
            ],
        );
        let mut out = Vec::new();
        leaf_dirs(&root, Path::new("/out"), &mut out);

        let dirs: Vec<PathBuf> = out.into_iter().map(|(dir, _)| dir).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/out/a_b"),
                PathBuf::from("/out/a_b (2)/_"),
                PathBuf::from("/out/a_b (2)/_ (2)"),
                PathBuf::from("/out/x"),
            ]
        );
    }

    #[test]
    fn test_unique_target() {
        let mut taken = HashSet::new();
        let dir = Path::new("/out/A");
        assert_eq!(unique_target(&mut taken, dir, "a.jpg"), dir.join("a.jpg"));
        assert_eq!(unique_target(&mut taken, dir, "a.jpg"), dir.join("a (2).jpg"));
        assert_eq!(unique_target(&mut taken, dir, "a.jpg"), dir.join("a (3).jpg"));
        assert_eq!(unique_target(&mut taken, dir, "README"), dir.join("README"));
        assert_eq!(unique_target(&mut taken, dir, "README"), dir.join("README (2)"));
    }
}
