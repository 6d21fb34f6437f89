//! Output of a pipeline run: the ordered tree and per-photo label paths.
//!
//! Both are derived values, recomputed on every run and never persisted.

use serde::{Deserialize, Serialize};

/// Label path of one photo, from the root to its leaf group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: String,
    pub classification: Vec<String>,
}

impl ClassificationResult {
    pub fn new(id: impl Into<String>, classification: Vec<String>) -> Self {
        Self {
            id: id.into(),
            classification,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.classification
    }
}

/// A node of the classification tree.
///
/// Inner groups carry ordered `children`; leaf groups carry the ordered
/// `photo_ids`. The root has an empty label and an empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationGroup {
    pub label: String,

    /// Labels from the root down to and including this group
    pub path: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ClassificationGroup>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photo_ids: Vec<String>,
}

impl ClassificationGroup {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaf groups below (or equal to) this group, in tree order
    pub fn leaves(&self) -> Vec<&ClassificationGroup> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ClassificationGroup>) {
        if self.is_leaf() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }

    /// Number of photos below this group
    pub fn photo_count(&self) -> usize {
        self.photo_ids.len() + self.children.iter().map(|c| c.photo_count()).sum::<usize>()
    }
}

/// The ordered classification tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTree {
    /// Number of classification levels the tree was built with
    pub depth: usize,

    pub root: ClassificationGroup,
}

impl ClassificationTree {
    /// A tree with no photos
    pub fn empty(depth: usize) -> Self {
        Self {
            depth,
            root: ClassificationGroup::root(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.photo_count() == 0
    }

    /// Leaf groups in order. A tree without photos has none.
    pub fn leaves(&self) -> Vec<&ClassificationGroup> {
        if self.is_empty() {
            return Vec::new();
        }
        self.root.leaves()
    }

    /// Every photo id in tree order
    pub fn photo_ids(&self) -> Vec<&str> {
        self.leaves()
            .into_iter()
            .flat_map(|g| g.photo_ids.iter().map(String::as_str))
            .collect()
    }

    /// Top-level groups (empty for a zero-level tree)
    pub fn groups(&self) -> &[ClassificationGroup] {
        &self.root.children
    }
}
