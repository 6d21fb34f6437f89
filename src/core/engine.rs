//! Pipeline engine: policies + photos → ordered classification tree.
//!
//! A run proceeds level by level. Every group of the current level is
//! partitioned by label (first-seen order), the resulting sibling groups are
//! ordered by the level's reorder policy, and after the last level the
//! photos of every leaf are ordered by the trailing reorder policy.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::classify::LevelClassifier;
use super::evaluator::Evaluator;
use super::fields::{FieldCache, FieldSource};
use super::reorder::Reorderer;
use crate::domain::classification::{ClassificationGroup, ClassificationResult, ClassificationTree};
use crate::domain::photo::PhotoInfo;
use crate::domain::policy::{Policies, ReorderItem};
use crate::error::{Error, Result, Stage};

/// Counters collected during one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub photos: usize,
    pub classify_calls: usize,
    pub reorder_calls: usize,

    /// Raw field values actually extracted (cache misses)
    pub field_extractions: usize,
    pub cache_hits: usize,
    pub elapsed_ms: u64,
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub tree: ClassificationTree,

    /// One entry per photo, in tree order
    pub results: Vec<ClassificationResult>,

    #[serde(skip)]
    pub stats: RunStats,
}

impl PipelineOutput {
    fn empty(depth: usize) -> Self {
        Self {
            tree: ClassificationTree::empty(depth),
            results: Vec::new(),
            stats: RunStats::default(),
        }
    }

    /// Label path of one photo
    pub fn result_for(&self, photo_id: &str) -> Option<&ClassificationResult> {
        self.results.iter().find(|r| r.id == photo_id)
    }
}

/// A group under construction
struct WorkGroup<'a> {
    /// Index of the parent in the previous layer
    parent: usize,
    label: String,
    path: Vec<String>,
    photos: Vec<&'a PhotoInfo>,
}

/// Runs the classification pipeline.
///
/// The engine holds no mutable state; concurrent runs share nothing but the
/// evaluator limits.
#[derive(Debug, Clone, Default)]
pub struct PipelineEngine {
    evaluator: Evaluator,
}

impl PipelineEngine {
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Classify and order `photos` according to `policies`
    #[instrument(skip_all, fields(levels = policies.depth(), photos = photos.len()))]
    pub async fn run(
        &self,
        policies: &Policies,
        photos: &[PhotoInfo],
        source: &dyn FieldSource,
    ) -> Result<PipelineOutput> {
        let depth = policies.depth();
        if photos.is_empty() {
            debug!("No photos, returning empty tree");
            return Ok(PipelineOutput::empty(depth));
        }

        let started = Instant::now();
        info!("Starting classification run");

        // Compile everything before the first evaluation
        let mut levels = Vec::with_capacity(depth);
        for (index, level) in policies.levels().iter().enumerate() {
            let stage = Stage::Level(index);
            levels.push((
                LevelClassifier::compile(&level.classification_policies, &self.evaluator, stage)?,
                Reorderer::compile(&level.reorder_policy, &self.evaluator, stage)?,
            ));
        }
        let trailing = Reorderer::compile(policies.trailing_reorder(), &self.evaluator, Stage::TrailingReorder)?;

        let mut stats = RunStats {
            photos: photos.len(),
            ..RunStats::default()
        };
        let mut cache = FieldCache::new();

        let mut layers: Vec<Vec<WorkGroup>> = vec![vec![WorkGroup {
            parent: 0,
            label: String::new(),
            path: Vec::new(),
            photos: photos.iter().collect(),
        }]];

        for (index, (classifier, reorderer)) in levels.iter().enumerate() {
            let current = &layers[layers.len() - 1];
            let mut next = Vec::new();

            for (parent, group) in current.iter().enumerate() {
                // Stable partition by label
                let mut partitions: Vec<(String, Vec<&PhotoInfo>)> = Vec::new();
                let mut by_label: HashMap<String, usize> = HashMap::new();
                for &photo in &group.photos {
                    let label = classifier
                        .classify(&self.evaluator, photo, source, &mut cache)
                        .await?;
                    stats.classify_calls += 1;

                    match by_label.get(&label) {
                        Some(&slot) => partitions[slot].1.push(photo),
                        None => {
                            by_label.insert(label.clone(), partitions.len());
                            partitions.push((label, vec![photo]));
                        }
                    }
                }

                let items: Vec<ReorderItem> = partitions
                    .iter()
                    .enumerate()
                    .map(|(slot, (label, _))| ReorderItem::new(format!("{}.{}", index, slot), label.clone()))
                    .collect();
                let ordered = reorderer.reorder(&self.evaluator, &items).map_err(|e| in_group(e, &group.path))?;
                stats.reorder_calls += 1;

                let slots: HashMap<&str, usize> = items
                    .iter()
                    .enumerate()
                    .map(|(slot, item)| (item.id.as_str(), slot))
                    .collect();
                let mut partitions: Vec<Option<(String, Vec<&PhotoInfo>)>> =
                    partitions.into_iter().map(Some).collect();

                for item in &ordered {
                    let taken = slots
                        .get(item.id.as_str())
                        .and_then(|&slot| partitions[slot].take());
                    let (label, members) = match taken {
                        Some(partition) => partition,
                        None => {
                            return Err(Error::PolicyContractViolation {
                                stage: Stage::Level(index),
                                detail: format!("group id {} returned twice", item.id),
                            })
                        }
                    };

                    let mut path = group.path.clone();
                    path.push(label.clone());
                    next.push(WorkGroup {
                        parent,
                        label,
                        path,
                        photos: members,
                    });
                }
            }

            debug!(level = index, groups = next.len(), "Level classified");
            layers.push(next);
        }

        // Order photos inside every leaf
        let leaves = &layers[layers.len() - 1];
        let mut leaf_orders: Vec<Vec<String>> = Vec::with_capacity(leaves.len());
        for group in leaves {
            let items: Vec<ReorderItem> = group
                .photos
                .iter()
                .map(|p| ReorderItem::new(p.id.clone(), p.file_name.clone()))
                .collect();
            let ordered = trailing.reorder(&self.evaluator, &items).map_err(|e| in_group(e, &group.path))?;
            stats.reorder_calls += 1;
            leaf_orders.push(ordered.into_iter().map(|item| item.id).collect());
        }

        let mut results = Vec::with_capacity(photos.len());
        for (group, ids) in leaves.iter().zip(&leaf_orders) {
            for id in ids {
                results.push(ClassificationResult::new(id.clone(), group.path.clone()));
            }
        }

        let tree = ClassificationTree {
            depth,
            root: assemble(&layers, leaf_orders),
        };

        stats.field_extractions = cache.misses();
        stats.cache_hits = cache.hits();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            leaves = tree.leaves().len(),
            classify_calls = stats.classify_calls,
            reorder_calls = stats.reorder_calls,
            elapsed_ms = stats.elapsed_ms,
            "Classification run completed"
        );

        Ok(PipelineOutput { tree, results, stats })
    }
}

/// Add the group path to evaluation errors raised while ordering a group
fn in_group(err: Error, path: &[String]) -> Error {
    match err {
        Error::Evaluation { stage, subject, source } => Error::Evaluation {
            stage,
            subject: format!("{} in group /{}", subject, path.join("/")),
            source,
        },
        Error::PolicyContractViolation { stage, detail } => Error::PolicyContractViolation {
            stage,
            detail: format!("{} in group /{}", detail, path.join("/")),
        },
        other => other,
    }
}

/// Build the nested tree from the per-level layers, bottom-up
fn assemble(layers: &[Vec<WorkGroup>], leaf_orders: Vec<Vec<String>>) -> ClassificationGroup {
    let last = layers.len() - 1;
    let mut built: Vec<ClassificationGroup> = layers[last]
        .iter()
        .zip(leaf_orders)
        .map(|(group, photo_ids)| ClassificationGroup {
            label: group.label.clone(),
            path: group.path.clone(),
            children: Vec::new(),
            photo_ids,
        })
        .collect();

    for layer in (0..last).rev() {
        let mut parents: Vec<ClassificationGroup> = layers[layer]
            .iter()
            .map(|group| ClassificationGroup {
                label: group.label.clone(),
                path: group.path.clone(),
                children: Vec::new(),
                photo_ids: Vec::new(),
            })
            .collect();

        for (meta, node) in layers[layer + 1].iter().zip(built) {
            parents[meta.parent].children.push(node);
        }
        built = parents;
    }

    built.into_iter().next().unwrap_or_default()
}
