//! Reordering of same-level items with a mandatory permutation check.

use std::collections::HashMap;

use super::evaluator::{CompiledFunction, Evaluator};
use super::strategy::Role;
use crate::domain::policy::{ReorderItem, ReorderPolicy};
use crate::error::{Error, Result, Stage};

impl ReorderPolicy {
    /// Order `items`, outside of a pipeline run
    pub fn evaluate(&self, evaluator: &Evaluator, items: &[ReorderItem]) -> Result<Vec<ReorderItem>> {
        Reorderer::compile(self, evaluator, Stage::Standalone)?.reorder(evaluator, items)
    }
}

/// A reorder policy compiled for one pipeline run
#[derive(Debug)]
pub struct Reorderer {
    function: Option<CompiledFunction>,
    stage: Stage,
}

impl Reorderer {
    pub fn compile(policy: &ReorderPolicy, evaluator: &Evaluator, stage: Stage) -> Result<Self> {
        let function = policy
            .func
            .as_ref()
            .map(|func| evaluator.compile(func, Role::Reorder, stage))
            .transpose()?;
        Ok(Self { function, stage })
    }

    pub fn is_identity(&self) -> bool {
        self.function.is_none()
    }

    /// Order `items`. The output is checked to be a permutation of the
    /// input by id.
    pub fn reorder(&self, evaluator: &Evaluator, items: &[ReorderItem]) -> Result<Vec<ReorderItem>> {
        let function = match &self.function {
            Some(function) => function,
            None => return Ok(items.to_vec()),
        };

        let output = evaluator
            .reorder(function, items)
            .map_err(|e| Error::evaluation(self.stage, describe(items), e))?;

        check_permutation(items, &output).map_err(|detail| Error::PolicyContractViolation {
            stage: self.stage,
            detail,
        })?;

        Ok(output)
    }
}

fn describe(items: &[ReorderItem]) -> String {
    match items.len() {
        1 => format!("item {}", items[0].id),
        n => format!("{} items", n),
    }
}

/// Verify that `output` holds exactly the ids of `input`, with the same
/// multiplicity. Returns a description of the first difference.
pub fn check_permutation(input: &[ReorderItem], output: &[ReorderItem]) -> Result<(), String> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for item in input {
        *counts.entry(item.id.as_str()).or_insert(0) += 1;
    }
    for item in output {
        *counts.entry(item.id.as_str()).or_insert(0) -= 1;
    }

    let mut missing: Vec<&str> = counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(id, _)| *id)
        .collect();
    let mut unexpected: Vec<&str> = counts
        .iter()
        .filter(|(_, n)| **n < 0)
        .map(|(id, _)| *id)
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }

    missing.sort_unstable();
    unexpected.sort_unstable();
    Err(format!(
        "reorder returned {} items for {} inputs (missing: [{}], unexpected or duplicated: [{}])",
        output.len(),
        input.len(),
        missing.join(", "),
        unexpected.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::PolicyFunction;

    fn items() -> Vec<ReorderItem> {
        vec![
            ReorderItem::new("1", "c"),
            ReorderItem::new("2", "a"),
            ReorderItem::new("3", "b"),
        ]
    }

    #[test]
    fn test_identity_keeps_order() {
        let out = ReorderPolicy::identity()
            .evaluate(&Evaluator::default(), &items())
            .unwrap();
        assert_eq!(out, items());
    }

    #[test]
    fn test_builtin_sort() {
        let out = ReorderPolicy::with(PolicyFunction::lexicographic(false))
            .evaluate(&Evaluator::default(), &items())
            .unwrap();
        let ids: Vec<_> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_dropped_item_violates_contract() {
        let policy = ReorderPolicy::with(PolicyFunction::script("drop", "items", "items.pop(); items"));
        let err = policy.evaluate(&Evaluator::default(), &items()).unwrap_err();
        match err {
            Error::PolicyContractViolation { detail, .. } => assert!(detail.contains("missing: [3]")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duplicated_item_violates_contract() {
        let policy = ReorderPolicy::with(PolicyFunction::script(
            "dup",
            "items",
            "items.pop(); items.push(items[0]); items",
        ));
        assert!(matches!(
            policy.evaluate(&Evaluator::default(), &items()),
            Err(Error::PolicyContractViolation { .. })
        ));
    }

    #[test]
    fn test_check_permutation() {
        let input = items();
        let mut shuffled = input.clone();
        shuffled.reverse();
        assert!(check_permutation(&input, &shuffled).is_ok());

        let renamed = vec![
            ReorderItem::new("1", "c"),
            ReorderItem::new("2", "a"),
            ReorderItem::new("9", "b"),
        ];
        let detail = check_permutation(&input, &renamed).unwrap_err();
        assert!(detail.contains("missing: [3]"));
        assert!(detail.contains("[9]"));
    }
}
