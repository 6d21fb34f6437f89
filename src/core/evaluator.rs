//! Evaluation of policy functions.
//!
//! Built-in strategies run natively. Scripts run in the embedded Rhai
//! interpreter: every call gets a fresh engine configured with the
//! [`EvaluationLimits`], so a failing or looping script cannot affect any
//! other evaluation. Time is bounded through the engine's progress hook,
//! which reports expiry as [`EvaluationError::Timeout`].

use std::time::Instant;

use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use thiserror::Error;
use tracing::debug;

use super::limits::EvaluationLimits;
use super::strategy::{self, Role, Strategy};
use crate::domain::policy::{PolicyFunction, ReorderItem};
use crate::error::{Error, Result, Stage};

/// Operations between two deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Failures of a single policy evaluation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("script failed to parse: {0}")]
    Parse(String),

    #[error("script references undefined name: {0}")]
    UndefinedName(String),

    #[error("script raised an error: {0}")]
    Runtime(String),

    #[error("script timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("script exceeded a resource limit: {0}")]
    ResourceLimit(String),

    #[error("expected {expected} result, got {actual}")]
    OutputType {
        expected: &'static str,
        actual: String,
    },

    #[error("strategy '{strategy}' was compiled for {compiled}, not {requested}")]
    RoleMismatch {
        strategy: &'static str,
        compiled: Role,
        requested: Role,
    },
}

/// Values that can cross into and out of a script
pub trait PolicyValue: Sized {
    const TYPE_NAME: &'static str;

    fn to_dynamic(&self) -> Dynamic;

    fn from_dynamic(value: Dynamic) -> Result<Self, EvaluationError>;
}

impl PolicyValue for String {
    const TYPE_NAME: &'static str = "string";

    fn to_dynamic(&self) -> Dynamic {
        Dynamic::from(self.clone())
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, EvaluationError> {
        if value.is_string() {
            value.into_string().map_err(|actual| EvaluationError::OutputType {
                expected: Self::TYPE_NAME,
                actual: actual.to_string(),
            })
        } else if value.is_char() {
            Ok(value.to_string())
        } else {
            Err(EvaluationError::OutputType {
                expected: Self::TYPE_NAME,
                actual: value.type_name().to_string(),
            })
        }
    }
}

impl PolicyValue for Vec<ReorderItem> {
    const TYPE_NAME: &'static str = "array of items";

    fn to_dynamic(&self) -> Dynamic {
        let array: Array = self
            .iter()
            .map(|item| {
                let mut map = Map::new();
                map.insert("id".into(), Dynamic::from(item.id.clone()));
                map.insert("value".into(), Dynamic::from(item.value.clone()));
                Dynamic::from(map)
            })
            .collect();
        Dynamic::from(array)
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, EvaluationError> {
        let actual = value.type_name().to_string();
        let array = value
            .try_cast::<Array>()
            .ok_or(EvaluationError::OutputType {
                expected: Self::TYPE_NAME,
                actual,
            })?;

        array
            .into_iter()
            .map(|element| {
                let actual = element.type_name().to_string();
                let map = element.try_cast::<Map>().ok_or(EvaluationError::OutputType {
                    expected: "item map",
                    actual,
                })?;
                Ok(ReorderItem::new(
                    map_string(&map, "id")?,
                    map_string(&map, "value")?,
                ))
            })
            .collect()
    }
}

fn map_string(map: &Map, key: &'static str) -> Result<String, EvaluationError> {
    let value = map.get(key).ok_or(EvaluationError::OutputType {
        expected: "item with id and value",
        actual: format!("item without '{}'", key),
    })?;
    String::from_dynamic(value.clone())
}

/// A policy function ready to run
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    strategy: Strategy,
    role: Role,
    ast: Option<AST>,
}

impl CompiledFunction {
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Runs policy functions under a fixed set of limits
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    limits: EvaluationLimits,
}

impl Evaluator {
    pub fn new(limits: EvaluationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &EvaluationLimits {
        &self.limits
    }

    /// Resolve and, for scripts, parse a function.
    ///
    /// Resolution failures are validation errors; parse failures are
    /// evaluation errors attributed to `stage`.
    pub fn compile(&self, func: &PolicyFunction, role: Role, stage: Stage) -> Result<CompiledFunction> {
        let strategy = Strategy::resolve(func, role)?;
        let ast = match &strategy {
            Strategy::Script { source, .. } => Some(
                self.engine()
                    .compile(source)
                    .map_err(|e| {
                        Error::evaluation(stage, format!("'{}' function", func.kind), EvaluationError::Parse(e.to_string()))
                    })?,
            ),
            _ => None,
        };

        Ok(CompiledFunction {
            strategy,
            role,
            ast,
        })
    }

    /// Evaluate a `string -> string` function
    pub fn classify(&self, func: &CompiledFunction, input: &str) -> Result<String, EvaluationError> {
        expect_role(func, Role::Classify)?;
        match &func.strategy {
            Strategy::RegexExtract(regex) => Ok(strategy::regex_extract(regex, input)),
            Strategy::Passthrough => Ok(input.to_string()),
            Strategy::Script { arg, .. } => self.run_script(func, arg, &input.to_string()),
            other => Err(EvaluationError::RoleMismatch {
                strategy: other.name(),
                compiled: func.role,
                requested: Role::Classify,
            }),
        }
    }

    /// Evaluate an `items -> items` function. No permutation check is done
    /// here; see [`crate::core::reorder`].
    pub fn reorder(&self, func: &CompiledFunction, items: &[ReorderItem]) -> Result<Vec<ReorderItem>, EvaluationError> {
        expect_role(func, Role::Reorder)?;
        match &func.strategy {
            Strategy::Passthrough => Ok(items.to_vec()),
            Strategy::Lexicographic { descending } => {
                let mut sorted = items.to_vec();
                strategy::sort_lexicographic(&mut sorted, *descending);
                Ok(sorted)
            }
            Strategy::Numeric { descending } => {
                let mut sorted = items.to_vec();
                strategy::sort_numeric(&mut sorted, *descending);
                Ok(sorted)
            }
            Strategy::Script { arg, .. } => self.run_script(func, arg, &items.to_vec()),
            other => Err(EvaluationError::RoleMismatch {
                strategy: other.name(),
                compiled: func.role,
                requested: Role::Reorder,
            }),
        }
    }

    fn run_script<V: PolicyValue>(&self, func: &CompiledFunction, arg: &str, input: &V) -> Result<V, EvaluationError> {
        let ast = func
            .ast
            .as_ref()
            .ok_or_else(|| EvaluationError::Parse("script was not compiled".to_string()))?;

        let engine = self.engine();
        let mut scope = Scope::new();
        scope.push_dynamic(arg, input.to_dynamic());

        let started = Instant::now();
        let output = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| self.map_error(*e))?;
        debug!(elapsed_us = started.elapsed().as_micros() as u64, "Script evaluated");

        V::from_dynamic(output)
    }

    /// A fresh engine whose deadline starts now
    fn engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);

        let deadline = Instant::now() + self.limits.timeout();
        engine.on_progress(move |operations| {
            if operations % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        // scripts never write to the host's stdout
        engine.on_print(|text| debug!(target: "phototree::script", "{}", text));
        engine.on_debug(|text, _source, position| {
            debug!(target: "phototree::script", %position, "{}", text)
        });

        engine
    }

    fn map_error(&self, err: EvalAltResult) -> EvaluationError {
        match err {
            EvalAltResult::ErrorParsing(kind, _) => EvaluationError::Parse(kind.to_string()),
            EvalAltResult::ErrorVariableNotFound(name, _) => EvaluationError::UndefinedName(name),
            EvalAltResult::ErrorFunctionNotFound(signature, _) => {
                EvaluationError::UndefinedName(signature)
            }
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => self.map_error(*inner),
            EvalAltResult::ErrorTerminated(_, _) => EvaluationError::Timeout {
                limit_ms: self.limits.timeout_ms,
            },
            EvalAltResult::ErrorTooManyOperations(_) => {
                EvaluationError::ResourceLimit("too many operations".to_string())
            }
            EvalAltResult::ErrorStackOverflow(_) => {
                EvaluationError::ResourceLimit("call depth".to_string())
            }
            EvalAltResult::ErrorDataTooLarge(what, _) => EvaluationError::ResourceLimit(what),
            EvalAltResult::ErrorRuntime(value, _) => EvaluationError::Runtime(value.to_string()),
            other => EvaluationError::Runtime(other.to_string()),
        }
    }
}

fn expect_role(func: &CompiledFunction, requested: Role) -> Result<(), EvaluationError> {
    if func.role == requested {
        Ok(())
    } else {
        Err(EvaluationError::RoleMismatch {
            strategy: func.strategy.name(),
            compiled: func.role,
            requested,
        })
    }
}
