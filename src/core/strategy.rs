//! Resolution of `func_str` into a closed set of strategies.
//!
//! Built-in strategies are recognized by the `builtin:` prefix; any other
//! source is a script for the embedded interpreter.

use std::cmp::Ordering;

use regex::Regex;

use crate::domain::policy::{PolicyFunction, ReorderItem, BUILTIN_PREFIX};
use crate::error::{Error, Result};

/// Label returned by the regex strategy when nothing matches
pub const REGEX_FALLBACK_LABEL: &str = "other";

/// What a policy function is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// `string -> string`
    Classify,

    /// `ReorderItem[] -> ReorderItem[]`
    Reorder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Classify => write!(f, "classification"),
            Role::Reorder => write!(f, "reorder"),
        }
    }
}

/// A resolved policy function
#[derive(Debug, Clone)]
pub enum Strategy {
    /// First match of the pattern, or [`REGEX_FALLBACK_LABEL`]
    RegexExtract(Regex),

    /// Input returned unchanged
    Passthrough,

    /// Stable sort by value, byte order
    Lexicographic { descending: bool },

    /// Stable sort by the first integer in the value
    Numeric { descending: bool },

    /// Script body with its argument name
    Script { arg: String, source: String },
}

impl Strategy {
    /// Resolve a function for the given role.
    ///
    /// Fails with a validation error for unknown built-ins, invalid
    /// patterns and built-ins that do not support `role`. Scripts are not
    /// compiled here; parse failures surface as evaluation errors.
    pub fn resolve(func: &PolicyFunction, role: Role) -> Result<Self> {
        let strategy = match func.func_str.strip_prefix(BUILTIN_PREFIX) {
            Some(directive) => Self::parse_builtin(directive)?,
            None => {
                if func.arg.trim().is_empty() {
                    return Err(Error::validation("script function has an empty argument name"));
                }
                Strategy::Script {
                    arg: func.arg.clone(),
                    source: func.func_str.clone(),
                }
            }
        };

        if !strategy.supports(role) {
            return Err(Error::validation(format!(
                "strategy '{}' cannot be used for {}",
                strategy.name(),
                role
            )));
        }

        Ok(strategy)
    }

    fn parse_builtin(directive: &str) -> Result<Self> {
        let (name, param) = match directive.split_once(':') {
            Some((name, param)) => (name, Some(param)),
            None => (directive, None),
        };

        match (name, param) {
            ("regex", Some(pattern)) => Regex::new(pattern)
                .map(Strategy::RegexExtract)
                .map_err(|e| Error::validation(format!("invalid regex '{}': {}", pattern, e))),
            ("regex", None) => Err(Error::validation("builtin:regex requires a pattern")),
            ("passthrough", None) => Ok(Strategy::Passthrough),
            ("lexicographic", order) => Ok(Strategy::Lexicographic {
                descending: parse_order(order)?,
            }),
            ("numeric", order) => Ok(Strategy::Numeric {
                descending: parse_order(order)?,
            }),
            _ => Err(Error::validation(format!(
                "unknown builtin strategy: {}",
                directive
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::RegexExtract(_) => "regex",
            Strategy::Passthrough => "passthrough",
            Strategy::Lexicographic { .. } => "lexicographic",
            Strategy::Numeric { .. } => "numeric",
            Strategy::Script { .. } => "script",
        }
    }

    pub fn supports(&self, role: Role) -> bool {
        match self {
            Strategy::RegexExtract(_) => role == Role::Classify,
            Strategy::Lexicographic { .. } | Strategy::Numeric { .. } => role == Role::Reorder,
            Strategy::Passthrough | Strategy::Script { .. } => true,
        }
    }
}

fn parse_order(order: Option<&str>) -> Result<bool> {
    match order {
        None | Some("asc") => Ok(false),
        Some("desc") => Ok(true),
        Some(other) => Err(Error::validation(format!("unknown sort order: {}", other))),
    }
}

/// Apply the regex strategy to one value
pub fn regex_extract(regex: &Regex, data: &str) -> String {
    regex
        .find(data)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| REGEX_FALLBACK_LABEL.to_string())
}

pub fn sort_lexicographic(items: &mut [ReorderItem], descending: bool) {
    if descending {
        items.sort_by(|a, b| b.value.cmp(&a.value));
    } else {
        items.sort_by(|a, b| a.value.cmp(&b.value));
    }
}

/// Items with a number come first, by numeric value; the rest follow in
/// byte order. Ties keep their input order.
pub fn sort_numeric(items: &mut [ReorderItem], descending: bool) {
    items.sort_by(|a, b| {
        match (leading_number(&a.value), leading_number(&b.value)) {
            (Some(x), Some(y)) => {
                let by_number = compare_digits(x, y);
                let by_number = if descending { by_number.reverse() } else { by_number };
                by_number.then_with(|| a.value.cmp(&b.value))
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.value.cmp(&b.value),
        }
    });
}

/// First run of ASCII digits, without leading zeros
fn leading_number(value: &str) -> Option<&str> {
    let start = value.find(|c: char| c.is_ascii_digit())?;
    let rest = &value[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed })
}

/// Compare two digit strings of arbitrary length
fn compare_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
