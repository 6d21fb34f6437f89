//! Classification and reorder policies.
//!
//! These are the persisted, user-authored decision functions. They are plain
//! data here; resolving and running them is done by [`crate::core`].

use std::convert::TryFrom;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::canonical::CanonicalForm;
use crate::core::strategy::{Role, Strategy};
use crate::error::{Error, Result};

/// Prefix marking a built-in strategy in `func_str`
pub const BUILTIN_PREFIX: &str = "builtin:";

/// A single-argument function used for classification or reordering.
///
/// `func_str` is either a built-in directive (`builtin:regex:<pattern>`,
/// `builtin:passthrough`, `builtin:lexicographic[:desc]`,
/// `builtin:numeric[:desc]`) or a script body that sees its input under
/// the name `arg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFunction {
    /// Free-form label shown to users
    #[serde(rename = "type")]
    pub kind: String,

    /// Name the input is bound to
    pub arg: String,

    /// Function source or built-in directive
    pub func_str: String,
}

impl PolicyFunction {
    pub fn new(kind: impl Into<String>, arg: impl Into<String>, func_str: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            arg: arg.into(),
            func_str: func_str.into(),
        }
    }

    /// Classify by the first match of a regular expression
    pub fn regex_extract(pattern: &str) -> Self {
        Self::new("regex", "data", format!("{}regex:{}", BUILTIN_PREFIX, pattern))
    }

    /// Return the input unchanged
    pub fn passthrough() -> Self {
        Self::new("passthrough", "data", format!("{}passthrough", BUILTIN_PREFIX))
    }

    /// Sort items by value in byte order
    pub fn lexicographic(descending: bool) -> Self {
        let directive = if descending {
            "lexicographic:desc"
        } else {
            "lexicographic"
        };
        Self::new("lexicographic", "items", format!("{}{}", BUILTIN_PREFIX, directive))
    }

    /// Sort items by the first integer found in their value
    pub fn numeric(descending: bool) -> Self {
        let directive = if descending { "numeric:desc" } else { "numeric" };
        Self::new("numeric", "items", format!("{}{}", BUILTIN_PREFIX, directive))
    }

    /// A script evaluated by the embedded interpreter
    pub fn script(kind: impl Into<String>, arg: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(kind, arg, source)
    }

    pub fn is_builtin(&self) -> bool {
        self.func_str.starts_with(BUILTIN_PREFIX)
    }
}

impl CanonicalForm for PolicyFunction {}

/// Which raw field of a photo a classification policy reads.
///
/// Persisted as its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ClassificationFieldType {
    /// File name including extension
    Name,

    /// An EXIF tag, named by `field_name`
    ExifInfo,

    /// A record property, named by `field_name`
    Property,

    /// Base64 of the original file content
    Content,
}

impl ClassificationFieldType {
    /// Whether `field_name` is consulted for this field type
    pub fn uses_field_name(self) -> bool {
        matches!(self, Self::ExifInfo | Self::Property)
    }
}

impl From<ClassificationFieldType> for u8 {
    fn from(value: ClassificationFieldType) -> Self {
        match value {
            ClassificationFieldType::Name => 0,
            ClassificationFieldType::ExifInfo => 1,
            ClassificationFieldType::Property => 2,
            ClassificationFieldType::Content => 3,
        }
    }
}

impl TryFrom<u8> for ClassificationFieldType {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Name),
            1 => Ok(Self::ExifInfo),
            2 => Ok(Self::Property),
            3 => Ok(Self::Content),
            other => Err(format!("invalid field_type ordinal: {}", other)),
        }
    }
}

impl fmt::Display for ClassificationFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::ExifInfo => write!(f, "exif"),
            Self::Property => write!(f, "property"),
            Self::Content => write!(f, "content"),
        }
    }
}

/// Turns a photo into a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    pub field_type: ClassificationFieldType,

    /// Tag or property name; kept verbatim even when unused
    pub field_name: String,

    /// `string -> string` function
    pub func: PolicyFunction,
}

impl ClassificationPolicy {
    pub fn new(field_type: ClassificationFieldType, field_name: impl Into<String>, func: PolicyFunction) -> Self {
        Self {
            field_type,
            field_name: field_name.into(),
            func,
        }
    }

    /// Classify by file name
    pub fn by_name(func: PolicyFunction) -> Self {
        Self::new(ClassificationFieldType::Name, "", func)
    }

    /// Classify by an EXIF tag
    pub fn by_exif(tag: impl Into<String>, func: PolicyFunction) -> Self {
        Self::new(ClassificationFieldType::ExifInfo, tag, func)
    }
}

impl CanonicalForm for ClassificationPolicy {
    fn validate(&self) -> Result<()> {
        Strategy::resolve(&self.func, Role::Classify).map(|_| ())
    }
}

/// Minimal projection of a photo or group used for ordering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: String,
    pub value: String,
}

impl ReorderItem {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Orders same-level items; `None` keeps the input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    /// `ReorderItem[] -> ReorderItem[]` function
    #[serde(default)]
    pub func: Option<PolicyFunction>,
}

impl ReorderPolicy {
    pub fn new(func: Option<PolicyFunction>) -> Self {
        Self { func }
    }

    pub fn identity() -> Self {
        Self { func: None }
    }

    pub fn with(func: PolicyFunction) -> Self {
        Self { func: Some(func) }
    }

    pub fn is_identity(&self) -> bool {
        self.func.is_none()
    }
}

impl CanonicalForm for ReorderPolicy {
    fn validate(&self) -> Result<()> {
        match &self.func {
            Some(func) => Strategy::resolve(func, Role::Reorder).map(|_| ()),
            None => Ok(()),
        }
    }
}

/// One level of the classification hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReorderPolicy {
    /// The (single) classification policy of this level
    pub classification_policies: ClassificationPolicy,

    /// Orders the groups produced by this level
    pub reorder_policy: ReorderPolicy,
}

impl ClassificationReorderPolicy {
    pub fn new(classification: ClassificationPolicy, reorder: ReorderPolicy) -> Self {
        Self {
            classification_policies: classification,
            reorder_policy: reorder,
        }
    }
}

impl CanonicalForm for ClassificationReorderPolicy {
    fn validate(&self) -> Result<()> {
        self.classification_policies.validate()?;
        self.reorder_policy.validate()
    }
}

/// The full policy document: ordered levels plus the leaf reorder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policies {
    pub classification_reorder_policies: Vec<ClassificationReorderPolicy>,

    /// Orders photos inside each leaf group
    pub reorder_policy: ReorderPolicy,
}

impl Policies {
    pub fn new(levels: Vec<ClassificationReorderPolicy>, trailing: ReorderPolicy) -> Self {
        Self {
            classification_reorder_policies: levels,
            reorder_policy: trailing,
        }
    }

    pub fn levels(&self) -> &[ClassificationReorderPolicy] {
        &self.classification_reorder_policies
    }

    pub fn trailing_reorder(&self) -> &ReorderPolicy {
        &self.reorder_policy
    }

    /// Number of hierarchy levels (tree depth)
    pub fn depth(&self) -> usize {
        self.classification_reorder_policies.len()
    }
}

impl CanonicalForm for Policies {
    fn validate(&self) -> Result<()> {
        for (index, level) in self.classification_reorder_policies.iter().enumerate() {
            level
                .validate()
                .map_err(|e| prefixed(&format!("level {}", index), e))?;
        }
        self.reorder_policy
            .validate()
            .map_err(|e| prefixed("trailing reorder", e))
    }
}

fn prefixed(prefix: &str, err: Error) -> Error {
    match err {
        Error::Validation(message) => Error::Validation(format!("{}: {}", prefix, message)),
        other => other,
    }
}
