//! Canonical (persisted) form of policy documents.
//!
//! Every persisted type implements [`CanonicalForm`]. The canonical form is
//! compact JSON with the field order fixed by the type definition, so equal
//! values always serialize to identical bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Capability for types that are persisted as canonical JSON
pub trait CanonicalForm: Serialize + DeserializeOwned {
    /// Structural checks run after parsing
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn to_canonical_form(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate. Malformed input is a validation error, never a
    /// serialization error, since it originates from a stored document.
    fn from_canonical_form(input: &str) -> Result<Self> {
        let value: Self = serde_json::from_str(input)
            .map_err(|e| Error::validation(format!("malformed policy document: {}", e)))?;
        value.validate()?;
        Ok(value)
    }
}
