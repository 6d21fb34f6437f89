//! Deterministic id → path mapping.
//!
//! An id is stripped of `-` separators, encoded with the URL-safe base64
//! alphabet (`+` → `-`, `/` → `_`, no padding) and sharded into two
//! directory levels:
//!
//! ```text
//! <enc[0..2]>/<enc[2..4]>/<enc><extension-chain>
//! ```

use std::fmt;
use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::{Error, Result};

/// Characters removed from an id before encoding
pub const ID_SEPARATOR: char = '-';

/// Characters of the encoded id used per shard level
const SHARD_WIDTH: usize = 2;

/// Shortest encoded id that fills both shard levels
pub const MIN_ENCODED_LEN: usize = 2 * SHARD_WIDTH;

/// Canonical form of an id
pub fn strip_separators(id: &str) -> String {
    id.chars().filter(|c| *c != ID_SEPARATOR).collect()
}

/// Encode an id into its filesystem-safe form
pub fn encode_id(id: &str) -> Result<String> {
    let canonical = strip_separators(id);
    if canonical.is_empty() {
        return Err(Error::validation(format!("photo id '{}' is empty", id)));
    }

    let encoded = URL_SAFE_NO_PAD.encode(canonical.as_bytes());
    if encoded.len() < MIN_ENCODED_LEN {
        return Err(Error::validation(format!(
            "photo id '{}' is too short to shard (encoded '{}')",
            id, encoded
        )));
    }
    Ok(encoded)
}

/// Inverse of [`encode_id`]; returns the canonical id
pub fn decode_id(encoded: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::validation(format!("'{}' is not an encoded id: {}", encoded, e)))?;
    String::from_utf8(bytes)
        .map_err(|_| Error::validation(format!("'{}' does not decode to UTF-8", encoded)))
}

/// Variant tag appended to the encoded id, e.g. `.jpg` or `.raw.thumbnail.jpg`.
///
/// Either empty or a sequence of non-empty `.`-prefixed segments without
/// path separators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionChain(String);

impl ExtensionChain {
    pub fn new(chain: impl Into<String>) -> Result<Self> {
        let chain = chain.into();
        validate_chain(&chain)?;
        Ok(Self(chain))
    }

    /// The chain without any extension
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from bare suffixes: `["raw", "jpg"]` → `.raw.jpg`
    pub fn from_suffixes<I, S>(suffixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chain: String = suffixes
            .into_iter()
            .map(|s| format!(".{}", s.as_ref()))
            .collect();
        Self::new(chain)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments without their leading dots
    pub fn suffixes(&self) -> Vec<&str> {
        if self.0.is_empty() {
            return Vec::new();
        }
        self.0[1..].split('.').collect()
    }
}

impl fmt::Display for ExtensionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ExtensionChain {
    type Error = Error;

    fn try_from(chain: &str) -> Result<Self> {
        Self::new(chain)
    }
}

fn validate_chain(chain: &str) -> Result<()> {
    if chain.is_empty() {
        return Ok(());
    }
    if !chain.starts_with('.') {
        return Err(Error::validation(format!(
            "extension chain '{}' must start with '.'",
            chain
        )));
    }
    if chain.contains(['/', '\\', '\0']) {
        return Err(Error::validation(format!(
            "extension chain '{}' contains a path separator",
            chain
        )));
    }
    if chain[1..].split('.').any(str::is_empty) {
        return Err(Error::validation(format!(
            "extension chain '{}' has an empty segment",
            chain
        )));
    }
    Ok(())
}

/// Shard directories of an encoded id
pub(crate) fn shard_dirs(encoded: &str) -> PathBuf {
    PathBuf::from(&encoded[..SHARD_WIDTH]).join(&encoded[SHARD_WIDTH..MIN_ENCODED_LEN])
}

/// Path of a variant relative to the file store root. Needs no open store.
pub fn relative_path(id: &str, chain: &ExtensionChain) -> Result<PathBuf> {
    let encoded = encode_id(id)?;
    Ok(shard_dirs(&encoded).join(format!("{}{}", encoded, chain)))
}

/// Whether `file_name` is a stored variant of the id encoded as `encoded`,
/// returning its chain
pub(crate) fn variant_of(file_name: &str, encoded: &str) -> Option<ExtensionChain> {
    let rest = file_name.strip_prefix(encoded)?;
    if rest.is_empty() || rest.starts_with('.') {
        ExtensionChain::new(rest).ok()
    } else {
        None
    }
}
