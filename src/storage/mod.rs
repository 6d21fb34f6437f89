//! Metadata persistence: photo records and key/value settings.

pub mod sqlite;

use std::path::Path;

use crate::domain::canonical::CanonicalForm;
use crate::domain::photo::PhotoInfo;
use crate::domain::policy::Policies;
use crate::error::Result;

pub use sqlite::SqliteMetadataStore;

/// Settings key holding the canonical policies document
pub const POLICIES_KEY: &str = "policies";

/// Store of photo records and settings bound to one directory.
///
/// Record operations on a closed store fail with `NotOpened`.
pub trait MetadataStore: Send + Sync {
    /// Bind to `dir`, creating it if needed. Opening another directory
    /// closes the current binding first.
    fn open(&mut self, dir: &Path) -> Result<()>;

    /// Release the binding. Closing a closed store does nothing.
    fn close(&mut self);

    fn is_opened(&self) -> bool;

    /// Add a new record; `AlreadyExists` if the id is taken
    fn insert(&self, photo: &PhotoInfo) -> Result<()>;

    /// Replace an existing record; `NotFound` if absent
    fn update(&self, photo: &PhotoInfo) -> Result<()>;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool>;

    fn query(&self, id: &str) -> Result<PhotoInfo>;

    /// Every record, in import order
    fn query_all(&self) -> Result<Vec<PhotoInfo>>;

    fn get_by_key(&self, key: &str) -> Result<Option<String>>;

    fn set_by_key(&self, key: &str, value: &str) -> Result<()>;

    fn contains(&self, id: &str) -> Result<bool> {
        match self.query(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stored policies, or the default (zero levels, identity) when unset
    fn get_policies(&self) -> Result<Policies> {
        match self.get_by_key(POLICIES_KEY)? {
            Some(document) => Policies::from_canonical_form(&document),
            None => Ok(Policies::default()),
        }
    }

    /// Validate and store a policies document
    fn set_policies(&self, policies: &Policies) -> Result<()> {
        policies.validate()?;
        self.set_by_key(POLICIES_KEY, &policies.to_canonical_form()?)
    }
}
