//! Repository session: one root directory, one metadata store, one file
//! manager, opened and closed together.
//!
//! ```text
//! <root>/
//! ├── meta/      # metadata store (library.db)
//! └── photos/    # file manager shards
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::fields::{record_property, FieldSource};
use crate::domain::photo::PhotoInfo;
use crate::error::{Error, Result};
use crate::files::{ExtensionChain, FileManager};
use crate::storage::{MetadataStore, SqliteMetadataStore};

pub const META_DIR: &str = "meta";
pub const PHOTOS_DIR: &str = "photos";

/// An explicitly owned repository session.
///
/// Either both collaborators are bound to the same root, or neither is.
pub struct Repository {
    root: Option<PathBuf>,
    metadata: Box<dyn MetadataStore>,
    files: FileManager,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("files", &self.files)
            .finish()
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository {
    /// A closed repository backed by SQLite metadata
    pub fn new() -> Self {
        Self::with_store(Box::new(SqliteMetadataStore::new()))
    }

    /// A closed repository using the given metadata store
    pub fn with_store(metadata: Box<dyn MetadataStore>) -> Self {
        Self {
            root: None,
            metadata,
            files: FileManager::new(),
        }
    }

    /// Create and open a repository at `root`
    pub async fn open_at(root: impl AsRef<Path>) -> Result<Self> {
        let mut repository = Self::new();
        repository.open(root).await?;
        Ok(repository)
    }

    /// Bind to `root`. Any open session is closed first. If either
    /// collaborator fails to open, both are closed and the error returned.
    pub async fn open(&mut self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        self.close();

        if let Err(e) = self.bind(root).await {
            warn!(root = %root.display(), error = %e, "Repository open failed, rolling back");
            self.close();
            return Err(e);
        }

        info!(root = %root.display(), "Repository opened");
        self.root = Some(root.to_path_buf());
        Ok(())
    }

    async fn bind(&mut self, root: &Path) -> Result<()> {
        self.metadata.open(&root.join(META_DIR))?;
        self.files.open(root.join(PHOTOS_DIR)).await?;
        Ok(())
    }

    /// Close both collaborators. Closing a closed repository does nothing.
    pub fn close(&mut self) {
        self.metadata.close();
        self.files.close();
        if let Some(root) = self.root.take() {
            info!(root = %root.display(), "Repository closed");
        }
    }

    pub fn is_opened(&self) -> bool {
        self.metadata.is_opened() && self.files.is_opened()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn ensure_opened(&self) -> Result<()> {
        if self.is_opened() {
            Ok(())
        } else {
            Err(Error::NotOpened("repository"))
        }
    }

    pub fn metadata(&self) -> Result<&dyn MetadataStore> {
        self.ensure_opened()?;
        Ok(self.metadata.as_ref())
    }

    pub fn files(&self) -> Result<&FileManager> {
        self.ensure_opened()?;
        Ok(&self.files)
    }

    /// Field source reading CONTENT from this repository's file manager
    pub fn fields(&self) -> Result<RepositoryFields<'_>> {
        Ok(RepositoryFields { files: self.files()? })
    }
}

/// PROPERTY and CONTENT fields of photos stored in a repository
#[derive(Debug, Clone, Copy)]
pub struct RepositoryFields<'a> {
    files: &'a FileManager,
}

#[async_trait]
impl<'a> FieldSource for RepositoryFields<'a> {
    async fn property(&self, photo: &PhotoInfo, name: &str) -> Result<Option<String>> {
        Ok(record_property(photo, name))
    }

    async fn content(&self, photo: &PhotoInfo) -> Result<Vec<u8>> {
        let chain = ExtensionChain::new(photo.original_extension())?;
        self.files.get(&photo.id, &chain).await
    }
}
