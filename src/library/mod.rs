//! Photo library use cases over an open repository.
//!
//! Import, delete, get, classify, reorder and export. Each use case exists
//! as distinctly named single / batch / explicit-id operations.

pub mod export;
pub mod import;

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::engine::{PipelineEngine, PipelineOutput};
use crate::core::evaluator::Evaluator;
use crate::core::limits::EvaluationLimits;
use crate::domain::classification::ClassificationResult;
use crate::domain::photo::PhotoInfo;
use crate::domain::policy::{Policies, ReorderItem};
use crate::error::{Error, Result};
use crate::files::{encode_id, strip_separators, ExtensionChain};
use crate::repository::Repository;

pub use export::{sanitize_label, ExportOptions, ExportReport};
pub use import::PhotoImport;

/// Tree and label paths of a classification request
pub type ClassificationOutcome = PipelineOutput;

/// Use cases bound to one open repository
#[derive(Debug)]
pub struct PhotoLibrary {
    repository: Repository,
    engine: PipelineEngine,
}

impl PhotoLibrary {
    /// Wrap an open repository
    pub fn new(repository: Repository, evaluator: Evaluator) -> Result<Self> {
        if !repository.is_opened() {
            return Err(Error::NotOpened("repository"));
        }
        Ok(Self {
            repository,
            engine: PipelineEngine::new(evaluator),
        })
    }

    /// Open the repository at `root`
    pub async fn open(root: impl AsRef<Path>, limits: EvaluationLimits) -> Result<Self> {
        let repository = Repository::open_at(root).await?;
        Self::new(repository, Evaluator::new(limits))
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn evaluator(&self) -> &Evaluator {
        self.engine.evaluator()
    }

    /// Close the repository and hand it back
    pub fn close(mut self) -> Repository {
        self.repository.close();
        self.repository
    }

    /// Import one photo under a fresh id
    pub async fn import_photo(&self, photo: PhotoImport) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.import_photo_with_id(photo, &id).await?;
        Ok(id)
    }

    /// Import several photos; stops at the first failure, keeping the
    /// photos imported before it
    pub async fn import_photos(&self, photos: Vec<PhotoImport>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(photos.len());
        for photo in photos {
            ids.push(self.import_photo(photo).await?);
        }
        info!(count = ids.len(), "Photos imported");
        Ok(ids)
    }

    /// Import one photo under a caller-chosen id; `AlreadyExists` if the
    /// id, or another id with the same storage key ("ab-cd" / "abcd"), is
    /// taken
    #[instrument(skip(self, photo), fields(file_name = %photo.file_name))]
    pub async fn import_photo_with_id(&self, photo: PhotoImport, id: &str) -> Result<()> {
        encode_id(id)?;
        let metadata = self.repository.metadata()?;
        let files = self.repository.files()?;
        if metadata.contains(id)? {
            return Err(Error::AlreadyExists(format!("photo {}", id)));
        }
        if !files.variants(id).await?.is_empty() {
            return Err(Error::AlreadyExists(format!(
                "storage key {} of photo {}",
                strip_separators(id),
                id
            )));
        }

        let record = photo.record(id);
        let chain = ExtensionChain::new(record.original_extension())?;
        files.upload(&photo.content, id, &chain).await?;

        if let Err(e) = metadata.insert(&record) {
            warn!(id, error = %e, "Metadata insert failed, removing uploaded file");
            if let Err(cleanup) = files.delete(id, &chain).await {
                warn!(id, error = %cleanup, "Could not remove uploaded file");
            }
            return Err(e);
        }

        info!(id, "Photo imported");
        Ok(())
    }

    /// Remove a photo's record and every stored variant. Returns whether
    /// the record existed.
    #[instrument(skip(self))]
    pub async fn delete_photo(&self, id: &str) -> Result<bool> {
        let existed = self.repository.metadata()?.delete(id)?;
        let variants = self.repository.files()?.delete_all(id).await?;
        info!(existed, variants, "Photo deleted");
        Ok(existed)
    }

    /// Original bytes of a photo
    pub async fn get_photo(&self, id: &str) -> Result<Vec<u8>> {
        let record = self.repository.metadata()?.query(id)?;
        let chain = ExtensionChain::new(record.original_extension())?;
        self.repository.files()?.get(id, &chain).await
    }

    pub fn photo_info(&self, id: &str) -> Result<PhotoInfo> {
        self.repository.metadata()?.query(id)
    }

    /// Every record in import order
    pub fn list_photos(&self) -> Result<Vec<PhotoInfo>> {
        self.repository.metadata()?.query_all()
    }

    pub fn policies(&self) -> Result<Policies> {
        self.repository.metadata()?.get_policies()
    }

    pub fn set_policies(&self, policies: &Policies) -> Result<()> {
        self.repository.metadata()?.set_policies(policies)?;
        info!(levels = policies.depth(), "Policies updated");
        Ok(())
    }

    /// Label path of one photo
    pub async fn classify_photo(&self, id: &str) -> Result<ClassificationResult> {
        let outcome = self.classify_photos(&[id.to_string()]).await?;
        outcome
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("classification of photo {}", id)))
    }

    /// Classify a subset of photos. Repeated ids are classified once.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn classify_photos(&self, ids: &[String]) -> Result<ClassificationOutcome> {
        let metadata = self.repository.metadata()?;
        let mut seen = HashSet::new();
        let mut photos = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.insert(id.as_str()) {
                photos.push(metadata.query(id)?);
            }
        }
        self.classify(&photos).await
    }

    /// Classify every photo in the repository
    #[instrument(skip_all)]
    pub async fn classify_all(&self) -> Result<ClassificationOutcome> {
        let photos = self.list_photos()?;
        self.classify(&photos).await
    }

    async fn classify(&self, photos: &[PhotoInfo]) -> Result<ClassificationOutcome> {
        let policies = self.policies()?;
        let fields = self.repository.fields()?;
        self.engine.run(&policies, photos, &fields).await
    }

    /// Order items with the stored trailing reorder policy
    pub fn reorder(&self, items: &[ReorderItem]) -> Result<Vec<ReorderItem>> {
        self.policies()?
            .trailing_reorder()
            .evaluate(self.engine.evaluator(), items)
    }
}
