//! Sharded blob store bound to one root directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::address::{encode_id, relative_path, shard_dirs, variant_of, ExtensionChain};
use crate::error::{Error, Result};

const COMPONENT: &str = "file manager";

/// Upload attempts before a vanishing shard directory is reported
const STAGING_ATTEMPTS: usize = 16;

/// Stores binary variants of photos under `<root>/<s1>/<s2>/<enc><chain>`.
///
/// `open` and `close` take `&mut self`; blob operations take `&self` and may
/// run concurrently for distinct ids. Two writers of the same (id, chain)
/// key race with last-writer-wins: each writes a private temporary file and
/// renames it into place.
#[derive(Debug, Default)]
pub struct FileManager {
    root: Option<PathBuf>,
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `root`, creating it if needed. Re-opening the bound root is a
    /// no-op; opening another root closes the current binding first.
    pub async fn open(&mut self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        if self.root.as_deref() == Some(root) {
            return Ok(());
        }
        self.close();

        fs::create_dir_all(root).await?;
        info!(root = %root.display(), "File manager opened");
        self.root = Some(root.to_path_buf());
        Ok(())
    }

    /// Unbind. Closing a closed manager does nothing.
    pub fn close(&mut self) {
        if let Some(root) = self.root.take() {
            info!(root = %root.display(), "File manager closed");
        }
    }

    pub fn is_opened(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn bound_root(&self) -> Result<&Path> {
        self.root.as_deref().ok_or(Error::NotOpened(COMPONENT))
    }

    /// Absolute path of a variant. Never touches the filesystem.
    pub fn path(&self, id: &str, chain: &ExtensionChain) -> Result<PathBuf> {
        Ok(self.bound_root()?.join(relative_path(id, chain)?))
    }

    /// Store `blob`, replacing any existing variant with the same key
    pub async fn upload(&self, blob: &[u8], id: &str, chain: &ExtensionChain) -> Result<PathBuf> {
        let target = self.path(id, chain)?;
        let dir = match target.parent() {
            Some(dir) => dir.to_path_buf(),
            None => return Err(Error::validation(format!("no shard directory for {}", id))),
        };

        let mut attempt = 1;
        loop {
            match stage_and_rename(blob, &dir, &target).await {
                Ok(()) => break,
                // shard directory pruned by a concurrent delete of a neighbour
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < STAGING_ATTEMPTS => {
                    debug!(id, attempt, "Shard directory vanished, retrying upload");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(id, chain = %chain, bytes = blob.len(), "Blob stored");
        Ok(target)
    }

    /// Exact bytes of a variant
    pub async fn get(&self, id: &str, chain: &ExtensionChain) -> Result<Vec<u8>> {
        let path = self.path(id, chain)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("photo {} variant '{}'", id, chain)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, id: &str, chain: &ExtensionChain) -> Result<bool> {
        Ok(fs::try_exists(self.path(id, chain)?).await?)
    }

    /// Remove one variant. Returns whether it existed.
    pub async fn delete(&self, id: &str, chain: &ExtensionChain) -> Result<bool> {
        let path = self.path(id, chain)?;
        let removed = remove_if_present(&path).await?;
        if removed {
            debug!(id, chain = %chain, "Blob deleted");
            self.prune_shards(id).await?;
        }
        Ok(removed)
    }

    /// Remove every variant of `id`. Returns how many were removed.
    pub async fn delete_all(&self, id: &str) -> Result<usize> {
        let chains = self.variants(id).await?;
        let mut removed = 0;
        for chain in &chains {
            if remove_if_present(&self.path(id, chain)?).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            self.prune_shards(id).await?;
        }
        debug!(id, removed, "Variants deleted");
        Ok(removed)
    }

    /// Extension chains stored for `id`, sorted
    pub async fn variants(&self, id: &str) -> Result<Vec<ExtensionChain>> {
        let encoded = encode_id(id)?;
        let dir = self.bound_root()?.join(shard_dirs(&encoded));

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chains = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(chain) = entry.file_name().to_str().and_then(|n| variant_of(n, &encoded)) {
                chains.push(chain);
            }
        }

        chains.sort();
        Ok(chains)
    }

    /// Remove the shard directories of `id` once they are empty
    async fn prune_shards(&self, id: &str) -> Result<()> {
        let root = self.bound_root()?;
        let inner = root.join(shard_dirs(&encode_id(id)?));

        for dir in [inner.as_path(), inner.parent().unwrap_or(root)] {
            if dir == root {
                break;
            }
            // still holds other ids, or already gone
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Write `blob` to a private file in `dir`, then rename it onto `target`
async fn stage_and_rename(blob: &[u8], dir: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;

    let staging = dir.join(format!(".tmp-{}", Uuid::new_v4().simple()));
    if let Err(e) = fs::write(&staging, blob).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&staging, target).await {
        warn!(path = %staging.display(), error = %e, "Rename failed, discarding staged blob");
        let _ = fs::remove_file(&staging).await;
        return Err(e);
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
