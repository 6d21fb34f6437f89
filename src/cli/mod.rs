//! Command-line interface for phototree.
//!
//! Provides commands for importing and deleting photos, classifying them
//! with the stored policies, exporting the result and managing policies.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config;
use crate::domain::{CanonicalForm, ClassificationGroup, Policies};
use crate::files::{relative_path, ExtensionChain};
use crate::library::{ExportOptions, PhotoImport, PhotoLibrary};
use crate::repository::PHOTOS_DIR;

/// phototree - Policy-driven photo classification
#[derive(Parser, Debug)]
#[command(name = "phototree")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository root (overrides the config file)
    #[arg(long, global = true, env = "PHOTOTREE_REPOSITORY")]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import photo files
    Import {
        /// Files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Import a single file under this id
        #[arg(long)]
        id: Option<String>,
    },

    /// List imported photos
    List,

    /// Delete a photo and all its stored variants
    Delete {
        /// Photo ID
        id: String,
    },

    /// Classify photos with the stored policies
    Classify {
        /// Photo IDs (all photos if none given)
        ids: Vec<String>,

        /// Print the tree and results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the classification tree and photos to a directory
    Export {
        /// Destination directory
        dest: PathBuf,

        /// Skip manifest.json
        #[arg(long)]
        no_manifest: bool,

        /// Skip copying photos
        #[arg(long)]
        no_photos: bool,
    },

    /// Show or replace the stored policies
    Policies {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Print the storage path of a photo variant
    Path {
        /// Photo ID
        id: String,

        /// Extension chain, e.g. ".jpg" or ".raw.thumbnail.jpg"
        #[arg(long, default_value = "")]
        ext: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Print the stored policies as JSON
    Show,

    /// Validate and store policies from a JSON file
    Set {
        /// Policies document
        file: PathBuf,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let repo = self.repo;
        match self.command {
            Commands::Import { files, id } => import_photos(repo, files, id).await,
            Commands::List => list_photos(repo).await,
            Commands::Delete { id } => delete_photo(repo, &id).await,
            Commands::Classify { ids, json } => classify(repo, ids, json).await,
            Commands::Export {
                dest,
                no_manifest,
                no_photos,
            } => {
                let options = ExportOptions {
                    manifest: !no_manifest,
                    photos: !no_photos,
                };
                export(repo, &dest, options).await
            }
            Commands::Policies { command } => match command {
                PolicyCommands::Show => show_policies(repo).await,
                PolicyCommands::Set { file } => set_policies(repo, &file).await,
            },
            Commands::Path { id, ext } => show_path(repo, &id, &ext),
            Commands::Config => show_config(),
        }
    }
}

fn repository_root(repo: Option<PathBuf>) -> Result<PathBuf> {
    match repo {
        Some(root) => Ok(root),
        None => config::repository_dir(),
    }
}

async fn open_library(repo: Option<PathBuf>) -> Result<PhotoLibrary> {
    let root = repository_root(repo)?;
    let limits = config::evaluation_limits()?;
    PhotoLibrary::open(&root, limits)
        .await
        .with_context(|| format!("Failed to open repository: {}", root.display()))
}

/// Import one or more files
async fn import_photos(repo: Option<PathBuf>, files: Vec<PathBuf>, id: Option<String>) -> Result<()> {
    let library = open_library(repo).await?;

    if let Some(id) = id {
        if files.len() != 1 {
            anyhow::bail!("--id requires exactly one file, got {}", files.len());
        }
        let photo = PhotoImport::from_path(&files[0])
            .await
            .with_context(|| format!("Failed to read {}", files[0].display()))?;
        library.import_photo_with_id(photo, &id).await?;
        println!("{}  {}", id, files[0].display());
        return Ok(());
    }

    let mut imports = Vec::with_capacity(files.len());
    for path in &files {
        imports.push(
            PhotoImport::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    let ids = library.import_photos(imports).await?;
    for (id, path) in ids.iter().zip(&files) {
        println!("{}  {}", id, path.display());
    }
    Ok(())
}

async fn list_photos(repo: Option<PathBuf>) -> Result<()> {
    let library = open_library(repo).await?;
    let photos = library.list_photos()?;

    if photos.is_empty() {
        println!("No photos found");
        return Ok(());
    }

    println!("{:<34} {:<30} {:<6}", "PHOTO ID", "FILE NAME", "EXIF");
    println!("{}", "-".repeat(72));

    for photo in photos {
        println!(
            "{:<34} {:<30} {:<6}",
            photo.id,
            photo.file_name,
            photo.exif_info.tags().len()
        );
    }

    Ok(())
}

async fn delete_photo(repo: Option<PathBuf>, id: &str) -> Result<()> {
    let library = open_library(repo).await?;
    if library.delete_photo(id).await? {
        println!("Deleted {}", id);
    } else {
        println!("No photo {}", id);
    }
    Ok(())
}

async fn classify(repo: Option<PathBuf>, ids: Vec<String>, json: bool) -> Result<()> {
    let library = open_library(repo).await?;
    let outcome = if ids.is_empty() {
        library.classify_all().await?
    } else {
        library.classify_photos(&ids).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.tree.is_empty() {
        println!("No photos to classify");
        return Ok(());
    }

    let names = library
        .list_photos()?
        .into_iter()
        .map(|p| (p.id, p.file_name))
        .collect();
    print_group(&outcome.tree.root, 0, &names);
    Ok(())
}

fn print_group(
    group: &ClassificationGroup,
    depth: usize,
    names: &std::collections::HashMap<String, String>,
) {
    let indent = "  ".repeat(depth);
    if depth > 0 {
        println!("{}{:?} ({})", indent, group.label, group.photo_count());
    }
    for child in &group.children {
        print_group(child, depth + 1, names);
    }
    for id in &group.photo_ids {
        let name = names.get(id).map(String::as_str).unwrap_or("?");
        println!("{}  {}  {}", indent, name, id);
    }
}

async fn export(repo: Option<PathBuf>, dest: &Path, options: ExportOptions) -> Result<()> {
    let library = open_library(repo).await?;
    let report = library
        .export(dest, options)
        .await
        .with_context(|| format!("Export to {} failed", dest.display()))?;

    println!("Exported to {}", report.dest.display());
    if let Some(manifest) = report.manifest {
        println!("  Manifest: {}", manifest.display());
    }
    println!("  Photos:   {}", report.photos_copied);
    Ok(())
}

async fn show_policies(repo: Option<PathBuf>) -> Result<()> {
    let library = open_library(repo).await?;
    let policies = library.policies()?;
    println!("{}", serde_json::to_string_pretty(&policies)?);
    Ok(())
}

async fn set_policies(repo: Option<PathBuf>, file: &Path) -> Result<()> {
    let document = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read policies file: {}", file.display()))?;
    let policies = Policies::from_canonical_form(&document)
        .with_context(|| format!("Invalid policies in {}", file.display()))?;

    let library = open_library(repo).await?;
    library.set_policies(&policies)?;
    println!("Stored {} classification level(s)", policies.depth());
    Ok(())
}

/// Print a variant path; does not need an open repository
fn show_path(repo: Option<PathBuf>, id: &str, ext: &str) -> Result<()> {
    let root = repository_root(repo)?;
    let chain = ExtensionChain::new(ext)?;
    let path = root.join(PHOTOS_DIR).join(relative_path(id, &chain)?);
    println!("{}", path.display());
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("phototree configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Repository: {}", cfg.repository.display());
    println!();
    println!("Evaluation limits:");
    println!("  Timeout:          {}ms", cfg.limits.timeout_ms);
    println!("  Max operations:   {}", cfg.limits.max_operations);
    println!("  Max call levels:  {}", cfg.limits.max_call_levels);
    println!("  Max string size:  {} bytes", cfg.limits.max_string_size);
    println!("  Max array size:   {}", cfg.limits.max_array_size);

    Ok(())
}
