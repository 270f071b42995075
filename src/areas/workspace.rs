//! Working tree access
//!
//! File system operations against the checked-out tree: listing
//! candidate files (never descending into `.git`), reading file
//! content for hashing, and capturing the stat metadata the index
//! records per entry.

use crate::artifacts::index::index_entry::EntryMetadata;
use crate::error::Error;
use anyhow::Context;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_COMPONENTS: [&str; 3] = [".git", ".", ".."];

/// Working tree rooted at the repository directory
#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_ignored(path: &Path) -> bool {
        path.components().any(|component| {
            matches!(
                component,
                Component::Normal(name)
                    if IGNORED_COMPONENTS.contains(&name.to_string_lossy().as_ref())
            )
        })
    }

    /// List regular files and symlinks under `root` (the whole tree
    /// when `None`), as sorted repository-relative paths
    pub fn list_files(&self, root: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let root_path = match root {
            Some(relative) => self.path.join(relative),
            None => self.path.to_path_buf(),
        };

        if !root_path.exists() {
            return Err(Error::NotFound(format!("{}", root_path.display())).into());
        }

        if !root_path.is_dir() {
            let relative = root_path
                .strip_prefix(self.path.as_ref())
                .map(PathBuf::from)
                .unwrap_or_default();
            return Ok(vec![relative]);
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&root_path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file() || entry.file_type().is_symlink()
            })
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(self.path.as_ref()).ok()?;
                if Self::is_ignored(relative) {
                    None
                } else {
                    Some(relative.to_path_buf())
                }
            })
            .collect();

        files.sort();
        Ok(files)
    }

    /// Read a file's blob content
    ///
    /// For a symlink the blob content is the link target, matching
    /// how symlinks are stored.
    pub fn read_file(&self, relative: &Path) -> anyhow::Result<Bytes> {
        let file_path = self.path.join(relative);

        let metadata = std::fs::symlink_metadata(&file_path)
            .with_context(|| format!("unable to stat {}", file_path.display()))?;
        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&file_path)?;
            return Ok(Bytes::from(
                target.as_os_str().to_string_lossy().into_owned().into_bytes(),
            ));
        }

        let content = std::fs::read(&file_path)
            .with_context(|| format!("unable to read {}", file_path.display()))?;
        Ok(Bytes::from(content))
    }

    /// Capture the stat metadata for one file; `None` when missing
    pub fn stat_file(&self, relative: &Path) -> anyhow::Result<Option<EntryMetadata>> {
        let file_path = self.path.join(relative);

        match std::fs::symlink_metadata(&file_path) {
            Ok(metadata) => {
                let entry_metadata = (file_path.as_path(), metadata).try_into()?;
                Ok(Some(entry_metadata))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
