//! Repository facade
//!
//! Coordinates the four areas (database, index, refs, workspace) into
//! the whole-repository operations: init, staging, committing, and
//! status. The facade owns its areas; the file handles inside them
//! are seek-stateful, so a repository value is single-owner.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::{RefValue, Refs};
use crate::areas::workspace::Workspace;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::status::status_info::{StatusEntry, StatusReport};
use crate::error::Error;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repository metadata directory name
const GIT_DIR: &str = ".git";

/// Object database directory name
const DATABASE_DIR: &str = "objects";

/// Index file name
const INDEX_FILE: &str = "index";

/// Branch the fresh HEAD points at
const DEFAULT_BRANCH: &str = "master";

/// A repository and its coordinated areas
#[derive(Debug)]
pub struct Repository {
    /// Repository root (the working tree)
    path: Box<Path>,
    database: Database,
    index: Index,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    /// Open an existing repository rooted at `path`
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("unable to open repository at {}", path.display()))?;
        let git_dir = path.join(GIT_DIR);

        Ok(Repository {
            database: Database::new(git_dir.join(DATABASE_DIR).into_boxed_path()),
            index: Index::new(git_dir.join(INDEX_FILE).into_boxed_path()),
            workspace: Workspace::new(path.clone().into_boxed_path()),
            refs: Refs::new(git_dir.into_boxed_path()),
            path: path.into_boxed_path(),
        })
    }

    /// Create the repository skeleton at `path` and open it
    ///
    /// Lays out `.git/` with `HEAD` pointing at the default branch,
    /// an empty object database, and `refs/heads/`. Re-initializing
    /// an existing repository leaves its contents alone.
    pub fn init(path: &Path) -> anyhow::Result<Self> {
        let git_dir = path.join(GIT_DIR);

        std::fs::create_dir_all(git_dir.join(DATABASE_DIR))
            .with_context(|| format!("unable to create {}", git_dir.display()))?;
        std::fs::create_dir_all(git_dir.join("refs").join("heads"))?;

        let head_path = git_dir.join("HEAD");
        if !head_path.exists() {
            std::fs::write(&head_path, format!("ref: refs/heads/{DEFAULT_BRANCH}\n"))?;
        }

        debug!(path = %path.display(), "initialized repository");
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    /// Stage files or directory trees, then persist the index
    pub fn add<P: AsRef<Path>>(&mut self, paths: &[P]) -> anyhow::Result<()> {
        self.index.rehydrate()?;

        for path in paths {
            let relative = path.as_ref();
            let absolute = self.path.join(relative);

            if absolute.is_dir() {
                self.stage_tree(relative)?;
            } else {
                self.stage_file(relative.to_path_buf())?;
            }
        }

        self.index.write_updates()
    }

    /// Stage every regular file and symlink under a directory
    pub fn add_tree(&mut self, dir: &Path) -> anyhow::Result<()> {
        self.index.rehydrate()?;
        self.stage_tree(dir)?;
        self.index.write_updates()
    }

    fn stage_tree(&mut self, dir: &Path) -> anyhow::Result<()> {
        let files = self.workspace.list_files(Some(dir))?;
        for file in files {
            self.stage_file(file)?;
        }
        Ok(())
    }

    fn stage_file(&mut self, relative: PathBuf) -> anyhow::Result<()> {
        let Some(metadata) = self.workspace.stat_file(&relative)? else {
            // a vanished path has nothing to stage
            return Ok(());
        };

        let content = self.workspace.read_file(&relative)?;
        let oid = self.database.store_bytes(ObjectType::Blob, &content)?;

        self.index
            .add(IndexEntry::create(relative, oid, metadata))
    }

    /// Unstage one path (or tracked directory), then persist the index
    pub fn remove(&mut self, path: &Path) -> anyhow::Result<()> {
        self.index.rehydrate()?;
        self.index.remove(path)?;
        self.index.write_updates()
    }

    /// Persist the staged tree, returning the root tree name
    pub fn write_index_tree(&mut self) -> anyhow::Result<ObjectId> {
        self.index.rehydrate()?;
        let tree = Tree::build(self.index.entries())?;
        self.database.write_tree(&tree)
    }

    /// Record a commit from the staged tree and advance HEAD
    ///
    /// The parent is whatever HEAD resolves to (absent for a root
    /// commit). With a detached HEAD the new commit's name is written
    /// straight back into `HEAD`; otherwise the current branch ref
    /// advances.
    pub fn commit(&mut self, message: &str, author: Author) -> anyhow::Result<ObjectId> {
        self.index.rehydrate()?;
        if self.index.is_empty() {
            return Err(Error::InvalidInput("nothing staged to commit".into()).into());
        }

        let tree = Tree::build(self.index.entries())?;
        let tree_oid = self.database.write_tree(&tree)?;

        let parents: Vec<ObjectId> = self.refs.read_head()?.into_iter().collect();
        let commit = Commit::new(parents, tree_oid, author.clone(), author, message.to_string());
        let commit_oid = self.database.store(&commit)?;

        self.refs.update_head(commit_oid)?;

        debug!(oid = %commit_oid, tree = %tree_oid, "recorded commit");
        Ok(commit_oid)
    }

    /// Point HEAD at a branch (symbolic) or directly at an object
    pub fn set_head(&self, target: &RefValue) -> anyhow::Result<()> {
        self.refs.update("HEAD", target)
    }

    /// Classify every path across HEAD tree, index, and working tree
    pub fn status(&mut self) -> anyhow::Result<Vec<StatusEntry>> {
        self.index.rehydrate()?;
        StatusReport::compute(&self.database, &self.workspace, &self.refs, &self.index)
    }
}
