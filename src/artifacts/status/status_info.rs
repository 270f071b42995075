//! Status report assembly
//!
//! Gathers the three independent comparisons (index vs working tree,
//! working tree vs index for untracked files, HEAD tree vs index)
//! into one path-sorted list.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{FileStatus, IndexChange, WorkspaceChange};
use crate::artifacts::status::inspector::Inspector;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// One classified path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusEntry {
    pub path: PathBuf,
    pub status: FileStatus,
    /// The object name backing the classification: the staged blob
    /// for index-side statuses, the HEAD row for `staged_removed`,
    /// absent for untracked files
    pub oid: Option<ObjectId>,
}

/// Three-way diff of HEAD tree, index, and working tree
pub struct StatusReport;

impl StatusReport {
    /// Compute the sorted status list
    ///
    /// The index must already be rehydrated. Two runs with no
    /// intervening changes produce identical output.
    pub fn compute(
        database: &Database,
        workspace: &Workspace,
        refs: &Refs,
        index: &Index,
    ) -> anyhow::Result<Vec<StatusEntry>> {
        let inspector = Inspector::new(database, workspace);
        let mut report = Vec::new();

        // rows of the HEAD tree, keyed by repo-relative path
        let head_entries = Self::head_tree_entries(database, refs)?;

        // pass 1: each index entry against the file at its path
        for entry in index.entries() {
            let stat = workspace.stat_file(&entry.name)?;
            match inspector.check_index_against_workspace(Some(entry), stat.as_ref())? {
                WorkspaceChange::Modified => report.push(StatusEntry {
                    path: entry.name.clone(),
                    status: FileStatus::Modified,
                    oid: Some(entry.oid),
                }),
                WorkspaceChange::Removed => report.push(StatusEntry {
                    path: entry.name.clone(),
                    status: FileStatus::Removed,
                    oid: Some(entry.oid),
                }),
                WorkspaceChange::Untracked | WorkspaceChange::None => {}
            }
        }

        // pass 2: working tree files the index does not know
        for path in workspace.list_files(None)? {
            if index.entry_by_path(&path).is_none() {
                report.push(StatusEntry {
                    path,
                    status: FileStatus::Untracked,
                    oid: None,
                });
            }
        }

        // pass 3: HEAD tree against the index, over the union of paths
        let mut staged_paths: BTreeSet<PathBuf> = head_entries.keys().cloned().collect();
        staged_paths.extend(index.entries().map(|entry| entry.name.clone()));

        for path in staged_paths {
            let index_entry = index.entry_by_path(&path);
            let head_entry = head_entries.get(&path);
            match inspector.check_index_against_head_tree(index_entry, head_entry) {
                IndexChange::Added => report.push(StatusEntry {
                    oid: index_entry.map(|entry| entry.oid),
                    path,
                    status: FileStatus::StagedAdded,
                }),
                IndexChange::Modified => report.push(StatusEntry {
                    oid: index_entry.map(|entry| entry.oid),
                    path,
                    status: FileStatus::StagedModified,
                }),
                IndexChange::Removed => report.push(StatusEntry {
                    oid: head_entry.map(|entry| entry.oid),
                    path,
                    status: FileStatus::StagedRemoved,
                }),
                IndexChange::None => {}
            }
        }

        report.sort();
        Ok(report)
    }

    /// Flatten the HEAD commit's tree; an unborn HEAD yields no rows
    fn head_tree_entries(
        database: &Database,
        refs: &Refs,
    ) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let mut entries = BTreeMap::new();

        let Some(head_oid) = refs.read_head()? else {
            return Ok(entries);
        };
        let Some(commit) = database.parse_object_as_commit(&head_oid)? else {
            return Ok(entries);
        };

        for walked in database.walk_tree(commit.tree_oid())? {
            let walked = walked?;
            entries.insert(walked.path, walked.entry);
        }

        Ok(entries)
    }
}
