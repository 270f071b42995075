//! Change detection logic
//!
//! Compares one path at a time across working tree, index, and HEAD
//! tree. The workspace comparison takes the stat fast path first:
//! when every recorded stat field still matches, the file cannot have
//! changed and no hashing happens. Only a stat mismatch with matching
//! size/mode falls through to rehashing the file content.

use crate::areas::database::Database;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::status::file_change::{IndexChange, WorkspaceChange};
use derive_new::new;

/// Stat-then-hash comparison over one repository's areas
#[derive(new)]
pub struct Inspector<'r> {
    database: &'r Database,
    workspace: &'r Workspace,
}

impl Inspector<'_> {
    fn is_content_changed(&self, entry: &IndexEntry) -> anyhow::Result<bool> {
        let file_path = self.workspace.path().join(&entry.name);
        let oid = self.database.hash_file(&file_path)?;
        Ok(oid != entry.oid)
    }

    /// Classify an index entry against the file (if any) at its path
    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> anyhow::Result<WorkspaceChange> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChange::Untracked),
            (Some(_), None) => Ok(WorkspaceChange::Removed),
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChange::Modified)
            }
            (Some(entry), Some(stat)) if entry.times_match(stat) && entry.inode_match(stat) => {
                Ok(WorkspaceChange::None)
            }
            (Some(entry), Some(_)) if self.is_content_changed(entry)? => {
                Ok(WorkspaceChange::Modified)
            }
            _ => Ok(WorkspaceChange::None),
        }
    }

    /// Classify an index entry against the HEAD tree row at its path
    pub fn check_index_against_head_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        head_entry: Option<&DatabaseEntry>,
    ) -> IndexChange {
        match (index_entry, head_entry) {
            (Some(index_entry), Some(head_entry))
                if head_entry.mode != index_entry.metadata.mode
                    || head_entry.oid != index_entry.oid =>
            {
                IndexChange::Modified
            }
            (Some(_), None) => IndexChange::Added,
            (None, Some(_)) => IndexChange::Removed,
            _ => IndexChange::None,
        }
    }
}
