//! Change classification kinds

/// How the working tree differs from the index at one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WorkspaceChange {
    #[default]
    None,
    /// Present on disk, absent from the index
    Untracked,
    /// Content or mode differs from the staged entry
    Modified,
    /// Staged entry whose file is gone
    Removed,
}

/// How the index differs from the HEAD tree at one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IndexChange {
    #[default]
    None,
    /// Staged, absent from HEAD
    Added,
    /// Staged with different content or mode than HEAD
    Modified,
    /// In HEAD, no longer staged
    Removed,
}

/// Final per-path classification reported by status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileStatus {
    Modified,
    Removed,
    Untracked,
    StagedAdded,
    StagedModified,
    StagedRemoved,
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
            FileStatus::Untracked => "untracked",
            FileStatus::StagedAdded => "staged_added",
            FileStatus::StagedModified => "staged_modified",
            FileStatus::StagedRemoved => "staged_removed",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
