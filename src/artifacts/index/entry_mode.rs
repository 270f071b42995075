//! Entry modes
//!
//! The mode word stored in trees and index entries: bits 12-15 carry
//! the object kind, bits 0-8 the unix permissions. Only the five
//! combinations Git actually writes are representable.

use crate::error::Error;

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd)]
pub enum EntryMode {
    /// Regular file, mode 100644
    #[default]
    Regular,
    /// Executable file, mode 100755
    Executable,
    /// Symbolic link, mode 120000
    Symlink,
    /// Commit reference (submodule), mode 160000
    Gitlink,
    /// Sub-tree, mode 40000
    Tree,
}

impl EntryMode {
    /// Octal text form as written in tree rows
    pub fn as_octal_str(&self) -> &str {
        match self {
            EntryMode::Regular => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Gitlink => "160000",
            EntryMode::Tree => "40000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::Regular => 0o100644,
            EntryMode::Executable => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Gitlink => 0o160000,
            EntryMode::Tree => 0o40000,
        }
    }

    pub fn from_u32(mode: u32) -> anyhow::Result<Self> {
        match mode {
            0o100644 => Ok(EntryMode::Regular),
            0o100755 => Ok(EntryMode::Executable),
            0o120000 => Ok(EntryMode::Symlink),
            0o160000 => Ok(EntryMode::Gitlink),
            0o40000 => Ok(EntryMode::Tree),
            _ => Err(Error::Corrupt(format!("entry mode {mode:o}")).into()),
        }
    }

    /// Parse the octal text form found in tree rows
    pub fn from_octal_str(mode: &str) -> anyhow::Result<Self> {
        let value = u32::from_str_radix(mode, 8)
            .map_err(|_| Error::Corrupt(format!("entry mode text {mode:?}")))?;
        Self::from_u32(value)
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Tree)
    }
}
