//! Tree row as stored in the object database
//!
//! A database entry is one row of a tree object: the referenced object
//! name plus the entry mode. Used when traversing trees during status,
//! path lookup, and walks.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use derive_new::new;

/// One `(mode, object name)` row of a tree object
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct DatabaseEntry {
    /// Name of the referenced object
    pub oid: ObjectId,
    /// Entry mode (type and permissions)
    pub mode: EntryMode,
}

impl DatabaseEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}
