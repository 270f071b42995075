//! Tree object
//!
//! Trees are content-addressed directory listings: ordered rows of
//! `(mode, name, object name)`. A row with tree mode references
//! another tree; every other row references a blob (or a gitlink).
//!
//! ## Format
//!
//! On disk, after the `tree <size>\0` frame, each row is
//! `"<octal_mode> <name>\0"` followed by the raw 20-byte object name.
//! Rows are sorted by name bytewise, with directory names ordered as
//! if they carried a trailing `/`.
//!
//! ## Building
//!
//! `Tree::build` folds a flat, path-sorted list of index entries into
//! a nested tree keyed by directory component; `traverse` visits the
//! nesting bottom-up so children are persisted (and named) before
//! their parents.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::error::Error;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Node of a tree under construction
#[derive(Debug, Clone)]
enum TreeNode {
    /// Leaf row referencing an already-stored blob
    Leaf(DatabaseEntry),
    /// Nested sub-tree
    Directory(Tree),
}

impl TreeNode {
    fn mode(&self) -> EntryMode {
        match self {
            TreeNode::Leaf(entry) => entry.mode,
            TreeNode::Directory(_) => EntryMode::Tree,
        }
    }

    fn oid(&self) -> anyhow::Result<ObjectId> {
        match self {
            TreeNode::Leaf(entry) => Ok(entry.oid),
            TreeNode::Directory(tree) => tree.object_id(),
        }
    }
}

/// Directory snapshot as a content-addressed object
///
/// A tree is either *read* (rows loaded from the database, kept in
/// file order) or *built* (nested nodes assembled from index entries).
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// Rows loaded from the database, in file order
    readable_entries: Vec<(String, DatabaseEntry)>,
    /// Nodes being assembled from the index, keyed by name
    /// (directories carry a trailing `/` so ordering matches the
    /// on-disk sort)
    writeable_entries: BTreeMap<String, TreeNode>,
}

impl Tree {
    /// Fold flat index entries into a nested tree
    ///
    /// Each entry's directory components are descended (creating
    /// sub-trees on demand) and the leaf is inserted at the innermost
    /// level.
    pub fn build<'e>(entries: impl Iterator<Item = &'e IndexEntry>) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for entry in entries {
            let parents = entry.parent_dirs();
            let leaf = DatabaseEntry::new(entry.oid, entry.metadata.mode);
            root.add_entry(&parents, entry.basename()?, leaf)?;
        }

        Ok(root)
    }

    fn add_entry(
        &mut self,
        parents: &[&Path],
        basename: &str,
        leaf: DatabaseEntry,
    ) -> anyhow::Result<()> {
        if parents.is_empty() {
            if self.writeable_entries.contains_key(&format!("{basename}/")) {
                return Err(Error::InvalidInput(format!(
                    "path component {basename:?} is both a file and a directory"
                ))
                .into());
            }
            self.writeable_entries
                .insert(basename.to_string(), TreeNode::Leaf(leaf));
            return Ok(());
        }

        let component = parents[0]
            .file_name()
            .and_then(|name| name.to_str())
            .context("invalid directory component")?;
        if self.writeable_entries.contains_key(component) {
            return Err(Error::InvalidInput(format!(
                "path component {component:?} is both a file and a directory"
            ))
            .into());
        }

        let subtree = match self
            .writeable_entries
            .entry(format!("{component}/"))
            .or_insert_with(|| TreeNode::Directory(Tree::default()))
        {
            TreeNode::Directory(tree) => tree,
            TreeNode::Leaf(_) => unreachable!("directory keys always map to directories"),
        };

        subtree.add_entry(&parents[1..], basename, leaf)
    }

    /// Visit nested trees bottom-up (children before parents)
    ///
    /// Persisting in this order guarantees every child's object name
    /// exists by the time its parent row is serialized.
    pub fn traverse<F>(&self, func: &F) -> anyhow::Result<()>
    where
        F: Fn(&Tree) -> anyhow::Result<()>,
    {
        for node in self.writeable_entries.values() {
            if let TreeNode::Directory(tree) = node {
                tree.traverse(func)?;
            }
        }
        func(self)
    }

    /// Rows of a tree loaded from the database
    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.readable_entries
            .iter()
            .map(|(name, entry)| (name, entry))
    }

    pub fn len(&self) -> usize {
        if self.writeable_entries.is_empty() {
            self.readable_entries.len()
        } else {
            self.writeable_entries.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a row by name
    pub fn entry_named(&self, name: &str) -> Option<&DatabaseEntry> {
        self.readable_entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, entry)| entry)
    }

    /// Serialize one row
    fn write_row(
        bytes: &mut Vec<u8>,
        mode: EntryMode,
        name: &str,
        oid: &ObjectId,
    ) -> anyhow::Result<()> {
        bytes.write_all(format!("{} {}", mode.as_octal_str(), name).as_bytes())?;
        bytes.push(0);
        oid.write_raw_to(bytes)?;
        Ok(())
    }

    fn content_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut content = Vec::new();

        if self.writeable_entries.is_empty() {
            // re-sort read rows so a parsed-then-written tree is
            // invariant under row permutation
            let mut rows: Vec<&(String, DatabaseEntry)> = self.readable_entries.iter().collect();
            rows.sort_by(|(a_name, a), (b_name, b)| {
                sort_key(a_name, a.is_tree()).cmp(&sort_key(b_name, b.is_tree()))
            });
            for (name, entry) in rows {
                Self::write_row(&mut content, entry.mode, name, &entry.oid)?;
            }
        } else {
            for (key, node) in &self.writeable_entries {
                let name = key.trim_end_matches('/');
                Self::write_row(&mut content, node.mode(), name, &node.oid()?)?;
            }
        }

        Ok(content)
    }
}

/// Bytewise sort key with the directory trailing-`/` rule
fn sort_key(name: &str, is_tree: bool) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    if is_tree {
        key.push(b'/');
    }
    key
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let content = self.content_bytes()?;

        let mut tree_bytes = Vec::with_capacity(content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = Vec::new();

        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let read = reader.read_until(b' ', &mut mode_bytes)?;
            if read == 0 {
                break; // clean EOF, no more rows
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(Error::Corrupt("tree row mode unterminated".into()).into());
            }
            let mode_str = std::str::from_utf8(&mode_bytes)
                .map_err(|_| Error::Corrupt("tree row mode is not ascii".into()))?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            let read = reader.read_until(b'\0', &mut name_bytes)?;
            if read == 0 || name_bytes.pop() != Some(b'\0') {
                return Err(Error::Corrupt("tree row name unterminated".into()).into());
            }
            let name = std::str::from_utf8(&name_bytes)
                .map_err(|_| Error::Corrupt("tree row name is not utf-8".into()))?
                .to_owned();

            let oid = ObjectId::read_raw_from(&mut reader)
                .map_err(|_| Error::Corrupt("tree row object name truncated".into()))?;

            entries.push((name, DatabaseEntry::new(oid, mode)));
        }

        Ok(Tree {
            readable_entries: entries,
            writeable_entries: BTreeMap::new(),
        })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}

/// Entry yielded by a tree walk: the full repo-relative path plus the
/// row it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub entry: DatabaseEntry,
}

/// One level of a depth-first tree walk
///
/// Frames hold only their local path component; full paths are
/// reassembled on each yield.
pub(crate) struct WalkFrame {
    pub(crate) component: Option<String>,
    pub(crate) rows: Vec<(String, DatabaseEntry)>,
    pub(crate) cursor: usize,
}

impl WalkFrame {
    pub(crate) fn from_tree(component: Option<String>, tree: &Tree) -> Self {
        WalkFrame {
            component,
            rows: tree.readable_entries.clone(),
            cursor: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn leaf(byte: u8) -> DatabaseEntry {
        DatabaseEntry::new(ObjectId::from_raw([byte; 20]), EntryMode::Regular)
    }

    fn read_back(tree: &Tree) -> Tree {
        let serialized = tree.serialize().unwrap();
        let payload_start = serialized.iter().position(|&b| b == 0).unwrap() + 1;
        Tree::deserialize(std::io::Cursor::new(serialized[payload_start..].to_vec())).unwrap()
    }

    #[test]
    fn rows_are_mode_name_nul_then_raw_oid() {
        let mut tree = Tree::default();
        tree.readable_entries
            .push(("a.txt".to_string(), leaf(0xAB)));

        let serialized = tree.serialize().unwrap();
        let expected_row = [b"100644 a.txt\0".as_ref(), &[0xAB; 20]].concat();
        assert!(serialized.ends_with(&expected_row));
    }

    #[test]
    fn files_sort_before_sibling_directories_with_shorter_names() {
        // "foo.txt" must precede the directory "foo" because the
        // directory sorts as "foo/"
        let mut tree = Tree::default();
        tree.readable_entries.push((
            "foo".to_string(),
            DatabaseEntry::new(ObjectId::from_raw([1; 20]), EntryMode::Tree),
        ));
        tree.readable_entries.push(("foo.txt".to_string(), leaf(2)));

        let parsed = read_back(&tree);
        let names: Vec<&String> = parsed.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["foo.txt", "foo"]);
    }

    #[test]
    fn build_nests_by_directory_component() {
        let entries = vec![
            IndexEntry::create(PathBuf::from("a/b/c.txt"), ObjectId::from_raw([3; 20]), Default::default()),
            IndexEntry::create(PathBuf::from("a/b/d.txt"), ObjectId::from_raw([4; 20]), Default::default()),
            IndexEntry::create(PathBuf::from("top.txt"), ObjectId::from_raw([5; 20]), Default::default()),
        ];

        let tree = Tree::build(entries.iter()).unwrap();
        assert_eq!(tree.writeable_entries.len(), 2);
        assert!(matches!(
            tree.writeable_entries.get("a/"),
            Some(TreeNode::Directory(_))
        ));
        assert!(matches!(
            tree.writeable_entries.get("top.txt"),
            Some(TreeNode::Leaf(_))
        ));
    }

    #[test]
    fn conflicting_file_and_directory_component_is_invalid() {
        let entries = vec![
            IndexEntry::create(PathBuf::from("a"), ObjectId::from_raw([6; 20]), Default::default()),
            IndexEntry::create(PathBuf::from("a/b.txt"), ObjectId::from_raw([7; 20]), Default::default()),
        ];

        let err = Tree::build(entries.iter()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidInput(_))
        ));
    }

    proptest! {
        #[test]
        fn serialization_is_invariant_under_row_permutation(
            names in proptest::collection::btree_set("[a-z]{1,8}", 1..8)
        ) {
            let names: Vec<String> = names.iter().cloned().collect();
            let rows: Vec<(String, DatabaseEntry)> = names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), leaf(i as u8)))
                .collect();

            let mut forward = Tree::default();
            forward.readable_entries = rows.clone();

            let mut reversed = Tree::default();
            reversed.readable_entries = rows.into_iter().rev().collect();

            prop_assert_eq!(
                forward.serialize().unwrap(),
                reversed.serialize().unwrap()
            );
        }
    }
}
