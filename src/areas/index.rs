//! Staging area (the binary index file)
//!
//! The index tracks which blobs compose the next commit, keyed by
//! repository-relative path. On disk it is the byte-precise format of
//! `artifacts::index`: a `DIRC` header, path-sorted 8-byte-aligned
//! entry records, and a SHA-1 trailer over everything before it.
//!
//! ## Data structures
//!
//! - `entries`: tracked files by path (the `BTreeMap` keeps the
//!   on-disk sort order for free)
//! - `children`: directory paths to the entries beneath them, for
//!   file/directory conflict handling and subtree removal

use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{EntryFlags, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{
    CHECKSUM_SIZE, DEFAULT_VERSION, ENTRY_BLOCK, ENTRY_PREFIX_SIZE, HEADER_SIZE, MAX_VERSION,
    SIGNATURE,
};
use crate::error::Error;
use byteorder::ByteOrder;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::ops::DerefMut;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// In-memory staging area bound to an index file
#[derive(Debug)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    /// Tracked files by repository-relative path
    entries: BTreeMap<PathBuf, IndexEntry>,
    /// Directory paths to the tracked paths beneath them
    children: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    header: IndexHeader,
    /// Set when the in-memory state has diverged from disk
    changed: bool,
}

/// True when any normal component of the path is `.git`
fn has_git_component(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(component, Component::Normal(name) if name.eq_ignore_ascii_case(".git"))
    })
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::empty(DEFAULT_VERSION),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.header.version()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// True when the path is a tracked file or a directory with
    /// tracked files beneath it
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || self.children.contains_key(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    fn clear(&mut self) {
        let version = self.header.version();
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty(version);
        self.changed = false;
    }

    /// Load the index from disk
    ///
    /// The file is read in one shot and the trailing SHA-1 verified
    /// over everything before it, before any parsing. A missing or
    /// empty file leaves the index empty.
    ///
    /// ## Locking
    ///
    /// Holds a shared lock on the index file while reading.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        if !self.path.exists() {
            self.clear();
            return Ok(());
        }

        let mut index_file = std::fs::OpenOptions::new().read(true).open(&self.path)?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        self.clear();

        let mut bytes = Vec::new();
        lock.deref_mut().read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(());
        }

        let body = Self::verify_checksum(&bytes)?;
        let header = Self::parse_header(body)?;
        self.parse_entries(&header, &body[HEADER_SIZE..])?;

        self.header = header;
        Ok(())
    }

    /// Check the trailing SHA-1, returning the checksummed body
    fn verify_checksum(bytes: &[u8]) -> anyhow::Result<&[u8]> {
        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(Error::Corrupt("index file truncated".into()).into());
        }

        let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        let mut hasher = Sha1::new();
        hasher.update(body);
        if hasher.finalize().as_slice() != trailer {
            return Err(Error::Corrupt("index checksum mismatch".into()).into());
        }

        Ok(body)
    }

    fn parse_header(body: &[u8]) -> anyhow::Result<IndexHeader> {
        let header = IndexHeader::deserialize(body)?;

        if header.signature != SIGNATURE {
            return Err(Error::Corrupt("index signature mismatch".into()).into());
        }
        if header.version < DEFAULT_VERSION || header.version > MAX_VERSION {
            return Err(Error::Unsupported(format!("index version {}", header.version)).into());
        }

        Ok(header)
    }

    /// Parse all entry records
    ///
    /// Bytes past the last entry belong to extension sections, which
    /// are outside this reader's scope and skipped; the checksum
    /// already covered them.
    fn parse_entries(&mut self, header: &IndexHeader, body: &[u8]) -> anyhow::Result<()> {
        let mut cursor = 0usize;

        for _ in 0..header.entries_count {
            let record = Self::entry_record(&body[cursor..], header.version)?;
            let entry = IndexEntry::deserialize(record, header.version)?;
            self.store_entry(entry);
            cursor += record.len();
        }

        Ok(())
    }

    /// Slice one aligned entry record off the front of `body`
    ///
    /// The record spans the fixed prefix, the extended-flag word when
    /// the version-3 extended bit is set, the NUL-terminated path,
    /// and padding up to the next 8-byte boundary. The terminator is
    /// located after the prefix; probing block-end bytes instead
    /// would stop early on an extended-flag word whose low byte is
    /// zero.
    fn entry_record(body: &[u8], version: u32) -> anyhow::Result<&[u8]> {
        if body.len() < ENTRY_PREFIX_SIZE + 2 {
            return Err(Error::Corrupt("index entry record truncated".into()).into());
        }

        let flags = EntryFlags::from_bits(byteorder::NetworkEndian::read_u16(&body[60..62]));
        let mut path_start = ENTRY_PREFIX_SIZE;
        if version >= 3 && flags.is_extended() {
            path_start += 2;
        }

        let terminator = body[path_start..]
            .iter()
            .position(|&b| b == 0)
            .map(|offset| path_start + offset)
            .ok_or_else(|| Error::Corrupt("index entry path missing terminator".into()))?;

        let record_len = (terminator + 1).next_multiple_of(ENTRY_BLOCK);
        if record_len > body.len() {
            return Err(Error::Corrupt("index entry record truncated".into()).into());
        }

        Ok(&body[..record_len])
    }

    /// Stage an entry, replacing any previous entry at the same path
    ///
    /// Paths containing a `.git` component are rejected silently: the
    /// repository's own metadata is never tracked. The entry's
    /// conflicting parents and children are removed first, so a path
    /// can flip between file and directory.
    pub fn add(&mut self, entry: IndexEntry) -> anyhow::Result<()> {
        if has_git_component(&entry.name) {
            debug!(path = %entry.name.display(), "refusing to stage repository metadata");
            return Ok(());
        }

        self.discard_conflicts(&entry);
        self.store_entry(entry);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    /// Unstage the entry at an exact path (or a whole tracked
    /// directory), failing with `NotFound` when nothing matches
    pub fn remove(&mut self, path: &Path) -> anyhow::Result<()> {
        if !self.is_directly_tracked(path) {
            return Err(Error::NotFound(format!("{} not in index", path.display())).into());
        }

        self.remove_entry(path);
        self.remove_children(path);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    /// Remove entries that cannot coexist with the new one: parent
    /// directories staged as files, and children when the new entry
    /// replaces a directory
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.name);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_path_buf())
                .or_default()
                .insert(entry.name.clone());
        }

        self.entries.insert(entry.name.clone(), entry);
    }

    fn remove_entry(&mut self, path: &Path) {
        let Some(entry) = self.entries.remove(path) else {
            return;
        };

        for parent in entry.parent_dirs() {
            if let Some(children) = self.children.get_mut(parent) {
                children.remove(path);
                if children.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    fn remove_children(&mut self, path: &Path) {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    /// Refresh the stat cache of an existing entry
    pub fn update_entry_stat(
        &mut self,
        path: &Path,
        metadata: crate::artifacts::index::index_entry::EntryMetadata,
    ) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.metadata = metadata;
            self.changed = true;
        }
    }

    /// Write the index back to disk
    ///
    /// Entries are emitted in path order (the map's iteration order),
    /// each record padded per the format, with the SHA-1 of all
    /// written bytes appended.
    ///
    /// ## Locking
    ///
    /// Holds an exclusive lock on the index file while writing.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let mut index_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        let lock = file_guard::lock(&mut index_file, file_guard::Lock::Exclusive, 0, 1)?;

        let mut writer = Checksum::new(lock);

        self.header = IndexHeader::new(
            SIGNATURE.to_string(),
            self.header.version(),
            self.entries.len() as u32,
        );
        writer.write(&self.header.serialize()?)?;

        let version = self.header.version();
        for entry in self.entries.values() {
            let entry_bytes: Bytes = entry.serialize(version)?;
            writer.write(&entry_bytes)?;
        }

        writer.write_checksum()?;
        self.changed = false;

        debug!(path = %self.path.display(), entries = self.entries.len(), "wrote index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn index() -> Index {
        let dir = assert_fs::TempDir::new().unwrap().into_persistent();
        let path = dir.path().join("index").into_boxed_path();
        Index::new(path)
    }

    fn entry(path: &str) -> IndexEntry {
        IndexEntry::create(
            PathBuf::from(path),
            ObjectId::from_raw([7; 20]),
            Default::default(),
        )
    }

    #[rstest]
    fn add_replaces_entries_at_the_same_path(mut index: Index) {
        index.add(entry("a.txt")).unwrap();
        let mut updated = entry("a.txt");
        updated.oid = ObjectId::from_raw([9; 20]);
        index.add(updated).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.entry_by_path(Path::new("a.txt")).unwrap().oid,
            ObjectId::from_raw([9; 20])
        );
    }

    #[rstest]
    fn git_components_are_rejected_silently(mut index: Index) {
        index.add(entry(".git/config")).unwrap();
        index.add(entry("nested/.git/hooks")).unwrap();
        index.add(entry(".GIT/config")).unwrap();

        assert!(index.is_empty());
    }

    #[rstest]
    fn a_file_replaces_a_tracked_directory(mut index: Index) {
        index.add(entry("dir/a.txt")).unwrap();
        index.add(entry("dir/b.txt")).unwrap();
        index.add(entry("dir")).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.entry_by_path(Path::new("dir")).is_some());
    }

    #[rstest]
    fn a_directory_replaces_a_tracked_file(mut index: Index) {
        index.add(entry("dir")).unwrap();
        index.add(entry("dir/a.txt")).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.entry_by_path(Path::new("dir/a.txt")).is_some());
    }

    #[rstest]
    fn remove_of_an_untracked_path_is_not_found(mut index: Index) {
        let err = index.remove(Path::new("ghost.txt")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotFound(_))
        ));
    }

    #[rstest]
    fn rehydrates_v3_extended_entries_from_disk(mut index: Index) {
        use crate::artifacts::index::index_entry::ExtendedFlags;

        let mut staged = entry("later.txt");
        staged.flags = EntryFlags::from_bits(staged.flags.bits() | 0x4000);
        staged.extended_flags = Some(ExtendedFlags::SKIP_WORKTREE);

        // hand-assemble a v3 index file: header, one extended entry,
        // trailing SHA-1
        let mut bytes = IndexHeader::new(SIGNATURE.to_string(), 3, 1)
            .serialize()
            .unwrap()
            .to_vec();
        bytes.extend_from_slice(&staged.serialize(3).unwrap());
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        bytes.extend_from_slice(&digest);
        std::fs::write(index.path(), &bytes).unwrap();

        index.rehydrate().unwrap();

        assert_eq!(index.version(), 3);
        let parsed = index.entry_by_path(Path::new("later.txt")).unwrap();
        assert_eq!(parsed.extended_flags, Some(ExtendedFlags::SKIP_WORKTREE));
        assert_eq!(parsed, &staged);
    }

    #[rstest]
    fn remove_of_a_directory_unstages_the_subtree(mut index: Index) {
        index.add(entry("dir/a.txt")).unwrap();
        index.add(entry("dir/sub/b.txt")).unwrap();
        index.add(entry("other.txt")).unwrap();

        index.remove(Path::new("dir")).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.entry_by_path(Path::new("other.txt")).is_some());
    }
}
