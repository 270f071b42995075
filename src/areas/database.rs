//! Object database
//!
//! Content-addressed storage for blobs, trees, commits and tags.
//! Objects are written loose (zlib files under a two-hex-digit
//! directory) and read from either tier: the loose path is probed
//! first, then the pack indexes; packed deltas are resolved
//! transparently so callers only ever see the four first-class types.
//!
//! ## Storage format
//!
//! - Loose path: `objects/ab/cdef123...` (first two hex digits as the
//!   directory, the rest as the file name)
//! - Content: zlib over `"<type> <size>\0<payload>"`

use crate::artifacts::core::{hash, zlib};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::{Tree, WalkEntry, WalkFrame};
use crate::artifacts::pack::pack_file::{ObjectStream, PackFile};
use crate::artifacts::pack::pack_index::search_packs;
use crate::artifacts::pack::delta;
use crate::error::Error;
use anyhow::Context;
use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Counter feeding temp-file names for atomic loose writes
static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Object database rooted at an `objects/` directory
#[derive(Debug)]
pub struct Database {
    /// Path to the objects directory (typically `.git/objects`)
    path: Box<Path>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Store any object, returning its name
    ///
    /// Idempotent: rewriting an existing object is a no-op because the
    /// bytes at that path are already identical by construction.
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let content = object.serialize()?;
        let oid = object.object_id()?;
        self.write_loose(&oid, &content)?;
        Ok(oid)
    }

    /// Store a raw `(type, payload)` pair, returning its name
    pub fn store_bytes(
        &self,
        object_type: ObjectType,
        payload: &[u8],
    ) -> anyhow::Result<ObjectId> {
        let oid = hash::sha1_object(&object_type, payload);

        let mut content =
            Vec::with_capacity(payload.len() + 16);
        content.write_all(&hash::framed_header(&object_type, payload.len() as u64))?;
        content.write_all(payload)?;

        self.write_loose(&oid, &content)?;
        Ok(oid)
    }

    fn write_loose(&self, oid: &ObjectId, framed: &[u8]) -> anyhow::Result<()> {
        let object_path = self.path.join(oid.to_path());
        if object_path.exists() {
            return Ok(());
        }

        let object_dir = object_path
            .parent()
            .with_context(|| format!("invalid object path {}", object_path.display()))?;
        std::fs::create_dir_all(object_dir).with_context(|| {
            format!("unable to create object directory {}", object_dir.display())
        })?;

        let compressed = zlib::compress(framed)?;

        // write to a temp name, then rename into place
        let temp_path = object_dir.join(format!(
            "tmp-obj-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("unable to open {}", temp_path.display()))?;
        file.write_all(&compressed)
            .with_context(|| format!("unable to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &object_path)
            .with_context(|| format!("unable to rename into {}", object_path.display()))?;

        debug!(oid = %oid, bytes = framed.len(), "stored loose object");
        Ok(())
    }

    /// Hash a file the way `store_bytes(Blob, ..)` would, without
    /// writing anything
    pub fn hash_file(&self, path: &Path) -> anyhow::Result<ObjectId> {
        hash::sha1_file(path)
    }

    /// Open an object for reading, wherever it lives
    ///
    /// Dispatch order: the loose path, then every pack index; a packed
    /// delta is resolved through its chain before being returned. An
    /// object in neither tier is `NotFound`.
    pub fn open(&self, oid: &ObjectId) -> anyhow::Result<ObjectReader> {
        let loose_path = self.path.join(oid.to_path());
        if loose_path.exists() {
            return self.open_loose(&loose_path);
        }

        if let Some((pack_path, offset)) = search_packs(&self.path, oid)? {
            debug!(oid = %oid, pack = %pack_path.display(), offset, "object found in pack");
            return self.open_packed(&pack_path, offset);
        }

        Err(Error::NotFound(format!("object {oid}")).into())
    }

    fn open_loose(&self, loose_path: &Path) -> anyhow::Result<ObjectReader> {
        let file = File::open(loose_path)
            .with_context(|| format!("unable to open {}", loose_path.display()))?;
        let decoder = flate2::bufread::ZlibDecoder::new(BufReader::new(file));
        let mut reader = BufReader::new(decoder);

        // a zlib failure while the header is still being inflated is
        // corruption, the same as a malformed header
        let (object_type, size) = ObjectType::parse_framed_header(&mut reader).map_err(|e| {
            if e.downcast_ref::<Error>().is_some() {
                e.context(format!("malformed header in {}", loose_path.display()))
            } else {
                anyhow::Error::from(Error::Corrupt(format!(
                    "loose object {}: {e}",
                    loose_path.display()
                )))
            }
        })?;

        Ok(ObjectReader {
            object_type,
            size,
            source: ReaderSource::Loose(reader),
        })
    }

    fn open_packed(&self, pack_path: &Path, offset: u64) -> anyhow::Result<ObjectReader> {
        let mut pack = PackFile::open(pack_path)?;
        let header = pack.read_header_at(offset)?;

        if header.kind.is_delta() {
            let (object_type, payload) = delta::resolve_chain(self, &mut pack, offset)?;
            return Ok(ObjectReader {
                object_type,
                size: payload.len() as u64,
                source: ReaderSource::Materialized(Cursor::new(payload)),
            });
        }

        let stream = pack.into_object_stream(offset)?;
        Ok(ObjectReader {
            object_type: stream.object_type(),
            size: stream.size(),
            source: ReaderSource::Packed(Box::new(stream)),
        })
    }

    /// Parse an object into its concrete type
    pub fn parse_object(&self, oid: &ObjectId) -> anyhow::Result<ObjectBox> {
        let reader = self.open(oid)?;
        let object_type = reader.object_type();
        let payload = reader.read_to_bytes()?;
        let cursor = Cursor::new(payload);

        Ok(match object_type {
            ObjectType::Blob => ObjectBox::Blob(Box::new(Blob::deserialize(cursor)?)),
            ObjectType::Tree => ObjectBox::Tree(Box::new(Tree::deserialize(cursor)?)),
            ObjectType::Commit => ObjectBox::Commit(Box::new(Commit::deserialize(cursor)?)),
            ObjectType::Tag => ObjectBox::Tag(Box::new(Tag::deserialize(cursor)?)),
        })
    }

    /// Parse an object as a blob, if it is one
    pub fn parse_object_as_blob(&self, oid: &ObjectId) -> anyhow::Result<Option<Blob>> {
        match self.parse_object(oid)? {
            ObjectBox::Blob(blob) => Ok(Some(*blob)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a tree, if it is one
    pub fn parse_object_as_tree(&self, oid: &ObjectId) -> anyhow::Result<Option<Tree>> {
        match self.parse_object(oid)? {
            ObjectBox::Tree(tree) => Ok(Some(*tree)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a commit, if it is one
    pub fn parse_object_as_commit(&self, oid: &ObjectId) -> anyhow::Result<Option<Commit>> {
        match self.parse_object(oid)? {
            ObjectBox::Commit(commit) => Ok(Some(*commit)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a tag, if it is one
    pub fn parse_object_as_tag(&self, oid: &ObjectId) -> anyhow::Result<Option<Tag>> {
        match self.parse_object(oid)? {
            ObjectBox::Tag(tag) => Ok(Some(*tag)),
            _ => Ok(None),
        }
    }

    /// Load a tree object, failing when the name resolves to anything
    /// else
    pub fn read_tree(&self, oid: &ObjectId) -> anyhow::Result<Tree> {
        self.parse_object_as_tree(oid)?
            .ok_or_else(|| Error::InvalidInput(format!("object {oid} is not a tree")).into())
    }

    /// Persist a built tree bottom-up, returning the root name
    ///
    /// Children are stored before their parents so every row's object
    /// name exists by the time it is written.
    pub fn write_tree(&self, tree: &Tree) -> anyhow::Result<ObjectId> {
        tree.traverse(&|subtree| self.store(subtree).map(|_| ()))?;
        tree.object_id()
    }

    /// Walk a tree depth-first, yielding non-tree entries with their
    /// full repo-relative paths
    pub fn walk_tree(&self, root: &ObjectId) -> anyhow::Result<TreeWalk<'_>> {
        let tree = self.read_tree(root)?;
        Ok(TreeWalk {
            database: self,
            stack: vec![WalkFrame::from_tree(None, &tree)],
        })
    }

    /// Navigate a path through nested trees to a single row
    ///
    /// Fails with `NotFound` when a segment is missing (or a non-tree
    /// is descended into) and with `InvalidInput` when the full path
    /// names a tree instead of a leaf.
    pub fn entry_from_tree(
        &self,
        root: &ObjectId,
        path: &Path,
    ) -> anyhow::Result<DatabaseEntry> {
        let segments: Vec<&str> = path
            .components()
            .map(|component| {
                component
                    .as_os_str()
                    .to_str()
                    .ok_or_else(|| Error::InvalidInput(format!("path {path:?}")))
            })
            .collect::<Result<_, _>>()?;
        if segments.is_empty() {
            return Err(Error::InvalidInput("empty tree path".into()).into());
        }

        let mut tree = self.read_tree(root)?;
        for (depth, segment) in segments.iter().enumerate() {
            let entry = tree.entry_named(segment).copied().ok_or_else(|| {
                Error::NotFound(format!("no file {} in tree", path.display()))
            })?;

            let is_last = depth + 1 == segments.len();
            if is_last {
                if entry.is_tree() {
                    return Err(
                        Error::InvalidInput(format!("{} is a tree", path.display())).into()
                    );
                }
                return Ok(entry);
            }

            if !entry.is_tree() {
                return Err(
                    Error::NotFound(format!("no file {} in tree", path.display())).into(),
                );
            }
            tree = self.read_tree(&entry.oid)?;
        }

        unreachable!("loop returns on the last segment")
    }

    /// Find loose objects whose hex name starts with `prefix`
    ///
    /// Used to resolve abbreviated names. Prefixes of two or more
    /// characters only scan one fan-out directory.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!("object id prefix {prefix:?}")).into());
        }

        let mut matches = Vec::new();

        let scan_dir = |dir_name: &str, file_prefix: &str, matches: &mut Vec<ObjectId>| {
            let dir_path = self.path.join(dir_name);
            if !dir_path.is_dir() {
                return Ok::<(), anyhow::Error>(());
            }
            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let file_name = file_name.to_string_lossy();
                if file_name.starts_with(file_prefix)
                    && let Ok(oid) = ObjectId::try_parse(&format!("{dir_name}{file_name}"))
                {
                    matches.push(oid);
                }
            }
            Ok(())
        };

        if prefix.len() >= 2 {
            scan_dir(&prefix[..2], &prefix[2..], &mut matches)?;
        } else {
            for i in 0..=255u8 {
                let dir_name = format!("{i:02x}");
                if dir_name.starts_with(prefix) {
                    scan_dir(&dir_name, "", &mut matches)?;
                }
            }
        }

        matches.sort();
        Ok(matches)
    }
}

/// Where an object reader draws its bytes from
#[derive(Debug)]
enum ReaderSource {
    /// Loose tier: zlib stream positioned after the frame header
    Loose(BufReader<flate2::bufread::ZlibDecoder<BufReader<File>>>),
    /// Packed non-delta entry: bounded zlib stream
    Packed(Box<ObjectStream>),
    /// Resolved delta (or any other materialized payload)
    Materialized(Cursor<Bytes>),
}

/// Streaming reader over one object's payload
///
/// Exposes the resolved type and declared size up front; the payload
/// itself is pulled through `Read` so large blobs never have to be
/// materialized.
#[derive(Debug)]
pub struct ObjectReader {
    object_type: ObjectType,
    size: u64,
    source: ReaderSource,
}

impl ObjectReader {
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Declared payload size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Drain the payload, verifying it matches the declared size
    pub fn read_to_bytes(mut self) -> anyhow::Result<Bytes> {
        let declared = self.size;
        let mut payload = Vec::with_capacity(declared as usize);
        self.read_to_end(&mut payload)
            .map_err(|e| Error::Corrupt(format!("object payload: {e}")))?;

        if payload.len() as u64 != declared {
            return Err(Error::Corrupt(format!(
                "object payload is {} bytes, header declared {declared}",
                payload.len()
            ))
            .into());
        }

        Ok(Bytes::from(payload))
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.source {
            ReaderSource::Loose(reader) => reader.read(buf),
            ReaderSource::Packed(stream) => stream.read(buf),
            ReaderSource::Materialized(cursor) => cursor.read(buf),
        }
    }
}

/// Depth-first tree walk with reconstructed paths
///
/// Keeps a stack of `(rows, cursor, local component)`; full paths are
/// reassembled from the component stack on each yield, so frames stay
/// small.
pub struct TreeWalk<'d> {
    database: &'d Database,
    stack: Vec<WalkFrame>,
}

impl TreeWalk<'_> {
    fn qualified_path(&self, leaf_name: &str) -> PathBuf {
        let mut path = PathBuf::new();
        for frame in &self.stack {
            if let Some(component) = &frame.component {
                path.push(component);
            }
        }
        path.push(leaf_name);
        path
    }
}

impl Iterator for TreeWalk<'_> {
    type Item = anyhow::Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.cursor >= frame.rows.len() {
                self.stack.pop();
                continue;
            }

            let (name, entry) = frame.rows[frame.cursor].clone();
            frame.cursor += 1;

            if entry.is_tree() {
                match self.database.read_tree(&entry.oid) {
                    Ok(subtree) => {
                        self.stack.push(WalkFrame::from_tree(Some(name), &subtree));
                        continue;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            let path = self.qualified_path(&name);
            return Some(Ok(WalkEntry { path, entry }));
        }
    }
}
