//! Git-compatible object and index storage engine
//!
//! `kit` reads and writes the on-disk formats of a Git repository
//! bit-exactly: the loose object store, pack files (with offset and
//! reference deltas), pack indexes, the binary staging index, and the
//! reference namespace. Command-line handling, network transport, and
//! merge machinery are out of scope; this crate is the storage core
//! such tools are built on.
//!
//! ## Entry points
//!
//! [`Repository`] coordinates whole-repository operations:
//!
//! ```no_run
//! use kit::{Author, Repository};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut repo = Repository::init(std::path::Path::new("."))?;
//! repo.add(&["a.txt"])?;
//! repo.commit("initial", Author::new("A".into(), "a@x".into()))?;
//! # Ok(())
//! # }
//! ```
//!
//! The areas are usable on their own: [`Database`] for object
//! storage, [`Index`] for the staging file, [`Refs`] for the ref
//! namespace, and the `artifacts::pack` types for direct pack access.

pub mod areas;
pub mod artifacts;
pub mod error;

pub use areas::database::{Database, ObjectReader, TreeWalk};
pub use areas::index::Index;
pub use areas::refs::{expand_ref_name, RefValue, Refs};
pub use areas::repository::Repository;
pub use areas::workspace::Workspace;
pub use artifacts::database::database_entry::DatabaseEntry;
pub use artifacts::index::index_entry::{EntryFlags, EntryMetadata, ExtendedFlags, IndexEntry};
pub use artifacts::index::entry_mode::EntryMode;
pub use artifacts::objects::blob::Blob;
pub use artifacts::objects::commit::{Author, Commit};
pub use artifacts::objects::object::{Object, ObjectBox, Packable, Unpackable};
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::objects::object_type::ObjectType;
pub use artifacts::objects::tag::Tag;
pub use artifacts::objects::tree::{Tree, WalkEntry};
pub use artifacts::pack::pack_file::{PackFile, PackRecord, PackedObjectKind};
pub use artifacts::pack::pack_index::{search_packs, PackIndex};
pub use artifacts::status::file_change::FileStatus;
pub use artifacts::status::status_info::StatusEntry;
pub use error::Error;
