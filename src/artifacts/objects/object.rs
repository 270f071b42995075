//! Core object traits
//!
//! - `Packable`: serialization to the framed binary form
//! - `Unpackable`: deserialization from a reader positioned after the
//!   frame header
//! - `Object`: shared operations (name computation, storage path)
//!
//! ## Object format
//!
//! All objects are stored as
//! ```text
//! <type> <size>\0<payload>
//! ```
//! then zlib-compressed, either loose under `objects/` or packed.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::BufRead;
use std::path::PathBuf;

/// Serialization to the framed binary format
pub trait Packable {
    /// Serialize the object including its frame header
    fn serialize(&self) -> Result<Bytes>;
}

/// Deserialization from the framed binary format
pub trait Unpackable {
    /// Deserialize the object from a reader (header already consumed)
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

/// Shared object operations
pub trait Object: Packable {
    /// The object's type tag
    fn object_type(&self) -> ObjectType;

    /// Compute the object name (SHA-1 of the framed serialization)
    fn object_id(&self) -> Result<ObjectId> {
        let content = self.serialize()?;
        let mut hasher = Sha1::new();
        hasher.update(&content);
        Ok(ObjectId::from_raw(hasher.finalize().into()))
    }

    /// The loose-store path this object would occupy
    fn object_path(&self) -> Result<PathBuf> {
        Ok(self.object_id()?.to_path())
    }
}

/// Type-erased parsed object
///
/// Returned when the caller does not know the stored type up front.
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
            ObjectBox::Tag(_) => ObjectType::Tag,
        }
    }
}
