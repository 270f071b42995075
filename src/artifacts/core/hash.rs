//! SHA-1 hashing over framed object payloads
//!
//! Every object is hashed over its canonical frame
//! `"<type> <size>\0"` followed by the payload bytes. Files are
//! streamed through the digest in fixed-size chunks so the payload
//! never has to fit in memory.

use crate::artifacts::core::STAGING_BUFFER_SIZE;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::Path;

/// Build the canonical object header for the given type and payload size
pub fn framed_header(object_type: &ObjectType, size: u64) -> Vec<u8> {
    format!("{} {}\0", object_type.as_str(), size).into_bytes()
}

/// Hash an in-memory payload with its canonical frame
pub fn sha1_object(object_type: &ObjectType, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(framed_header(object_type, payload.len() as u64));
    hasher.update(payload);
    ObjectId::from_raw(hasher.finalize().into())
}

/// Hash a file as a blob without reading it whole
///
/// The frame size is the file's length at the time of the call; the
/// caller ensures the file is quiescent while it is being hashed.
pub fn sha1_file(path: &Path) -> anyhow::Result<ObjectId> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("unable to open {} for hashing", path.display()))?;
    let size = file.metadata()?.len();

    let mut hasher = Sha1::new();
    hasher.update(framed_header(&ObjectType::Blob, size));

    let mut reader = file;
    let mut buffer = [0u8; STAGING_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(ObjectId::from_raw(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hashes_the_canonical_blob_frame() {
        let oid = sha1_object(&ObjectType::Blob, b"hello\n");
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn file_hash_matches_in_memory_hash() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        let payload = vec![0xAB_u8; STAGING_BUFFER_SIZE * 3 + 17];
        std::fs::write(&path, &payload).unwrap();

        assert_eq!(
            sha1_file(&path).unwrap(),
            sha1_object(&ObjectType::Blob, &payload)
        );
    }
}
