//! Blob object
//!
//! Blobs hold raw file content. Names and permissions live in trees;
//! the blob itself is nothing but bytes.
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Write};

/// File content as a content-addressed object
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    /// Raw file bytes
    content: Bytes,
}

impl Blob {
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut blob_bytes = Vec::with_capacity(self.content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), self.content.len());
        blob_bytes.write_all(header.as_bytes())?;
        blob_bytes.write_all(&self.content)?;

        Ok(Bytes::from(blob_bytes))
    }
}

impl Unpackable for Blob {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        // the frame header has already been consumed
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;

        Ok(Self::new(Bytes::from(content)))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_the_blob_frame() {
        let blob = Blob::new(Bytes::from_static(b"hello\n"));
        assert_eq!(blob.serialize().unwrap().as_ref(), b"blob 6\0hello\n");
    }

    #[test]
    fn known_content_has_the_known_name() {
        let blob = Blob::new(Bytes::from_static(b"hello\n"));
        assert_eq!(
            blob.object_id().unwrap().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn binary_content_survives_a_round_trip() {
        let content = Bytes::from(vec![0u8, 159, 146, 150, 255]);
        let blob = Blob::new(content.clone());
        let parsed = Blob::deserialize(std::io::Cursor::new(content.to_vec())).unwrap();
        assert_eq!(parsed, blob);
    }
}
