//! Index file header

use crate::artifacts::index::{HEADER_SIZE, SIGNATURE};
use crate::error::Error;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

#[derive(Debug, Clone, new)]
pub struct IndexHeader {
    pub(crate) signature: String,
    pub(crate) version: u32,
    pub(crate) entries_count: u32,
}

impl IndexHeader {
    pub(crate) fn empty(version: u32) -> Self {
        IndexHeader {
            signature: String::from(SIGNATURE),
            version,
            entries_count: 0,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(self.signature.as_bytes())?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.version)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Corrupt("index header truncated".into()).into());
        }

        let signature = String::from_utf8(bytes[0..4].to_vec())
            .map_err(|_| Error::Corrupt("index signature is not ascii".into()))?;
        let version = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        let entries_count = byteorder::NetworkEndian::read_u32(&bytes[8..12]);

        Ok(IndexHeader {
            signature,
            version,
            entries_count,
        })
    }
}
