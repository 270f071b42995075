//! Pack index reader
//!
//! ## Layout (version 2)
//!
//! ```text
//! Magic    (4B)   0xff 't' 'O' 'c'
//! Version  (4B)   big-endian 2
//! Fanout   (1 KiB) 256 cumulative u32 counts over the first name byte
//! Names    (N * 20B) sorted object names
//! CRC-32s  (N * 4B)
//! Offsets  (N * 4B) bit 31 set escapes into the large-offset table
//! Large    (M * 8B) 64-bit offsets, indexed by the low 31 bits
//! Pack SHA-1 (20B) | Index SHA-1 (20B)
//! ```
//!
//! Version 1 files (no magic) are recognized at `open`; lookups on
//! them fail with `Unsupported`.

use crate::artifacts::objects::object_id::{ObjectId, OBJECT_ID_RAW_LENGTH};
use crate::error::Error;
use anyhow::Context;
use byteorder::ByteOrder;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Magic bytes opening a v2 pack index
pub const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];

/// Fanout table entries (one per possible first name byte)
const FANOUT_ENTRIES: usize = 256;

/// Fanout table size in bytes
const FANOUT_SIZE: usize = FANOUT_ENTRIES * 4;

/// Header size for v2: magic plus version
const IDX_HEADER_SIZE: usize = 8;

/// Escape bit marking an offset slot as a large-offset index
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// In-memory view of one pack index file
#[derive(Debug)]
pub struct PackIndex {
    path: Box<Path>,
    version: u32,
    data: Bytes,
    object_count: u32,
    /// Byte offsets of the v2 tables inside `data` (zero for v1)
    names_start: usize,
    offsets_start: usize,
    large_start: usize,
    large_count: u32,
}

impl PackIndex {
    /// Open an index file, loading the fanout table and validating
    /// the v2 table layout
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("unable to read pack index {}", path.display()))?;
        let data = Bytes::from(data);

        if data.len() >= 4 && data[0..4] == IDX_MAGIC {
            let version = byteorder::NetworkEndian::read_u32(&data[4..8]);
            if version != 2 {
                return Err(Error::Unsupported(format!("pack index version {version}")).into());
            }
            Self::open_v2(path, data)
        } else {
            Self::open_v1(path, data)
        }
    }

    fn open_v2(path: &Path, data: Bytes) -> anyhow::Result<Self> {
        let trailer = 2 * OBJECT_ID_RAW_LENGTH;
        if data.len() < IDX_HEADER_SIZE + FANOUT_SIZE + trailer {
            return Err(Error::Corrupt("pack index too small for fanout".into()).into());
        }

        let object_count = Self::validate_fanout(&data[IDX_HEADER_SIZE..])?;
        let count = object_count as usize;

        let names_start = IDX_HEADER_SIZE + FANOUT_SIZE;
        let crcs_start = names_start + count * OBJECT_ID_RAW_LENGTH;
        let offsets_start = crcs_start + count * 4;
        let large_start = offsets_start + count * 4;
        let large_end = data
            .len()
            .checked_sub(trailer)
            .filter(|&end| end >= large_start)
            .ok_or_else(|| Error::Corrupt("pack index tables overrun the file".into()))?;

        let large_bytes = large_end - large_start;
        if large_bytes % 8 != 0 {
            return Err(
                Error::Corrupt("pack index large-offset table misaligned".into()).into(),
            );
        }

        Ok(PackIndex {
            path: Box::from(path),
            version: 2,
            data,
            object_count,
            names_start,
            offsets_start,
            large_start,
            large_count: (large_bytes / 8) as u32,
        })
    }

    /// Legacy layout: fanout at byte 0, then interleaved
    /// `(u32 offset, 20-byte name)` rows. Parsed far enough to report
    /// the version and count; lookups are not implemented.
    fn open_v1(path: &Path, data: Bytes) -> anyhow::Result<Self> {
        if data.len() < FANOUT_SIZE + 2 * OBJECT_ID_RAW_LENGTH {
            return Err(Error::Corrupt("pack index too small for fanout".into()).into());
        }

        let object_count = Self::validate_fanout(&data)?;

        Ok(PackIndex {
            path: Box::from(path),
            version: 1,
            data,
            object_count,
            names_start: 0,
            offsets_start: 0,
            large_start: 0,
            large_count: 0,
        })
    }

    /// Check the fanout is non-decreasing; its last entry is the
    /// object count
    fn validate_fanout(fanout: &[u8]) -> anyhow::Result<u32> {
        let mut previous = 0u32;
        for i in 0..FANOUT_ENTRIES {
            let value = byteorder::NetworkEndian::read_u32(&fanout[i * 4..i * 4 + 4]);
            if value < previous {
                return Err(Error::Corrupt(format!(
                    "pack index fanout decreases at byte {i}"
                ))
                .into());
            }
            previous = value;
        }
        Ok(previous)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Cumulative count of names whose first byte is <= `first_byte`
    fn fanout(&self, first_byte: u8) -> u32 {
        let table_start = if self.version == 2 { IDX_HEADER_SIZE } else { 0 };
        let slot = table_start + first_byte as usize * 4;
        byteorder::NetworkEndian::read_u32(&self.data[slot..slot + 4])
    }

    /// Raw name bytes of the i-th sorted entry
    fn name_at(&self, index: u32) -> &[u8] {
        let start = self.names_start + index as usize * OBJECT_ID_RAW_LENGTH;
        &self.data[start..start + OBJECT_ID_RAW_LENGTH]
    }

    /// Object name of the i-th sorted entry
    pub fn object_id_at(&self, index: u32) -> anyhow::Result<ObjectId> {
        let mut reader = self.name_at(index);
        ObjectId::read_raw_from(&mut reader)
    }

    /// Pack offset of the i-th sorted entry, following the
    /// large-offset escape when bit 31 is set
    pub fn offset_at(&self, index: u32) -> anyhow::Result<u64> {
        let slot = self.offsets_start + index as usize * 4;
        let raw = byteorder::NetworkEndian::read_u32(&self.data[slot..slot + 4]);

        if raw & LARGE_OFFSET_FLAG == 0 {
            return Ok(raw as u64);
        }

        let large_index = raw & !LARGE_OFFSET_FLAG;
        if large_index >= self.large_count {
            return Err(Error::Corrupt(format!(
                "pack index large offset {large_index} of {}",
                self.large_count
            ))
            .into());
        }
        let slot = self.large_start + large_index as usize * 8;
        Ok(byteorder::NetworkEndian::read_u64(&self.data[slot..slot + 8]))
    }

    /// Fanout-bounded binary search for an object name
    ///
    /// The interval is `[lo, hi)` over the sorted name table; the
    /// half not containing the pivot is discarded after each probe.
    pub fn find(&self, oid: &ObjectId) -> anyhow::Result<Option<u64>> {
        if self.version != 2 {
            return Err(Error::Unsupported("pack index v1 lookup".into()).into());
        }

        let first_byte = oid.as_bytes()[0];
        let mut lo = match first_byte {
            0 => 0,
            _ => self.fanout(first_byte - 1),
        };
        let mut hi = self.fanout(first_byte);

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.name_at(mid).cmp(oid.as_bytes().as_slice()) {
                std::cmp::Ordering::Equal => return Ok(Some(self.offset_at(mid)?)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }

        Ok(None)
    }
}

/// Scan `<objects>/pack/*.idx` for an object name
///
/// Returns the matching pack file path and the entry offset. Scan
/// order is unspecified; when duplicates exist across packs, any hit
/// may be returned.
pub fn search_packs(
    objects_dir: &Path,
    oid: &ObjectId,
) -> anyhow::Result<Option<(PathBuf, u64)>> {
    let pack_dir = objects_dir.join("pack");
    if !pack_dir.is_dir() {
        return Ok(None);
    }

    for entry in std::fs::read_dir(&pack_dir)? {
        let entry = entry?;
        let index_path = entry.path();
        if index_path.extension().and_then(|e| e.to_str()) != Some("idx") {
            continue;
        }

        let index = PackIndex::open(&index_path)?;
        if index.version() != 2 {
            continue; // v1 indexes are not searchable
        }
        if let Some(offset) = index.find(oid)? {
            return Ok(Some((index_path.with_extension("pack"), offset)));
        }
    }

    Ok(None)
}
