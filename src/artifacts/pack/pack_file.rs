//! Pack file reader
//!
//! ## Format
//!
//! ```text
//! "PACK" | version (u32 BE) | object count (u32 BE)
//! entry*
//! SHA-1 of all preceding bytes (20 bytes)
//! ```
//!
//! Each entry opens with a variable-length header: the first byte
//! holds `(more:1, type:3, size_lsb:4)`, continuation bytes hold
//! `(more:1, size_bits:7)` contributing at shifts 4, 11, 18, ….
//! `ofs_delta` entries follow with a varint-encoded negative distance
//! to their base; `ref_delta` entries with the base's raw 20-byte
//! name. The payload after the header bytes is one zlib stream.

use crate::artifacts::core::hash::sha1_object;
use crate::artifacts::core::STAGING_BUFFER_SIZE;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::{PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_TRAILER_SIZE, PACK_VERSION};
use crate::error::Error;
use anyhow::Context;
use byteorder::ReadBytesExt;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Object kind as encoded in a pack entry header
///
/// The two delta kinds are internal to packs; after resolution every
/// object is one of the four first-class types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl PackedObjectKind {
    pub fn from_type_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(PackedObjectKind::Commit),
            2 => Some(PackedObjectKind::Tree),
            3 => Some(PackedObjectKind::Blob),
            4 => Some(PackedObjectKind::Tag),
            6 => Some(PackedObjectKind::OfsDelta),
            7 => Some(PackedObjectKind::RefDelta),
            _ => None,
        }
    }

    /// The first-class type, or `None` for the delta kinds
    pub fn as_object_type(&self) -> Option<ObjectType> {
        match self {
            PackedObjectKind::Commit => Some(ObjectType::Commit),
            PackedObjectKind::Tree => Some(ObjectType::Tree),
            PackedObjectKind::Blob => Some(ObjectType::Blob),
            PackedObjectKind::Tag => Some(ObjectType::Tag),
            PackedObjectKind::OfsDelta | PackedObjectKind::RefDelta => None,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, PackedObjectKind::OfsDelta | PackedObjectKind::RefDelta)
    }
}

/// Base reference carried by a delta entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaBase {
    /// Absolute offset of the base entry in the same pack
    Offset(u64),
    /// Name of the base object, resolvable anywhere in the store
    Reference(ObjectId),
}

/// Parsed pack entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Offset of the entry's first header byte
    pub offset: u64,
    /// Offset of the zlib payload following the header bytes
    pub payload_offset: u64,
    pub kind: PackedObjectKind,
    /// Decompressed payload size declared by the header
    pub size: u64,
    /// Present for the two delta kinds
    pub base: Option<DeltaBase>,
}

/// A fully inflated pack entry
#[derive(Debug, Clone)]
pub struct PackedObject {
    pub header: EntryHeader,
    /// Decompressed payload; for deltas this is the raw delta program
    pub payload: Bytes,
}

/// Record yielded by the pack entry iterator
///
/// Non-delta entries carry the name obtained by hashing the framed
/// object; deltas are reported with their raw kind and no name, since
/// naming them requires resolving the chain.
#[derive(Debug, Clone)]
pub struct PackRecord {
    pub offset: u64,
    pub kind: PackedObjectKind,
    pub size: u64,
    pub base: Option<DeltaBase>,
    pub name: Option<ObjectId>,
    pub payload: Bytes,
}

/// Read-only handle on one pack file
///
/// The handle is seek-stateful and single-owner; it owns the
/// underlying file and closes it on drop.
#[derive(Debug)]
pub struct PackFile {
    path: Box<Path>,
    file: BufReader<File>,
    version: u32,
    object_count: u32,
    length: u64,
}

impl PackFile {
    /// Open a pack and validate its header
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("unable to open pack {}", path.display()))?;
        let length = file.metadata()?.len();
        let mut file = BufReader::new(file);

        if length < PACK_HEADER_SIZE + PACK_TRAILER_SIZE {
            return Err(Error::Corrupt("pack too small for header and trailer".into()).into());
        }

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != PACK_SIGNATURE {
            return Err(Error::Corrupt("pack magic mismatch".into()).into());
        }

        let version = file.read_u32::<byteorder::NetworkEndian>()?;
        if version != PACK_VERSION {
            return Err(Error::Unsupported(format!("pack version {version}")).into());
        }

        let object_count = file.read_u32::<byteorder::NetworkEndian>()?;

        Ok(PackFile {
            path: Box::from(path),
            file,
            version,
            object_count,
            length,
        })
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

    fn read_byte(&mut self) -> anyhow::Result<u8> {
        Ok(self.file.read_u8()?)
    }

    /// Parse the entry header at `offset`, leaving the handle
    /// positioned at the zlib payload
    pub fn read_header_at(&mut self, offset: u64) -> anyhow::Result<EntryHeader> {
        if offset < PACK_HEADER_SIZE || offset >= self.length - PACK_TRAILER_SIZE {
            return Err(Error::Corrupt(format!("pack entry offset {offset} out of range")).into());
        }
        self.file.seek(SeekFrom::Start(offset))?;

        let mut consumed = 0u64;
        let mut byte = self.read_byte()?;
        consumed += 1;

        let type_bits = (byte >> 4) & 0x7;
        let kind = PackedObjectKind::from_type_bits(type_bits)
            .ok_or_else(|| Error::Corrupt(format!("pack entry type bits {type_bits}")))?;

        let mut size = (byte & 0x0F) as u64;
        let mut shift = 4u32;
        while byte & 0x80 != 0 {
            byte = self.read_byte()?;
            consumed += 1;
            if shift > 60 {
                return Err(Error::Corrupt("pack entry size varint overflows".into()).into());
            }
            size |= ((byte & 0x7F) as u64) << shift;
            shift += 7;
        }

        let base = match kind {
            PackedObjectKind::OfsDelta => {
                let (distance, distance_bytes) = self.read_base_distance()?;
                consumed += distance_bytes;
                if distance == 0 || distance > offset {
                    return Err(Error::Corrupt(format!(
                        "delta base distance {distance} at offset {offset}"
                    ))
                    .into());
                }
                Some(DeltaBase::Offset(offset - distance))
            }
            PackedObjectKind::RefDelta => {
                let oid = ObjectId::read_raw_from(&mut self.file)
                    .map_err(|_| Error::Corrupt("delta base name truncated".into()))?;
                consumed += 20;
                Some(DeltaBase::Reference(oid))
            }
            _ => None,
        };

        Ok(EntryHeader {
            offset,
            payload_offset: offset + consumed,
            kind,
            size,
            base,
        })
    }

    /// Parse the `ofs_delta` distance varint: big-endian 7-bit groups
    /// with an offset-by-one bias on every continuation
    fn read_base_distance(&mut self) -> anyhow::Result<(u64, u64)> {
        let mut byte = self.read_byte()?;
        let mut bytes_read = 1u64;
        let mut distance = (byte & 0x7F) as u64;

        while byte & 0x80 != 0 {
            byte = self.read_byte()?;
            bytes_read += 1;
            if bytes_read > 10 {
                return Err(Error::Corrupt("delta base distance varint overflows".into()).into());
            }
            distance = ((distance + 1) << 7) | ((byte & 0x7F) as u64);
        }

        Ok((distance, bytes_read))
    }

    /// Inflate the whole entry at `offset`
    ///
    /// Returns the parsed header plus the decompressed payload, which
    /// is the delta program for delta entries.
    pub fn read_object_at(&mut self, offset: u64) -> anyhow::Result<PackedObject> {
        let (object, _) = self.read_object_and_advance(offset)?;
        Ok(object)
    }

    /// Inflate the entry at `offset` and also report the offset one
    /// past its compressed payload, for sequential walks
    fn read_object_and_advance(&mut self, offset: u64) -> anyhow::Result<(PackedObject, u64)> {
        let header = self.read_header_at(offset)?;

        let mut decoder = flate2::bufread::ZlibDecoder::new(&mut self.file);
        let mut payload = Vec::with_capacity(header.size as usize);
        decoder
            .read_to_end(&mut payload)
            .map_err(|e| Error::Corrupt(format!("pack entry payload at {offset}: {e}")))?;
        let consumed = decoder.total_in();

        if payload.len() as u64 != header.size {
            return Err(Error::Corrupt(format!(
                "pack entry at {offset} inflated to {} bytes, header declared {}",
                payload.len(),
                header.size
            ))
            .into());
        }

        Ok((
            PackedObject {
                header,
                payload: Bytes::from(payload),
            },
            header.payload_offset + consumed,
        ))
    }

    /// Consume the handle into a bounded stream over a non-delta entry
    ///
    /// The stream yields exactly the declared number of payload bytes.
    pub fn into_object_stream(mut self, offset: u64) -> anyhow::Result<ObjectStream> {
        let header = self.read_header_at(offset)?;
        let object_type = header.kind.as_object_type().ok_or_else(|| {
            Error::InvalidInput(format!("entry at {offset} is a delta, not streamable"))
        })?;

        Ok(ObjectStream {
            object_type,
            size: header.size,
            produced: 0,
            decoder: flate2::bufread::ZlibDecoder::new(self.file),
        })
    }

    /// Walk every entry from byte 12 to the trailer
    pub fn entries(&mut self) -> PackEntries<'_> {
        let remaining = self.object_count;
        PackEntries {
            pack: self,
            next_offset: PACK_HEADER_SIZE,
            remaining,
        }
    }

    /// Stream all bytes but the trailer through SHA-1 and compare
    pub fn validate(&mut self) -> anyhow::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;

        let mut hasher = Sha1::new();
        let mut remaining = self.length - PACK_TRAILER_SIZE;
        let mut buffer = [0u8; STAGING_BUFFER_SIZE];
        while remaining > 0 {
            let take = remaining.min(buffer.len() as u64) as usize;
            self.file.read_exact(&mut buffer[..take])?;
            hasher.update(&buffer[..take]);
            remaining -= take as u64;
        }

        let mut trailer = [0u8; PACK_TRAILER_SIZE as usize];
        self.file.read_exact(&mut trailer)?;

        if hasher.finalize().as_slice() != trailer {
            return Err(Error::Corrupt(format!(
                "pack {} trailer hash mismatch",
                self.path.display()
            ))
            .into());
        }

        Ok(())
    }
}

/// Bounded streaming reader over one non-delta pack entry
#[derive(Debug)]
pub struct ObjectStream {
    object_type: ObjectType,
    size: u64,
    produced: u64,
    decoder: flate2::bufread::ZlibDecoder<BufReader<File>>,
}

impl ObjectStream {
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.produced >= self.size {
            return Ok(0);
        }

        let cap = (self.size - self.produced).min(buf.len() as u64) as usize;
        let read = self.decoder.read(&mut buf[..cap])?;
        if read == 0 && self.produced < self.size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "pack entry stream ended at {} of {} declared bytes",
                    self.produced, self.size
                ),
            ));
        }

        self.produced += read as u64;
        Ok(read)
    }
}

/// Iterator over all entries of a pack
///
/// Advances by fully draining each entry's zlib stream before parsing
/// the next header.
pub struct PackEntries<'p> {
    pack: &'p mut PackFile,
    next_offset: u64,
    remaining: u32,
}

impl Iterator for PackEntries<'_> {
    type Item = anyhow::Result<PackRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let trailer_start = self.pack.length - PACK_TRAILER_SIZE;
        if self.next_offset >= trailer_start {
            let leftover = self.remaining;
            self.remaining = 0;
            return Some(Err(Error::Corrupt(format!(
                "pack ended with {leftover} entries still declared"
            ))
            .into()));
        }

        let offset = self.next_offset;
        match self.pack.read_object_and_advance(offset) {
            Ok((object, next_offset)) => {
                self.next_offset = next_offset;
                self.remaining -= 1;

                let name = object
                    .header
                    .kind
                    .as_object_type()
                    .map(|object_type| sha1_object(&object_type, &object.payload));

                Some(Ok(PackRecord {
                    offset,
                    kind: object.header.kind,
                    size: object.header.size,
                    base: object.header.base,
                    name,
                    payload: object.payload,
                }))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}
