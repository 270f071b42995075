//! Index entry representation
//!
//! Each entry records one tracked file: its path, content hash, and
//! the stat metadata used for fast change detection.
//!
//! ## Entry format
//!
//! A fixed 62-byte prefix (ten big-endian u32 stat fields, the 20-byte
//! object name, a 16-bit flag word), an optional 16-bit extended flag
//! word (version >= 3 with the extended bit set), the NUL-terminated
//! path, then NUL padding to an 8-byte boundary.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::{ENTRY_BLOCK, ENTRY_PREFIX_SIZE};
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::Error;
use bitflags::bitflags;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::Write;
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

/// Largest value the 12-bit name-length field can carry
pub const MAX_NAME_LENGTH: usize = 0xFFF;

/// The 16-bit flag word: assume-valid, extended, a two-bit stage, and
/// the clamped path length in the low twelve bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags(u16);

impl EntryFlags {
    const ASSUME_VALID: u16 = 0x8000;
    const EXTENDED: u16 = 0x4000;
    const STAGE_MASK: u16 = 0x3000;
    const STAGE_SHIFT: u16 = 12;
    const NAME_LENGTH_MASK: u16 = 0x0FFF;

    pub fn from_bits(bits: u16) -> Self {
        EntryFlags(bits)
    }

    /// Flags for a fresh stage-0 entry with the given path length
    pub fn for_path_length(length: usize) -> Self {
        EntryFlags(min(length, MAX_NAME_LENGTH) as u16)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn name_length(&self) -> u16 {
        self.0 & Self::NAME_LENGTH_MASK
    }

    pub fn stage(&self) -> u8 {
        ((self.0 & Self::STAGE_MASK) >> Self::STAGE_SHIFT) as u8
    }

    pub fn is_extended(&self) -> bool {
        self.0 & Self::EXTENDED != 0
    }

    pub fn is_assume_valid(&self) -> bool {
        self.0 & Self::ASSUME_VALID != 0
    }
}

bitflags! {
    /// The version-3 extended flag word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExtendedFlags: u16 {
        const INTENT_TO_ADD = 1 << 13;
        const SKIP_WORKTREE = 1 << 14;
    }
}

/// Stat metadata captured when a file is staged
///
/// Comparing these fields against a fresh `stat` lets status skip
/// hashing files that cannot have changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub ctime: u32,
    pub ctime_nsec: u32,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> anyhow::Result<Self> {
        let mode = if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if file_path.is_executable() {
            EntryMode::Executable
        } else {
            EntryMode::Regular
        };

        Ok(Self {
            ctime: metadata.ctime() as u32,
            ctime_nsec: metadata.ctime_nsec() as u32,
            mtime: metadata.mtime() as u32,
            mtime_nsec: metadata.mtime_nsec() as u32,
            dev: metadata.dev() as u32,
            ino: metadata.ino() as u32,
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size() as u32,
        })
    }
}

/// One tracked file in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the repository root, POSIX separators
    pub name: PathBuf,
    /// Content hash of the staged blob
    pub oid: ObjectId,
    pub metadata: EntryMetadata,
    pub flags: EntryFlags,
    /// Present only when `flags.is_extended()` and the index is v3
    pub extended_flags: Option<ExtendedFlags>,
}

impl IndexEntry {
    /// Build a stage-0 entry for a freshly hashed file
    pub fn create(name: PathBuf, oid: ObjectId, metadata: EntryMetadata) -> Self {
        let path_length = name.as_os_str().len();
        IndexEntry {
            name,
            oid,
            metadata,
            flags: EntryFlags::for_path_length(path_length),
            extended_flags: None,
        }
    }

    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("entry name {:?}", self.name)).into())
    }

    /// Parent directories from outermost to innermost, excluding the
    /// repository root itself
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs = Vec::new();
        let mut parent = self.name.parent();

        while let Some(dir) = parent {
            if !dir.as_os_str().is_empty() {
                dirs.push(dir);
            }
            parent = dir.parent();
        }
        dirs.reverse();

        dirs
    }

    /// True when size and mode agree with a fresh stat
    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    /// True when the file still lives on the same device and inode
    pub fn inode_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.dev == other.dev && self.metadata.ino == other.ino
    }

    /// True when all four timestamp fields agree with a fresh stat
    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }

    /// Serialize the entry record, padded to an 8-byte boundary
    pub fn serialize(&self, version: u32) -> anyhow::Result<Bytes> {
        let entry_name = self
            .name
            .to_str()
            .ok_or_else(|| Error::InvalidInput(format!("entry name {:?}", self.name)))?;

        let mut entry_bytes = Vec::new();
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size)?;
        self.oid.write_raw_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(self.flags.bits())?;

        if version >= 3 && self.flags.is_extended() {
            let extended = self.extended_flags.unwrap_or_default();
            entry_bytes.write_u16::<byteorder::NetworkEndian>(extended.bits())?;
        }

        entry_bytes.write_all(entry_name.as_bytes())?;

        // at least one NUL terminator, then pad to the 8-byte block
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }

    /// Parse one aligned entry record
    pub fn deserialize(bytes: &[u8], version: u32) -> anyhow::Result<Self> {
        if bytes.len() < ENTRY_PREFIX_SIZE + 2 {
            return Err(Error::Corrupt("index entry truncated".into()).into());
        }

        let ctime = byteorder::NetworkEndian::read_u32(&bytes[0..4]);
        let ctime_nsec = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        let mtime = byteorder::NetworkEndian::read_u32(&bytes[8..12]);
        let mtime_nsec = byteorder::NetworkEndian::read_u32(&bytes[12..16]);
        let dev = byteorder::NetworkEndian::read_u32(&bytes[16..20]);
        let ino = byteorder::NetworkEndian::read_u32(&bytes[20..24]);
        let mode = EntryMode::from_u32(byteorder::NetworkEndian::read_u32(&bytes[24..28]))?;
        let uid = byteorder::NetworkEndian::read_u32(&bytes[28..32]);
        let gid = byteorder::NetworkEndian::read_u32(&bytes[32..36]);
        let size = byteorder::NetworkEndian::read_u32(&bytes[36..40]);
        let mut oid_reader = &bytes[40..60];
        let oid = ObjectId::read_raw_from(&mut oid_reader)?;
        let flags = EntryFlags::from_bits(byteorder::NetworkEndian::read_u16(&bytes[60..62]));

        let mut path_start = ENTRY_PREFIX_SIZE;
        let extended_flags = if version >= 3 && flags.is_extended() {
            if bytes.len() < path_start + 2 {
                return Err(Error::Corrupt("index entry extended flags truncated".into()).into());
            }
            let word = byteorder::NetworkEndian::read_u16(&bytes[path_start..path_start + 2]);
            path_start += 2;
            Some(ExtendedFlags::from_bits_truncate(word))
        } else {
            None
        };

        let path_end = bytes[path_start..]
            .iter()
            .position(|&b| b == 0)
            .map(|offset| path_start + offset)
            .ok_or_else(|| Error::Corrupt("index entry path missing terminator".into()))?;
        let name = std::str::from_utf8(&bytes[path_start..path_end])
            .map_err(|_| Error::Corrupt("index entry path is not utf-8".into()))?;

        // everything past the terminator is alignment padding
        if bytes[path_end..].iter().any(|&b| b != 0) {
            return Err(Error::Corrupt("index entry padding is not zero".into()).into());
        }

        Ok(IndexEntry {
            name: PathBuf::from(name),
            oid,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
            flags,
            extended_flags,
        })
    }
}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}
