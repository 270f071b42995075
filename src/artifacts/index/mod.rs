//! Binary index file format
//!
//! The index (staging area) tracks the files composing the next
//! commit. Byte-precise and endian-strict:
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 or 3 (4 bytes, big-endian)
//!   - Entry count (4 bytes, big-endian)
//!
//! Entries (variable length):
//!   - Sorted by path, each record NUL-padded to 8-byte alignment
//!
//! Checksum (20 bytes):
//!   - SHA-1 of all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of the SHA-1 trailer in bytes
pub const CHECKSUM_SIZE: usize = 20;

/// Size of the index header in bytes
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files
pub const SIGNATURE: &str = "DIRC";

/// Version written for fresh indexes
pub const DEFAULT_VERSION: u32 = 2;

/// Highest version the reader accepts
pub const MAX_VERSION: u32 = 3;

/// Alignment block for entry records
pub const ENTRY_BLOCK: usize = 8;

/// Fixed prefix before the optional extended flags and the path
pub const ENTRY_PREFIX_SIZE: usize = 62;

/// Smallest possible aligned entry record
pub const ENTRY_MIN_SIZE: usize = 64;
