//! Pack storage format
//!
//! A pack is a concatenation of compressed objects with a central
//! index. This module reads both halves:
//!
//! - `pack_file`: the `.pack` stream of entries (header, objects,
//!   SHA-1 trailer)
//! - `pack_index`: the `.idx` fanout + binary-search lookup
//! - `delta`: copy/insert delta application and chain resolution
//!
//! Pack creation is out of scope; only reading is implemented.

pub mod delta;
pub mod pack_file;
pub mod pack_index;

/// Magic bytes opening every pack file
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// The only pack version the reader accepts
pub const PACK_VERSION: u32 = 2;

/// Pack header size: magic, version, object count
pub const PACK_HEADER_SIZE: u64 = 12;

/// SHA-1 trailer size
pub const PACK_TRAILER_SIZE: u64 = 20;
