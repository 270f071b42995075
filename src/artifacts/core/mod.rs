//! Shared low-level utilities
//!
//! - `hash`: SHA-1 over framed object payloads, including stream-based
//!   file hashing
//! - `zlib`: streaming zlib wrappers used by the loose store and the
//!   pack reader

pub mod hash;
pub mod zlib;

/// Fixed staging buffer size for streaming I/O
pub const STAGING_BUFFER_SIZE: usize = 4096;
