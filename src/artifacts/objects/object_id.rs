//! Object identifier (SHA-1 name)
//!
//! An object name is the 20-byte SHA-1 digest of the framed object.
//! The binary form is the canonical one: ordering is bytewise, which
//! is what the pack index binary search relies on. The text form is
//! lowercase 40-hex.
//!
//! ## Storage
//!
//! Loose objects live at `objects/<first-2-hex>/<remaining-38-hex>`.

use crate::error::Error;
use std::io;
use std::path::PathBuf;

/// Length of a raw object name in bytes
pub const OBJECT_ID_RAW_LENGTH: usize = 20;

/// Length of an object name in hex characters
pub const OBJECT_ID_HEX_LENGTH: usize = 40;

/// 20-byte SHA-1 object name
///
/// Ordered by byte comparison; displayed as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_RAW_LENGTH]);

impl ObjectId {
    /// Wrap a raw 20-byte digest
    pub fn from_raw(bytes: [u8; OBJECT_ID_RAW_LENGTH]) -> Self {
        ObjectId(bytes)
    }

    /// Parse and validate a 40-hex object name
    pub fn try_parse(hex: &str) -> anyhow::Result<Self> {
        if hex.len() != OBJECT_ID_HEX_LENGTH {
            return Err(
                Error::InvalidInput(format!("object id length {}", hex.len())).into(),
            );
        }

        let mut bytes = [0u8; OBJECT_ID_RAW_LENGTH];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
                Error::InvalidInput(format!("object id hex digits in {hex:?}"))
            })?;
        }

        Ok(ObjectId(bytes))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_RAW_LENGTH] {
        &self.0
    }

    /// Lowercase 40-hex form
    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(OBJECT_ID_HEX_LENGTH);
        for byte in &self.0 {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    /// Write the raw 20 bytes
    ///
    /// Used when serializing tree rows and binary index entries.
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }

    /// Read a raw 20-byte object name
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut bytes = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut bytes)?;
        Ok(ObjectId(bytes))
    }

    /// Loose storage path: `XX/YYYY...` split after the first hex pair
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Abbreviated form (first 7 hex characters)
    pub fn to_short_oid(&self) -> String {
        self.to_hex().split_at(7).0.to_string()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
