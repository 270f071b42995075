//! First-class object types
//!
//! Pack files additionally encode two delta tags; those never escape
//! the pack layer (see `artifacts::pack`), so this enum only carries
//! the four types an object can have after delta resolution.

use crate::error::Error;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    /// Consume a framed header `"<type> <size>\0"` from a reader
    ///
    /// Returns the type tag and the declared payload size.
    pub fn parse_framed_header(
        reader: &mut impl BufRead,
    ) -> anyhow::Result<(ObjectType, u64)> {
        let mut type_bytes = Vec::new();
        reader.read_until(b' ', &mut type_bytes)?;
        if type_bytes.pop() != Some(b' ') {
            return Err(Error::Corrupt("object header missing type delimiter".into()).into());
        }

        let mut size_bytes = Vec::new();
        reader.read_until(b'\0', &mut size_bytes)?;
        if size_bytes.pop() != Some(b'\0') {
            return Err(Error::Corrupt("object header missing size terminator".into()).into());
        }

        let object_type = std::str::from_utf8(&type_bytes)
            .map_err(|_| Error::Corrupt("object header type is not ascii".into()))?;
        let object_type = ObjectType::try_from(object_type)?;

        let size = std::str::from_utf8(&size_bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::Corrupt("object header size is not a number".into()))?;

        Ok((object_type, size))
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(Error::Unsupported(format!("object type {value:?}")).into()),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
