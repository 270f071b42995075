//! Annotated tag object
//!
//! ## Format
//!
//! On disk, after the `tag <size>\0` frame:
//! ```text
//! object <sha>
//! type <object-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <tag message>
//! ```

use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::error::Error;
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Write};

/// Annotated tag pointing at another object
#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct Tag {
    /// Name of the tagged object
    object_oid: ObjectId,
    /// Type of the tagged object
    target_type: ObjectType,
    /// Tag name (e.g. `v1.0.0`)
    name: String,
    tagger: Author,
    message: String,
}

impl Tag {
    pub fn object_oid(&self) -> &ObjectId {
        &self.object_oid
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Author {
        &self.tagger
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let content = [
            format!("object {}", self.object_oid),
            format!("type {}", self.target_type.as_str()),
            format!("tag {}", self.name),
            format!("tagger {}", self.tagger.display()),
            String::new(),
            self.message.clone(),
        ]
        .join("\n");

        let mut tag_bytes = Vec::with_capacity(content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content.len());
        tag_bytes.write_all(header.as_bytes())?;
        tag_bytes.write_all(content.as_bytes())?;

        Ok(Bytes::from(tag_bytes))
    }
}

impl Unpackable for Tag {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        let content = String::from_utf8(content)
            .map_err(|_| Error::Corrupt("tag payload is not utf-8".into()))?;

        let lines: Vec<&str> = content.split('\n').collect();

        let mut object_oid = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        let mut cursor = 0;
        while cursor < lines.len() {
            let line = lines[cursor];
            cursor += 1;

            if line.is_empty() {
                break;
            }

            if let Some(value) = line.strip_prefix("object ") {
                if object_oid.is_some() {
                    return Err(Error::InvalidInput("duplicate object header".into()).into());
                }
                object_oid = Some(ObjectId::try_parse(value)?);
            } else if let Some(value) = line.strip_prefix("type ") {
                if target_type.is_some() {
                    return Err(Error::InvalidInput("duplicate type header".into()).into());
                }
                target_type = Some(ObjectType::try_from(value)?);
            } else if let Some(value) = line.strip_prefix("tag ") {
                if name.is_some() {
                    return Err(Error::InvalidInput("duplicate tag header".into()).into());
                }
                name = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("tagger ") {
                if tagger.is_some() {
                    return Err(Error::InvalidInput("duplicate tagger header".into()).into());
                }
                tagger = Some(Author::try_from(value)?);
            } else {
                return Err(Error::Corrupt(format!("tag header line {line:?}")).into());
            }
        }

        let message = lines[cursor..].join("\n");

        Ok(Tag {
            object_oid: object_oid
                .ok_or_else(|| Error::InvalidInput("tag missing object header".into()))?,
            target_type: target_type
                .ok_or_else(|| Error::InvalidInput("tag missing type header".into()))?,
            name: name.ok_or_else(|| Error::InvalidInput("tag missing tag header".into()))?,
            tagger: tagger
                .ok_or_else(|| Error::InvalidInput("tag missing tagger header".into()))?,
            message,
        })
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }
}
