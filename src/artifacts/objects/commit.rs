//! Commit object
//!
//! ## Format
//!
//! On disk, after the `commit <size>\0` frame:
//! ```text
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//! gpgsig <first signature line>
//!  <continuation lines, each prefixed with one space>
//!
//! <commit message>
//! ```
//! `parent` may repeat (merges) or be absent (root commits). `tree`,
//! `author` and `committer` appear exactly once.

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::error::Error;
use anyhow::Context;
use bytes::Bytes;
use std::io::{BufRead, Write};

const PGP_SIGNATURE_END: &str = "-----END PGP SIGNATURE-----";

/// Author or committer identity with timestamp
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Author {
    /// Identity stamped with the current local time
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    /// Identity from `GIT_AUTHOR_NAME` / `GIT_AUTHOR_EMAIL`, with an
    /// optional `GIT_AUTHOR_DATE` override
    pub fn load_from_env() -> anyhow::Result<Self> {
        let name = std::env::var("GIT_AUTHOR_NAME").context("GIT_AUTHOR_NAME not set")?;
        let email = std::env::var("GIT_AUTHOR_EMAIL").context("GIT_AUTHOR_EMAIL not set")?;
        let timestamp = std::env::var("GIT_AUTHOR_DATE").ok().and_then(|date| {
            chrono::DateTime::parse_from_rfc2822(&date)
                .or_else(|_| chrono::DateTime::parse_from_str(&date, "%Y-%m-%d %H:%M:%S %z"))
                .ok()
        });

        match timestamp {
            Some(ts) => Ok(Author::new_with_timestamp(name, email, ts)),
            None => Ok(Author::new(name, email)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }

    /// Identity line as written into commits and tags:
    /// `"<name> <<email>> <unix_time> <±HHMM>"`
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    /// Parse an identity line by splitting on the angle brackets, then
    /// taking the two space-separated tokens that follow
    fn try_from(value: &str) -> anyhow::Result<Self> {
        let email_start = value
            .find('<')
            .ok_or_else(|| Error::InvalidInput(format!("identity line missing '<': {value:?}")))?;
        let email_end = value
            .find('>')
            .ok_or_else(|| Error::InvalidInput(format!("identity line missing '>': {value:?}")))?;
        if email_end < email_start {
            return Err(Error::InvalidInput(format!("identity line brackets: {value:?}")).into());
        }

        let name = value[..email_start].trim().to_string();
        let email = value[email_start + 1..email_end].to_string();

        let mut rest = value[email_end + 1..].split_whitespace();
        let unix_time = rest
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| Error::InvalidInput(format!("identity timestamp: {value:?}")))?;
        let zone = rest
            .next()
            .ok_or_else(|| Error::InvalidInput(format!("identity timezone: {value:?}")))?;

        let offset = parse_timezone(zone)?;
        let timestamp = chrono::DateTime::from_timestamp(unix_time, 0)
            .ok_or_else(|| Error::InvalidInput(format!("identity timestamp: {value:?}")))?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp,
        })
    }
}

/// Parse a `±HHMM` timezone token
fn parse_timezone(zone: &str) -> anyhow::Result<chrono::FixedOffset> {
    let invalid = || Error::InvalidInput(format!("timezone token {zone:?}"));

    if zone.len() != 5 {
        return Err(invalid().into());
    }
    let sign = match &zone[..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(invalid().into()),
    };
    let hours: i32 = zone[1..3].parse().map_err(|_| invalid())?;
    let minutes: i32 = zone[3..5].parse().map_err(|_| invalid())?;

    chrono::FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| invalid().into())
}

/// Commit object
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Parent commit names (empty for root commits, several for merges)
    parents: Vec<ObjectId>,
    /// Tree snapshot the commit records
    tree_oid: ObjectId,
    author: Author,
    committer: Author,
    /// Detached PGP signature block, without the `gpgsig ` key or the
    /// continuation indentation
    gpgsig: Option<String>,
    message: String,
}

impl Commit {
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Author,
        committer: Author,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            author,
            committer,
            gpgsig: None,
            message,
        }
    }

    pub fn with_signature(mut self, gpgsig: String) -> Self {
        self.gpgsig = Some(gpgsig);
        self
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn gpgsig(&self) -> Option<&str> {
        self.gpgsig.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// First line of the message
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    fn content_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("tree {}", self.tree_oid)];
        for parent in &self.parents {
            lines.push(format!("parent {parent}"));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));
        if let Some(signature) = &self.gpgsig {
            let mut signature_lines = signature.lines();
            if let Some(first) = signature_lines.next() {
                lines.push(format!("gpgsig {first}"));
            }
            for continuation in signature_lines {
                lines.push(format!(" {continuation}"));
            }
        }
        lines.push(String::new());
        lines.push(self.message.clone());
        lines
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let content = self.content_lines().join("\n");

        let mut commit_bytes = Vec::with_capacity(content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content.len());
        commit_bytes.write_all(header.as_bytes())?;
        commit_bytes.write_all(content.as_bytes())?;

        Ok(Bytes::from(commit_bytes))
    }
}

impl Unpackable for Commit {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        let content = String::from_utf8(content)
            .map_err(|_| Error::Corrupt("commit payload is not utf-8".into()))?;

        let lines: Vec<&str> = content.split('\n').collect();

        let mut tree_oid = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut gpgsig = None;

        let mut cursor = 0;
        while cursor < lines.len() {
            let line = lines[cursor];
            cursor += 1;

            if line.is_empty() {
                break; // headers end at the first blank line
            }

            if let Some(value) = line.strip_prefix("tree ") {
                if tree_oid.is_some() {
                    return Err(Error::InvalidInput("duplicate tree header".into()).into());
                }
                tree_oid = Some(ObjectId::try_parse(value)?);
            } else if let Some(value) = line.strip_prefix("parent ") {
                parents.push(ObjectId::try_parse(value)?);
            } else if let Some(value) = line.strip_prefix("author ") {
                if author.is_some() {
                    return Err(Error::InvalidInput("duplicate author header".into()).into());
                }
                author = Some(Author::try_from(value)?);
            } else if let Some(value) = line.strip_prefix("committer ") {
                if committer.is_some() {
                    return Err(Error::InvalidInput("duplicate committer header".into()).into());
                }
                committer = Some(Author::try_from(value)?);
            } else if let Some(value) = line.strip_prefix("gpgsig ") {
                let mut signature = vec![value.to_string()];
                // continuation lines carry a single leading space
                while cursor < lines.len()
                    && let Some(continuation) = lines[cursor].strip_prefix(' ')
                {
                    signature.push(continuation.to_string());
                    cursor += 1;
                    if continuation == PGP_SIGNATURE_END {
                        break;
                    }
                }
                gpgsig = Some(signature.join("\n"));
            } else {
                return Err(Error::Corrupt(format!("commit header line {line:?}")).into());
            }
        }

        let message = lines[cursor..].join("\n");

        let commit = Commit {
            parents,
            tree_oid: tree_oid
                .ok_or_else(|| Error::InvalidInput("commit missing tree header".into()))?,
            author: author
                .ok_or_else(|| Error::InvalidInput("commit missing author header".into()))?,
            committer: committer
                .ok_or_else(|| Error::InvalidInput("commit missing committer header".into()))?,
            gpgsig,
            message,
        };
        Ok(commit)
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn author() -> Author {
        Author::try_from("A <a@x> 1700000000 +0000").unwrap()
    }

    #[fixture]
    fn tree_oid() -> ObjectId {
        ObjectId::try_parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap()
    }

    #[rstest]
    fn identity_line_round_trips(author: Author) {
        assert_eq!(author.name(), "A");
        assert_eq!(author.email(), "a@x");
        assert_eq!(author.display(), "A <a@x> 1700000000 +0000");
    }

    #[rstest]
    #[case("no brackets at all 1700000000 +0000")]
    #[case("A <a@x> notatime +0000")]
    #[case("A <a@x> 1700000000 somewhere")]
    fn malformed_identity_lines_are_rejected(#[case] line: &str) {
        let err = Author::try_from(line).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidInput(_))
        ));
    }

    #[rstest]
    fn serializes_headers_in_canonical_order(author: Author, tree_oid: ObjectId) {
        let parent =
            ObjectId::try_parse("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let commit = Commit::new(
            vec![parent],
            tree_oid,
            author.clone(),
            author,
            "subject\n\nbody".to_string(),
        );

        let serialized = commit.serialize().unwrap();
        let text = std::str::from_utf8(&serialized).unwrap();
        let payload = text.split_once('\0').unwrap().1;

        assert_eq!(
            payload,
            "tree aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n\
             parent bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n\
             author A <a@x> 1700000000 +0000\n\
             committer A <a@x> 1700000000 +0000\n\
             \n\
             subject\n\nbody"
        );
    }

    #[rstest]
    fn round_trips_through_deserialize(author: Author, tree_oid: ObjectId) {
        let commit = Commit::new(vec![], tree_oid, author.clone(), author, "msg".into());
        let serialized = commit.serialize().unwrap();
        let payload = serialized
            .iter()
            .position(|&b| b == 0)
            .map(|i| serialized.slice(i + 1..))
            .unwrap();

        let parsed = Commit::deserialize(std::io::Cursor::new(payload.to_vec())).unwrap();
        assert_eq!(parsed, commit);
    }

    #[rstest]
    fn parses_a_multiline_signature(author: Author, tree_oid: ObjectId) {
        let signature = "-----BEGIN PGP SIGNATURE-----\n\
                         iQEzBAABCAAdFiEE\n\
                         =AbCd\n\
                         -----END PGP SIGNATURE-----";
        let commit = Commit::new(vec![], tree_oid, author.clone(), author, "signed".into())
            .with_signature(signature.to_string());

        let serialized = commit.serialize().unwrap();
        let payload = serialized
            .iter()
            .position(|&b| b == 0)
            .map(|i| serialized.slice(i + 1..))
            .unwrap();
        let parsed = Commit::deserialize(std::io::Cursor::new(payload.to_vec())).unwrap();

        assert_eq!(parsed.gpgsig(), Some(signature));
        assert_eq!(parsed.message(), "signed");
    }

    #[rstest]
    fn duplicate_committer_is_invalid(author: Author, tree_oid: ObjectId) {
        let payload = format!(
            "tree {tree_oid}\n\
             author {}\n\
             committer {}\n\
             committer {}\n\
             \n\
             msg",
            author.display(),
            author.display(),
            author.display()
        );

        let err = Commit::deserialize(std::io::Cursor::new(payload.into_bytes())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidInput(_))
        ));
    }
}
