//! References (branches, HEAD, tags)
//!
//! A ref is a named pointer: either directly to an object name, or
//! symbolically to another ref. On disk each ref is a one-line text
//! file containing `"<40-hex>\n"` or `"ref: <refname>\n"`.
//!
//! ## Name expansion
//!
//! `HEAD` and anything under `refs/` pass through unchanged; a bare
//! name with no `/` expands to `refs/heads/<name>`; everything else
//! is rejected as an invalid ref.

use crate::artifacts::objects::object_id::ObjectId;
use crate::error::Error;
use anyhow::Context;
use derive_new::new;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Prefix all branch refs live under
pub const HEADS_PREFIX: &str = "refs/heads/";

/// Symbolic chain bound, to stop ref cycles
const MAX_SYMREF_DEPTH: usize = 10;

/// Value read from a ref file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// Points at another ref by full name
    Symbolic(String),
    /// Points directly at an object
    Direct(ObjectId),
}

/// Reference store rooted at the repository metadata directory
#[derive(Debug, new)]
pub struct Refs {
    /// Path to the metadata directory (typically `.git`)
    path: Box<Path>,
}

/// Expand a short ref name to its full form
///
/// `HEAD` and `refs/...` names stay as-is; a bare name becomes
/// `refs/heads/<name>`; anything else cannot be expanded.
pub fn expand_ref_name(name: &str) -> anyhow::Result<String> {
    if name == HEAD_REF_NAME || name.starts_with("refs/") {
        return Ok(name.to_string());
    }
    if !name.is_empty() && !name.contains('/') && is_valid_ref_component(name) {
        return Ok(format!("{HEADS_PREFIX}{name}"));
    }
    Err(Error::InvalidRef(name.to_string()).into())
}

/// Component rules shared with branch creation: no leading dot, no
/// `..`, no control characters, no `.lock` suffix, none of Git's
/// forbidden punctuation
fn is_valid_ref_component(component: &str) -> bool {
    !component.is_empty()
        && !component.starts_with('.')
        && !component.ends_with(".lock")
        && !component.contains("..")
        && !component.contains("@{")
        && !component
            .chars()
            .any(|c| c.is_control() || " *:?[\\^~".contains(c))
}

impl Refs {
    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    /// Read and classify one ref file; a missing file is `None`
    pub fn read(&self, name: &str) -> anyhow::Result<Option<RefValue>> {
        let ref_path = self.path.join(expand_ref_name(name)?);
        self.read_ref_file(&ref_path)
    }

    fn read_ref_file(&self, ref_path: &Path) -> anyhow::Result<Option<RefValue>> {
        if !ref_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(ref_path)
            .with_context(|| format!("unable to read ref file {}", ref_path.display()))?;
        let content = content.trim_end_matches('\n');

        if content.is_empty() {
            return Ok(None);
        }

        if let Some(target) = content.strip_prefix("ref: ") {
            return Ok(Some(RefValue::Symbolic(target.to_string())));
        }

        let oid = ObjectId::try_parse(content).map_err(|_| {
            Error::Corrupt(format!("ref file {} content", ref_path.display()))
        })?;
        Ok(Some(RefValue::Direct(oid)))
    }

    /// Follow the symbolic chain from `name` to an object name
    ///
    /// A missing terminal ref is `None` (an unborn branch); a chain
    /// longer than the depth bound fails.
    pub fn resolve(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        let mut current = expand_ref_name(name)?;

        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.read(&current)? {
                None => return Ok(None),
                Some(RefValue::Direct(oid)) => return Ok(Some(oid)),
                Some(RefValue::Symbolic(target)) => current = target,
            }
        }

        Err(Error::DepthExceeded(format!(
            "symbolic ref chain from {name} exceeds {MAX_SYMREF_DEPTH}"
        ))
        .into())
    }

    /// Rewrite one ref file atomically
    ///
    /// Symbolic targets are expanded and stored as `"ref: <name>\n"`;
    /// direct targets as the 40-hex line.
    pub fn update(&self, name: &str, target: &RefValue) -> anyhow::Result<()> {
        let content = match target {
            RefValue::Symbolic(target_name) => {
                format!("ref: {}\n", expand_ref_name(target_name)?)
            }
            RefValue::Direct(oid) => format!("{oid}\n"),
        };

        let ref_path = self.path.join(expand_ref_name(name)?);
        self.write_ref_file(&ref_path, &content)
    }

    /// Temp-file + rename so readers never observe a partial line
    fn write_ref_file(&self, ref_path: &Path, content: &str) -> anyhow::Result<()> {
        let parent = ref_path
            .parent()
            .with_context(|| format!("invalid ref path {}", ref_path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("unable to create ref directory {}", parent.display()))?;

        let temp_path = parent.join(format!("tmp-ref-{}", std::process::id()));
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("unable to open {}", temp_path.display()))?;
        file.write_all(content.as_bytes())?;
        std::fs::rename(&temp_path, ref_path)
            .with_context(|| format!("unable to rename into {}", ref_path.display()))?;

        debug!(path = %ref_path.display(), "updated ref");
        Ok(())
    }

    /// Object name HEAD resolves to, if any
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.resolve(HEAD_REF_NAME)
    }

    /// Advance HEAD (or the branch it points at) to a new commit
    ///
    /// A symbolic HEAD is followed to its terminal ref and that file
    /// is rewritten; a detached HEAD is rewritten in place.
    pub fn update_head(&self, oid: ObjectId) -> anyhow::Result<()> {
        let mut current = HEAD_REF_NAME.to_string();

        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.read(&current)? {
                Some(RefValue::Symbolic(target)) => current = target,
                Some(RefValue::Direct(_)) | None => {
                    return self.update(&current, &RefValue::Direct(oid));
                }
            }
        }

        Err(Error::DepthExceeded(format!(
            "symbolic ref chain from HEAD exceeds {MAX_SYMREF_DEPTH}"
        ))
        .into())
    }

    /// The ref name HEAD points at, `None` when detached
    ///
    /// Returns the short branch name for targets under `refs/heads/`;
    /// any other symbolic target is returned as its full ref name,
    /// never partially stripped.
    pub fn current_head_ref(&self) -> anyhow::Result<Option<String>> {
        match self.read(HEAD_REF_NAME)? {
            Some(RefValue::Symbolic(target)) => match target.strip_prefix(HEADS_PREFIX) {
                Some(branch) => Ok(Some(branch.to_string())),
                None => Ok(Some(target)),
            },
            Some(RefValue::Direct(_)) | None => Ok(None),
        }
    }

    /// Enumerate branch refs, sorted lexicographically
    pub fn list_heads(&self) -> anyhow::Result<Vec<String>> {
        self.list_refs_under(&self.heads_path())
    }

    /// Enumerate every ref under `refs/`, sorted lexicographically
    pub fn list_all(&self) -> anyhow::Result<Vec<String>> {
        self.list_refs_under(&self.refs_path())
    }

    fn list_refs_under(&self, root: &Path) -> anyhow::Result<Vec<String>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(self.path.as_ref()).ok()?;
                Some(relative.to_string_lossy().to_string())
            })
            .collect();

        names.sort();
        Ok(names)
    }

    /// Map every object name to the refs that point at it
    pub fn reverse_refs(&self) -> anyhow::Result<HashMap<ObjectId, Vec<String>>> {
        let mut reverse: HashMap<ObjectId, Vec<String>> = HashMap::new();

        for name in self
            .list_all()?
            .into_iter()
            .chain(std::iter::once(HEAD_REF_NAME.to_string()))
        {
            if let Some(oid) = self.resolve(&name)? {
                reverse.entry(oid).or_default().push(name);
            }
        }

        Ok(reverse)
    }

    /// Create a branch ref pointing at an existing commit
    pub fn create_branch(&self, name: &str, oid: ObjectId) -> anyhow::Result<()> {
        if name.split('/').any(|component| !is_valid_ref_component(component)) {
            return Err(Error::InvalidRef(name.to_string()).into());
        }

        let branch_path = self.heads_path().join(name);
        if branch_path.exists() {
            return Err(Error::InvalidInput(format!("branch {name} already exists")).into());
        }

        self.write_ref_file(&branch_path, &format!("{oid}\n"))
    }

    /// Delete a branch ref, pruning directories it leaves empty
    pub fn delete_branch(&self, name: &str) -> anyhow::Result<ObjectId> {
        let branch_path = self.heads_path().join(name);
        let oid = self
            .read_ref_file(&branch_path)?
            .and_then(|value| match value {
                RefValue::Direct(oid) => Some(oid),
                RefValue::Symbolic(_) => None,
            })
            .ok_or_else(|| Error::NotFound(format!("branch {name}")))?;

        std::fs::remove_file(&branch_path)
            .with_context(|| format!("unable to delete branch file {}", branch_path.display()))?;
        self.prune_empty_parent_dirs(&branch_path)?;

        Ok(oid)
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && parent != self.heads_path().as_path()
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)
                .with_context(|| format!("unable to remove {}", parent.display()))?;
            self.prune_empty_parent_dirs(parent)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("HEAD", "HEAD")]
    #[case("refs/heads/main", "refs/heads/main")]
    #[case("refs/tags/v1", "refs/tags/v1")]
    #[case("main", "refs/heads/main")]
    #[case("topic-1", "refs/heads/topic-1")]
    fn expansion_rules(#[case] short: &str, #[case] full: &str) {
        assert_eq!(expand_ref_name(short).unwrap(), full);
    }

    #[rstest]
    #[case("")]
    #[case("feature/nested")]
    #[case("..")]
    #[case("name.lock")]
    #[case("with space")]
    fn unexpandable_names_are_invalid(#[case] name: &str) {
        let err = expand_ref_name(name).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidRef(_))
        ));
    }

    proptest! {
        #[test]
        fn alphanumeric_names_always_expand(name in "[a-zA-Z0-9_-]{1,30}") {
            prop_assert!(expand_ref_name(&name).is_ok());
        }

        #[test]
        fn control_characters_never_expand(name in "[a-z]{1,5}\x01[a-z]{1,5}") {
            prop_assert!(expand_ref_name(&name).is_err());
        }
    }
}
