//! Path resolution for diff headers and preambles.
//!
//! Diff dialects identify their target through a before/after pair of
//! paths where the sentinel `/dev/null` marks creation or deletion, and
//! through `patch -pN` style strip levels that drop leading path
//! components before use.

use serde::Serialize;

use crate::error::{PatchError, Result};

pub const DEV_NULL: &str = "/dev/null";

/// A before/after pair, the shape shared by every header dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeforeAfter<T> {
    pub before: T,
    pub after: T,
}

impl<T> BeforeAfter<T> {
    pub fn new(before: T, after: T) -> Self {
        Self { before, after }
    }
}

/// A path plus the optional timestamp that `---`/`+++`/`***` lines carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAndTimestamp {
    pub path: String,
    pub timestamp: Option<String>,
}

/// Anything that can stand in a before/after slot and yield a path.
pub trait HasPath {
    fn path(&self) -> &str;
}

impl HasPath for String {
    fn path(&self) -> &str {
        self
    }
}

impl HasPath for PathAndTimestamp {
    fn path(&self) -> &str {
        &self.path
    }
}

/// The semantic effect of applying a diff to its target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffOutcome {
    Created,
    Modified,
    Deleted,
}

/// Per-file status as shown by `patch --dry-run` style listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    Added,
    Extant,
    Deleted,
}

impl FileStatus {
    /// One-character marker used in listings (`+`, ` `, `-`).
    pub fn marker(&self) -> char {
        match self {
            Self::Added => '+',
            Self::Extant => ' ',
            Self::Deleted => '-',
        }
    }
}

/// A resolved target path with its status and, for rename/copy targets,
/// the path the content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePathPlus {
    pub path: String,
    pub status: FileStatus,
    pub expath: Option<String>,
}

impl FilePathPlus {
    /// Resolve a pair into a path and status, or `None` when both sides
    /// are null.
    pub fn from_pair<T: HasPath>(pair: &BeforeAfter<T>, strip_level: usize) -> Option<Self> {
        let before = pair.before.path();
        let after = pair.after.path();
        if is_non_null(after) {
            let status = if is_non_null(before) {
                FileStatus::Extant
            } else {
                FileStatus::Added
            };
            let path = strip_path(after, strip_level).ok()?;
            Some(Self {
                path,
                status,
                expath: None,
            })
        } else if is_non_null(before) {
            let path = strip_path(before, strip_level).ok()?;
            Some(Self {
                path,
                status: FileStatus::Deleted,
                expath: None,
            })
        } else {
            None
        }
    }
}

/// True for a usable path: non-empty and not the `/dev/null` sentinel.
pub fn is_non_null(path: &str) -> bool {
    !path.is_empty() && path != DEV_NULL
}

/// Drop the first `level` components from a relative path.
///
/// Absolute paths are returned unchanged, as are all paths at level 0.
pub fn strip_path(path: &str, level: usize) -> Result<String> {
    if level == 0 || path.starts_with('/') {
        return Ok(path.to_string());
    }
    match path.splitn(level + 1, '/').nth(level) {
        Some(rest) if !rest.is_empty() => Ok(rest.to_string()),
        _ => Err(PatchError::TooManyStripLevels {
            path: path.to_string(),
            level,
        }),
    }
}

/// The path a pair applies to: the after path if it is non-null, else the
/// before path, else `None`.
pub fn file_path_of_pair<T: HasPath>(pair: &BeforeAfter<T>, strip_level: usize) -> Option<String> {
    for candidate in [pair.after.path(), pair.before.path()] {
        if is_non_null(candidate) {
            return strip_path(candidate, strip_level).ok();
        }
    }
    None
}

/// The outcome a pair implies, from its `/dev/null` sides.
pub fn outcome_of_pair<T: HasPath>(pair: &BeforeAfter<T>) -> DiffOutcome {
    if pair.after.path() == DEV_NULL {
        DiffOutcome::Deleted
    } else if pair.before.path() == DEV_NULL {
        DiffOutcome::Created
    } else {
        DiffOutcome::Modified
    }
}

/// Whether the pair's two paths agree after one level of stripping.
///
/// `None` when either side is null and the question cannot be answered.
pub fn pair_consistent_with_strip_one<T: HasPath>(pair: &BeforeAfter<T>) -> Option<bool> {
    let before = pair.before.path();
    let after = pair.after.path();
    if !is_non_null(before) || !is_non_null(after) {
        return None;
    }
    match (strip_path(before, 1), strip_path(after, 1)) {
        (Ok(b), Ok(a)) => Some(b == a),
        _ => Some(false),
    }
}
