//! The format-neutral diff model.
//!
//! A diff is one of three dialects — unified, context, or a Git binary
//! patch — modelled as a sum type so every operation that does not care
//! about the dialect (serialisation, statistics, path resolution,
//! conversion to abstract hunks) dispatches in one place. The dispatch
//! parser tries the dialects in order of how often they occur in the
//! wild: unified, git binary, context.

use regex::Regex;

use crate::context::ContextDiff;
use crate::diffstat::DiffStats;
use crate::error::{PatchError, Result};
use crate::git_binary::GitBinaryDiff;
use crate::lines::line_content;
use crate::merge::AbstractDiff;
use crate::paths::{
    file_path_of_pair, outcome_of_pair, BeforeAfter, DiffOutcome, FilePathPlus, PathAndTimestamp,
};
use crate::unified::UnifiedDiff;

// ---------------------------------------------------------------------------
// Shared regex fragments
// ---------------------------------------------------------------------------

/// A path token: quoted with arbitrary interior whitespace, or bare up
/// to the first whitespace.
pub(crate) const PATH_RE_STR: &str = r#"(?:"(?P<qpath>[^"]+)"|(?P<path>\S+))"#;

/// The two accepted timestamp shapes: ISO-like with optional
/// nanoseconds, or the `ctime(3)` shape, both with a timezone offset.
pub(crate) const EITHER_TS_RE_STR: &str = r"(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d{9})? [-+]\d{4}|[A-Z][a-z]{2} [A-Z][a-z]{2} \d{2} \d{2}:\d{2}:\d{2} \d{4} [-+]\d{4})";

/// Extract a path (+ optional timestamp) from `lines[index]` using a
/// file-data regex built around [`PATH_RE_STR`] and [`EITHER_TS_RE_STR`].
pub(crate) fn get_file_data_at(
    cre: &Regex,
    lines: &[String],
    index: usize,
) -> Option<(PathAndTimestamp, usize)> {
    if index >= lines.len() {
        return None;
    }
    let caps = cre.captures(line_content(&lines[index]))?;
    let path = caps
        .name("qpath")
        .or_else(|| caps.name("path"))?
        .as_str()
        .to_string();
    let timestamp = caps.name("ts").map(|m| m.as_str().to_string());
    Some((PathAndTimestamp { path, timestamp }, index + 1))
}

// ---------------------------------------------------------------------------
// Text-diff header
// ---------------------------------------------------------------------------

/// Declared start line (1-based) and length from a hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartAndLength {
    pub start: usize,
    pub length: usize,
}

/// The two file-data lines that open a unified or context diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiffHeader {
    pub lines: Vec<String>,
    pub file_data: BeforeAfter<PathAndTimestamp>,
}

impl TextDiffHeader {
    /// The path this diff applies to, after stripping.
    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        file_path_of_pair(&self.file_data, strip_level)
    }

    /// The expected effect of applying the associated diff.
    pub fn outcome(&self) -> DiffOutcome {
        outcome_of_pair(&self.file_data)
    }

    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        FilePathPlus::from_pair(&self.file_data, strip_level)
    }
}

/// Shared scaffold for the unified and context parsers: two file-data
/// lines followed by one or more hunks.
///
/// Returns `Ok(None)` when `lines[start]` does not open this dialect at
/// all; `Err` when it does but the diff is malformed (the caller
/// converts that to `None` for speculative parses).
pub(crate) fn parse_text_diff_at<H>(
    lines: &[String],
    start: usize,
    before_cre: &Regex,
    after_cre: &Regex,
    get_hunk_at: impl Fn(&[String], usize) -> Result<Option<(H, usize)>>,
    dialect: &str,
) -> Result<Option<(TextDiffHeader, Vec<H>, usize)>> {
    if lines.len() < start + 2 {
        return Ok(None);
    }
    let Some((before, index)) = get_file_data_at(before_cre, lines, start) else {
        return Ok(None);
    };
    let Some((after, mut index)) = get_file_data_at(after_cre, lines, index) else {
        return Err(PatchError::parse_at(
            format!("missing {dialect} diff after file data"),
            index,
        ));
    };
    let mut hunks = Vec::new();
    while index < lines.len() {
        match get_hunk_at(lines, index)? {
            Some((hunk, next)) => {
                hunks.push(hunk);
                index = next;
            }
            None => break,
        }
    }
    if hunks.is_empty() {
        return Err(PatchError::parse_at(
            format!("expected {dialect} diff hunks not found"),
            index,
        ));
    }
    let header = TextDiffHeader {
        lines: lines[start..start + 2].to_vec(),
        file_data: BeforeAfter::new(before, after),
    };
    Ok(Some((header, hunks, index)))
}

// ---------------------------------------------------------------------------
// The Diff sum type
// ---------------------------------------------------------------------------

/// A single file's diff in any of the recognised dialects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    Unified(UnifiedDiff),
    Context(ContextDiff),
    GitBinary(GitBinaryDiff),
}

impl Diff {
    /// If a diff of any dialect starts at `lines[index]`, parse it and
    /// return it with the index of the first line past it.
    ///
    /// With `raise_if_malformed` unset a malformed diff yields
    /// `(None, index)` instead of an error.
    pub fn get_diff_at(
        lines: &[String],
        index: usize,
        raise_if_malformed: bool,
    ) -> Result<(Option<Diff>, usize)> {
        // Ordered by likelihood of being encountered these days.
        let attempts: [fn(&[String], usize) -> Result<Option<(Diff, usize)>>; 3] = [
            |lines, index| {
                Ok(UnifiedDiff::get_diff_at(lines, index)?
                    .map(|(diff, next)| (Diff::Unified(diff), next)))
            },
            |lines, index| {
                Ok(GitBinaryDiff::get_diff_at(lines, index)?
                    .map(|(diff, next)| (Diff::GitBinary(diff), next)))
            },
            |lines, index| {
                Ok(ContextDiff::get_diff_at(lines, index)?
                    .map(|(diff, next)| (Diff::Context(diff), next)))
            },
        ];
        for attempt in attempts {
            match attempt(lines, index) {
                Ok(Some((diff, next))) => return Ok((Some(diff), next)),
                Ok(None) => {}
                Err(err) if raise_if_malformed => return Err(err),
                Err(_) => {}
            }
        }
        Ok((None, index))
    }

    /// Parse lines that must contain exactly one diff.
    pub fn parse_lines(lines: &[String]) -> Result<Diff> {
        let (diff, index) = Self::get_diff_at(lines, 0, true)?;
        match diff {
            Some(diff) if index >= lines.len() => Ok(diff),
            _ => Err(PatchError::parse_at("not a valid diff", index)),
        }
    }

    pub fn parse_text(text: &str) -> Result<Diff> {
        Self::parse_lines(&crate::lines::split_lines(text))
    }

    /// Every line of the diff, header first, in input order.
    pub fn append_lines_to(&self, out: &mut Vec<String>) {
        match self {
            Diff::Unified(diff) => diff.append_lines_to(out),
            Diff::Context(diff) => diff.append_lines_to(out),
            Diff::GitBinary(diff) => out.extend_from_slice(&diff.lines),
        }
    }

    /// Re-serialise the diff byte-for-byte.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        self.append_lines_to(&mut lines);
        lines.concat()
    }

    /// Line-change statistics; binary diffs have none.
    pub fn diffstat_stats(&self) -> DiffStats {
        match self {
            Diff::Unified(diff) => diff.diffstat_stats(),
            Diff::Context(diff) => diff.diffstat_stats(),
            Diff::GitBinary(_) => DiffStats::default(),
        }
    }

    /// The before/after file data, for the dialects that carry it.
    pub fn file_data(&self) -> Option<&BeforeAfter<PathAndTimestamp>> {
        match self {
            Diff::Unified(diff) => Some(&diff.header.file_data),
            Diff::Context(diff) => Some(&diff.header.file_data),
            Diff::GitBinary(_) => None,
        }
    }

    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        self.header().and_then(|h| h.file_path(strip_level))
    }

    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        self.header().and_then(|h| h.file_path_plus(strip_level))
    }

    /// The expected effect of applying this diff; unknowable for binary
    /// patches.
    pub fn outcome(&self) -> Option<DiffOutcome> {
        self.header().map(|h| h.outcome())
    }

    fn header(&self) -> Option<&TextDiffHeader> {
        match self {
            Diff::Unified(diff) => Some(&diff.header),
            Diff::Context(diff) => Some(&diff.header),
            Diff::GitBinary(_) => None,
        }
    }

    /// Remove trailing whitespace the diff would add, returning the
    /// 1-based after-file line numbers that were fixed.
    pub fn fix_trailing_whitespace(&mut self) -> Vec<usize> {
        match self {
            Diff::Unified(diff) => diff.fix_trailing_whitespace(),
            Diff::Context(diff) => diff.fix_trailing_whitespace(),
            Diff::GitBinary(_) => Vec::new(),
        }
    }

    /// Report trailing whitespace the diff would add without changing
    /// anything.
    pub fn report_trailing_whitespace(&self) -> Vec<usize> {
        match self {
            Diff::Unified(diff) => diff.report_trailing_whitespace(),
            Diff::Context(diff) => diff.report_trailing_whitespace(),
            Diff::GitBinary(_) => Vec::new(),
        }
    }

    /// Convert to the format-independent form the applier consumes.
    /// Binary patches have no line-level representation.
    pub fn abstract_diff(&self) -> Option<AbstractDiff> {
        match self {
            Diff::Unified(diff) => Some(diff.abstract_diff()),
            Diff::Context(diff) => Some(diff.abstract_diff()),
            Diff::GitBinary(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::split_lines;

    const UNIFIED: &str = "\
--- a/f.txt\t2020-01-01 00:00:00 +0000
+++ b/f.txt\t2020-01-02 00:00:00 +0000
@@ -1,2 +1,2 @@
 a
-b
+B
";

    const CONTEXT: &str = "\
*** a/f.txt\t2020-01-01 00:00:00 +0000
--- b/f.txt\t2020-01-02 00:00:00 +0000
***************
*** 1,2 ****
  a
! b
--- 1,2 ----
  a
! B
";

    #[test]
    fn dispatch_recognises_unified() {
        let diff = Diff::parse_text(UNIFIED).unwrap();
        assert!(matches!(diff, Diff::Unified(_)));
        assert_eq!(diff.to_text(), UNIFIED);
    }

    #[test]
    fn dispatch_recognises_context() {
        let diff = Diff::parse_text(CONTEXT).unwrap();
        assert!(matches!(diff, Diff::Context(_)));
        assert_eq!(diff.to_text(), CONTEXT);
    }

    #[test]
    fn dispatch_rejects_junk() {
        let lines = split_lines("this is not a diff\n");
        let (diff, index) = Diff::get_diff_at(&lines, 0, false).unwrap();
        assert!(diff.is_none());
        assert_eq!(index, 0);
    }

    #[test]
    fn trailing_lines_fail_strict_parse() {
        let text = format!("{UNIFIED}leftover\n");
        assert!(Diff::parse_text(&text).is_err());
    }

    #[test]
    fn file_data_timestamps_are_parsed() {
        let diff = Diff::parse_text(UNIFIED).unwrap();
        let data = diff.file_data().unwrap();
        assert_eq!(data.before.path, "a/f.txt");
        assert_eq!(
            data.before.timestamp.as_deref(),
            Some("2020-01-01 00:00:00 +0000")
        );
    }

    #[test]
    fn quoted_paths_accept_spaces() {
        let text = "\
--- \"a/my file.txt\"
+++ \"b/my file.txt\"
@@ -1 +1 @@
-x
+y
";
        let diff = Diff::parse_text(text).unwrap();
        assert_eq!(diff.file_path(1), Some("my file.txt".to_string()));
    }

    #[test]
    fn outcome_follows_dev_null() {
        let text = "\
--- /dev/null
+++ b/new.txt
@@ -0,0 +1 @@
+hello
";
        let diff = Diff::parse_text(text).unwrap();
        assert_eq!(diff.outcome(), Some(DiffOutcome::Created));
        assert_eq!(diff.file_path(1), Some("new.txt".to_string()));
    }
}
