//! The patch aggregate: a header followed by one diff (plus preambles
//! and trailing junk) per file.
//!
//! The assembler walks the input lines once. At each position it tries
//! to peel preambles and a diff; what cannot be recognised becomes
//! header text (before the first diff) or trailing junk attached to the
//! previous file (after it), which is how quilt-style separators
//! between diffs survive a round trip.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::diff::Diff;
use crate::diffstat::{self, DiffStats, PathStats};
use crate::error::{PatchError, Result};
use crate::lines::{line_content, split_lines};
use crate::merge::AbstractDiff;
use crate::paths::{pair_consistent_with_strip_one, DiffOutcome, FilePathPlus};
use crate::preamble::PreambleSet;

// ---------------------------------------------------------------------------
// Patch header
// ---------------------------------------------------------------------------

/// The free text above the first diff: leading `#` comment lines, a
/// description, and an optional diffstat summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchHeader {
    pub comment_lines: Vec<String>,
    pub description_lines: Vec<String>,
    pub diffstat_lines: Vec<String>,
}

impl PatchHeader {
    pub fn parse_lines(lines: &[String]) -> Result<PatchHeader> {
        let descr_starts_at = lines
            .iter()
            .position(|line| !line.starts_with('#'))
            .unwrap_or(lines.len());
        let mut diffstat_starts_at = None;
        for index in descr_starts_at..lines.len() {
            if diffstat::summary_starts_at(lines, index)? {
                diffstat_starts_at = Some(index);
                break;
            }
        }
        let descr_end = diffstat_starts_at.unwrap_or(lines.len());
        Ok(PatchHeader {
            comment_lines: lines[..descr_starts_at].to_vec(),
            description_lines: lines[descr_starts_at..descr_end].to_vec(),
            diffstat_lines: lines[descr_end..].to_vec(),
        })
    }

    pub fn parse_text(text: &str) -> Result<PatchHeader> {
        Self::parse_lines(&split_lines(text))
    }

    pub fn is_empty(&self) -> bool {
        self.comment_lines.is_empty()
            && self.description_lines.is_empty()
            && self.diffstat_lines.is_empty()
    }

    pub fn comments(&self) -> String {
        self.comment_lines.concat()
    }

    pub fn description(&self) -> String {
        self.description_lines.concat()
    }

    pub fn diffstat(&self) -> String {
        self.diffstat_lines.concat()
    }

    fn normalised_lines(text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut text = text.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        split_lines(&text)
    }

    pub fn set_comments(&mut self, text: &str) {
        self.comment_lines = Self::normalised_lines(text);
    }

    pub fn set_description(&mut self, text: &str) {
        self.description_lines = Self::normalised_lines(text);
    }

    pub fn set_diffstat(&mut self, text: &str) {
        self.diffstat_lines = Self::normalised_lines(text);
    }

    pub fn append_lines_to(&self, out: &mut Vec<String>) {
        out.extend_from_slice(&self.comment_lines);
        out.extend_from_slice(&self.description_lines);
        out.extend_from_slice(&self.diffstat_lines);
    }

    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        self.append_lines_to(&mut lines);
        lines.concat()
    }
}

// ---------------------------------------------------------------------------
// DiffPlus
// ---------------------------------------------------------------------------

/// Everything belonging to a single file within a patch: its preambles,
/// its diff (absent for pure metadata changes such as a rename without
/// content), and any trailing junk before the next file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPlus {
    pub preambles: PreambleSet,
    pub diff: Option<Diff>,
    pub trailing_junk: Vec<String>,
}

impl DiffPlus {
    /// Try to peel preambles and a diff starting at `lines[start]`.
    /// Either on its own is enough to make a `DiffPlus`.
    pub fn get_diff_plus_at(
        lines: &[String],
        start: usize,
        raise_if_malformed: bool,
    ) -> Result<(Option<DiffPlus>, usize)> {
        let (preambles, index) = PreambleSet::get_preambles_at(lines, start);
        if index >= lines.len() {
            if !preambles.is_empty() {
                return Ok((Some(DiffPlus::new(preambles, None)), index));
            }
            return Ok((None, start));
        }
        let (diff, next) = Diff::get_diff_at(lines, index, raise_if_malformed)?;
        match diff {
            Some(diff) => Ok((Some(DiffPlus::new(preambles, Some(diff))), next)),
            None if !preambles.is_empty() => Ok((Some(DiffPlus::new(preambles, None)), index)),
            None => Ok((None, start)),
        }
    }

    pub fn parse_lines(lines: &[String]) -> Result<DiffPlus> {
        let (diff_plus, index) = Self::get_diff_plus_at(lines, 0, true)?;
        match diff_plus {
            Some(diff_plus) if index >= lines.len() => Ok(diff_plus),
            _ => Err(PatchError::parse_at(
                "not a valid (optionally preambled) diff",
                index,
            )),
        }
    }

    pub fn parse_text(text: &str) -> Result<DiffPlus> {
        Self::parse_lines(&split_lines(text))
    }

    fn new(preambles: PreambleSet, diff: Option<Diff>) -> DiffPlus {
        DiffPlus {
            preambles,
            diff,
            trailing_junk: Vec::new(),
        }
    }

    pub fn append_lines_to(&self, out: &mut Vec<String>) {
        self.preambles.append_lines_to(out);
        if let Some(diff) = &self.diff {
            diff.append_lines_to(out);
        }
        out.extend_from_slice(&self.trailing_junk);
    }

    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        self.append_lines_to(&mut lines);
        lines.concat()
    }

    /// The target path: the preambles win (`Index → Git → Diff`), the
    /// diff's own header is the fallback.
    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        self.preambles
            .file_path(strip_level)
            .or_else(|| self.diff.as_ref().and_then(|d| d.file_path(strip_level)))
    }

    /// The target path with status and rename/copy source. The path
    /// resolves through the preambles; the diff's `/dev/null` sides,
    /// when present, are the better status source.
    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        let preamble_plus = self.preambles.file_path_plus(strip_level);
        let diff_plus = self.diff.as_ref().and_then(|d| d.file_path_plus(strip_level));
        let mut fpp = match (preamble_plus, diff_plus) {
            (Some(mut preamble_fpp), Some(diff_fpp)) => {
                preamble_fpp.status = diff_fpp.status;
                preamble_fpp
            }
            (Some(preamble_fpp), None) => preamble_fpp,
            (None, Some(diff_fpp)) => diff_fpp,
            (None, None) => return None,
        };
        if fpp.expath.is_none() {
            fpp.expath = self.preambles.file_expath();
        }
        Some(fpp)
    }

    /// The expected effect of applying this file's change.
    pub fn outcome(&self) -> Option<DiffOutcome> {
        if let Some(outcome) = self.diff.as_ref().and_then(|d| d.outcome()) {
            return Some(outcome);
        }
        let git = self.preambles.git()?;
        if git.extras.contains_key("new file mode") {
            Some(DiffOutcome::Created)
        } else if git.extras.contains_key("deleted file mode") {
            Some(DiffOutcome::Deleted)
        } else {
            Some(DiffOutcome::Modified)
        }
    }

    /// The file mode after application, from a Git preamble.
    pub fn new_mode(&self) -> Option<u32> {
        self.preambles.git().and_then(|p| p.new_mode())
    }

    pub fn diffstat_stats(&self) -> DiffStats {
        self.diff
            .as_ref()
            .map(Diff::diffstat_stats)
            .unwrap_or_default()
    }

    pub fn fix_trailing_whitespace(&mut self) -> Vec<usize> {
        self.diff
            .as_mut()
            .map(Diff::fix_trailing_whitespace)
            .unwrap_or_default()
    }

    pub fn report_trailing_whitespace(&self) -> Vec<usize> {
        self.diff
            .as_ref()
            .map(Diff::report_trailing_whitespace)
            .unwrap_or_default()
    }

    pub fn abstract_diff(&self) -> Option<AbstractDiff> {
        self.diff.as_ref().and_then(Diff::abstract_diff)
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// A file's trailing-whitespace report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTwsLines {
    pub path: Option<String>,
    pub lines: Vec<usize>,
}

/// A whole patch: header text plus one [`DiffPlus`] per file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub source_name: Option<String>,
    pub num_strip_levels: usize,
    pub header: PatchHeader,
    pub diff_pluses: Vec<DiffPlus>,
}

impl Patch {
    /// Parse a patch from lines.
    ///
    /// The first recognised DiffPlus marks the end of the header;
    /// before it, speculative parsing never raises. After it, a
    /// malformed diff fails the parse rather than degrading into junk.
    pub fn parse_lines(lines: &[String], num_strip_levels: usize) -> Result<Patch> {
        let mut diff_starts_at = None;
        let mut diff_pluses: Vec<DiffPlus> = Vec::new();
        let mut index = 0;
        while index < lines.len() {
            let raise_if_malformed = diff_starts_at.is_some();
            let starts_at = index;
            let (diff_plus, next) =
                DiffPlus::get_diff_plus_at(lines, index, raise_if_malformed)?;
            if let Some(diff_plus) = diff_plus {
                if diff_starts_at.is_none() {
                    diff_starts_at = Some(starts_at);
                }
                diff_pluses.push(diff_plus);
                index = next;
                continue;
            }
            if let Some(last) = diff_pluses.last_mut() {
                last.trailing_junk.push(lines[index].clone());
            }
            index += 1;
        }
        let header_end = diff_starts_at.unwrap_or(lines.len());
        let header = PatchHeader::parse_lines(&lines[..header_end])?;
        debug!(files = diff_pluses.len(), "parsed patch");
        Ok(Patch {
            source_name: None,
            num_strip_levels,
            header,
            diff_pluses,
        })
    }

    pub fn parse_text(text: &str, num_strip_levels: usize) -> Result<Patch> {
        Self::parse_lines(&split_lines(text), num_strip_levels)
    }

    /// Parse an email carrying a patch: the `Subject:` header becomes
    /// the first description line and CRLF line breaks in the body are
    /// normalised.
    pub fn parse_email_text(text: &str, num_strip_levels: usize) -> Result<Patch> {
        let (subject, body) = split_email(text);
        let body = if subject.is_some() {
            body.replace("\r\n", "\n")
        } else {
            body
        };
        let mut patch = Self::parse_text(&body, num_strip_levels)?;
        if let Some(subject) = subject {
            let description = patch.header.description();
            patch
                .header
                .set_description(&format!("{subject}\n{description}"));
        }
        Ok(patch)
    }

    pub fn parse_file(path: &Path, num_strip_levels: usize) -> Result<Patch> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PatchError::io(format!("reading patch '{}'", path.display()), e))?;
        let mut patch = Self::parse_text(&text, num_strip_levels)?;
        patch.source_name = Some(path.display().to_string());
        Ok(patch)
    }

    pub fn parse_email_file(path: &Path, num_strip_levels: usize) -> Result<Patch> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PatchError::io(format!("reading patch '{}'", path.display()), e))?;
        let mut patch = Self::parse_email_text(&text, num_strip_levels)?;
        patch.source_name = Some(path.display().to_string());
        Ok(patch)
    }

    fn adjusted_strip_level(&self, strip_level: Option<usize>) -> usize {
        strip_level.unwrap_or(self.num_strip_levels)
    }

    pub fn set_strip_level(&mut self, strip_level: usize) {
        self.num_strip_levels = strip_level;
    }

    /// Guess the strip level: Git patches always use 1; otherwise
    /// headers whose two paths agree after one strip vote for 1, any
    /// disagreement votes for 0.
    pub fn estimate_strip_level(&self) -> Option<usize> {
        let mut votes_for_one = 0;
        for diff_plus in &self.diff_pluses {
            if diff_plus.preambles.git().is_some() {
                return Some(1);
            }
            let check = diff_plus
                .diff
                .as_ref()
                .and_then(|d| d.file_data())
                .and_then(pair_consistent_with_strip_one);
            match check {
                Some(true) => votes_for_one += 1,
                Some(false) => return Some(0),
                None => {}
            }
        }
        if votes_for_one > 0 {
            Some(1)
        } else {
            None
        }
    }

    pub fn append_lines_to(&self, out: &mut Vec<String>) {
        self.header.append_lines_to(out);
        for diff_plus in &self.diff_pluses {
            diff_plus.append_lines_to(out);
        }
    }

    /// Re-serialise the patch byte-for-byte.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        self.append_lines_to(&mut lines);
        lines.concat()
    }

    pub fn file_paths(&self, strip_level: Option<usize>) -> Vec<Option<String>> {
        let strip_level = self.adjusted_strip_level(strip_level);
        self.diff_pluses
            .iter()
            .map(|dp| dp.file_path(strip_level))
            .collect()
    }

    pub fn file_paths_plus(&self, strip_level: Option<usize>) -> Vec<Option<FilePathPlus>> {
        let strip_level = self.adjusted_strip_level(strip_level);
        self.diff_pluses
            .iter()
            .map(|dp| dp.file_path_plus(strip_level))
            .collect()
    }

    /// Per-file statistics, in file order.
    pub fn diffstat_stats(&self, strip_level: Option<usize>) -> Vec<PathStats> {
        let strip_level = self.adjusted_strip_level(strip_level);
        self.diff_pluses
            .iter()
            .map(|dp| PathStats {
                path: dp.file_path(strip_level),
                stats: dp.diffstat_stats(),
            })
            .collect()
    }

    pub fn fix_trailing_whitespace(&mut self, strip_level: Option<usize>) -> Vec<FileTwsLines> {
        let strip_level = self.adjusted_strip_level(strip_level);
        let mut reports = Vec::new();
        for diff_plus in &mut self.diff_pluses {
            let bad_lines = diff_plus.fix_trailing_whitespace();
            if !bad_lines.is_empty() {
                reports.push(FileTwsLines {
                    path: diff_plus.file_path(strip_level),
                    lines: bad_lines,
                });
            }
        }
        reports
    }

    pub fn report_trailing_whitespace(&self, strip_level: Option<usize>) -> Vec<FileTwsLines> {
        let strip_level = self.adjusted_strip_level(strip_level);
        self.diff_pluses
            .iter()
            .filter_map(|diff_plus| {
                let bad_lines = diff_plus.report_trailing_whitespace();
                if bad_lines.is_empty() {
                    None
                } else {
                    Some(FileTwsLines {
                        path: diff_plus.file_path(strip_level),
                        lines: bad_lines,
                    })
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Minimal RFC-822 splitting for the email wrapper
// ---------------------------------------------------------------------------

static HEADER_FIELD_CRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[!-9;-~]+:").unwrap());

/// Split an email into its `Subject:` (unfolded) and body. Text that
/// does not open with a header field is all body.
fn split_email(text: &str) -> (Option<String>, String) {
    let lines = split_lines(text);
    if lines.is_empty() || !HEADER_FIELD_CRE.is_match(line_content(&lines[0])) {
        return (None, text.to_string());
    }
    let mut subject: Option<String> = None;
    let mut in_subject = false;
    let mut index = 0;
    while index < lines.len() {
        let content = line_content(&lines[index]);
        if content.is_empty() {
            index += 1;
            break;
        }
        if content.starts_with([' ', '\t']) {
            // Folded continuation of the previous field.
            if in_subject {
                if let Some(subject) = subject.as_mut() {
                    subject.push(' ');
                    subject.push_str(content.trim());
                }
            }
        } else if content.len() >= 8 && content[..8].eq_ignore_ascii_case("subject:") {
            subject = Some(content[8..].trim().to_string());
            in_subject = true;
        } else {
            in_subject = false;
        }
        index += 1;
    }
    (subject, lines[index..].concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::FileStatus;

    const MULTI_FILE: &str = "\
# maintained by hand
Fix two adjacent off-by-one errors.

 foo.c | 2 +-
 bar.c | 2 +-
 2 files changed, 2 insertions(+), 2 deletions(-)

Index: src/foo.c
===================================================================
--- src/foo.c\t2020-01-01 00:00:00 +0000
+++ src/foo.c\t2020-01-02 00:00:00 +0000
@@ -1,3 +1,3 @@
 int f(void)
-{ return 0; }
+{ return 1; }
 /* end */
---8<---
diff --git a/src/bar.c b/src/bar.c
index 1111111..2222222 100644
--- a/src/bar.c
+++ b/src/bar.c
@@ -1,3 +1,3 @@
 int g(void)
-{ return 0; }
+{ return 2; }
 /* end */
";

    #[test]
    fn multi_file_patch_round_trips() {
        let patch = Patch::parse_text(MULTI_FILE, 0).unwrap();
        assert_eq!(patch.diff_pluses.len(), 2);
        assert_eq!(patch.to_text(), MULTI_FILE);
    }

    #[test]
    fn header_splits_into_three_segments() {
        let patch = Patch::parse_text(MULTI_FILE, 0).unwrap();
        assert_eq!(patch.header.comments(), "# maintained by hand\n");
        assert!(patch
            .header
            .description()
            .starts_with("Fix two adjacent off-by-one errors."));
        assert!(patch.header.diffstat().contains("2 files changed"));
    }

    #[test]
    fn trailing_junk_attaches_to_previous_file() {
        let patch = Patch::parse_text(MULTI_FILE, 0).unwrap();
        assert_eq!(
            patch.diff_pluses[0].trailing_junk,
            vec!["---8<---\n".to_string()]
        );
        assert!(patch.diff_pluses[1].trailing_junk.is_empty());
    }

    #[test]
    fn file_paths_resolve_through_preambles() {
        let patch = Patch::parse_text(MULTI_FILE, 0).unwrap();
        assert_eq!(
            patch.file_paths(Some(0)),
            vec![
                Some("src/foo.c".to_string()),
                Some("src/bar.c".to_string())
            ]
        );
        assert_eq!(
            patch.file_paths(Some(1)),
            vec![Some("foo.c".to_string()), Some("bar.c".to_string())]
        );
    }

    #[test]
    fn index_preamble_takes_path_precedence_over_git() {
        let text = "\
Index: src/foo.c
=======
diff --git a/src/foo.c b/src/foo.c
--- a/src/foo.c
+++ b/src/foo.c
@@ -1 +1 @@
-x
+y
";
        let diff_plus = DiffPlus::parse_text(text).unwrap();
        assert_eq!(diff_plus.file_path(1), Some("foo.c".to_string()));
        assert_eq!(diff_plus.file_path(0), Some("src/foo.c".to_string()));
    }

    #[test]
    fn preamble_only_diff_plus_is_legal() {
        let text = "\
diff --git a/old.c b/new.c
similarity index 100%
rename from old.c
rename to new.c
";
        let diff_plus = DiffPlus::parse_text(text).unwrap();
        assert!(diff_plus.diff.is_none());
        assert_eq!(diff_plus.to_text(), text);
        let fpp = diff_plus.file_path_plus(1).unwrap();
        assert_eq!(fpp.path, "new.c");
        assert_eq!(fpp.expath, Some("old.c".to_string()));
    }

    #[test]
    fn outcome_from_git_preamble_when_diff_is_absent() {
        let text = "\
diff --git a/new.c b/new.c
new file mode 100644
index 0000000..e69de29
";
        let diff_plus = DiffPlus::parse_text(text).unwrap();
        assert_eq!(diff_plus.outcome(), Some(DiffOutcome::Created));
        assert_eq!(diff_plus.new_mode(), Some(0o100644));
    }

    #[test]
    fn status_comes_from_diff_dev_null_sides() {
        let text = "\
Index: new.txt
--- /dev/null
+++ new.txt
@@ -0,0 +1 @@
+hello
";
        let diff_plus = DiffPlus::parse_text(text).unwrap();
        let fpp = diff_plus.file_path_plus(0).unwrap();
        assert_eq!(fpp.path, "new.txt");
        assert_eq!(fpp.status, FileStatus::Added);
    }

    #[test]
    fn malformed_tail_fails_after_diffs_started() {
        let text = "\
--- a/f
+++ b/f
@@ -1 +1 @@
-x
+y
--- a/g
+++ borked
";
        assert!(Patch::parse_text(text, 0).is_err());
    }

    #[test]
    fn junk_only_input_is_all_header() {
        let patch = Patch::parse_text("nothing like a diff here\n", 0).unwrap();
        assert!(patch.diff_pluses.is_empty());
        assert_eq!(patch.to_text(), "nothing like a diff here\n");
    }

    #[test]
    fn estimate_strip_level_prefers_git() {
        let patch = Patch::parse_text(MULTI_FILE, 0).unwrap();
        assert_eq!(patch.estimate_strip_level(), Some(1));

        let plain = "\
--- foo.c
+++ foo.c
@@ -1 +1 @@
-x
+y
";
        let patch = Patch::parse_text(plain, 0).unwrap();
        assert_eq!(patch.estimate_strip_level(), Some(0));
    }

    #[test]
    fn diffstat_stats_per_file() {
        let patch = Patch::parse_text(MULTI_FILE, 0).unwrap();
        let stats = patch.diffstat_stats(Some(1));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].path, Some("foo.c".to_string()));
        assert_eq!(stats[0].stats.inserted, 1);
        assert_eq!(stats[0].stats.deleted, 1);
    }

    #[test]
    fn email_subject_prepends_description() {
        let email = "\
From: someone@example.com\r
Subject: [PATCH] fix the\r
 frobnicator\r
Date: today\r
\r
--- a/f\r
+++ b/f\r
@@ -1 +1 @@\r
-x\r
+y\r
";
        let patch = Patch::parse_email_text(email, 0).unwrap();
        assert!(patch
            .header
            .description()
            .starts_with("[PATCH] fix the frobnicator\n"));
        assert_eq!(patch.diff_pluses.len(), 1);
    }

    #[test]
    fn non_email_text_passes_through() {
        let patch = Patch::parse_email_text(MULTI_FILE, 0).unwrap();
        assert_eq!(patch.diff_pluses.len(), 2);
    }
}
