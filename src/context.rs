//! Parse and re-serialise "context" format diffs (POSIX `diff -c`).
//!
//! Context hunks are more irregular than unified ones: the before and
//! after blocks each carry their own header, either block's body may be
//! absent when it holds no changes, and a `start,finish` of `0,0`
//! declares a zero-length side. Body lines use two-character prefixes
//! (`- `, `+ `, `! `, `  `).

use std::sync::LazyLock;

use regex::Regex;

use crate::diff::{parse_text_diff_at, TextDiffHeader, EITHER_TS_RE_STR, PATH_RE_STR};
use crate::diffstat::DiffStats;
use crate::error::{PatchError, Result};
use crate::lines::{line_content, trim_trailing_ws};
use crate::merge::{AbstractChunk, AbstractDiff, AbstractHunk};

static BEFORE_FILE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\*\*\* {PATH_RE_STR}(?:\s+{EITHER_TS_RE_STR})?$")).unwrap()
});
static AFTER_FILE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^--- {PATH_RE_STR}(?:\s+{EITHER_TS_RE_STR})?$")).unwrap()
});
static HUNK_START_CRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*{15}\s*(.*)$").unwrap());
static HUNK_BEFORE_CRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*\*\s+(\d+)(,(\d+))?\s+\*\*\*\*\s*(.*)$").unwrap());
static HUNK_AFTER_CRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^---\s+(\d+)(,(\d+))?\s+----(.*)$").unwrap());

/// Declared `start,finish` range reduced to a start and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeChunk {
    start: usize,
    length: usize,
}

/// One block (before or after) of a context hunk: where it sits inside
/// the hunk's raw lines, the declared range, and how many physical
/// lines it spans including its own header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBlock {
    pub offset: usize,
    pub start: usize,
    pub length: usize,
    pub numlines: usize,
}

/// A single context diff hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHunk {
    pub lines: Vec<String>,
    pub before: ContextBlock,
    pub after: ContextBlock,
}

impl ContextHunk {
    fn block_slice(&self, block: &ContextBlock) -> &[String] {
        &self.lines[block.offset..block.offset + block.numlines]
    }

    /// Body lines of a block slice with the two-character prefix
    /// removed, optionally skipping lines starting with `skip`. A line
    /// followed by a no-newline marker loses its terminator.
    fn body_lines(slice: &[String], skip: Option<char>) -> Vec<String> {
        let mut out = Vec::new();
        let mut index = 1;
        while index < slice.len() {
            let line = &slice[index];
            let skip_this = skip.is_some_and(|c| line.starts_with(c));
            if !skip_this {
                let content = line.get(2..).unwrap_or("");
                if index + 1 == slice.len() || !slice[index + 1].starts_with('\\') {
                    out.push(content.to_string());
                } else {
                    out.push(line_content(content).to_string());
                }
            }
            index += 1;
            if index < slice.len() && slice[index].starts_with('\\') {
                index += 1;
            }
        }
        out
    }

    /// The before content. A header-only before block (a pure insert)
    /// derives its content from the after block, skipping added lines.
    pub fn before_lines(&self) -> Vec<String> {
        if self.before.numlines <= 1 {
            Self::body_lines(self.block_slice(&self.after), Some('+'))
        } else {
            Self::body_lines(self.block_slice(&self.before), None)
        }
    }

    /// The after content. A header-only after block (a pure delete)
    /// derives its content from the before block, skipping deleted
    /// lines.
    pub fn after_lines(&self) -> Vec<String> {
        if self.after.numlines <= 1 {
            Self::body_lines(self.block_slice(&self.before), Some('-'))
        } else {
            Self::body_lines(self.block_slice(&self.after), None)
        }
    }

    pub fn fix_trailing_whitespace(&mut self) -> Vec<usize> {
        self.process_tws(true)
    }

    pub fn report_trailing_whitespace(&self) -> Vec<usize> {
        self.clone().process_tws(false)
    }

    fn process_tws(&mut self, fix: bool) -> Vec<usize> {
        let mut bad_lines = Vec::new();
        for index in self.after.offset + 1..self.after.offset + self.after.numlines {
            let line = &self.lines[index];
            if line.starts_with("+ ") || line.starts_with("! ") {
                let repl_line = format!("{}{}", &line[..2], trim_trailing_ws(&line[2..]));
                if repl_line.len() != line.len() {
                    bad_lines.push(self.after.start + (index - (self.after.offset + 1)));
                    if fix {
                        self.lines[index] = repl_line;
                    }
                }
            }
        }
        bad_lines
    }

    pub fn diffstat_stats(&self) -> DiffStats {
        let mut stats = DiffStats::new();
        for index in self.before.offset + 1..self.before.offset + self.before.numlines {
            if self.lines[index].starts_with("- ") {
                stats.deleted += 1;
            } else if self.lines[index].starts_with("! ") {
                stats.modified += 1;
            }
        }
        for index in self.after.offset + 1..self.after.offset + self.after.numlines {
            if self.lines[index].starts_with("+ ") {
                stats.inserted += 1;
            } else if self.lines[index].starts_with("! ") {
                stats.modified += 1;
            }
        }
        stats
    }

    /// The format-independent form; 1-based starts become 0-based here.
    pub fn abstract_hunk(&self) -> AbstractHunk {
        let before_lines = self.before_lines();
        let before_start = if before_lines.is_empty() {
            self.before.start as isize
        } else {
            self.before.start as isize - 1
        };
        let before = AbstractChunk {
            start_index: before_start,
            lines: before_lines,
        };
        let after = AbstractChunk {
            start_index: self.after.start as isize - 1,
            lines: self.after_lines(),
        };
        AbstractHunk::new(before, after)
    }
}

/// A context format diff: header plus hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDiff {
    pub header: TextDiffHeader,
    pub hunks: Vec<ContextHunk>,
}

impl ContextDiff {
    fn range_chunk(caps: &regex::Captures<'_>) -> RangeChunk {
        let start: usize = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let finish: usize = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(start);
        let length = if start == 0 && finish == 0 {
            0
        } else {
            (finish + 1).saturating_sub(start)
        };
        RangeChunk { start, length }
    }

    fn get_before_chunk_at(lines: &[String], index: usize) -> Option<(RangeChunk, usize)> {
        let caps = HUNK_BEFORE_CRE.captures(line_content(lines.get(index)?))?;
        Some((Self::range_chunk(&caps), index + 1))
    }

    fn get_after_chunk_at(lines: &[String], index: usize) -> Option<(RangeChunk, usize)> {
        let caps = HUNK_AFTER_CRE.captures(line_content(lines.get(index)?))?;
        Some((Self::range_chunk(&caps), index + 1))
    }

    /// Extract the hunk starting at `lines[index]`.
    ///
    /// The before block runs until its declared quota is met or the
    /// after block's header shows up early (an absent or short body);
    /// the after block's body may likewise be absent entirely.
    pub(crate) fn get_hunk_at(
        lines: &[String],
        index: usize,
    ) -> Result<Option<(ContextHunk, usize)>> {
        if !HUNK_START_CRE.is_match(line_content(&lines[index])) {
            return Ok(None);
        }
        let start_index = index;
        let before_start_index = index + 1;
        let Some((before_chunk, mut index)) = Self::get_before_chunk_at(lines, before_start_index)
        else {
            return Ok(None);
        };

        let mut before_count = 0;
        let mut after_start_index = index;
        let mut after_chunk = None;
        while before_count < before_chunk.length {
            if index >= lines.len() {
                return Err(PatchError::UnexpectedEndOfPatch);
            }
            after_start_index = index;
            if let Some((chunk, next)) = Self::get_after_chunk_at(lines, index) {
                after_chunk = Some(chunk);
                index = next;
                break;
            }
            before_count += 1;
            index += 1;
        }
        let after_chunk = match after_chunk {
            Some(chunk) => chunk,
            None => {
                if index >= lines.len() {
                    return Err(PatchError::UnexpectedEndOfPatch);
                }
                if lines[index].starts_with("\\ ") {
                    index += 1;
                }
                after_start_index = index;
                match Self::get_after_chunk_at(lines, index) {
                    Some((chunk, next)) => {
                        index = next;
                        chunk
                    }
                    None => {
                        return Err(PatchError::parse_at(
                            "failed to find context diff \"after\" hunk",
                            index,
                        ))
                    }
                }
            }
        };

        let mut after_count = 0;
        while after_count < after_chunk.length {
            if index >= lines.len() {
                if after_count == 0 {
                    break;
                }
                return Err(PatchError::UnexpectedEndOfPatch);
            }
            let line = &lines[index];
            if !(line.starts_with("! ") || line.starts_with("+ ") || line.starts_with("  ")) {
                if after_count == 0 {
                    break;
                }
                return Err(PatchError::parse_at(
                    "unexpected end of context diff hunk",
                    index,
                ));
            }
            after_count += 1;
            index += 1;
        }
        if index < lines.len() && lines[index].starts_with("\\ ") {
            index += 1;
        }

        let before = ContextBlock {
            offset: before_start_index - start_index,
            start: before_chunk.start,
            length: before_chunk.length,
            numlines: after_start_index - before_start_index,
        };
        let after = ContextBlock {
            offset: after_start_index - start_index,
            start: after_chunk.start,
            length: after_chunk.length,
            numlines: index - after_start_index,
        };
        Ok(Some((
            ContextHunk {
                lines: lines[start_index..index].to_vec(),
                before,
                after,
            },
            index,
        )))
    }

    /// If a context diff starts at `lines[start]`, parse it.
    pub fn get_diff_at(lines: &[String], start: usize) -> Result<Option<(ContextDiff, usize)>> {
        let parsed = parse_text_diff_at(
            lines,
            start,
            &BEFORE_FILE_CRE,
            &AFTER_FILE_CRE,
            Self::get_hunk_at,
            "context",
        )?;
        Ok(parsed.map(|(header, hunks, index)| (ContextDiff { header, hunks }, index)))
    }

    pub fn parse_lines(lines: &[String]) -> Result<ContextDiff> {
        match Self::get_diff_at(lines, 0)? {
            Some((diff, index)) if index >= lines.len() => Ok(diff),
            Some((_, index)) => Err(PatchError::parse_at("not a valid context diff", index)),
            None => Err(PatchError::parse("not a valid context diff")),
        }
    }

    pub fn parse_text(text: &str) -> Result<ContextDiff> {
        Self::parse_lines(&crate::lines::split_lines(text))
    }

    pub fn append_lines_to(&self, out: &mut Vec<String>) {
        out.extend_from_slice(&self.header.lines);
        for hunk in &self.hunks {
            out.extend_from_slice(&hunk.lines);
        }
    }

    /// Re-serialise the diff byte-for-byte.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        self.append_lines_to(&mut lines);
        lines.concat()
    }

    pub fn diffstat_stats(&self) -> DiffStats {
        self.hunks
            .iter()
            .map(ContextHunk::diffstat_stats)
            .fold(DiffStats::new(), |acc, s| acc + s)
    }

    pub fn fix_trailing_whitespace(&mut self) -> Vec<usize> {
        self.hunks
            .iter_mut()
            .flat_map(ContextHunk::fix_trailing_whitespace)
            .collect()
    }

    pub fn report_trailing_whitespace(&self) -> Vec<usize> {
        self.hunks
            .iter()
            .flat_map(ContextHunk::report_trailing_whitespace)
            .collect()
    }

    pub fn abstract_diff(&self) -> AbstractDiff {
        AbstractDiff::new(self.hunks.iter().map(ContextHunk::abstract_hunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::split_lines;
    use crate::merge::Severity;

    const SAMPLE: &str = "\
*** a/f.txt\t2020-01-01 00:00:00 +0000
--- b/f.txt\t2020-01-02 00:00:00 +0000
***************
*** 1,4 ****
  a
  b
! c
  d
--- 1,5 ----
  a
  b
! C
! C2
  d
";

    #[test]
    fn parses_and_round_trips() {
        let diff = ContextDiff::parse_text(SAMPLE).unwrap();
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.before.start, 1);
        assert_eq!(hunk.before.length, 4);
        assert_eq!(hunk.after.start, 1);
        assert_eq!(hunk.after.length, 5);
        assert_eq!(diff.to_text(), SAMPLE);
    }

    #[test]
    fn side_lines_strip_two_column_prefix() {
        let diff = ContextDiff::parse_text(SAMPLE).unwrap();
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.before_lines(), split_lines("a\nb\nc\nd\n"));
        assert_eq!(hunk.after_lines(), split_lines("a\nb\nC\nC2\nd\n"));
    }

    #[test]
    fn applies_exactly() {
        let diff = ContextDiff::parse_text(SAMPLE).unwrap();
        let input = split_lines("a\nb\nc\nd\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.abstract_diff().apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(result.concat(), "a\nb\nC\nC2\nd\n");
    }

    #[test]
    fn absent_after_body_derives_from_before() {
        let text = "\
*** a/f.txt
--- b/f.txt
***************
*** 1,3 ****
  a
- b
  c
--- 1,2 ----
";
        let diff = ContextDiff::parse_text(text).unwrap();
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.before_lines(), split_lines("a\nb\nc\n"));
        assert_eq!(hunk.after_lines(), split_lines("a\nc\n"));
        assert_eq!(diff.to_text(), text);

        let input = split_lines("a\nb\nc\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.abstract_diff().apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(result.concat(), "a\nc\n");
    }

    #[test]
    fn absent_before_body_derives_from_after() {
        let text = "\
*** a/f.txt
--- b/f.txt
***************
*** 2 ****
--- 2,3 ----
  b
+ new
";
        let diff = ContextDiff::parse_text(text).unwrap();
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.before_lines(), split_lines("b\n"));
        assert_eq!(hunk.after_lines(), split_lines("b\nnew\n"));
        assert_eq!(diff.to_text(), text);
    }

    #[test]
    fn zero_zero_range_means_empty() {
        let text = "\
*** /dev/null
--- b/new.txt
***************
*** 0,0 ****
--- 1,2 ----
+ one
+ two
";
        let diff = ContextDiff::parse_text(text).unwrap();
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.before.length, 0);
        assert!(hunk.before_lines().is_empty());
        assert_eq!(hunk.after_lines(), split_lines("one\ntwo\n"));

        let abstract_hunk = hunk.abstract_hunk();
        assert_eq!(abstract_hunk.before.start_index, 0);
    }

    #[test]
    fn no_newline_marker_in_after_block() {
        let text = "\
*** a/f.txt
--- b/f.txt
***************
*** 1 ****
! old
--- 1 ----
! new
\\ No newline at end of file
";
        let diff = ContextDiff::parse_text(text).unwrap();
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.after_lines(), vec!["new".to_string()]);
        assert_eq!(diff.to_text(), text);
    }

    #[test]
    fn missing_after_header_is_parse_error() {
        let text = "\
*** a/f.txt
--- b/f.txt
***************
*** 1,2 ****
  a
  b
stray line
";
        let err = ContextDiff::parse_text(text).unwrap_err();
        assert!(matches!(err, PatchError::Parse { .. }));
    }

    #[test]
    fn truncated_before_body_is_unexpected_end() {
        let text = "\
*** a/f.txt
--- b/f.txt
***************
*** 1,4 ****
  a
";
        let err = ContextDiff::parse_text(text).unwrap_err();
        assert!(matches!(err, PatchError::UnexpectedEndOfPatch));
    }

    #[test]
    fn diffstat_counts_context_prefixes() {
        let diff = ContextDiff::parse_text(SAMPLE).unwrap();
        let stats = diff.diffstat_stats();
        assert_eq!(stats.modified, 3);
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.deleted, 0);
    }

    #[test]
    fn trailing_whitespace_in_changed_after_lines() {
        let text = "\
*** a/f.txt
--- b/f.txt
***************
*** 3 ****
! old
--- 3 ----
! new \n";
        let mut diff = ContextDiff::parse_text(text).unwrap();
        assert_eq!(diff.report_trailing_whitespace(), vec![3]);
        assert_eq!(diff.fix_trailing_whitespace(), vec![3]);
        assert!(diff.report_trailing_whitespace().is_empty());
    }
}
