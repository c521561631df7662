//! Parse and re-serialise "unified" format diffs.

use std::sync::LazyLock;

use regex::Regex;

use crate::diff::{
    parse_text_diff_at, StartAndLength, TextDiffHeader, EITHER_TS_RE_STR, PATH_RE_STR,
};
use crate::diffstat::DiffStats;
use crate::error::{PatchError, Result};
use crate::lines::{line_content, trim_trailing_ws};
use crate::merge::{AbstractChunk, AbstractDiff, AbstractHunk};

static BEFORE_FILE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^--- {PATH_RE_STR}(?:\s+{EITHER_TS_RE_STR})?(.*)$")).unwrap()
});
static AFTER_FILE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\+\+\+ {PATH_RE_STR}(?:\s+{EITHER_TS_RE_STR})?(.*)$")).unwrap()
});
static HUNK_DATA_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@\s+-(\d+)(,(\d+))?\s+\+(\d+)(,(\d+))?\s+@@\s*(.*)$").unwrap()
});

/// A single unified diff hunk: its raw lines plus the declared
/// before/after ranges, kept so the hunk re-serialises byte-identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedHunk {
    pub lines: Vec<String>,
    pub before: StartAndLength,
    pub after: StartAndLength,
}

impl UnifiedHunk {
    /// Iterate one side of the hunk's content: body lines minus the
    /// skipped prefix, with the leading marker column removed. A line
    /// followed by a `\ No newline at end of file` marker loses its
    /// terminator.
    fn side_lines(&self, skip_prefix: char) -> Vec<String> {
        let mut out = Vec::new();
        let mut index = 1;
        while index < self.lines.len() {
            let line = &self.lines[index];
            if !line.starts_with(skip_prefix) {
                let content = &line[1..];
                if index + 1 == self.lines.len() || !self.lines[index + 1].starts_with('\\') {
                    out.push(content.to_string());
                } else {
                    out.push(line_content(content).to_string());
                }
            }
            index += 1;
            if index < self.lines.len() && self.lines[index].starts_with('\\') {
                index += 1;
            }
        }
        out
    }

    pub fn before_lines(&self) -> Vec<String> {
        self.side_lines('+')
    }

    pub fn after_lines(&self) -> Vec<String> {
        self.side_lines('-')
    }

    /// Trim trailing whitespace from added lines and return the 1-based
    /// after-file numbers of the lines that needed it.
    pub fn fix_trailing_whitespace(&mut self) -> Vec<usize> {
        let mut bad_lines = Vec::new();
        let mut after_count = 0;
        for index in 0..self.lines.len() {
            if self.lines[index].starts_with('+') {
                after_count += 1;
                let repl_line = trim_trailing_ws(&self.lines[index]);
                if repl_line.len() != self.lines[index].len() {
                    bad_lines.push(self.after.start + after_count - 1);
                    self.lines[index] = repl_line;
                }
            } else if self.lines[index].starts_with(' ') {
                after_count += 1;
            }
        }
        bad_lines
    }

    /// The 1-based after-file numbers of added lines carrying trailing
    /// whitespace, without changing anything.
    pub fn report_trailing_whitespace(&self) -> Vec<usize> {
        let mut bad_lines = Vec::new();
        let mut after_count = 0;
        for line in &self.lines {
            if line.starts_with('+') {
                after_count += 1;
                if trim_trailing_ws(line).len() != line.len() {
                    bad_lines.push(self.after.start + after_count - 1);
                }
            } else if line.starts_with(' ') {
                after_count += 1;
            }
        }
        bad_lines
    }

    pub fn diffstat_stats(&self) -> DiffStats {
        let mut stats = DiffStats::new();
        for line in &self.lines[1..] {
            if line.starts_with('-') {
                stats.deleted += 1;
            } else if line.starts_with('+') {
                stats.inserted += 1;
            } else if line.starts_with(' ') {
                stats.unchanged += 1;
            }
        }
        stats
    }

    /// The format-independent form of this hunk.
    ///
    /// Declared line numbers are 1-based; conversion to 0-based indices
    /// happens here and nowhere else. An empty side is declared to start
    /// at the line that follows it, so its number is already an index.
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

/// A unified format diff: header plus hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedDiff {
    pub header: TextDiffHeader,
    pub hunks: Vec<UnifiedHunk>,
}

impl UnifiedDiff {
    /// Extract the hunk starting at `lines[index]`, consuming body lines
    /// until both declared quotas are met: `-` counts against the before
    /// side, `+` against the after side, ` ` against both, `\` against
    /// neither.
    pub(crate) fn get_hunk_at(
        lines: &[String],
        index: usize,
    ) -> Result<Option<(UnifiedHunk, usize)>> {
        let Some(caps) = HUNK_DATA_CRE.captures(line_content(&lines[index])) else {
            return Ok(None);
        };
        let parse_num = |n: usize| caps.get(n).and_then(|m| m.as_str().parse::<usize>().ok());
        let before_start = parse_num(1).unwrap_or(0);
        let before_length = parse_num(3).unwrap_or(1);
        let after_start = parse_num(4).unwrap_or(0);
        let after_length = parse_num(6).unwrap_or(1);

        let start_index = index;
        let mut index = index + 1;
        let mut before_count = 0;
        let mut after_count = 0;
        while before_count < before_length || after_count < after_length {
            if index >= lines.len() {
                return Err(PatchError::UnexpectedEndOfPatch);
            }
            let line = &lines[index];
            if line.starts_with('-') {
                before_count += 1;
            } else if line.starts_with('+') {
                after_count += 1;
            } else if line.starts_with(' ') {
                before_count += 1;
                after_count += 1;
            } else if !line.starts_with('\\') {
                return Err(PatchError::parse_at(
                    "unexpected end of unified diff hunk",
                    index,
                ));
            }
            index += 1;
        }
        if index < lines.len() && lines[index].starts_with('\\') {
            index += 1;
        }
        Ok(Some((
            UnifiedHunk {
                lines: lines[start_index..index].to_vec(),
                before: StartAndLength {
                    start: before_start,
                    length: before_length,
                },
                after: StartAndLength {
                    start: after_start,
                    length: after_length,
                },
            },
            index,
        )))
    }

    /// If a unified diff starts at `lines[start]`, parse it.
    pub fn get_diff_at(lines: &[String], start: usize) -> Result<Option<(UnifiedDiff, usize)>> {
        let parsed = parse_text_diff_at(
            lines,
            start,
            &BEFORE_FILE_CRE,
            &AFTER_FILE_CRE,
            Self::get_hunk_at,
            "unified",
        )?;
        Ok(parsed.map(|(header, hunks, index)| (UnifiedDiff { header, hunks }, index)))
    }

    pub fn parse_lines(lines: &[String]) -> Result<UnifiedDiff> {
        match Self::get_diff_at(lines, 0)? {
            Some((diff, index)) if index >= lines.len() => Ok(diff),
            Some((_, index)) => Err(PatchError::parse_at("not a valid unified diff", index)),
            None => Err(PatchError::parse("not a valid unified diff")),
        }
    }

    pub fn parse_text(text: &str) -> Result<UnifiedDiff> {
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
            .map(UnifiedHunk::diffstat_stats)
            .fold(DiffStats::new(), |acc, s| acc + s)
    }

    pub fn fix_trailing_whitespace(&mut self) -> Vec<usize> {
        self.hunks
            .iter_mut()
            .flat_map(UnifiedHunk::fix_trailing_whitespace)
            .collect()
    }

    pub fn report_trailing_whitespace(&self) -> Vec<usize> {
        self.hunks
            .iter()
            .flat_map(UnifiedHunk::report_trailing_whitespace)
            .collect()
    }

    pub fn abstract_diff(&self) -> AbstractDiff {
        AbstractDiff::new(self.hunks.iter().map(UnifiedHunk::abstract_hunk).collect())
    }
}
