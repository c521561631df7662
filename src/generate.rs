//! Generate diffs from before/after content.
//!
//! A line-level differ (`similar`) produces grouped change operations;
//! this module renders them into unified or context format, appends
//! `\ No newline at end of file` markers where the content demands
//! them, and re-parses the result so generated diffs are exactly the
//! parsed kind the rest of the crate works with.

use similar::{ChangeTag, DiffTag, TextDiff};

use crate::context::ContextDiff;
use crate::error::Result;
use crate::git_binary::{self, DeltaFn, GitBinaryDiff};
use crate::lines::split_lines;
use crate::unified::UnifiedDiff;

/// One side of a generated diff: its content, the label for the header
/// line, and an optional timestamp.
#[derive(Debug, Clone, Default)]
pub struct DiffInput {
    pub content: String,
    pub label: String,
    pub timestamp: Option<String>,
}

impl DiffInput {
    pub fn new(content: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            label: label.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    fn header_line(&self, prefix: &str) -> String {
        match &self.timestamp {
            Some(ts) => format!("{prefix} {}\t{ts}\n", self.label),
            None => format!("{prefix} {}\n", self.label),
        }
    }
}

fn format_range_unified(start: usize, stop: usize) -> String {
    let mut beginning = start + 1;
    let length = stop - start;
    if length == 1 {
        return beginning.to_string();
    }
    if length == 0 {
        beginning -= 1;
    }
    format!("{beginning},{length}")
}

fn format_range_context(start: usize, stop: usize) -> String {
    let mut beginning = start + 1;
    let length = stop - start;
    if length == 0 {
        beginning -= 1;
    }
    if length <= 1 {
        return beginning.to_string();
    }
    format!("{},{}", beginning, beginning + length - 1)
}

/// Terminate every line, inserting a no-newline marker after content
/// that did not end with one.
fn ensure_terminated(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if line.ends_with('\n') {
            out.push(line);
        } else {
            out.push(format!("{line}\n"));
            out.push("\\ No newline at end of file\n".to_string());
        }
    }
    out
}

/// Generate a unified diff, or `None` when the contents are identical.
pub fn unified(
    before: &DiffInput,
    after: &DiffInput,
    num_context_lines: usize,
) -> Result<Option<UnifiedDiff>> {
    let text_diff = TextDiff::from_lines(&before.content, &after.content);
    let groups = text_diff.grouped_ops(num_context_lines);
    if groups.is_empty() {
        return Ok(None);
    }
    let mut lines = vec![before.header_line("---"), after.header_line("+++")];
    for group in &groups {
        let old_start = group.first().map(|op| op.old_range().start).unwrap_or(0);
        let old_end = group.last().map(|op| op.old_range().end).unwrap_or(0);
        let new_start = group.first().map(|op| op.new_range().start).unwrap_or(0);
        let new_end = group.last().map(|op| op.new_range().end).unwrap_or(0);
        lines.push(format!(
            "@@ -{} +{} @@\n",
            format_range_unified(old_start, old_end),
            format_range_unified(new_start, new_end)
        ));
        for op in group {
            for change in text_diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                lines.push(format!("{sign}{}", change.value()));
            }
        }
    }
    UnifiedDiff::parse_lines(&ensure_terminated(lines)).map(Some)
}

/// Generate a context diff, or `None` when the contents are identical.
pub fn context(
    before: &DiffInput,
    after: &DiffInput,
    num_context_lines: usize,
) -> Result<Option<ContextDiff>> {
    let text_diff = TextDiff::from_lines(&before.content, &after.content);
    let groups = text_diff.grouped_ops(num_context_lines);
    if groups.is_empty() {
        return Ok(None);
    }
    let old_lines = split_lines(&before.content);
    let new_lines = split_lines(&after.content);
    let mut lines = vec![before.header_line("***"), after.header_line("---")];
    for group in &groups {
        let old_start = group.first().map(|op| op.old_range().start).unwrap_or(0);
        let old_end = group.last().map(|op| op.old_range().end).unwrap_or(0);
        let new_start = group.first().map(|op| op.new_range().start).unwrap_or(0);
        let new_end = group.last().map(|op| op.new_range().end).unwrap_or(0);

        lines.push("***************\n".to_string());
        lines.push(format!(
            "*** {} ****\n",
            format_range_context(old_start, old_end)
        ));
        if group
            .iter()
            .any(|op| matches!(op.tag(), DiffTag::Delete | DiffTag::Replace))
        {
            for op in group {
                let prefix = match op.tag() {
                    DiffTag::Equal => "  ",
                    DiffTag::Delete => "- ",
                    DiffTag::Replace => "! ",
                    DiffTag::Insert => continue,
                };
                for line in &old_lines[op.old_range()] {
                    lines.push(format!("{prefix}{line}"));
                }
            }
        }
        lines.push(format!(
            "--- {} ----\n",
            format_range_context(new_start, new_end)
        ));
        if group
            .iter()
            .any(|op| matches!(op.tag(), DiffTag::Insert | DiffTag::Replace))
        {
            for op in group {
                let prefix = match op.tag() {
                    DiffTag::Equal => "  ",
                    DiffTag::Insert => "+ ",
                    DiffTag::Replace => "! ",
                    DiffTag::Delete => continue,
                };
                for line in &new_lines[op.new_range()] {
                    lines.push(format!("{prefix}{line}"));
                }
            }
        }
    }
    ContextDiff::parse_lines(&ensure_terminated(lines)).map(Some)
}

/// Generate a git binary diff, or `None` for identical content. The
/// optional `delta` hook supplies git-delta bytes; without one every
/// block is a literal.
pub fn git_binary(
    before: &[u8],
    after: &[u8],
    delta: Option<&DeltaFn>,
) -> Result<Option<GitBinaryDiff>> {
    git_binary::generate_diff(before, after, delta)
}
