//! Format-independent hunks and the forward applier.
//!
//! A text diff of any dialect reduces to a sequence of abstract hunks:
//! a before chunk, an after chunk, and the number of context lines the
//! two share at head and tail. The applier walks those hunks over an
//! input buffer, tracking the offset between declared and actual
//! positions, reducing context when an exact match cannot be found,
//! detecting hunks whose effect is already present, and emitting
//! conflict markers when nothing else works — the useful subset of what
//! `patch --merge` does, in process.

use std::cmp::{max, min};
use std::fmt;
use std::io::Write;

/// Context reductions tried before a hunk is declared unplaceable.
pub const FUZZ_FACTOR: usize = 2;

// ---------------------------------------------------------------------------
// Severity and diagnostics
// ---------------------------------------------------------------------------

/// Worst-case classification of an application, ordered so that
/// `max` accumulates correctly across hunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

/// Sink for the applier's per-hunk diagnostic lines.
///
/// Production code routes these to standard error; tests capture them
/// in a `Vec<String>`.
pub trait DiagnosticSink {
    fn write_line(&mut self, line: &str);
}

impl DiagnosticSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Routes diagnostics to the process's standard error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(std::io::stderr(), "{line}");
    }
}

/// A 1-based position range in diagnostic output, shown as `start` or
/// `start-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPosn {
    pub start: usize,
    pub length: usize,
}

impl fmt::Display for AppliedPosn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.length > 1 {
            write!(f, "{}-{}", self.start, self.start + self.length - 1)
        } else {
            write!(f, "{}", self.start)
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-sequence search helpers
// ---------------------------------------------------------------------------

fn lines_contain_at(lines: &[String], sub: &[String], index: usize) -> bool {
    index + sub.len() <= lines.len() && lines[index..index + sub.len()] == *sub
}

fn find_first_sub_lines(lines: &[String], sub: &[String], from: usize) -> Option<usize> {
    if sub.len() > lines.len() {
        return None;
    }
    (from..=lines.len() - sub.len()).find(|&index| lines_contain_at(lines, sub, index))
}

fn common_head_len(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_tail_len(a: &[String], b: &[String]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

// ---------------------------------------------------------------------------
// Chunks and hunks
// ---------------------------------------------------------------------------

/// One side of an abstract hunk: where it starts (0-based, signed so a
/// zero-length side declared at line 0 can sit one before the buffer)
/// and the lines it expects or produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractChunk {
    pub start_index: isize,
    pub lines: Vec<String>,
}

impl AbstractChunk {
    /// Do `lines` hold this chunk's content at its position shifted by
    /// `offset`?
    pub fn matches_lines(&self, lines: &[String], offset: isize) -> bool {
        let index = self.start_index + offset;
        index >= 0 && lines_contain_at(lines, &self.lines, index as usize)
    }
}

/// A before/after chunk pair with the derived shared-context lengths
/// that drive fuzz reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractHunk {
    pub before: AbstractChunk,
    pub after: AbstractChunk,
    pub pre_context_len: usize,
    pub post_context_len: usize,
}

impl AbstractHunk {
    pub fn new(before: AbstractChunk, after: AbstractChunk) -> Self {
        let limit = min(before.lines.len(), after.lines.len());
        let pre_context_len = min(common_head_len(&before.lines, &after.lines), limit);
        let post_context_len = min(
            common_tail_len(&before.lines, &after.lines),
            limit - pre_context_len,
        );
        Self {
            before,
            after,
            pre_context_len,
            post_context_len,
        }
    }

    /// Search `lines` (from `from` onwards) for a position where this
    /// hunk applies after shedding up to `fuzz_factor` context lines
    /// from each end. Returns the position and the reductions used.
    fn compromised_posn(
        &self,
        lines: &[String],
        from: usize,
        fuzz_factor: usize,
    ) -> Option<(usize, usize, usize)> {
        let max_redn = min(fuzz_factor, max(self.pre_context_len, self.post_context_len));
        for context_redn in 0..=max_redn {
            let pre_redn = min(context_redn, self.pre_context_len);
            let post_redn = min(context_redn, self.post_context_len);
            let sub = &self.before.lines[pre_redn..self.before.lines.len() - post_redn];
            if let Some(start) = find_first_sub_lines(lines, sub, from) {
                return Some((start, pre_redn, post_redn));
            }
        }
        None
    }

    /// Does the content already reflect this hunk's application?
    fn is_already_applied_forward(&self, lines: &[String], offset: isize) -> bool {
        let fr_offset = self.before.start_index - self.after.start_index;
        self.after.matches_lines(lines, fr_offset + offset)
    }

    /// Diagnostic position of the changed region, computed from the
    /// input cursor after the hunk has been consumed.
    fn applied_posn(&self, end_index: usize, post_redn: usize) -> AppliedPosn {
        let num_lines = self.after.lines.len() - self.pre_context_len - self.post_context_len;
        let start = end_index as isize
            - num_lines as isize
            - (self.post_context_len - post_redn) as isize
            + 1;
        AppliedPosn {
            start: max(start, 1) as usize,
            length: num_lines,
        }
    }
}

// ---------------------------------------------------------------------------
// The applier
// ---------------------------------------------------------------------------

/// An ordered sequence of abstract hunks for one file.
#[derive(Debug, Clone)]
pub struct AbstractDiff {
    hunks: Vec<AbstractHunk>,
}

impl AbstractDiff {
    pub fn new(hunks: Vec<AbstractHunk>) -> Self {
        Self { hunks }
    }

    pub fn hunks(&self) -> &[AbstractHunk] {
        &self.hunks
    }

    /// Index of the first hunk (skipping `skipping`) whose before chunk
    /// does not match `lines` at its declared position shifted by
    /// `offset`, or `None` when every remaining hunk matches.
    pub fn first_before_mismatch(
        &self,
        lines: &[String],
        skipping: usize,
        offset: isize,
    ) -> Option<usize> {
        (skipping..self.hunks.len())
            .find(|&index| !self.hunks[index].before.matches_lines(lines, offset))
    }

    /// Apply every hunk to `lines`, in order, returning the worst
    /// severity seen and the output buffer. Content mismatches never
    /// fail; they degrade to fuzzy placement, an already-applied skip,
    /// or an inline conflict block, reported through `sink` as
    /// `<path>: Hunk #<n> <verb> at <position>.` lines.
    pub fn apply_forwards(
        &self,
        lines: &[String],
        sink: &mut dyn DiagnosticSink,
        reported_path: &str,
    ) -> (Severity, Vec<String>) {
        let mut result: Vec<String> = Vec::new();
        let mut lines_index: usize = 0;
        let mut ecode = Severity::Ok;
        let mut num_hunks_done = 0;
        let mut current_offset: isize = 0;

        while num_hunks_done < self.hunks.len() {
            let first_mismatch = self.first_before_mismatch(lines, num_hunks_done, current_offset);
            let matched_end = first_mismatch.unwrap_or(self.hunks.len());
            for hunk in &self.hunks[num_hunks_done..matched_end] {
                let at = (hunk.before.start_index + current_offset) as usize;
                result.extend_from_slice(&lines[lines_index..at.max(lines_index)]);
                result.extend_from_slice(&hunk.after.lines);
                lines_index = at + hunk.before.lines.len();
                num_hunks_done += 1;
            }
            let Some(mismatch) = first_mismatch else {
                break;
            };
            ecode = max(ecode, Severity::Warning);
            let hunk = &self.hunks[mismatch];
            if let Some((alt_start, pre_redn, post_redn)) =
                hunk.compromised_posn(lines, lines_index, FUZZ_FACTOR)
            {
                result.extend_from_slice(&lines[lines_index..alt_start]);
                let keep = hunk.after.lines.len() - post_redn;
                result.extend_from_slice(&hunk.after.lines[pre_redn..keep]);
                lines_index = alt_start + hunk.before.lines.len() - pre_redn - post_redn;
                current_offset = alt_start as isize - hunk.before.start_index - pre_redn as isize;
                sink.write_line(&format!(
                    "{}: Hunk #{} merged at {}.",
                    reported_path,
                    mismatch + 1,
                    hunk.applied_posn(lines_index, post_redn)
                ));
            } else if hunk.is_already_applied_forward(lines, current_offset) {
                let upto = ((hunk.after.start_index + current_offset).max(0) as usize
                    + hunk.after.lines.len())
                .clamp(lines_index, lines.len());
                result.extend_from_slice(&lines[lines_index..upto]);
                lines_index = upto;
                current_offset += hunk.after.lines.len() as isize - hunk.before.lines.len() as isize;
                sink.write_line(&format!(
                    "{}: Hunk #{} already applied at {}.",
                    reported_path,
                    mismatch + 1,
                    hunk.applied_posn(lines_index, 0)
                ));
            } else {
                ecode = Severity::Error;
                let before_hlen = hunk.before.lines.len() - hunk.post_context_len;
                if hunk.before.start_index + current_offset + before_hlen as isize
                    > lines.len() as isize
                {
                    // Not enough input left to even show a conflict.
                    let remaining = self.hunks.len() - num_hunks_done;
                    let detail = if remaining > 1 {
                        format!(
                            "Hunks #{}-{} could NOT be applied.",
                            num_hunks_done + 1,
                            self.hunks.len()
                        )
                    } else {
                        format!("Hunk #{} could NOT be applied.", num_hunks_done + 1)
                    };
                    sink.write_line(&format!(
                        "{reported_path}: Unexpected end of file: {detail}"
                    ));
                    break;
                }
                let at = ((hunk.before.start_index + current_offset).max(0) as usize)
                    .max(lines_index);
                result.extend_from_slice(&lines[lines_index..at]);
                lines_index = at;
                result.push("<<<<<<<\n".to_string());
                let start_line = result.len();
                let window_end = (lines_index + before_hlen).min(lines.len());
                result.extend_from_slice(&lines[lines_index..window_end]);
                lines_index = window_end;
                result.push("=======\n".to_string());
                let keep = hunk.after.lines.len() - hunk.post_context_len;
                result.extend_from_slice(&hunk.after.lines[..keep]);
                result.push(">>>>>>>\n".to_string());
                let end_line = result.len();
                sink.write_line(&format!(
                    "{}: Hunk #{} NOT MERGED at {}-{}.",
                    reported_path,
                    mismatch + 1,
                    start_line,
                    end_line
                ));
            }
            num_hunks_done += 1;
        }
        result.extend_from_slice(&lines[lines_index..]);
        (ecode, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::split_lines;

    fn chunk(start_index: isize, text: &str) -> AbstractChunk {
        AbstractChunk {
            start_index,
            lines: split_lines(text),
        }
    }

    /// The hunk used by the walkthrough scenarios: replace line `c` of
    /// `a b c d` with `C C2`, with full context on both sides.
    fn replace_c_hunk() -> AbstractHunk {
        AbstractHunk::new(chunk(0, "a\nb\nc\nd\n"), chunk(0, "a\nb\nC\nC2\nd\n"))
    }

    #[test]
    fn context_lengths_are_derived() {
        let hunk = replace_c_hunk();
        assert_eq!(hunk.pre_context_len, 2);
        assert_eq!(hunk.post_context_len, 1);
    }

    #[test]
    fn context_lengths_never_overlap() {
        // Identical sides: all shared, but pre + post stays within bounds.
        let hunk = AbstractHunk::new(chunk(0, "a\nb\n"), chunk(0, "a\nb\n"));
        assert!(hunk.pre_context_len + hunk.post_context_len <= 2);
    }

    #[test]
    fn exact_application() {
        let diff = AbstractDiff::new(vec![replace_c_hunk()]);
        let input = split_lines("a\nb\nc\nd\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(result.concat(), "a\nb\nC\nC2\nd\n");
        assert!(sink.is_empty());
    }

    #[test]
    fn fuzzy_application_reports_merge() {
        let diff = AbstractDiff::new(vec![replace_c_hunk()]);
        let input = split_lines("x\na\nb\nc\nd\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(result.concat(), "x\na\nb\nC\nC2\nd\n");
        assert_eq!(sink, vec!["f: Hunk #1 merged at 3-4.".to_string()]);
    }

    #[test]
    fn already_applied_is_detected() {
        let diff = AbstractDiff::new(vec![replace_c_hunk()]);
        let input = split_lines("a\nb\nC\nC2\nd\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(result.concat(), "a\nb\nC\nC2\nd\n");
        assert_eq!(sink, vec!["f: Hunk #1 already applied at 3-4.".to_string()]);
    }

    #[test]
    fn conflict_emits_marker_block() {
        let diff = AbstractDiff::new(vec![replace_c_hunk()]);
        let input = split_lines("a\nb\nZ\nd\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Error);
        let text = result.concat();
        assert_eq!(
            text,
            "<<<<<<<\na\nb\nZ\n=======\na\nb\nC\nC2\n>>>>>>>\nd\n"
        );
        assert_eq!(sink, vec!["f: Hunk #1 NOT MERGED at 1-10.".to_string()]);
    }

    #[test]
    fn file_too_short_stops_application() {
        let diff = AbstractDiff::new(vec![AbstractHunk::new(
            chunk(10, "p\nq\nr\n"),
            chunk(10, "p\nQ\nr\n"),
        )]);
        let input = split_lines("a\nb\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Error);
        assert_eq!(result.concat(), "a\nb\n");
        assert_eq!(
            sink,
            vec!["f: Unexpected end of file: Hunk #1 could NOT be applied.".to_string()]
        );
    }

    #[test]
    fn offset_is_tracked_across_hunks() {
        // Two hunks; a one-line prefix shifts both. The first merges
        // fuzzily, the second then matches exactly at the shifted
        // position with no further diagnostics.
        let hunk1 = AbstractHunk::new(chunk(0, "a\nb\n"), chunk(0, "a\nB\n"));
        let hunk2 = AbstractHunk::new(chunk(4, "e\nf\n"), chunk(4, "e\nF\n"));
        let diff = AbstractDiff::new(vec![hunk1, hunk2]);

        let plain = split_lines("a\nb\nc\nd\ne\nf\n");
        let mut sink = Vec::new();
        let (ecode, plain_result) = diff.apply_forwards(&plain, &mut sink, "f");
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(plain_result.concat(), "a\nB\nc\nd\ne\nF\n");

        let shifted = split_lines("x\na\nb\nc\nd\ne\nf\n");
        let mut sink = Vec::new();
        let (ecode, shifted_result) = diff.apply_forwards(&shifted, &mut sink, "f");
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(shifted_result.concat(), "x\na\nB\nc\nd\ne\nF\n");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn pure_insertion_applies_at_declared_position() {
        let hunk = AbstractHunk::new(chunk(1, ""), chunk(1, "new\n"));
        let diff = AbstractDiff::new(vec![hunk]);
        let input = split_lines("a\nb\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(result.concat(), "a\nnew\nb\n");
    }

    #[test]
    fn pure_deletion_applies_when_window_matches() {
        let hunk = AbstractHunk::new(chunk(1, "b\n"), chunk(1, ""));
        let diff = AbstractDiff::new(vec![hunk]);
        let input = split_lines("a\nb\nc\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&input, &mut sink, "f");
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(result.concat(), "a\nc\n");
    }

    #[test]
    fn every_hunk_already_applied_is_idempotent() {
        // The insertion hunk carries three context lines per side so no
        // fuzz reduction can shrink its needle to pure context that
        // still occurs in the applied text.
        let hunk1 = AbstractHunk::new(chunk(0, "a\nb\nc\n"), chunk(0, "a\nB\nc\n"));
        let hunk2 = AbstractHunk::new(
            chunk(3, "d\ne\nf\ng\nh\ni\n"),
            chunk(3, "d\ne\nf\nNEW\ng\nh\ni\n"),
        );
        let diff = AbstractDiff::new(vec![hunk1, hunk2]);
        let original = split_lines("a\nb\nc\nd\ne\nf\ng\nh\ni\n");
        let mut sink = Vec::new();
        let (first_ecode, applied) = diff.apply_forwards(&original, &mut sink, "f");
        assert_eq!(first_ecode, Severity::Ok);
        assert_eq!(applied.concat(), "a\nB\nc\nd\ne\nf\nNEW\ng\nh\ni\n");

        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&applied, &mut sink, "f");
        assert!(ecode <= Severity::Warning);
        assert_eq!(result, applied);
        assert_eq!(sink.len(), 2);
        assert!(sink.iter().all(|line| line.contains("already applied")));
    }

    #[test]
    fn already_applied_skip_preserves_drift_arithmetic() {
        // Both hunks are already applied and the first grew the file by
        // one line, so the second hunk's after-side start already
        // carries that growth. The skip consumes input relative to the
        // after-side start (clamped to the buffer) and the remainder of
        // the file survives intact.
        let hunk1 = AbstractHunk::new(chunk(0, "a\nb\nc\n"), chunk(0, "a\nB1\nB2\nc\n"));
        let hunk2 = AbstractHunk::new(chunk(3, "d\ne\nf\n"), chunk(4, "d\nE\nf\n"));
        let diff = AbstractDiff::new(vec![hunk1, hunk2]);
        let applied = split_lines("a\nB1\nB2\nc\nd\nE\nf\n");
        let mut sink = Vec::new();
        let (ecode, result) = diff.apply_forwards(&applied, &mut sink, "f");
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(result, applied);
        assert_eq!(
            sink,
            vec![
                "f: Hunk #1 already applied at 2-3.".to_string(),
                "f: Hunk #2 already applied at 6.".to_string(),
            ]
        );
    }

    #[test]
    fn applied_posn_formats_single_and_range() {
        assert_eq!(AppliedPosn { start: 3, length: 1 }.to_string(), "3");
        assert_eq!(AppliedPosn { start: 3, length: 2 }.to_string(), "3-4");
        assert_eq!(AppliedPosn { start: 5, length: 0 }.to_string(), "5");
    }
}
