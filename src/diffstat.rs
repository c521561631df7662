//! The numeric diffstat model.
//!
//! Holds per-hunk change counters, per-path aggregates, and the detector
//! that recognises a `diffstat` summary embedded in a patch header. Only
//! the numbers are modelled here; rendering the familiar bar chart is a
//! presentation concern that lives elsewhere.

use std::ops::{Add, AddAssign};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{PatchError, Result};
use crate::lines::line_content;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Line-change counters for one hunk, diff or whole patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub inserted: u32,
    pub deleted: u32,
    pub modified: u32,
    pub unchanged: u32,
}

impl DiffStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// All counted lines.
    pub fn total(&self) -> u32 {
        self.inserted + self.deleted + self.modified + self.unchanged
    }

    /// Counted lines that represent a change.
    pub fn total_changes(&self) -> u32 {
        self.inserted + self.deleted + self.modified
    }

    /// Render the non-zero counters the way diffstat end lines do,
    /// e.g. `, 3 insertions(+), 1 deletion(-)`.
    pub fn summary_fragment(&self) -> String {
        let mut parts = Vec::new();
        for (count, singular, mark) in [
            (self.inserted, "insertion", "+"),
            (self.deleted, "deletion", "-"),
            (self.modified, "modification", "!"),
        ] {
            if count > 0 {
                let plural = if count == 1 { "" } else { "s" };
                parts.push(format!("{count} {singular}{plural}({mark})"));
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(", {}", parts.join(", "))
        }
    }
}

impl Add for DiffStats {
    type Output = DiffStats;

    fn add(self, other: DiffStats) -> DiffStats {
        DiffStats {
            inserted: self.inserted + other.inserted,
            deleted: self.deleted + other.deleted,
            modified: self.modified + other.modified,
            unchanged: self.unchanged + other.unchanged,
        }
    }
}

impl AddAssign for DiffStats {
    fn add_assign(&mut self, other: DiffStats) {
        *self = *self + other;
    }
}

/// A file path with its accumulated statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStats {
    pub path: Option<String>,
    pub stats: DiffStats,
}

// ---------------------------------------------------------------------------
// Summary detection
// ---------------------------------------------------------------------------

static EMPTY_CRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#? 0 files changed$").unwrap());
static END_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^#? (\d+) files? changed(, (\d+) insertions?\(\+\))?(, (\d+) deletions?\(-\))?(, (\d+) modifications?\(!\))?$",
    )
    .unwrap()
});
static FSTATS_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#? (\S+)\s*\|((binary)|(\s*(\d+)(\s+\+*-*!*)?))$").unwrap()
});
static BLANK_LINE_CRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*$").unwrap());
static DIVIDER_LINE_CRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^---$").unwrap());

/// If a diffstat summary starts at `lines[index]`, return the number of
/// lines it occupies, else 0.
///
/// A summary is an optional `---` divider, any number of blank lines,
/// then either the empty summary line or one or more per-file lines
/// closed by an end line. Per-file lines with no end line are the only
/// malformed shape.
pub fn summary_length_at(lines: &[String], index: usize) -> Result<usize> {
    let start = index;
    let mut index = index;
    if index < lines.len() && DIVIDER_LINE_CRE.is_match(line_content(&lines[index])) {
        index += 1;
    }
    while index < lines.len() && BLANK_LINE_CRE.is_match(line_content(&lines[index])) {
        index += 1;
    }
    if index >= lines.len() {
        return Ok(0);
    }
    if EMPTY_CRE.is_match(line_content(&lines[index])) {
        return Ok(index - start + 1);
    }
    let mut count = 0;
    while index < lines.len() && FSTATS_CRE.is_match(line_content(&lines[index])) {
        count += 1;
        index += 1;
    }
    if count == 0 {
        return Ok(0);
    }
    if index < lines.len() && END_CRE.is_match(line_content(&lines[index])) {
        return Ok(index - start + 1);
    }
    Err(PatchError::MalformedSummary {
        lineno: Some(index),
    })
}

/// True when `lines[index]` starts a valid diffstat summary.
pub fn summary_starts_at(lines: &[String], index: usize) -> Result<bool> {
    Ok(summary_length_at(lines, index)? != 0)
}
