//! Parse and generate `GIT binary patch` blocks.
//!
//! A git binary diff holds one or two data blocks (forward, and
//! usually the reverse for `git apply -R`), each opened by a
//! `literal <size>` or `delta <size>` line and carrying zlib-compressed
//! bytes in base-85 data lines. The declared size is the decompressed
//! length and is verified on parse.

use std::io::{Read, Write};
use std::sync::LazyLock;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use regex::Regex;

use crate::base85;
use crate::error::{PatchError, Result};
use crate::lines::line_content;

/// zlib level used for generated blocks.
const ZLIB_COMPRESSION_LEVEL: u32 = 6;

static START_CRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^GIT binary patch$").unwrap());
static DATA_START_CRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(literal|delta) (\d+)$").unwrap());
static BLANK_LINE_CRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*$").unwrap());

pub(crate) fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(ZLIB_COMPRESSION_LEVEL));
    // Writing to a Vec cannot fail.
    encoder.write_all(data).unwrap_or_default();
    encoder.finish().unwrap_or_default()
}

pub(crate) fn zlib_decompress(data: &[u8], lineno: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| PatchError::data_at("invalid zlib stream in binary patch", lineno))?;
    Ok(out)
}

/// How a data block encodes its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMethod {
    Literal,
    Delta,
}

/// One data block of a git binary diff: its raw lines, the method, the
/// declared decompressed size and the still-compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitBinaryDiffData {
    pub lines: Vec<String>,
    pub method: DataMethod,
    pub size_raw: usize,
    pub data_zipped: Vec<u8>,
}

impl GitBinaryDiffData {
    /// Decompress the payload.
    pub fn data_raw(&self) -> Result<Vec<u8>> {
        zlib_decompress(&self.data_zipped, 0)
    }
}

/// A git binary diff: the `GIT binary patch` line plus a forward block
/// and an optional reverse block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitBinaryDiff {
    pub lines: Vec<String>,
    pub forward: GitBinaryDiffData,
    pub reverse: Option<GitBinaryDiffData>,
}

impl GitBinaryDiff {
    /// If a data block starts at `lines[start]`, decode and verify it.
    fn get_data_at(
        lines: &[String],
        start: usize,
    ) -> Result<Option<(GitBinaryDiffData, usize)>> {
        if start >= lines.len() {
            return Ok(None);
        }
        let Some(caps) = DATA_START_CRE.captures(line_content(&lines[start])) else {
            return Ok(None);
        };
        let method = match caps.get(1).map(|m| m.as_str()) {
            Some("delta") => DataMethod::Delta,
            _ => DataMethod::Literal,
        };
        let size: usize = caps.get(2).unwrap().as_str().parse().unwrap_or(0);
        let mut index = start + 1;
        while index < lines.len() && base85::is_data_line(&lines[index]) {
            index += 1;
        }
        let end_data = index;
        // Absorb the blank line closing the block, if present.
        if index < lines.len() && BLANK_LINE_CRE.is_match(line_content(&lines[index])) {
            index += 1;
        }
        let data_zipped = base85::decode_lines(&lines[start + 1..end_data]).map_err(|_| {
            PatchError::data_at("inconsistent git binary patch data", start)
        })?;
        let raw_size = zlib_decompress(&data_zipped, start)?.len();
        if raw_size != size {
            return Err(PatchError::data_at(
                format!("git binary patch expected {size} bytes, got {raw_size} bytes"),
                start,
            ));
        }
        Ok(Some((
            GitBinaryDiffData {
                lines: lines[start..index].to_vec(),
                method,
                size_raw: raw_size,
                data_zipped,
            },
            index,
        )))
    }

    /// If a git binary diff starts at `lines[start]`, parse it.
    pub fn get_diff_at(lines: &[String], start: usize) -> Result<Option<(GitBinaryDiff, usize)>> {
        if start >= lines.len() || !START_CRE.is_match(line_content(&lines[start])) {
            return Ok(None);
        }
        let Some((forward, index)) = Self::get_data_at(lines, start + 1)? else {
            return Err(PatchError::parse_at(
                "no content in GIT binary patch text",
                start + 1,
            ));
        };
        let (reverse, index) = match Self::get_data_at(lines, index)? {
            Some((data, next)) => (Some(data), next),
            None => (None, index),
        };
        Ok(Some((
            GitBinaryDiff {
                lines: lines[start..index].to_vec(),
                forward,
                reverse,
            },
            index,
        )))
    }

    pub fn parse_lines(lines: &[String]) -> Result<GitBinaryDiff> {
        match Self::get_diff_at(lines, 0)? {
            Some((diff, index)) if index >= lines.len() => Ok(diff),
            Some((_, index)) => Err(PatchError::parse_at("not a valid git binary diff", index)),
            None => Err(PatchError::parse("not a valid git binary diff")),
        }
    }

    pub fn parse_text(text: &str) -> Result<GitBinaryDiff> {
        Self::parse_lines(&crate::lines::split_lines(text))
    }

    /// Re-serialise the diff byte-for-byte.
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }
}

/// Optional delta computation hook: produces git-delta bytes that turn
/// `from` into `to`, or `None` when a delta is unavailable.
pub type DeltaFn = dyn Fn(&[u8], &[u8]) -> Option<Vec<u8>>;

fn component_lines(
    from_raw: &[u8],
    to_raw: &[u8],
    to_zipped: &[u8],
    delta: Option<&DeltaFn>,
) -> Vec<String> {
    let delta_zipped = delta
        .and_then(|f| f(from_raw, to_raw))
        .map(|d| (d.len(), zlib_compress(&d)));
    let mut lines = Vec::new();
    match delta_zipped {
        Some((raw_len, zipped)) if zipped.len() < to_zipped.len() => {
            lines.push(format!("delta {raw_len}\n"));
            lines.extend(base85::encode_to_lines(&zipped));
        }
        _ => {
            lines.push(format!("literal {}\n", to_raw.len()));
            lines.extend(base85::encode_to_lines(to_zipped));
        }
    }
    lines.push("\n".to_string());
    lines
}

/// Generate the text lines of a git binary diff for a content change,
/// forward block first then reverse. Identical content produces no
/// lines.
pub fn generate_diff_lines(before: &[u8], after: &[u8], delta: Option<&DeltaFn>) -> Vec<String> {
    if before == after {
        return Vec::new();
    }
    let before_zipped = zlib_compress(before);
    let after_zipped = zlib_compress(after);
    let mut lines = vec!["GIT binary patch\n".to_string()];
    lines.extend(component_lines(before, after, &after_zipped, delta));
    lines.extend(component_lines(after, before, &before_zipped, delta));
    lines
}

/// Generate and re-parse a git binary diff, or `None` for identical
/// content.
pub fn generate_diff(
    before: &[u8],
    after: &[u8],
    delta: Option<&DeltaFn>,
) -> Result<Option<GitBinaryDiff>> {
    let lines = generate_diff_lines(before, after, delta);
    if lines.is_empty() {
        return Ok(None);
    }
    GitBinaryDiff::parse_lines(&lines).map(Some)
}
