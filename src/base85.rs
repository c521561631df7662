//! Git's base-85 line codec.
//!
//! `GIT binary patch` data lines carry zlib-compressed bytes in git's
//! base-85 variant: each line opens with a length character (`A`-`Z`
//! for 1-52 bytes via `a`-`z`) followed by five encoded characters per
//! four bytes, at most 52 raw bytes per line. The git-binary parser
//! consumes this module through [`decode_lines`] / [`encode_to_lines`]
//! and recognises data lines with [`is_data_line`].

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{PatchError, Result};
use crate::lines::line_content;

const ENCODE: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

/// Maximum raw bytes encoded on one line.
pub const MAX_BYTES_PER_LINE: usize = 52;

static LINE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z](?:[0-9A-Za-z!#$%&()*+;<=>?@^_`{|}~-]{5})+$").unwrap()
});

static DECODE: LazyLock<[i16; 256]> = LazyLock::new(|| {
    let mut table = [-1i16; 256];
    for (value, &ch) in ENCODE.iter().enumerate() {
        table[ch as usize] = value as i16;
    }
    table
});

/// Does this line look like a base-85 data line?
pub fn is_data_line(line: &str) -> bool {
    LINE_CRE.is_match(line_content(line))
}

fn length_char_value(ch: u8) -> Option<usize> {
    match ch {
        b'A'..=b'Z' => Some((ch - b'A') as usize + 1),
        b'a'..=b'z' => Some((ch - b'a') as usize + 27),
        _ => None,
    }
}

fn length_char_for(len: usize) -> u8 {
    if len <= 26 {
        b'A' + (len - 1) as u8
    } else {
        b'a' + (len - 27) as u8
    }
}

/// Decode the data lines of one binary block into raw (still
/// zlib-compressed) bytes.
pub fn decode_lines(lines: &[String]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for (lineno, line) in lines.iter().enumerate() {
        let content = line_content(line).as_bytes();
        let byte_count = content
            .first()
            .copied()
            .and_then(length_char_value)
            .ok_or_else(|| PatchError::data_at("invalid base85 length character", lineno))?;
        let encoded = &content[1..];
        if encoded.len() != byte_count.div_ceil(4) * 5 {
            return Err(PatchError::data_at("base85 line length mismatch", lineno));
        }
        let mut decoded = Vec::with_capacity(encoded.len() / 5 * 4);
        for group in encoded.chunks(5) {
            let mut acc: u64 = 0;
            for &ch in group {
                let value = DECODE[ch as usize];
                if value < 0 {
                    return Err(PatchError::data_at("invalid base85 character", lineno));
                }
                acc = acc * 85 + value as u64;
            }
            if acc > u32::MAX as u64 {
                return Err(PatchError::data_at("base85 group overflow", lineno));
            }
            decoded.extend_from_slice(&(acc as u32).to_be_bytes());
        }
        if byte_count > decoded.len() {
            return Err(PatchError::data_at("base85 line too short", lineno));
        }
        data.extend_from_slice(&decoded[..byte_count]);
    }
    Ok(data)
}

/// Encode raw bytes into data lines, 52 bytes per line, each line
/// terminated with `\n`.
pub fn encode_to_lines(data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in data.chunks(MAX_BYTES_PER_LINE) {
        let mut line = String::new();
        line.push(length_char_for(chunk.len()) as char);
        for group in chunk.chunks(4) {
            let mut word = [0u8; 4];
            word[..group.len()].copy_from_slice(group);
            let mut acc = u32::from_be_bytes(word);
            let mut encoded = [0u8; 5];
            for slot in encoded.iter_mut().rev() {
                *slot = ENCODE[(acc % 85) as usize];
                acc /= 85;
            }
            line.push_str(std::str::from_utf8(&encoded).unwrap());
        }
        line.push('\n');
        lines.push(line);
    }
    lines
}
