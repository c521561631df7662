//! Line-oriented text primitives.
//!
//! Every parser and the applier work on sequences of lines that keep
//! their original terminators, because the diff formats signal "no
//! newline at end of file" through the terminator status of the
//! preceding line. A line is a `String` ending in `\n` (possibly
//! preceded by `\r`) or, for the final line of unterminated input,
//! nothing at all.

/// Split text into lines, each keeping its terminator.
///
/// A trailing fragment without a newline becomes the final line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            lines.push(text[start..=i].to_string());
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(text[start..].to_string());
    }
    lines
}

/// Concatenate lines back into text. The inverse of [`split_lines`].
pub fn join_lines(lines: &[String]) -> String {
    lines.concat()
}

/// The line's content without its terminator.
pub fn line_content(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}

/// The line's terminator (`"\n"`, `"\r\n"` or `""`).
pub fn line_terminator(line: &str) -> &str {
    &line[line_content(line).len()..]
}

/// Remove spaces and tabs sitting immediately before the terminator.
pub fn trim_trailing_ws(line: &str) -> String {
    let content = line_content(line);
    let terminator = line_terminator(line);
    format!("{}{}", content.trim_end_matches([' ', '\t']), terminator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_preserves_terminators() {
        let lines = split_lines("a\nb\r\nc");
        assert_eq!(lines, vec!["a\n", "b\r\n", "c"]);
    }

    #[test]
    fn split_empty_text() {
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn join_is_inverse_of_split() {
        let text = "one\ntwo\r\nthree\n";
        assert_eq!(join_lines(&split_lines(text)), text);
        let unterminated = "one\ntwo";
        assert_eq!(join_lines(&split_lines(unterminated)), unterminated);
    }

    #[test]
    fn content_and_terminator() {
        assert_eq!(line_content("abc\n"), "abc");
        assert_eq!(line_content("abc\r\n"), "abc");
        assert_eq!(line_content("abc"), "abc");
        assert_eq!(line_terminator("abc\r\n"), "\r\n");
        assert_eq!(line_terminator("abc"), "");
    }

    #[test]
    fn trim_trailing_whitespace() {
        assert_eq!(trim_trailing_ws("code \t\n"), "code\n");
        assert_eq!(trim_trailing_ws("code\n"), "code\n");
        assert_eq!(trim_trailing_ws("code  "), "code");
        assert_eq!(trim_trailing_ws("  indented\n"), "  indented\n");
    }
}
