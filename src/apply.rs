//! Apply a parsed diff to a file on disk.
//!
//! The driver owns everything around the in-process applier: reading
//! the target (an absent file is only unremarkable when the diff
//! creates it), the trailing-whitespace policy, the optional
//! delegation to an external `patch` implementation when the diff does
//! not apply cleanly, and writing or deleting the result.

use std::path::Path;

use tracing::debug;

use crate::diff::Diff;
use crate::error::{PatchError, Result};
use crate::lines::{join_lines, split_lines};
use crate::merge::{DiagnosticSink, Severity};
use crate::paths::{DiffOutcome, DEV_NULL};

/// Fallback hook standing in for an external `patch` process; its
/// result supersedes the in-process applier's.
pub trait ExternalPatchApplier {
    /// Apply `diff_text` to `text`, reporting against `reported_path`.
    /// Returns the severity, the new text and any diagnostic output.
    fn apply(&self, text: &str, diff_text: &str, reported_path: &str)
        -> (Severity, String, String);
}

/// Driver policy knobs.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Path to report in diagnostics instead of the target path.
    pub reported_path: Option<String>,
    /// Silently strip trailing whitespace the diff would add; when
    /// false it is reported instead and the result is at least a
    /// warning.
    pub drop_atws: bool,
}

/// Apply `diff` to the file at `file_path` and rewrite it in place,
/// deleting it instead when the result is empty and the diff's target
/// is `/dev/null`. Returns the worst severity encountered.
pub fn apply_diff_to_file(
    diff: &mut Diff,
    file_path: &Path,
    options: &ApplyOptions,
    sink: &mut dyn DiagnosticSink,
    external: Option<&dyn ExternalPatchApplier>,
) -> Result<Severity> {
    let reported_path = options
        .reported_path
        .clone()
        .unwrap_or_else(|| file_path.display().to_string());
    let mut ecode = Severity::Ok;

    let text = match std::fs::read_to_string(file_path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if diff.outcome() != Some(DiffOutcome::Created) {
                sink.write_line(&format!("{reported_path}: (expected) file not found."));
                ecode = Severity::Warning;
            }
            String::new()
        }
        Err(err) => {
            return Err(PatchError::io(
                format!("reading '{}'", file_path.display()),
                err,
            ))
        }
    };

    if options.drop_atws {
        let atws_lines = diff.fix_trailing_whitespace();
        if !atws_lines.is_empty() {
            sink.write_line(&format!(
                "\"{reported_path}\": had added trailing white space at line(s) {{{}}}: removed before application.",
                join_numbers(&atws_lines)
            ));
        }
    } else {
        let atws_lines = diff.report_trailing_whitespace();
        if !atws_lines.is_empty() {
            ecode = ecode.max(Severity::Warning);
            sink.write_line(&format!(
                "Warning: \"{reported_path}\": has added trailing white space at line(s) {{{}}}.",
                join_numbers(&atws_lines)
            ));
        }
    }

    let Some(adiff) = diff.abstract_diff() else {
        return Err(PatchError::apply(
            "git binary diffs cannot be applied in-process",
        ));
    };
    let lines = split_lines(&text);
    let new_text = if adiff.first_before_mismatch(&lines, 0, 0).is_none() {
        let (apply_ecode, result) = adiff.apply_forwards(&lines, sink, &reported_path);
        ecode = ecode.max(apply_ecode);
        join_lines(&result)
    } else if let Some(external) = external {
        debug!(%reported_path, "delegating to external patch");
        let (ext_ecode, new_text, stderr) = external.apply(&text, &diff.to_text(), &reported_path);
        for line in stderr.lines() {
            sink.write_line(line);
        }
        ecode = ecode.max(ext_ecode);
        new_text
    } else {
        let (apply_ecode, result) = adiff.apply_forwards(&lines, sink, &reported_path);
        ecode = ecode.max(apply_ecode);
        join_lines(&result)
    };

    let deletes_target = diff
        .file_data()
        .map(|fd| fd.after.path == DEV_NULL)
        .unwrap_or(false);
    if new_text.is_empty() && deletes_target {
        match std::fs::remove_file(file_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(PatchError::io(
                    format!("removing '{}'", file_path.display()),
                    err,
                ))
            }
        }
    } else {
        std::fs::write(file_path, &new_text)
            .map_err(|err| PatchError::io(format!("writing '{}'", file_path.display()), err))?;
    }
    Ok(ecode)
}

fn join_numbers(numbers: &[usize]) -> String {
    numbers
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unified(text: &str) -> Diff {
        Diff::parse_text(text).unwrap()
    }

    const MODIFY: &str = "\
--- f
+++ f
@@ -1,3 +1,3 @@
 a
-b
+B
 c
";

    #[test]
    fn modifies_file_in_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        std::fs::write(&target, "a\nb\nc\n").unwrap();
        let mut diff = unified(MODIFY);
        let mut sink = Vec::new();
        let ecode =
            apply_diff_to_file(&mut diff, &target, &ApplyOptions::default(), &mut sink, None)
                .unwrap();
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "a\nB\nc\n");
        assert!(sink.is_empty());
    }

    #[test]
    fn creates_file_without_warning() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("new.txt");
        let mut diff = unified(
            "--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+one\n+two\n",
        );
        let mut sink = Vec::new();
        let ecode =
            apply_diff_to_file(&mut diff, &target, &ApplyOptions::default(), &mut sink, None)
                .unwrap();
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "one\ntwo\n");
        assert!(sink.is_empty());
    }

    #[test]
    fn missing_file_for_modification_warns() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        let mut diff = unified(MODIFY);
        let mut sink = Vec::new();
        let ecode =
            apply_diff_to_file(&mut diff, &target, &ApplyOptions::default(), &mut sink, None)
                .unwrap();
        assert!(ecode >= Severity::Warning);
        assert!(sink[0].contains("(expected) file not found."));
    }

    #[test]
    fn deletes_file_when_result_is_empty() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("gone.txt");
        std::fs::write(&target, "only\n").unwrap();
        let mut diff = unified("--- a/gone.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-only\n");
        let mut sink = Vec::new();
        let ecode =
            apply_diff_to_file(&mut diff, &target, &ApplyOptions::default(), &mut sink, None)
                .unwrap();
        assert_eq!(ecode, Severity::Ok);
        assert!(!target.exists());
    }

    #[test]
    fn trailing_whitespace_dropped_before_application() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        std::fs::write(&target, "a\n").unwrap();
        let mut diff = unified("--- f\n+++ f\n@@ -1 +1,2 @@\n a\n+tail \n");
        let mut sink = Vec::new();
        let options = ApplyOptions {
            drop_atws: true,
            ..Default::default()
        };
        let ecode = apply_diff_to_file(&mut diff, &target, &options, &mut sink, None).unwrap();
        assert_eq!(ecode, Severity::Ok);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "a\ntail\n");
        assert!(sink[0].contains("removed before application"));
    }

    #[test]
    fn trailing_whitespace_reported_as_warning() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        std::fs::write(&target, "a\n").unwrap();
        let mut diff = unified("--- f\n+++ f\n@@ -1 +1,2 @@\n a\n+tail \n");
        let mut sink = Vec::new();
        let ecode =
            apply_diff_to_file(&mut diff, &target, &ApplyOptions::default(), &mut sink, None)
                .unwrap();
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "a\ntail \n");
        assert!(sink[0].starts_with("Warning:"));
    }

    struct FixedResult(&'static str);

    impl ExternalPatchApplier for FixedResult {
        fn apply(&self, _text: &str, _diff: &str, path: &str) -> (Severity, String, String) {
            (
                Severity::Warning,
                self.0.to_string(),
                format!("{path}: externally patched\n"),
            )
        }
    }

    #[test]
    fn external_applier_supersedes_on_mismatch() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        std::fs::write(&target, "x\ny\nz\n").unwrap();
        let mut diff = unified(MODIFY);
        let mut sink = Vec::new();
        let hook = FixedResult("from the outside\n");
        let ecode = apply_diff_to_file(
            &mut diff,
            &target,
            &ApplyOptions::default(),
            &mut sink,
            Some(&hook),
        )
        .unwrap();
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "from the outside\n"
        );
        assert_eq!(sink, vec!["f: externally patched".to_string()]);
    }

    #[test]
    fn fuzzy_fallback_without_external_hook() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        std::fs::write(&target, "x\na\nb\nc\n").unwrap();
        let mut diff = unified(MODIFY);
        let mut sink = Vec::new();
        let ecode =
            apply_diff_to_file(&mut diff, &target, &ApplyOptions::default(), &mut sink, None)
                .unwrap();
        assert_eq!(ecode, Severity::Warning);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "x\na\nB\nc\n");
        assert_eq!(sink.len(), 1);
        assert!(sink[0].contains("merged at"));
    }

    #[test]
    fn binary_diff_is_rejected() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("blob");
        std::fs::write(&target, "x").unwrap();
        let lines = crate::git_binary::generate_diff_lines(b"aaa", b"bbb", None);
        let mut diff = Diff::GitBinary(
            crate::git_binary::GitBinaryDiff::parse_lines(&lines).unwrap(),
        );
        let mut sink = Vec::new();
        let err = apply_diff_to_file(
            &mut diff,
            &target,
            &ApplyOptions::default(),
            &mut sink,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::Apply { .. }));
    }
}
