//! Handler for the `patchsmith apply` command.
//!
//! Parses the patch once, resolves each file's target path under the
//! root, and drives the file applier over every diff, collecting the
//! worst severity for the exit status.

use std::path::PathBuf;

use colored::Colorize;
use tracing::{debug, warn};

use crate::apply::{apply_diff_to_file, ApplyOptions};
use crate::config::Config;
use crate::error::{PatchError, Result};
use crate::merge::{Severity, StderrSink};

/// All inputs needed to run the apply command.
#[derive(Debug)]
pub struct ApplyCommandOptions {
    /// Patch file to apply.
    pub patch: PathBuf,
    /// Directory stripped paths are relative to.
    pub root: PathBuf,
    /// Strip level override.
    pub strip: Option<usize>,
    /// Report added trailing whitespace instead of dropping it.
    pub keep_trailing_whitespace: bool,
    /// Backup suffix override.
    pub backup: Option<String>,
    /// Parse the input as an email.
    pub email: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
    /// Path to config file.
    pub config_path: Option<PathBuf>,
}

/// Run the apply command end-to-end, returning the worst per-file
/// severity.
pub fn run(options: ApplyCommandOptions) -> Result<Severity> {
    let config = Config::load_effective(options.config_path.as_ref())?;
    let mut patch = super::load_patch(
        &options.patch,
        options.email,
        options.strip,
        config.strip_level,
    )?;
    let strip_level = patch.num_strip_levels;
    debug!(strip_level, files = patch.diff_pluses.len(), "applying patch");

    let drop_atws = !options.keep_trailing_whitespace && config.drop_trailing_whitespace;
    let backup_suffix = options.backup.or(config.backup_suffix);
    let mut worst = Severity::Ok;
    let mut applied = 0usize;
    let mut skipped = 0usize;

    for diff_plus in &mut patch.diff_pluses {
        let Some(file_path) = diff_plus.file_path(strip_level) else {
            warn!("diff with no resolvable file path; skipping");
            skipped += 1;
            continue;
        };
        let target = options.root.join(&file_path);
        let Some(diff) = diff_plus.diff.as_mut() else {
            // Pure metadata change (e.g. a rename without content).
            if !options.quiet {
                println!("{} {file_path} (no content change)", "skip".dimmed());
            }
            skipped += 1;
            continue;
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PatchError::io(format!("creating directory '{}'", parent.display()), e)
                })?;
            }
        }
        if let Some(suffix) = &backup_suffix {
            if target.is_file() {
                let file_name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let backup_path = target.with_file_name(format!("{file_name}{suffix}"));
                std::fs::copy(&target, &backup_path).map_err(|e| {
                    PatchError::io(format!("backing up '{}'", target.display()), e)
                })?;
            }
        }
        let apply_options = ApplyOptions {
            reported_path: Some(file_path.clone()),
            drop_atws,
        };
        let ecode = apply_diff_to_file(diff, &target, &apply_options, &mut StderrSink, None)?;
        worst = worst.max(ecode);
        applied += 1;
        if !options.quiet {
            let tag = match ecode {
                Severity::Ok => "ok".green().bold(),
                Severity::Warning => "warn".yellow().bold(),
                Severity::Error => "FAIL".red().bold(),
            };
            println!("{tag} {file_path}");
        }
    }

    if !options.quiet {
        let mut summary = format!(
            "{applied} file{} patched",
            if applied == 1 { "" } else { "s" }
        );
        if skipped > 0 {
            summary.push_str(&format!(", {skipped} skipped"));
        }
        println!("{summary}");
    }
    Ok(worst)
}
