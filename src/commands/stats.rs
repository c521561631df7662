//! Handler for the `patchsmith stats` command: the numeric diffstat
//! view of a patch, without the bar-chart cosmetics.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::diffstat::{DiffStats, PathStats};
use crate::error::{PatchError, Result};

/// All inputs needed to run the stats command.
#[derive(Debug)]
pub struct StatsCommandOptions {
    /// Patch file to inspect.
    pub patch: PathBuf,
    /// Strip level override.
    pub strip: Option<usize>,
    /// Output format.
    pub format: OutputFormat,
    /// Parse the input as an email.
    pub email: bool,
    /// Path to config file.
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    files: Vec<PathStats>,
    total: DiffStats,
}

/// Run the stats command.
pub fn run(options: StatsCommandOptions) -> Result<()> {
    let config = Config::load_effective(options.config_path.as_ref())?;
    let patch = super::load_patch(
        &options.patch,
        options.email,
        options.strip,
        config.strip_level,
    )?;
    let files = patch.diffstat_stats(None);
    let total = files
        .iter()
        .fold(DiffStats::new(), |acc, ps| acc + ps.stats);
    let report = StatsReport { files, total };

    match options.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| PatchError::config(format!("serialising stats: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Plain => {
            let width = report
                .files
                .iter()
                .filter_map(|ps| ps.path.as_ref().map(String::len))
                .max()
                .unwrap_or(0);
            for ps in &report.files {
                let path = ps.path.as_deref().unwrap_or("?");
                println!(
                    " {path:<width$} | {:>5}{}",
                    ps.stats.total_changes(),
                    ps.stats.summary_fragment()
                );
            }
            let num_files = report.files.len();
            println!(
                " {num_files} file{} changed{}",
                if num_files == 1 { "" } else { "s" },
                report.total.summary_fragment()
            );
        }
    }
    Ok(())
}
