//! Handler for the `patchsmith paths` command: which files a patch
//! touches, with status markers and rename/copy sources.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::error::{PatchError, Result};
use crate::paths::FilePathPlus;

/// All inputs needed to run the paths command.
#[derive(Debug)]
pub struct PathsCommandOptions {
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
struct PathsReport {
    files: Vec<Option<FilePathPlus>>,
}

/// Run the paths command.
pub fn run(options: PathsCommandOptions) -> Result<()> {
    let config = Config::load_effective(options.config_path.as_ref())?;
    let patch = super::load_patch(
        &options.patch,
        options.email,
        options.strip,
        config.strip_level,
    )?;
    let files = patch.file_paths_plus(None);

    match options.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&PathsReport { files })
                .map_err(|e| PatchError::config(format!("serialising paths: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Plain => {
            for fpp in files.iter() {
                match fpp {
                    Some(fpp) => match &fpp.expath {
                        Some(expath) => {
                            println!("{} {} <- {expath}", fpp.status.marker(), fpp.path)
                        }
                        None => println!("{} {}", fpp.status.marker(), fpp.path),
                    },
                    None => println!("? (unresolved)"),
                }
            }
        }
    }
    Ok(())
}
