//! CLI command handlers. Each submodule exposes an `Options` struct
//! and a `run` function the binary dispatches into.

pub mod apply;
pub mod paths;
pub mod stats;

use std::path::Path;

use crate::error::Result;
use crate::patch::Patch;

/// Load a patch, optionally through the email wrapper, and settle the
/// effective strip level (flag, config, then estimate, then 0).
pub(crate) fn load_patch(
    path: &Path,
    email: bool,
    strip_flag: Option<usize>,
    strip_config: Option<usize>,
) -> Result<Patch> {
    let mut patch = if email {
        Patch::parse_email_file(path, 0)?
    } else {
        Patch::parse_file(path, 0)?
    };
    let strip_level = strip_flag
        .or(strip_config)
        .or_else(|| patch.estimate_strip_level())
        .unwrap_or(0);
    patch.set_strip_level(strip_level);
    Ok(patch)
}
