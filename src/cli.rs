use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "patchsmith",
    about = "Parse, inspect and apply patch files",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Color output mode
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a patch file to files under a root directory
    #[command(alias = "a")]
    Apply {
        /// Patch file to apply
        patch: PathBuf,

        /// Directory the stripped paths are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Strip level (estimated from the patch when omitted)
        #[arg(short = 'p', long)]
        strip: Option<usize>,

        /// Report added trailing whitespace instead of removing it
        #[arg(long)]
        keep_trailing_whitespace: bool,

        /// Save each target with this suffix before rewriting
        #[arg(long)]
        backup: Option<String>,

        /// Treat the input as an email carrying the patch
        #[arg(long)]
        email: bool,
    },

    /// Show per-file change statistics for a patch
    #[command(alias = "s")]
    Stats {
        /// Patch file to inspect
        patch: PathBuf,

        /// Strip level (estimated from the patch when omitted)
        #[arg(short = 'p', long)]
        strip: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,

        /// Treat the input as an email carrying the patch
        #[arg(long)]
        email: bool,
    },

    /// List the files a patch touches with their status
    Paths {
        /// Patch file to inspect
        patch: PathBuf,

        /// Strip level (estimated from the patch when omitted)
        #[arg(short = 'p', long)]
        strip: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,

        /// Treat the input as an email carrying the patch
        #[arg(long)]
        email: bool,
    },
}
