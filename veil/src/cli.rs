//! Command-line argument parsing.
//!
//! Usage:
//!   veil [OPTIONS] <SCRIPT>...
//!   veil [OPTIONS] --document <HTML>

use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogArgs;

/// Command-line interface for the `veil` binary.
#[derive(Parser, Debug)]
#[command(name = "veil", about = "Run VEIL scripts", version)]
pub struct Cli {
    /// Logging controls.
    #[command(flatten)]
    pub log: LogArgs,

    /// Script files to run, in order; each gets a fresh set of variables.
    #[arg(value_name = "SCRIPT", conflicts_with = "document")]
    pub scripts: Vec<PathBuf>,

    /// Host HTML document; every `text/veil` script it references is run.
    #[arg(long, value_name = "HTML")]
    pub document: Option<PathBuf>,

    /// Function definition directory (`manifest.json` plus definition files).
    /// The embedded definitions are used when unset.
    #[arg(long, env = "VEIL_FUNCTIONS", value_name = "DIR")]
    pub functions: Option<PathBuf>,

    /// Write the document body here instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub body_out: Option<PathBuf>,
}
