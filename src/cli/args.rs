//! Command-line arguments for the `runner` binary.
//!
//! Parsed declaratively with `clap`'s derive API.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "runner",
    version,
    about = "Compiles, runs, and checks annotated fixtures against their golden output."
)]
pub struct RunnerArgs {
    /// Fixture files or directories to search for fixtures.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Maximum number of cases executing at once [default: hardware parallelism].
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub jobs: Option<u64>,

    /// Per-process deadline in seconds [default: 10].
    #[arg(short, long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Only run fixtures whose relative path or file name matches this glob.
    #[arg(short, long, value_name = "GLOB")]
    pub filter: Option<String>,

    /// YAML harness file with defaults and the command resolution table.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Default compiler used by fixtures with an empty `Compiler:` field.
    #[arg(long, value_name = "SPEC")]
    pub compiler: Option<String>,

    /// Fixture file extension searched in directories; repeatable [default: c].
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Comment prefix that introduces header lines [default: //].
    #[arg(long, value_name = "PREFIX", allow_hyphen_values = true)]
    pub comment: Option<String>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// When to color the text report.
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Print diffs, stderr tails, and full load diagnostics for failures.
    #[arg(short, long)]
    pub verbose: bool,

    /// Keep each case's scratch directory instead of deleting it.
    #[arg(long)]
    pub keep_artifacts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}
