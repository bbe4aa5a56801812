use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "snapvault")]
#[command(about = "Verify and safely clean up date-organized photo archives", long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify copy integrity using hash comparison
    Verify(VerifyArgs),
    /// Delete verified source files (dry run by default)
    Cleanup(CleanupArgs),
    /// List recorded runs and verification reports
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Path to a specific run record file
    #[arg(long, short = 'r')]
    pub run_file: Option<PathBuf>,

    /// Run ID to verify
    #[arg(long)]
    pub run_id: Option<String>,

    /// Use the most recent matching run without prompting
    #[arg(long)]
    pub last: bool,

    /// Non-interactive: accept a single match, fail if several match
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Filter runs by source directory (or the source for --reconstruct)
    #[arg(long, short = 's')]
    pub source: Option<PathBuf>,

    /// Filter runs by destination directory (or the destination for --reconstruct)
    #[arg(long, short = 'd')]
    pub destination: Option<PathBuf>,

    /// Rebuild the expected mapping from the configured rules instead of a run record
    #[arg(long)]
    pub reconstruct: bool,

    /// Hash algorithm: sha256 (default) or quick
    #[arg(long, short = 'a')]
    pub algorithm: Option<String>,

    /// Include dry-run records in discovery
    #[arg(long)]
    pub include_dry_runs: bool,
}

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Path to a specific verification report file
    #[arg(long, short = 'v')]
    pub verify_file: Option<PathBuf>,

    /// Verification ID to use
    #[arg(long)]
    pub verify_id: Option<String>,

    /// Use the most recent matching verification without prompting
    #[arg(long)]
    pub last: bool,

    /// Non-interactive: accept a single match, fail if several match
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Simulate without deleting
    #[arg(long, overrides_with = "no_dry_run")]
    pub dry_run: bool,

    /// Actually delete files
    #[arg(long)]
    pub no_dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Filter reports by source directory
    #[arg(long, short = 's')]
    pub source: Option<PathBuf>,

    /// Filter reports by destination directory
    #[arg(long, short = 'd')]
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Include dry-run records
    #[arg(long)]
    pub include_dry_runs: bool,
}
