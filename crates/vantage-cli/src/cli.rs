use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "vantage")]
#[command(about = "Report store maintenance tools", version)]
pub struct Cli {
    /// Storage root directory.
    #[arg(long, default_value = ".vantage")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List stored reports with their run summaries.
    Reports,
    /// List the runs of one report.
    Runs(ReportArg),
    /// Show one report's index summary.
    Info(InfoArgs),
    /// Reconcile one report's index with the runs actually stored.
    Repair(ReportArg),
    /// Print one stored run as JSON.
    Show(RunArgs),
    /// Delete one stored run and its index entry.
    DeleteRun(RunArgs),
    /// Delete old runs of one report.
    Prune(PruneArgs),
}

#[derive(Debug, Args)]
pub struct ReportArg {
    pub report_id: String,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    pub report_id: String,
    /// Compare the index with storage and log any drift.
    #[arg(long, default_value_t = false)]
    pub check: bool,
    /// Write the reconciled index back when drift is found.
    #[arg(long, default_value_t = false)]
    pub repair: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    pub report_id: String,
    pub run_id: String,
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    pub report_id: String,
    /// Delete runs older than this many days.
    #[arg(long, value_name = "DAYS", conflicts_with = "keep")]
    pub older_than_days: Option<u32>,
    /// Keep only the newest N runs.
    #[arg(long, value_name = "N")]
    pub keep: Option<usize>,
    /// Report what would be deleted without deleting anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
