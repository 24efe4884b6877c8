use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "evalsync",
    version,
    about = "Ticket evaluation classification, sync, and reporting over run-tracing exports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Sync(SyncArgs),
    Report(ReportArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[arg(long, default_value = ".cache/evalsync")]
    pub state_root: PathBuf,

    /// JSON export of raw runs from the tracing project: one array of run objects.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = ".cache/evalsync")]
    pub state_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Inclusive range start; defaults to 30 days before the end date.
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Inclusive range end; defaults to today (UTC).
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    #[arg(long, default_value_t = false)]
    pub list_low_quality: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/evalsync")]
    pub state_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
