use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "trag",
    version,
    about = "Run test262 over engine revisions and track conformance in SQLite"
)]
pub struct Cli {
    /// Log filter (tracing EnvFilter syntax)
    #[arg(long, global = true, env = "TRAG_LOG")]
    pub log: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read test metadata and write the suite file used by `run`
    Scan(ScanArgs),
    /// Build engine revisions and run the suite against each of them
    Run(RunArgs),
    /// Load JSONL result batches into the database
    Ingest(IngestArgs),
    /// Per-group pass rate of one revision
    Status(StatusArgs),
    /// Individual results of one revision
    List(ListArgs),
    /// Tests that changed outcome between two revisions
    Diff(DiffArgs),
    /// Write the JSON files read by the results dashboard
    Dashboard(DashboardArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScanArgs {
    /// One test path per line, relative to the test262 root
    #[arg(long)]
    pub cases: PathBuf,

    #[arg(long)]
    pub test262: PathBuf,

    #[arg(short, long, default_value = "testrun.json")]
    pub out: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Suite file written by `scan`
    pub suite: PathBuf,

    /// Engine source repository
    #[arg(long)]
    pub engine: PathBuf,

    #[arg(long, default_value = "results.db")]
    pub db: PathBuf,

    /// Revision or `A..B` range; omit to test the current checkout as is
    #[arg(long, conflicts_with = "commits")]
    pub revisions: Option<String>,

    /// File with one commit id per line
    #[arg(long)]
    pub commits: Option<PathBuf>,

    /// Maximum concurrent engine processes
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Re-test revisions that already have results
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Only run tests whose path contains this substring
    #[arg(long)]
    pub filter: Option<String>,

    /// Print what would run and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Per-test timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also write `<DIR>/<revision>.jsonl.gz` per tested revision
    #[arg(long)]
    pub export: Option<PathBuf>,

    #[arg(long, default_value = "trag.yaml")]
    pub config: PathBuf,

    /// Reject unknown keys in the config file
    #[arg(long, default_value_t = false)]
    pub strict_config: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = "results.db")]
    pub db: PathBuf,

    /// Delete all existing results first (in the same transaction)
    #[arg(long, default_value_t = false)]
    pub clear: bool,

    /// `.jsonl` or `.jsonl.gz` files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Which revision a query is about: given explicitly, or the HEAD of an engine checkout.
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct RevisionSelector {
    #[arg(long)]
    pub version: Option<String>,

    #[arg(long)]
    pub engine: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "results.db")]
    pub db: PathBuf,

    #[command(flatten)]
    pub revision: RevisionSelector,

    /// Print JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value = "results.db")]
    pub db: PathBuf,

    #[command(flatten)]
    pub revision: RevisionSelector,

    /// passed | failed
    #[arg(long)]
    pub outcome: Option<String>,

    /// Only tests whose path contains this substring
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Also print the error category and message of failures
    #[arg(long, default_value_t = false)]
    pub errors: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DiffArgs {
    #[arg(long, default_value = "results.db")]
    pub db: PathBuf,

    /// Baseline revision
    pub from: String,

    /// Revision compared against the baseline
    pub to: String,

    /// Print JSON instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DashboardArgs {
    #[arg(long, default_value = "results.db")]
    pub db: PathBuf,

    /// Commit ids in display order, one per line
    #[arg(long)]
    pub commits: PathBuf,

    #[arg(short, long, default_value = "dashboard")]
    pub out: PathBuf,
}
