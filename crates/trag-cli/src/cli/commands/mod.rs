use super::args::*;
use std::path::Path;
use trag_core::errors::ConfigError;
use trag_core::storage::ResultStore;
use trag_core::vcs::GitRepo;

pub mod dashboard;
pub mod diff;
pub mod ingest;
pub mod list;
pub mod run;
pub mod scan;
pub mod status;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const INTERRUPTED: i32 = 130;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let result = match cli.cmd {
        Command::Scan(args) => scan::cmd_scan(args),
        Command::Run(args) => run::cmd_run(args).await,
        Command::Ingest(args) => ingest::cmd_ingest(args),
        Command::Status(args) => status::cmd_status(args).await,
        Command::List(args) => list::cmd_list(args).await,
        Command::Diff(args) => diff::cmd_diff(args),
        Command::Dashboard(args) => dashboard::cmd_dashboard(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    };

    match result {
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            eprintln!("{e:#}");
            Ok(exit_codes::CONFIG_ERROR)
        }
        other => other,
    }
}

/// Log filter: `--log`/`TRAG_LOG`, else the `log` key of the run config, else `info`.
pub fn log_level(cli: &Cli) -> String {
    if let Some(level) = &cli.log {
        return level.clone();
    }
    if let Command::Run(args) = &cli.cmd {
        if let Ok(cfg) = trag_core::config::load_config(&args.config, false) {
            return cfg.log;
        }
    }
    "info".to_string()
}

/// Open `db` (creating parent directories) and make sure the schema is in place.
pub(crate) fn open_store(db: &Path) -> anyhow::Result<ResultStore> {
    if let Some(parent) = db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = ResultStore::open(db)?;
    store.init_schema()?;
    Ok(store)
}

/// Open an existing database for queries; a missing file is a usage error, not an empty result.
pub(crate) fn open_existing_store(db: &Path) -> anyhow::Result<ResultStore> {
    if !db.exists() {
        return Err(ConfigError(format!("database {} does not exist", db.display())).into());
    }
    open_store(db)
}

/// The revision a query is about: `--version` as given, or HEAD of `--engine`.
pub(crate) async fn selected_revision(sel: &RevisionSelector) -> anyhow::Result<String> {
    match (&sel.version, &sel.engine) {
        (Some(v), _) => Ok(v.clone()),
        (None, Some(engine)) => {
            let repo = GitRepo::open(engine)?;
            Ok(repo.head_revision().await?)
        }
        (None, None) => Err(ConfigError("either --version or --engine is required".into()).into()),
    }
}
