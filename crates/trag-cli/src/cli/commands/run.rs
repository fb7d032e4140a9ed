use super::{exit_codes, open_store};
use crate::cli::args::RunArgs;
use trag_core::config::{load_config, HarnessConfig};
use trag_core::engine::{EngineBuilder, GitCargoBuilder, PrebuiltEngine, RunOptions, RunScheduler};
use trag_core::errors::ConfigError;
use trag_core::storage::ResultStore;
use trag_core::suite::TestSuite;
use trag_core::vcs::{GitRepo, RevisionSpec};

pub async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    let cfg = harness_config(&args)?;
    let suite = TestSuite::load(&args.suite)?;
    let options = RunOptions {
        max_jobs: cfg.max_jobs,
        force: args.force,
        filter: args.filter.clone(),
        export_dir: args.export.clone(),
    };

    let repo = GitRepo::open(&args.engine)?;
    let spec = match (&args.revisions, &args.commits) {
        (Some(s), _) => Some(RevisionSpec::parse(s)),
        (None, Some(file)) => Some(RevisionSpec::from_commits_file(file)?),
        (None, None) => None,
    };
    let revisions = match &spec {
        Some(spec) => repo.resolve(spec).await?,
        None => vec![repo.head_revision().await?],
    };
    if revisions.is_empty() {
        eprintln!("no revisions to test");
        return Ok(exit_codes::OK);
    }

    if args.dry_run {
        // planning never touches the checkout
        let prebuilt = PrebuiltEngine::new(&args.engine, &cfg.binary);
        let plan = RunScheduler::new(prebuilt, ResultStore::memory()?, suite, &cfg, options).plan();
        for rev in &revisions {
            println!("revision {}", rev);
        }
        for (path, use_strict) in &plan {
            let mode = if *use_strict { "strict" } else { "sloppy" };
            println!("would run: {} ({})", path, mode);
        }
        eprintln!(
            "dry run: {} revisions x {} test runs, {} parallel jobs, {}s timeout",
            revisions.len(),
            plan.len(),
            cfg.max_jobs,
            cfg.timeout_secs
        );
        return Ok(exit_codes::OK);
    }

    let store = open_store(&args.db)?;
    match spec {
        Some(_) => {
            let builder = GitCargoBuilder::new(repo, &cfg).await?;
            run_with(builder, store, suite, &cfg, options, &revisions).await
        }
        None => {
            tracing::info!(revision = %revisions[0], "testing current checkout without rebuilding");
            let builder = PrebuiltEngine::new(&args.engine, &cfg.binary);
            run_with(builder, store, suite, &cfg, options, &revisions).await
        }
    }
}

/// Config file, then `TRAG_*` environment, then command line flags.
fn harness_config(args: &RunArgs) -> anyhow::Result<HarnessConfig> {
    let mut cfg = load_config(&args.config, args.strict_config)?.with_env();
    if let Some(jobs) = args.jobs {
        cfg.max_jobs = jobs;
    }
    if let Some(secs) = args.timeout {
        cfg.timeout_secs = secs;
    }
    if cfg.max_jobs == 0 {
        return Err(ConfigError("jobs must be at least 1".into()).into());
    }
    if cfg.timeout_secs == 0 {
        return Err(ConfigError("timeout must be at least 1 second".into()).into());
    }
    Ok(cfg)
}

async fn run_with<B: EngineBuilder>(
    builder: B,
    store: ResultStore,
    suite: TestSuite,
    cfg: &HarnessConfig,
    options: RunOptions,
    revisions: &[String],
) -> anyhow::Result<i32> {
    let scheduler = RunScheduler::new(builder, store, suite, cfg, options);

    // Dropping the run future on ctrl-c aborts the test tasks (killing their processes)
    // and drops the checkout guard, which restores the original checkout.
    let summary = tokio::select! {
        res = scheduler.run(revisions) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, results of the current revision are discarded");
            return Ok(exit_codes::INTERRUPTED);
        }
    };

    eprintln!(
        "tested {} revisions ({} results), {} already tested, {} failed to build",
        summary.tested.len(),
        summary.results,
        summary.already_tested.len(),
        summary.build_failed.len()
    );
    for rev in &summary.build_failed {
        eprintln!("  build failed: {}", rev);
    }

    if summary.build_failed.is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::TEST_FAILED)
    }
}
