use crate::config::HarnessConfig;
use crate::engine::builder::EngineBuilder;
use crate::engine::executor::{Invocation, TestExecutor};
use crate::model::{ErrorCategory, ErrorInfo, Verdict};
use crate::storage::jsonl;
use crate::storage::ResultStore;
use crate::suite::TestSuite;
use anyhow::Context;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_jobs: usize,
    /// Re-test revisions that already have results, replacing them.
    pub force: bool,
    /// Only run tests whose path contains this substring.
    pub filter: Option<String>,
    /// Also write `<dir>/<revision>.jsonl.gz` for every tested revision.
    pub export_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_jobs: crate::config::DEFAULT_MAX_JOBS,
            force: false,
            filter: None,
            export_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionState {
    Pending,
    Building,
    Running,
    Persisted,
    BuildFailed,
    AlreadyTested,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tested: Vec<String>,
    pub already_tested: Vec<String>,
    pub build_failed: Vec<String>,
    pub results: usize,
}

/// Drives build → test fan-out → persist over a list of revisions, one revision at a time.
pub struct RunScheduler<B: EngineBuilder> {
    builder: B,
    store: ResultStore,
    suite: Arc<TestSuite>,
    harness: Vec<PathBuf>,
    executor: Arc<TestExecutor>,
    options: RunOptions,
    permits: Arc<Semaphore>,
}

impl<B: EngineBuilder> RunScheduler<B> {
    pub fn new(
        builder: B,
        store: ResultStore,
        suite: TestSuite,
        cfg: &HarnessConfig,
        options: RunOptions,
    ) -> Self {
        let executor = TestExecutor::new(
            builder.binary(),
            builder.work_dir(),
            cfg.strict_flag.clone(),
            cfg.timeout(),
        );
        let permits = Arc::new(Semaphore::new(options.max_jobs.max(1)));
        Self {
            builder,
            store,
            suite: Arc::new(suite),
            harness: cfg.harness.clone(),
            executor: Arc::new(executor),
            options,
            permits,
        }
    }

    /// (test path, use_strict) units one revision would run, in submission order.
    pub fn plan(&self) -> Vec<(String, bool)> {
        self.suite
            .cases(self.options.filter.as_deref())
            .flat_map(|case| {
                case.metadata
                    .strict_modes()
                    .into_iter()
                    .map(move |strict| (case.path.clone(), strict))
            })
            .collect()
    }

    /// Test every revision in order, then restore the engine checkout.
    ///
    /// Build failures skip the revision; a store failure stops the run (after restoring)
    /// and names the revision whose results were lost.
    pub async fn run(mut self, revisions: &[String]) -> anyhow::Result<RunSummary> {
        let outcome = self.run_revisions(revisions).await;
        let restored = self.builder.restore().await;

        match (outcome, restored) {
            (Ok(summary), Ok(())) => {
                tracing::info!(
                    tested = summary.tested.len(),
                    already_tested = summary.already_tested.len(),
                    build_failed = summary.build_failed.len(),
                    results = summary.results,
                    "run finished"
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e.context("failed to restore engine checkout")),
            (Err(e), restored) => {
                if let Err(re) = restored {
                    tracing::error!(error = %re, "failed to restore engine checkout");
                }
                Err(e)
            }
        }
    }

    async fn run_revisions(&mut self, revisions: &[String]) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        for (i, revision) in revisions.iter().enumerate() {
            tracing::info!(revision = %revision, n = i + 1, of = revisions.len(), "testing revision");
            let state = self.process_revision(revision, &mut summary).await?;
            tracing::debug!(revision = %revision, state = ?state, "revision done");
        }
        Ok(summary)
    }

    async fn process_revision(
        &mut self,
        revision: &str,
        summary: &mut RunSummary,
    ) -> anyhow::Result<RevisionState> {
        let mut state = RevisionState::Pending;

        if !self.options.force && self.store.is_tested(revision)? {
            tracing::warn!(revision, "already tested, skipping (use --force to re-test)");
            summary.already_tested.push(revision.to_string());
            return Ok(RevisionState::AlreadyTested);
        }

        advance(&mut state, RevisionState::Building, revision);
        if let Err(e) = self.builder.build_revision(revision).await {
            tracing::warn!(revision, step = %e.step, error = %e.detail, "build failed, skipping revision");
            summary.build_failed.push(revision.to_string());
            advance(&mut state, RevisionState::BuildFailed, revision);
            return Ok(state);
        }

        advance(&mut state, RevisionState::Running, revision);
        let mut verdicts = self.run_tests(revision).await?;
        verdicts.sort_by(|a, b| {
            a.testcase
                .cmp(&b.testcase)
                .then(a.use_strict.cmp(&b.use_strict))
        });

        let n = self.store.replace_revision(revision, &verdicts)?;
        if let Some(dir) = &self.options.export_dir {
            let path = dir.join(format!("{}.jsonl.gz", revision));
            jsonl::write_records(&path, &verdicts)
                .with_context(|| format!("failed to export results for revision {}", revision))?;
            tracing::info!(revision, path = %path.display(), "exported results");
        }

        let failed = verdicts.iter().filter(|v| !v.passed()).count();
        tracing::info!(revision, results = n, failed, "results stored");
        summary.tested.push(revision.to_string());
        summary.results += n;
        advance(&mut state, RevisionState::Persisted, revision);
        Ok(state)
    }

    /// Fan out every unit of one revision and collect verdicts as they finish.
    async fn run_tests(&self, revision: &str) -> anyhow::Result<Vec<Verdict>> {
        let mut tasks = JoinSet::new();
        let mut pending = HashSet::new();

        for case in self.suite.cases(self.options.filter.as_deref()) {
            let files = self.suite.files_for(&case, &self.harness);
            let negative = case.metadata.is_negative();
            for use_strict in case.metadata.strict_modes() {
                let inv = Invocation {
                    testcase: case.path.clone(),
                    revision: revision.to_string(),
                    files: files.clone(),
                    use_strict,
                    negative,
                };
                let permit = self.permits.clone().acquire_owned().await?;
                let executor = self.executor.clone();
                pending.insert((inv.testcase.clone(), use_strict));
                tasks.spawn(async move {
                    let _permit = permit;
                    executor.run(&inv).await
                });
            }
        }
        let submitted = pending.len();
        tracing::info!(revision, submitted, "all tests submitted");

        let mut verdicts = Vec::with_capacity(submitted);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(v) => {
                    pending.remove(&(v.testcase.clone(), v.use_strict));
                    verdicts.push(v);
                    if verdicts.len() % 1000 == 0 {
                        tracing::info!(revision, done = verdicts.len(), submitted, "progress");
                    }
                }
                Err(e) => tracing::error!(revision, error = %e, "test task did not complete"),
            }
        }
        verdicts.extend(lost_units(revision, pending));
        Ok(verdicts)
    }
}

/// Runner-failure verdicts for units whose task panicked or was cancelled.
fn lost_units(revision: &str, pending: HashSet<(String, bool)>) -> Vec<Verdict> {
    let mut lost: Vec<_> = pending.into_iter().collect();
    lost.sort();
    lost.into_iter()
        .map(|(testcase, use_strict)| {
            tracing::error!(revision, testcase = %testcase, use_strict, "no verdict for unit");
            Verdict {
                testcase,
                version: revision.to_string(),
                use_strict,
                error: Some(ErrorInfo::new(
                    ErrorCategory::RunnerFailure,
                    "test task did not complete",
                )),
                time: None,
            }
        })
        .collect()
}

fn advance(state: &mut RevisionState, next: RevisionState, revision: &str) {
    tracing::debug!(revision, from = ?*state, to = ?next, "revision state");
    *state = next;
}
