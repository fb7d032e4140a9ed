#![cfg(unix)]

mod common;

use async_trait::async_trait;
use common::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use trag_core::config::HarnessConfig;
use trag_core::engine::{EngineBuilder, RunOptions, RunScheduler};
use trag_core::errors::{BuildError, BuildStep};
use trag_core::model::TestMetadata;
use trag_core::storage::store::NewFailure;
use trag_core::storage::ResultStore;
use trag_core::suite::{TestCaseEntry, TestSuite};

/// Pretends to check out a revision by writing it to `REVISION`; fails on `broken`.
struct FakeBuilder {
    root: PathBuf,
    fail_on: Option<String>,
    restores: Arc<AtomicUsize>,
}

#[async_trait]
impl EngineBuilder for FakeBuilder {
    async fn build_revision(&mut self, revision: &str) -> Result<(), BuildError> {
        if self.fail_on.as_deref() == Some(revision) {
            return Err(BuildError::new(revision, BuildStep::Build, "error[E0308]: mismatched types"));
        }
        std::fs::write(self.root.join("REVISION"), revision)
            .map_err(|e| BuildError::new(revision, BuildStep::Checkout, e.to_string()))?;
        Ok(())
    }

    fn binary(&self) -> PathBuf {
        fake_engine().to_path_buf()
    }

    fn work_dir(&self) -> PathBuf {
        self.root.clone()
    }

    async fn restore(&mut self) -> anyhow::Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    engine_root: PathBuf,
    suite: TestSuite,
    restores: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        fake_engine();
        let dir = tempfile::tempdir().unwrap();
        let test262 = dir.path().join("test262");
        let engine_root = dir.path().join("engine");
        std::fs::create_dir_all(&engine_root).unwrap();
        write_tree(
            &test262,
            &[
                ("test/a/pass.js", PASS),
                ("test/a/regress.js", REGRESSES_ON_BAD_STRICT),
                ("test/b/only_strict.js", PASS),
            ],
        );

        let mut testcases = BTreeMap::new();
        testcases.insert("test/a/pass.js".to_string(), TestCaseEntry::default());
        testcases.insert("test/a/regress.js".to_string(), TestCaseEntry::default());
        testcases.insert(
            "test/b/only_strict.js".to_string(),
            TestCaseEntry {
                metadata: Some(TestMetadata {
                    flags: vec!["onlyStrict".into()],
                    ..Default::default()
                }),
            },
        );

        Self {
            _dir: dir,
            engine_root,
            suite: TestSuite {
                test262_path: test262,
                testcases,
            },
            restores: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn scheduler(
        &self,
        store: &ResultStore,
        fail_on: Option<&str>,
        options: RunOptions,
    ) -> RunScheduler<FakeBuilder> {
        let builder = FakeBuilder {
            root: self.engine_root.clone(),
            fail_on: fail_on.map(str::to_string),
            restores: self.restores.clone(),
        };
        RunScheduler::new(
            builder,
            store.clone(),
            self.suite.clone(),
            &HarnessConfig::default(),
            options,
        )
    }

    fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

fn store() -> ResultStore {
    let store = ResultStore::memory().unwrap();
    store.init_schema().unwrap();
    store
}

fn revs(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn totals(store: &ResultStore, revision: &str) -> (u64, u64) {
    store
        .pass_rate(revision)
        .unwrap()
        .iter()
        .fold((0, 0), |(ok, total), g| (ok + g.ok, total + g.total))
}

#[test]
fn test_plan_expands_strict_modes() {
    let fx = Fixture::new();
    let store = store();

    let plan = fx.scheduler(&store, None, RunOptions::default()).plan();
    assert_eq!(
        plan,
        vec![
            ("test/a/pass.js".to_string(), false),
            ("test/a/pass.js".to_string(), true),
            ("test/a/regress.js".to_string(), false),
            ("test/a/regress.js".to_string(), true),
            ("test/b/only_strict.js".to_string(), true),
        ]
    );

    let filtered = fx
        .scheduler(
            &store,
            None,
            RunOptions {
                filter: Some("/b/".into()),
                ..Default::default()
            },
        )
        .plan();
    assert_eq!(filtered, vec![("test/b/only_strict.js".to_string(), true)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_revisions_end_to_end() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let store = store();

    let summary = fx
        .scheduler(&store, None, RunOptions { max_jobs: 2, ..Default::default() })
        .run(&revs(&["good", "bad"]))
        .await?;

    assert_eq!(summary.tested, revs(&["good", "bad"]));
    assert_eq!(summary.results, 10);
    assert_eq!(totals(&store, "good"), (5, 5));
    assert_eq!(totals(&store, "bad"), (4, 5));

    let diff = store.diff("good", "bad")?;
    assert_eq!(
        diff.new_failures,
        vec![NewFailure {
            testcase: "test/a/regress.js".into(),
            use_strict: true,
            message: "regressed".into(),
        }]
    );
    assert!(diff.new_fixes.is_empty());
    assert_eq!(fx.restores(), 1);
    Ok(())
}

#[tokio::test]
async fn test_build_failure_skips_revision() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let store = store();

    let summary = fx
        .scheduler(&store, Some("broken"), RunOptions::default())
        .run(&revs(&["broken", "good"]))
        .await?;

    assert_eq!(summary.build_failed, revs(&["broken"]));
    assert_eq!(summary.tested, revs(&["good"]));
    assert!(!store.is_tested("broken")?);
    assert!(store.is_tested("good")?);
    assert_eq!(fx.restores(), 1);
    Ok(())
}

#[tokio::test]
async fn test_already_tested_is_skipped_unless_forced() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let store = store();
    store.ingest(&[trag_core::model::Verdict {
        testcase: "test/a/pass.js".into(),
        version: "good".into(),
        use_strict: false,
        error: None,
        time: None,
    }])?;

    let summary = fx
        .scheduler(&store, None, RunOptions::default())
        .run(&revs(&["good"]))
        .await?;
    assert_eq!(summary.already_tested, revs(&["good"]));
    assert!(summary.tested.is_empty());
    assert_eq!(totals(&store, "good"), (1, 1));

    let summary = fx
        .scheduler(&store, None, RunOptions { force: true, ..Default::default() })
        .run(&revs(&["good"]))
        .await?;
    assert_eq!(summary.tested, revs(&["good"]));
    assert_eq!(totals(&store, "good"), (5, 5));
    assert_eq!(fx.restores(), 2);
    Ok(())
}

#[tokio::test]
async fn test_forced_build_failure_keeps_old_results() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let store = store();
    fx.scheduler(&store, None, RunOptions::default())
        .run(&revs(&["good"]))
        .await?;

    let summary = fx
        .scheduler(&store, Some("good"), RunOptions { force: true, ..Default::default() })
        .run(&revs(&["good"]))
        .await?;
    assert_eq!(summary.build_failed, revs(&["good"]));
    assert_eq!(totals(&store, "good"), (5, 5));
    Ok(())
}

#[tokio::test]
async fn test_export_writes_ingestable_batch() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let store = store();
    let out = tempfile::tempdir()?;

    fx.scheduler(
        &store,
        None,
        RunOptions {
            export_dir: Some(out.path().to_path_buf()),
            ..Default::default()
        },
    )
    .run(&revs(&["bad"]))
    .await?;

    let exported = out.path().join("bad.jsonl.gz");
    assert!(Path::new(&exported).exists());

    let fresh = self::store();
    let report = fresh.ingest_files(&[exported], false)?;
    assert_eq!(report.ingested, 5);
    assert_eq!(totals(&fresh, "bad"), (4, 5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_runs_never_exceed_max_jobs() -> anyhow::Result<()> {
    fake_engine();
    let dir = tempfile::tempdir()?;
    let test262 = dir.path().join("test262");
    let engine_root = dir.path().join("engine");
    let locks = dir.path().join("locks");
    let counts = dir.path().join("counts");
    std::fs::create_dir_all(&engine_root)?;
    std::fs::create_dir_all(&locks)?;

    // each live runner holds one directory under `locks` and logs how many it saw
    let script = format!(
        "mkdir '{locks}/'$$\n\
         ls '{locks}' | wc -l >> '{counts}'\n\
         sleep 0.2\n\
         rmdir '{locks}/'$$\n\
         echo '{{\"error\": null}}'\n",
        locks = locks.display(),
        counts = counts.display(),
    );
    let mut testcases = BTreeMap::new();
    for i in 0..20 {
        let rel = format!("test/par/{i:02}.js");
        write_tree(&test262, &[(rel.as_str(), script.as_str())]);
        testcases.insert(rel, TestCaseEntry::default());
    }
    let suite = TestSuite {
        test262_path: test262,
        testcases,
    };

    let store = store();
    let builder = FakeBuilder {
        root: engine_root,
        fail_on: None,
        restores: Arc::new(AtomicUsize::new(0)),
    };
    let summary = RunScheduler::new(
        builder,
        store.clone(),
        suite,
        &HarnessConfig::default(),
        RunOptions {
            max_jobs: 3,
            ..Default::default()
        },
    )
    .run(&revs(&["par"]))
    .await?;

    assert_eq!(summary.results, 40);
    assert_eq!(totals(&store, "par"), (40, 40));

    let seen: Vec<usize> = std::fs::read_to_string(&counts)?
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect();
    assert_eq!(seen.len(), 40);
    let max = seen.iter().copied().max().unwrap();
    assert!(max <= 3, "saw {max} runners at once");
    assert!(max >= 2, "runs never overlapped");
    Ok(())
}
