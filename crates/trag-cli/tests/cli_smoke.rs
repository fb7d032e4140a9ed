use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const R1: &str = r#"{"testcase":"test/lang/a.js","version":"r1","use_strict":0,"error":null}
{"testcase":"test/lang/a.js","version":"r1","use_strict":1,"error":null}
{"testcase":"test/builtins/b.js","version":"r1","use_strict":0,"error":null}
"#;

const R2: &str = r#"{"testcase":"test/lang/a.js","version":"r2","use_strict":0,"error":null}
{"testcase":"test/lang/a.js","version":"r2","use_strict":1,"error":{"category":"runtime","message":"TypeError: x"}}
{"testcase":"test/builtins/b.js","version":"r2","use_strict":0,"error":null}
this line is not json
"#;

fn trag() -> Command {
    let mut cmd = Command::cargo_bin("trag").unwrap();
    cmd.env_remove("TRAG_LOG");
    cmd
}

/// A database holding revisions `r1` and `r2`.
fn seeded_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("results.db");
    let r1 = dir.path().join("r1.jsonl");
    let r2 = dir.path().join("r2.jsonl");
    std::fs::write(&r1, R1).unwrap();
    std::fs::write(&r2, R2).unwrap();

    trag()
        .arg("ingest")
        .arg("--db")
        .arg(&db)
        .arg(&r1)
        .arg(&r2)
        .assert()
        .success()
        .stderr(predicate::str::contains("ingested 6 records"))
        .stderr(predicate::str::contains("1 skipped"));
    (dir, db)
}

fn db_arg(db: &Path) -> [String; 2] {
    ["--db".to_string(), db.display().to_string()]
}

#[test]
fn test_status_per_group() {
    let (_dir, db) = seeded_db();
    trag()
        .arg("status")
        .args(db_arg(&db))
        .args(["--version", "r2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("100.00%"))
        .stdout(predicate::str::contains("test/builtins"))
        .stdout(predicate::str::contains("50.00%"))
        .stdout(predicate::str::contains("test/lang"));
}

#[test]
fn test_status_unknown_revision() {
    let (_dir, db) = seeded_db();
    trag()
        .arg("status")
        .args(db_arg(&db))
        .args(["--version", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no results"));
}

#[test]
fn test_diff_exit_code_tracks_regressions() {
    let (_dir, db) = seeded_db();
    trag()
        .arg("diff")
        .args(db_arg(&db))
        .args(["r1", "r2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("- test/lang/a.js (strict): TypeError: x"));

    trag()
        .arg("diff")
        .args(db_arg(&db))
        .args(["r2", "r1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+ test/lang/a.js (strict)"));
}

#[test]
fn test_list_failures_with_errors() {
    let (_dir, db) = seeded_db();
    trag()
        .arg("list")
        .args(db_arg(&db))
        .args(["--version", "r2", "--outcome", "failed", "--errors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FAIL strict test/lang/a.js  [runtime] TypeError: x"))
        .stdout(predicate::str::contains("b.js").not());
}

#[test]
fn test_list_rejects_bad_outcome() {
    let (_dir, db) = seeded_db();
    trag()
        .arg("list")
        .args(db_arg(&db))
        .args(["--version", "r2", "--outcome", "flaky"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--outcome"));
}

#[test]
fn test_query_without_database_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    trag()
        .arg("status")
        .args(db_arg(&dir.path().join("missing.db")))
        .args(["--version", "r1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_dashboard_files() {
    let (dir, db) = seeded_db();
    let commits = dir.path().join("commits.txt");
    std::fs::write(&commits, "").unwrap();
    let out = dir.path().join("dash");

    // r1/r2 are not commit ids; an empty list still yields an index
    trag()
        .arg("dashboard")
        .args(db_arg(&db))
        .arg("--commits")
        .arg(&commits)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    let index: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("commits.json")).unwrap()).unwrap();
    assert_eq!(index["commits"], serde_json::json!([]));
}

#[test]
fn test_dashboard_rejects_bad_commit_ids() {
    let (dir, db) = seeded_db();
    let commits = dir.path().join("commits.txt");
    std::fs::write(&commits, "r1\n").unwrap();
    trag()
        .arg("dashboard")
        .args(db_arg(&db))
        .arg("--commits")
        .arg(&commits)
        .arg("-o")
        .arg(dir.path().join("dash"))
        .assert()
        .failure();
}

#[test]
fn test_scan_writes_suite() {
    let dir = tempfile::tempdir().unwrap();
    let test262 = dir.path().join("test262");
    let case = test262.join("test/lang/strict.js");
    std::fs::create_dir_all(case.parent().unwrap()).unwrap();
    std::fs::write(
        &case,
        "// Copyright\n/*---\ndescription: only strict\nflags: [onlyStrict]\n---*/\nvar x;\n",
    )
    .unwrap();
    let cases = dir.path().join("cases.txt");
    std::fs::write(&cases, "test/lang/strict.js\n").unwrap();
    let out = dir.path().join("testrun.json");

    trag()
        .arg("scan")
        .arg("--cases")
        .arg(&cases)
        .arg("--test262")
        .arg(&test262)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let suite: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(
        suite["testcases"]["test/lang/strict.js"]["metadata"]["flags"],
        serde_json::json!(["onlyStrict"])
    );
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(["-c", "user.name=trag", "-c", "user.email=trag@example.com"])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?}", args);
}

#[test]
fn test_dry_run_lists_units_without_touching_db() {
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("engine");
    std::fs::create_dir_all(&engine).unwrap();
    git(&engine, &["init", "--quiet"]);
    git(&engine, &["commit", "--quiet", "--allow-empty", "-m", "initial"]);

    let suite = dir.path().join("testrun.json");
    std::fs::write(
        &suite,
        r#"{
  "test262_path": "/nonexistent/test262",
  "testcases": {
    "test/lang/both.js": {"metadata": null},
    "test/lang/strict.js": {"metadata": {"flags": ["onlyStrict"]}},
    "test/lang/sloppy.js": {"metadata": {"flags": ["noStrict"]}}
  }
}"#,
    )
    .unwrap();
    let db = dir.path().join("results.db");

    trag()
        .current_dir(dir.path())
        .arg("run")
        .arg(&suite)
        .arg("--engine")
        .arg(&engine)
        .args(db_arg(&db))
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("would run: test/lang/both.js (sloppy)"))
        .stdout(predicate::str::contains("would run: test/lang/both.js (strict)"))
        .stdout(predicate::str::contains("would run: test/lang/strict.js (strict)"))
        .stdout(predicate::str::contains("would run: test/lang/strict.js (sloppy)").not())
        .stdout(predicate::str::contains("would run: test/lang/sloppy.js (sloppy)"))
        .stdout(predicate::str::contains("would run: test/lang/sloppy.js (strict)").not())
        .stderr(predicate::str::contains("1 revisions x 4 test runs"));

    assert!(!db.exists());
}
