//! JSON data files for the results dashboard front end.
//!
//! `commits.json` lists every known revision in commit-list order with its totals;
//! `<revision>.json` holds the per-group breakdown of one revision. Per-revision files are
//! immutable once written and are not regenerated.

use crate::storage::ResultStore;
use anyhow::Context;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitEntry {
    pub commit_id: String,
    pub n_success: u64,
    pub n_total: u64,
}

#[derive(Debug, Serialize)]
struct CommitsFile<'a> {
    generated_at: String,
    commits: &'a [CommitEntry],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEntry {
    pub path: String,
    pub n_ok: u64,
    pub n_fail: u64,
}

#[derive(Debug, Serialize)]
struct GroupsFile {
    groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardReport {
    pub commits: usize,
    pub written: usize,
    pub unchanged: usize,
}

/// Revisions of `commit_ids` that have results, in the given order.
pub fn commit_entries(store: &ResultStore, commit_ids: &[String]) -> anyhow::Result<Vec<CommitEntry>> {
    let mut by_version: HashMap<String, CommitEntry> = store
        .revision_summaries()?
        .into_iter()
        .map(|s| {
            (
                s.version.clone(),
                CommitEntry {
                    commit_id: s.version,
                    n_success: s.n_success,
                    n_total: s.n_total,
                },
            )
        })
        .collect();
    Ok(commit_ids
        .iter()
        .filter_map(|id| by_version.remove(id))
        .collect())
}

pub fn write_dashboard(
    store: &ResultStore,
    commit_ids: &[String],
    out_dir: &Path,
) -> anyhow::Result<DashboardReport> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let commits = commit_entries(store, commit_ids)?;
    let index = CommitsFile {
        generated_at: chrono::Utc::now().to_rfc3339(),
        commits: &commits,
    };
    std::fs::write(out_dir.join("commits.json"), serde_json::to_vec(&index)?)?;

    let mut report = DashboardReport {
        commits: commits.len(),
        ..Default::default()
    };
    for entry in &commits {
        let path = out_dir.join(format!("{}.json", entry.commit_id));
        if path.exists() {
            report.unchanged += 1;
            continue;
        }
        let groups = store
            .pass_rate(&entry.commit_id)?
            .into_iter()
            .map(|g| GroupEntry {
                n_fail: g.total - g.ok,
                n_ok: g.ok,
                path: g.group,
            })
            .collect();
        std::fs::write(&path, serde_json::to_vec(&GroupsFile { groups })?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        report.written += 1;
    }
    tracing::info!(
        commits = report.commits,
        written = report.written,
        unchanged = report.unchanged,
        "dashboard data written"
    );
    Ok(report)
}
