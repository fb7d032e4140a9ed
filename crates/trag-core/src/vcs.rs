//! Revision resolution and checkout bookkeeping for the engine repository.

use crate::errors::GitError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;

/// What the operator asked to test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    /// A single ref or hash, resolved to its full commit id.
    Single(String),
    /// `from..to` along first-parent history, oldest first, `from` excluded.
    Range { from: String, to: String },
    /// Explicit commit ids, tested in the given order.
    List(Vec<String>),
}

impl RevisionSpec {
    /// `A..B` is a range, anything else a single ref.
    pub fn parse(s: &str) -> Self {
        match s.split_once("..") {
            Some((from, to)) if !from.is_empty() && !to.is_empty() => RevisionSpec::Range {
                from: from.to_string(),
                to: to.to_string(),
            },
            _ => RevisionSpec::Single(s.to_string()),
        }
    }

    pub fn from_commits_file(path: &Path) -> anyhow::Result<Self> {
        Ok(RevisionSpec::List(read_commit_ids(path)?))
    }
}

/// Commits file: one hash per line, blank lines ignored.
pub fn read_commit_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read commits file {}: {}", path.display(), e))?;
    let mut commits = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !is_commit_id(line) {
            return Err(GitError::InvalidRevision(line.to_string()).into());
        }
        commits.push(line.to_string());
    }
    Ok(commits)
}

pub fn is_commit_id(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]{4,40}$").expect("static regex"))
        .is_match(s)
}

/// Where HEAD pointed before the harness started moving it around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalHead {
    Branch(String),
    Detached(String),
}

impl OriginalHead {
    pub fn checkout_target(&self) -> &str {
        match self {
            OriginalHead::Branch(b) => b,
            OriginalHead::Detached(h) => h,
        }
    }
}

/// A git working tree driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, GitError> {
        let root = root.as_ref().to_path_buf();
        if !root.join(".git").exists() {
            return Err(GitError::NotARepository(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(std::process::Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(GitError::CommandFailed {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    pub async fn head_revision(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    pub async fn original_head(&self) -> Result<OriginalHead, GitError> {
        match self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"]).await {
            Ok(branch) if !branch.is_empty() => Ok(OriginalHead::Branch(branch)),
            _ => Ok(OriginalHead::Detached(self.head_revision().await?)),
        }
    }

    pub async fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        self.run(&["rev-parse", "--verify", &format!("{}^{{commit}}", rev)])
            .await
    }

    pub async fn checkout(&self, rev: &str) -> Result<(), GitError> {
        self.run(&["checkout", "--quiet", rev]).await.map(|_| ())
    }

    /// Concrete commit ids for `spec`, in test order.
    pub async fn resolve(&self, spec: &RevisionSpec) -> Result<Vec<String>, GitError> {
        match spec {
            RevisionSpec::Single(rev) => Ok(vec![self.rev_parse(rev).await?]),
            RevisionSpec::Range { from, to } => {
                let range = format!("{}..{}", from, to);
                let out = self
                    .run(&["rev-list", "--first-parent", "--reverse", &range])
                    .await?;
                Ok(out
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect())
            }
            RevisionSpec::List(commits) => {
                for c in commits {
                    if !is_commit_id(c) {
                        return Err(GitError::InvalidRevision(c.clone()));
                    }
                }
                Ok(commits.clone())
            }
        }
    }
}

/// Records the original HEAD and puts it back.
///
/// Call [`CheckoutGuard::restore`] on the normal path. If the guard is dropped without it
/// (the run future was cancelled), `Drop` restores synchronously.
#[derive(Debug)]
pub struct CheckoutGuard {
    repo: GitRepo,
    original: OriginalHead,
    restored: bool,
}

impl CheckoutGuard {
    pub async fn acquire(repo: GitRepo) -> Result<Self, GitError> {
        let original = repo.original_head().await?;
        tracing::debug!(original = ?original, repo = %repo.root().display(), "recorded checkout");
        Ok(Self {
            repo,
            original,
            restored: false,
        })
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    pub fn original(&self) -> &OriginalHead {
        &self.original
    }

    pub async fn restore(&mut self) -> Result<(), GitError> {
        if self.restored {
            return Ok(());
        }
        self.repo.checkout(self.original.checkout_target()).await?;
        self.restored = true;
        tracing::info!(target_ref = self.original.checkout_target(), "restored checkout");
        Ok(())
    }
}

impl Drop for CheckoutGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        let target = self.original.checkout_target().to_string();
        let status = std::process::Command::new("git")
            .args(["checkout", "--quiet", &target])
            .current_dir(self.repo.root())
            .stdin(std::process::Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => {
                tracing::warn!(target_ref = %target, "restored checkout during cleanup")
            }
            Ok(s) => tracing::error!(target_ref = %target, status = %s, "failed to restore checkout"),
            Err(e) => tracing::error!(target_ref = %target, error = %e, "failed to restore checkout"),
        }
    }
}
