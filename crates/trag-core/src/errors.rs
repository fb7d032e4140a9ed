//! Classified failures of the harness.
//!
//! Test-scoped failures (timeouts, runner crashes) are not errors at this level: they are
//! recorded as failing verdicts. What remains here is what callers need to tell apart:
//! a revision that cannot be built, a line that cannot be ingested, and a store that
//! cannot be trusted.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which half of "check out, then build" went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Checkout,
    Build,
}

impl BuildStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStep::Checkout => "checkout",
            BuildStep::Build => "build",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Revision-scoped and recoverable: the scheduler logs it and moves on.
#[derive(Debug, Error)]
#[error("{step} failed for revision {revision}: {detail}")]
pub struct BuildError {
    pub revision: String,
    pub step: BuildStep,
    pub detail: String,
}

impl BuildError {
    pub fn new(revision: impl Into<String>, step: BuildStep, detail: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            step,
            detail: detail.into(),
        }
    }
}

/// One input line that could not be turned into a run record.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{source_name}:{line}: {reason}")]
pub struct MalformedRecord {
    pub source_name: String,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("{0} is not a git repository")]
    NotARepository(String),

    #[error("git {args} failed: {stderr}")]
    CommandFailed { args: String, stderr: String },

    #[error("invalid revision `{0}` (expected a lowercase hex commit id)")]
    InvalidRevision(String),

    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal store failures. A write failure names the revision whose transaction was rolled back.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema mismatch: table `{table}` has no column `{column}`")]
    SchemaMismatch { table: String, column: String },

    #[error("failed to persist results for revision {revision}: {source}")]
    Write {
        revision: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);
