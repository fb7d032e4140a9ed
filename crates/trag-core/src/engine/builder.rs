use crate::config::HarnessConfig;
use crate::errors::{BuildError, BuildStep, GitError};
use crate::vcs::{CheckoutGuard, GitRepo};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Produces a runnable engine for a given revision.
///
/// Implementations own the engine checkout exclusively; the scheduler never calls
/// `build_revision` while tests of the previous revision are still running.
#[async_trait]
pub trait EngineBuilder: Send {
    async fn build_revision(&mut self, revision: &str) -> Result<(), BuildError>;

    /// Test runner binary, valid after a successful build.
    fn binary(&self) -> PathBuf;

    /// Working directory for test invocations.
    fn work_dir(&self) -> PathBuf;

    /// Put the engine checkout back the way it was found.
    async fn restore(&mut self) -> anyhow::Result<()>;
}

/// Checks out each revision with git and rebuilds it with the configured command.
pub struct GitCargoBuilder {
    guard: CheckoutGuard,
    build_command: Vec<String>,
    binary: PathBuf,
}

impl GitCargoBuilder {
    pub async fn new(repo: GitRepo, cfg: &HarnessConfig) -> Result<Self, GitError> {
        let guard = CheckoutGuard::acquire(repo).await?;
        Ok(Self {
            guard,
            build_command: cfg.build_command.clone(),
            binary: cfg.binary.clone(),
        })
    }

    fn root(&self) -> &Path {
        self.guard.repo().root()
    }
}

#[async_trait]
impl EngineBuilder for GitCargoBuilder {
    async fn build_revision(&mut self, revision: &str) -> Result<(), BuildError> {
        tracing::info!(revision, "checking out");
        self.guard
            .repo()
            .checkout(revision)
            .await
            .map_err(|e| BuildError::new(revision, BuildStep::Checkout, e.to_string()))?;

        let Some((program, args)) = self.build_command.split_first() else {
            return Err(BuildError::new(revision, BuildStep::Build, "empty build command"));
        };
        tracing::info!(revision, command = %self.build_command.join(" "), "rebuilding");
        let output = Command::new(program)
            .args(args)
            .current_dir(self.root())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BuildError::new(revision, BuildStep::Build, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::new(
                revision,
                BuildStep::Build,
                format!("{}: {}", output.status, tail(&stderr, 20)),
            ));
        }
        Ok(())
    }

    fn binary(&self) -> PathBuf {
        self.root().join(&self.binary)
    }

    fn work_dir(&self) -> PathBuf {
        self.root().to_path_buf()
    }

    async fn restore(&mut self) -> anyhow::Result<()> {
        self.guard.restore().await?;
        Ok(())
    }
}

/// An engine that is already built at its current checkout; nothing is switched or rebuilt.
pub struct PrebuiltEngine {
    root: PathBuf,
    binary: PathBuf,
}

impl PrebuiltEngine {
    pub fn new(root: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl EngineBuilder for PrebuiltEngine {
    async fn build_revision(&mut self, revision: &str) -> Result<(), BuildError> {
        let bin = self.binary();
        if !bin.exists() {
            return Err(BuildError::new(
                revision,
                BuildStep::Build,
                format!("runner binary {} does not exist", bin.display()),
            ));
        }
        Ok(())
    }

    fn binary(&self) -> PathBuf {
        self.root.join(&self.binary)
    }

    fn work_dir(&self) -> PathBuf {
        self.root.clone()
    }

    async fn restore(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Last `n` lines of `s`.
fn tail(s: &str, n: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
