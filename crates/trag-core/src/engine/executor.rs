//! One engine invocation per (test, strictness, revision).
//!
//! Wire contract: the engine prints whatever it likes on stdout, but its last non-empty
//! line must be `{"error": null}` or `{"error": {"category": .., "message": ..}}`.

use crate::model::{ErrorCategory, ErrorInfo, Verdict};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

const ENCODING_ERROR: &str = "<# encoding error #>";

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub testcase: String,
    pub revision: String,
    /// Harness files followed by the test file.
    pub files: Vec<PathBuf>,
    pub use_strict: bool,
    pub negative: bool,
}

/// What happened to the process, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    TimedOut,
    /// Could not be spawned, or its pipes failed.
    Failed(String),
    Exited { success: bool, stdout: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct TestExecutor {
    binary: PathBuf,
    work_dir: PathBuf,
    strict_flag: String,
    timeout: Duration,
}

impl TestExecutor {
    pub fn new(
        binary: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        strict_flag: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            strict_flag: strict_flag.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn args_for(&self, inv: &Invocation) -> Vec<OsString> {
        let mut args = Vec::with_capacity(inv.files.len() + 1);
        if inv.use_strict {
            args.push(OsString::from(&self.strict_flag));
        }
        args.extend(inv.files.iter().map(|p| p.as_os_str().to_os_string()));
        args
    }

    /// Run one test and classify the result. Never fails: every problem becomes a verdict.
    pub async fn run(&self, inv: &Invocation) -> Verdict {
        let start = Instant::now();
        let outcome = self.execute(inv).await;
        let elapsed = start.elapsed();

        let error = reconcile_negative(classify(&outcome), inv.negative);
        tracing::debug!(
            testcase = %inv.testcase,
            use_strict = inv.use_strict,
            elapsed_ms = elapsed.as_millis() as u64,
            error = ?error.as_ref().map(|e| e.category.as_str()),
            "test finished"
        );

        Verdict {
            testcase: inv.testcase.clone(),
            version: inv.revision.clone(),
            use_strict: inv.use_strict,
            error,
            time: Some(elapsed.as_secs_f64()),
        }
    }

    async fn execute(&self, inv: &Invocation) -> ProcessOutcome {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args_for(inv))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ProcessOutcome::Failed(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            }
        };
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let waited = {
            let io = async {
                tokio::try_join!(
                    read_pipe(stdout.as_mut()),
                    read_pipe(stderr.as_mut()),
                    child.wait()
                )
            };
            timeout(self.timeout, io).await
        };

        match waited {
            Ok(Ok((out, err, status))) => {
                if !err.is_empty() {
                    tracing::trace!(
                        testcase = %inv.testcase,
                        stderr = %String::from_utf8_lossy(&err),
                        "runner stderr"
                    );
                }
                ProcessOutcome::Exited {
                    success: status.success(),
                    stdout: out,
                }
            }
            Ok(Err(e)) => {
                if let Err(ke) = child.kill().await {
                    tracing::warn!(testcase = %inv.testcase, error = %ke, "failed to kill runner after i/o error");
                }
                ProcessOutcome::Failed(format!("i/o error while running test: {}", e))
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(testcase = %inv.testcase, error = %e, "failed to kill timed out runner");
                }
                ProcessOutcome::TimedOut
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(p) = pipe {
        p.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Error carried by a process outcome, in priority order: timeout, nonzero exit, report.
pub fn classify(outcome: &ProcessOutcome) -> Option<ErrorInfo> {
    match outcome {
        ProcessOutcome::TimedOut => Some(ErrorInfo::timeout()),
        ProcessOutcome::Failed(msg) => Some(ErrorInfo::new(ErrorCategory::RunnerFailure, msg)),
        ProcessOutcome::Exited {
            success: false,
            stdout,
        } => {
            let message = std::str::from_utf8(stdout).unwrap_or(ENCODING_ERROR);
            Some(ErrorInfo::new(ErrorCategory::RunnerFailure, message))
        }
        ProcessOutcome::Exited {
            success: true,
            stdout,
        } => match parse_report(stdout) {
            Ok(error) => error,
            Err(reason) => Some(ErrorInfo::new(ErrorCategory::RunnerFailure, reason)),
        },
    }
}

/// Decode the engine's verdict from the last non-empty stdout line.
pub fn parse_report(stdout: &[u8]) -> Result<Option<ErrorInfo>, String> {
    let text = String::from_utf8_lossy(stdout);
    let Some(line) = text.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return Err("runner produced no output".into());
    };

    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| format!("invalid runner output ({}): {}", e, line))?;
    let error = value
        .get("error")
        .ok_or_else(|| format!("runner output has no `error` field: {}", line))?;
    serde_json::from_value(error.clone())
        .map_err(|e| format!("invalid `error` in runner output ({}): {}", e, line))
}

/// For negative tests an error is the expected outcome and a clean run is the failure.
pub fn reconcile_negative(error: Option<ErrorInfo>, negative: bool) -> Option<ErrorInfo> {
    if !negative {
        return error;
    }
    // any error satisfies a negative test; the expected phase and type are not compared
    match error {
        None => Some(ErrorInfo::unexpected_success()),
        Some(_) => None,
    }
}
