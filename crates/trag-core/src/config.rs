use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_JOBS: usize = 10;

/// How to build and invoke the engine under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Command run in the engine repository after each checkout.
    pub build_command: Vec<String>,
    /// Test runner binary, relative to the engine repository root.
    pub binary: PathBuf,
    /// Prelude files, relative to the test262 root.
    pub harness: Vec<PathBuf>,
    /// Flag that makes the engine evaluate the last file in strict mode.
    pub strict_flag: String,
    pub timeout_secs: u64,
    pub max_jobs: usize,
    pub log: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            build_command: vec![
                "cargo".into(),
                "build".into(),
                "-p".into(),
                "mcjs_test262".into(),
            ],
            binary: PathBuf::from("target/debug/mcjs_test262"),
            harness: vec![
                PathBuf::from("harness/sta.js"),
                PathBuf::from("harness/assert.js"),
            ],
            strict_flag: "--force-last-strict".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_jobs: DEFAULT_MAX_JOBS,
            log: "info".into(),
        }
    }
}

impl HarnessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Apply `TRAG_*` environment overrides. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(v) = env::var("TRAG_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.timeout_secs = n;
            }
        }
        if let Ok(v) = env::var("TRAG_MAX_JOBS") {
            if let Ok(n) = v.parse() {
                self.max_jobs = n;
            }
        }
        if let Ok(v) = env::var("TRAG_LOG") {
            self.log = v;
        }
        self
    }
}

/// Load `trag.yaml`. A missing file means defaults; unknown keys are reported and, in strict
/// mode, rejected.
pub fn load_config(path: &Path, strict: bool) -> Result<HarnessConfig, ConfigError> {
    if !path.exists() {
        return Ok(HarnessConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, strict)
        .map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))
}

pub fn parse_config(raw: &str, strict: bool) -> Result<HarnessConfig, ConfigError> {
    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let cfg: HarnessConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.push(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown config fields: {:?}",
                ignored_keys
            )));
        }
        tracing::warn!(keys = ?ignored_keys, "ignoring unknown config fields");
    }

    if cfg.max_jobs == 0 {
        return Err(ConfigError("max_jobs must be at least 1".into()));
    }
    if cfg.build_command.is_empty() {
        return Err(ConfigError("build_command must not be empty".into()));
    }
    Ok(cfg)
}
