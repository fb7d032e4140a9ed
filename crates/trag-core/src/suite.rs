use crate::metadata;
use crate::model::{TestCase, TestMetadata};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The scanned test suite (`testrun.json`): where test262 lives and what each case declares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuite {
    pub test262_path: PathBuf,
    pub testcases: BTreeMap<String, TestCaseEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCaseEntry {
    #[serde(default)]
    pub metadata: Option<TestMetadata>,
}

impl TestSuite {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read test suite {}", path.display()))?;
        let suite: TestSuite = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse test suite {}", path.display()))?;
        Ok(suite)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write test suite {}", path.display()))?;
        Ok(())
    }

    /// Cases in path order, optionally restricted to paths containing `filter`.
    pub fn cases<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = TestCase> + 'a {
        self.testcases
            .iter()
            .filter(move |(path, _)| filter.map_or(true, |f| path.contains(f)))
            .map(|(path, entry)| TestCase {
                path: path.clone(),
                metadata: entry.metadata.clone().unwrap_or_default(),
            })
    }

    /// Files handed to the engine for `case`: harness prelude, declared includes, then the test.
    pub fn files_for(&self, case: &TestCase, harness: &[PathBuf]) -> Vec<PathBuf> {
        let mut rel: Vec<PathBuf> = harness.to_vec();
        for inc in &case.metadata.includes {
            let p = Path::new("harness").join(inc);
            if !rel.contains(&p) {
                rel.push(p);
            }
        }
        rel.push(PathBuf::from(&case.path));
        rel.into_iter().map(|p| self.test262_path.join(p)).collect()
    }
}

/// One relative test path per non-empty line.
pub fn read_case_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read case list {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read the front matter of every listed case under `test262_root`.
pub fn scan(test262_root: &Path, cases: &[String]) -> anyhow::Result<TestSuite> {
    let mut testcases = BTreeMap::new();
    for rel in cases {
        let path = test262_root.join(rel);
        tracing::debug!(path = %path.display(), "scanning");
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read test case {}", path.display()))?;
        let metadata = metadata::parse(&source)
            .with_context(|| format!("bad front matter in {}", path.display()))?;
        testcases.insert(rel.clone(), TestCaseEntry { metadata });
    }
    tracing::info!(cases = testcases.len(), "scan complete");
    Ok(TestSuite {
        test262_path: test262_root.to_path_buf(),
        testcases,
    })
}
