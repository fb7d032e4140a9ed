use crate::errors::{MalformedRecord, StoreError};
use crate::model::{group_of, Verdict};
use crate::storage::interner::StringInterner;
use crate::storage::jsonl;
use rusqlite::{params, Connection, Transaction};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite store of run records. Cloning shares the single connection; every write goes
/// through one transaction at a time.
#[derive(Clone)]
pub struct ResultStore {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPassRate {
    pub group: String,
    pub ok: u64,
    pub total: u64,
}

impl GroupPassRate {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.ok as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFailure {
    pub testcase: String,
    pub use_strict: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFix {
    pub testcase: String,
    pub use_strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionDiff {
    pub new_failures: Vec<NewFailure>,
    pub new_fixes: Vec<NewFix>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeFilter {
    Passed,
    Failed,
}

impl OutcomeFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(OutcomeFilter::Passed),
            "failed" => Some(OutcomeFilter::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub testcase: String,
    pub use_strict: bool,
    pub error_category: Option<String>,
    pub error_message: Option<String>,
    pub time: Option<f64>,
}

impl ResultRow {
    pub fn passed(&self) -> bool {
        self.error_category.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSummary {
    pub version: String,
    pub n_success: u64,
    pub n_total: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub ingested: usize,
    pub skipped: Vec<MalformedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub strings: u64,
    pub groups: u64,
    pub runs: u64,
}

impl ResultStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;

        // runs.time arrived after the first databases were written
        let cols = get_columns(&conn, "runs")?;
        add_column_if_missing(&conn, &cols, "runs", "time", "REAL")?;

        for (table, required) in crate::storage::schema::REQUIRED_COLUMNS {
            let cols = get_columns(&conn, table)?;
            for col in required.iter() {
                if !cols.contains(*col) {
                    return Err(StoreError::SchemaMismatch {
                        table: table.to_string(),
                        column: col.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn intern(&self, s: &str) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(StringInterner::new().intern(&conn, s)?)
    }

    pub fn clear_revision(&self, revision: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM runs WHERE version = ?1", params![revision])?;
        tracing::info!(revision, deleted = n, "cleared revision");
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM groups; DELETE FROM runs;")?;
        Ok(())
    }

    /// Insert a batch of verdicts atomically. Every revision named in the batch replaces
    /// whatever the store held for it before.
    pub fn ingest(&self, records: &[Verdict]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut batch = BatchWriter::new();
        for r in records {
            batch.write(&tx, r)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Purge `revision` and store `records` in its place, in one transaction.
    pub fn replace_revision(&self, revision: &str, records: &[Verdict]) -> Result<usize, StoreError> {
        let write = |conn: &mut Connection| -> rusqlite::Result<usize> {
            let tx = conn.transaction()?;
            let mut batch = BatchWriter::new();
            batch.purge(&tx, revision)?;
            for r in records {
                batch.write(&tx, r)?;
            }
            tx.commit()?;
            Ok(records.len())
        };

        let mut conn = self.lock()?;
        write(&mut *conn).map_err(|source| StoreError::Write {
            revision: revision.to_string(),
            source,
        })
    }

    /// Read line-delimited records from `reader` in one transaction, skipping bad lines.
    pub fn ingest_reader<R: BufRead>(
        &self,
        source_name: &str,
        reader: R,
    ) -> Result<IngestReport, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut batch = BatchWriter::new();
        let mut report = IngestReport::default();
        ingest_lines(&tx, &mut batch, source_name, reader, &mut report)?;
        tx.commit()?;
        Ok(report)
    }

    /// Ingest several files in a single transaction. With `clear`, previous runs are deleted
    /// first and come back if anything fails. Without it, each revision found in the files
    /// replaces its earlier records; files naming the same revision are combined.
    pub fn ingest_files(&self, paths: &[PathBuf], clear: bool) -> Result<IngestReport, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if clear {
            tracing::info!("deleting previous records (restored if ingestion fails)");
            tx.execute_batch("DELETE FROM groups; DELETE FROM runs;")?;
        }

        let mut batch = BatchWriter::new();
        let mut report = IngestReport::default();
        for path in paths {
            tracing::info!(file = %path.display(), "ingesting");
            let reader = jsonl::open_reader(path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let name = path.display().to_string();
            ingest_lines(&tx, &mut batch, &name, reader, &mut report)?;
        }
        tx.commit()?;
        tracing::info!(
            ingested = report.ingested,
            skipped = report.skipped.len(),
            "transaction committed"
        );
        Ok(report)
    }

    pub fn is_tested(&self, revision: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM runs WHERE version = ?1)",
            params![revision],
            |r| r.get(0),
        )?;
        Ok(exists)
    }

    pub fn tested_revisions(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT version FROM runs ORDER BY version")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    /// Passing and total record counts per test group, by group name.
    pub fn pass_rate(&self, revision: &str) -> Result<Vec<GroupPassRate>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT sg.string AS grp,
                    SUM(r.error_category IS NULL) AS ok,
                    COUNT(*) AS total
             FROM runs r
             JOIN groups g ON g.path_sid = r.testcase_sid
             JOIN strings sg ON sg.string_id = g.group_sid
             WHERE r.version = ?1
             GROUP BY g.group_sid
             ORDER BY grp",
        )?;
        let rows = stmt.query_map(params![revision], |row| {
            Ok(GroupPassRate {
                group: row.get(0)?,
                ok: row.get::<_, i64>(1)? as u64,
                total: row.get::<_, i64>(2)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Failures introduced and fixed going from `a` to `b`, matched on (test, strictness).
    pub fn diff(&self, a: &str, b: &str) -> Result<RevisionDiff, StoreError> {
        let conn = self.lock()?;
        let left = sorted_outcomes(&conn, a)?;
        let right = sorted_outcomes(&conn, b)?;
        Ok(merge_diff(&left, &right))
    }

    pub fn list_results(
        &self,
        revision: &str,
        outcome: Option<OutcomeFilter>,
        path_filter: &str,
    ) -> Result<Vec<ResultRow>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT st.string, r.use_strict, r.error_category, se.string, r.time
             FROM runs r
             JOIN strings st ON st.string_id = r.testcase_sid
             LEFT JOIN strings se ON se.string_id = r.error_message_sid
             WHERE r.version = ?1
               AND (?2 = '' OR instr(st.string, ?2) > 0)
             ORDER BY st.string, r.use_strict",
        )?;
        let rows = stmt.query_map(params![revision, path_filter], |row| {
            Ok(ResultRow {
                testcase: row.get(0)?,
                use_strict: row.get(1)?,
                error_category: row.get(2)?,
                error_message: row.get(3)?,
                time: row.get(4)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let row = row?;
            let keep = match outcome {
                None => true,
                Some(OutcomeFilter::Passed) => row.passed(),
                Some(OutcomeFilter::Failed) => !row.passed(),
            };
            if keep {
                out.push(row);
            }
        }
        Ok(out)
    }

    pub fn revision_summaries(&self) -> Result<Vec<RevisionSummary>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT version, SUM(error_category IS NULL), COUNT(*)
             FROM runs
             GROUP BY version
             ORDER BY version",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RevisionSummary {
                version: row.get(0)?,
                n_success: row.get::<_, i64>(1)? as u64,
                n_total: row.get::<_, i64>(2)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;
        let count = |table: &str| -> rusqlite::Result<u64> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            conn.query_row(&sql, [], |r| r.get::<_, i64>(0).map(|n| n as u64))
        };
        Ok(StoreStats {
            strings: count("strings")?,
            groups: count("groups")?,
            runs: count("runs")?,
        })
    }
}

fn insert_record(
    tx: &Transaction,
    interner: &mut StringInterner,
    record: &Verdict,
) -> rusqlite::Result<()> {
    let testcase_sid = interner.intern(tx, &record.testcase)?;
    let group_sid = interner.intern(tx, group_of(&record.testcase))?;
    tx.prepare_cached("INSERT OR IGNORE INTO groups (path_sid, group_sid) VALUES (?1, ?2)")?
        .execute(params![testcase_sid, group_sid])?;

    let (category, message_sid) = match &record.error {
        Some(err) => (
            Some(err.category.as_str().to_string()),
            Some(interner.intern(tx, &err.message)?),
        ),
        None => (None, None),
    };

    tx.prepare_cached(
        "INSERT INTO runs (testcase_sid, error_category, error_message_sid, use_strict, version, time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?
    .execute(params![
        testcase_sid,
        category,
        message_sid,
        record.use_strict,
        record.version,
        record.time
    ])?;
    Ok(())
}

/// Record writer for one transaction. The first record of each revision purges that
/// revision's earlier rows, so re-ingesting a batch replaces it instead of doubling it.
struct BatchWriter {
    interner: StringInterner,
    purged: HashSet<String>,
}

impl BatchWriter {
    fn new() -> Self {
        Self {
            interner: StringInterner::new(),
            purged: HashSet::new(),
        }
    }

    fn purge(&mut self, tx: &Transaction, revision: &str) -> rusqlite::Result<()> {
        if self.purged.contains(revision) {
            return Ok(());
        }
        let n = tx
            .prepare_cached("DELETE FROM runs WHERE version = ?1")?
            .execute(params![revision])?;
        if n > 0 {
            tracing::info!(revision, purged = n, "replacing previous results");
        }
        self.purged.insert(revision.to_string());
        Ok(())
    }

    fn write(&mut self, tx: &Transaction, record: &Verdict) -> rusqlite::Result<()> {
        self.purge(tx, &record.version)?;
        insert_record(tx, &mut self.interner, record)
    }
}

fn ingest_lines<R: BufRead>(
    tx: &Transaction,
    batch: &mut BatchWriter,
    source_name: &str,
    reader: R,
    report: &mut IngestReport,
) -> Result<(), StoreError> {
    for (idx, bytes) in reader.split(b'\n').enumerate() {
        let line_no = idx + 1;
        let bytes = match bytes {
            Ok(b) => b,
            Err(e) => {
                // a corrupt gzip stream cannot be resumed; keep what was read so far
                tracing::warn!(source = source_name, line = line_no, error = %e, "unreadable input, stopping this file");
                report.skipped.push(MalformedRecord {
                    source_name: source_name.to_string(),
                    line: line_no,
                    reason: e.to_string(),
                });
                break;
            }
        };
        let line = match String::from_utf8(bytes) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(source = source_name, line = line_no, "line is not UTF-8, skipping");
                report.skipped.push(MalformedRecord {
                    source_name: source_name.to_string(),
                    line: line_no,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        match jsonl::parse_line(source_name, line_no, &line) {
            None => {}
            Some(Ok(record)) => {
                batch.write(tx, &record)?;
                report.ingested += 1;
            }
            Some(Err(skip)) => {
                tracing::warn!(source = source_name, line = line_no, reason = %skip.reason, "invalid record, skipping line");
                report.skipped.push(skip);
            }
        }
    }
    Ok(())
}

/// (path, use_strict, error_category, message) for one revision, sorted by path then strictness.
type Outcome = (String, bool, Option<String>, Option<String>);

fn sorted_outcomes(conn: &Connection, revision: &str) -> rusqlite::Result<Vec<Outcome>> {
    let mut stmt = conn.prepare(
        "SELECT st.string, r.use_strict, r.error_category, se.string
         FROM runs r
         JOIN strings st ON st.string_id = r.testcase_sid
         LEFT JOIN strings se ON se.string_id = r.error_message_sid
         WHERE r.version = ?1
         ORDER BY st.string, r.use_strict",
    )?;
    let rows = stmt.query_map(params![revision], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })?;
    rows.collect()
}

// SQLite's default BINARY collation orders TEXT bytewise, the same order as `str::cmp`.
fn merge_diff(left: &[Outcome], right: &[Outcome]) -> RevisionDiff {
    let mut diff = RevisionDiff::default();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let (la, ra) = (&left[i], &right[j]);
        match (la.0.as_str(), la.1).cmp(&(ra.0.as_str(), ra.1)) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                let a_passed = la.2.is_none();
                let b_passed = ra.2.is_none();
                if a_passed && !b_passed {
                    diff.new_failures.push(NewFailure {
                        testcase: ra.0.clone(),
                        use_strict: ra.1,
                        message: ra.3.clone().unwrap_or_default(),
                    });
                } else if !a_passed && b_passed {
                    diff.new_fixes.push(NewFix {
                        testcase: la.0.clone(),
                        use_strict: la.1,
                    });
                }
                i += 1;
                j += 1;
            }
        }
    }
    diff
}

fn get_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> rusqlite::Result<()> {
    if !cols.contains(col) {
        tracing::info!(table, col, "migrating: adding column");
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(path: &str, strict: bool, err: Option<&str>) -> Outcome {
        (
            path.to_string(),
            strict,
            err.map(|_| "runtime".to_string()),
            err.map(str::to_string),
        )
    }

    #[test]
    fn test_merge_skips_unmatched_keys() {
        let a = vec![o("a.js", false, None), o("b.js", false, None), o("c.js", true, Some("e"))];
        let b = vec![o("b.js", false, Some("boom")), o("c.js", true, None), o("d.js", false, Some("x"))];
        let d = merge_diff(&a, &b);
        assert_eq!(
            d.new_failures,
            vec![NewFailure {
                testcase: "b.js".into(),
                use_strict: false,
                message: "boom".into()
            }]
        );
        assert_eq!(
            d.new_fixes,
            vec![NewFix {
                testcase: "c.js".into(),
                use_strict: true
            }]
        );
    }

    #[test]
    fn test_merge_pairs_on_strictness() {
        let a = vec![o("x.js", false, None), o("x.js", true, None)];
        let b = vec![o("x.js", false, None), o("x.js", true, Some("TypeError: x"))];
        let d = merge_diff(&a, &b);
        assert_eq!(d.new_failures.len(), 1);
        assert!(d.new_failures[0].use_strict);
        assert!(d.new_fixes.is_empty());
    }

    #[test]
    fn test_percent_of_empty_group() {
        let g = GroupPassRate {
            group: "g".into(),
            ok: 0,
            total: 0,
        };
        assert_eq!(g.percent(), 0.0);
    }
}
