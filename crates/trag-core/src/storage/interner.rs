use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Table-backed string interning.
///
/// Lives for one write transaction: the memo only holds ids that the current transaction
/// has seen, so nothing survives a rollback.
#[derive(Debug, Default)]
pub struct StringInterner {
    memo: HashMap<String, i64>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `s`, inserting it if absent.
    pub fn intern(&mut self, conn: &Connection, s: &str) -> rusqlite::Result<i64> {
        if let Some(id) = self.memo.get(s) {
            return Ok(*id);
        }
        conn.prepare_cached("INSERT OR IGNORE INTO strings (string) VALUES (?1)")?
            .execute(params![s])?;
        let id: i64 = conn
            .prepare_cached("SELECT string_id FROM strings WHERE string = ?1")?
            .query_row(params![s], |r| r.get(0))?;
        self.memo.insert(s.to_string(), id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

/// Id of an already interned string, without inserting.
pub fn lookup(conn: &Connection, s: &str) -> rusqlite::Result<Option<i64>> {
    conn.prepare_cached("SELECT string_id FROM strings WHERE string = ?1")?
        .query_row(params![s], |r| r.get(0))
        .optional()
}
