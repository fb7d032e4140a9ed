pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS strings (
  string_id INTEGER PRIMARY KEY AUTOINCREMENT,
  string TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS groups (
  path_sid INTEGER UNIQUE REFERENCES strings(string_id),
  group_sid INTEGER REFERENCES strings(string_id)
);

CREATE TABLE IF NOT EXISTS runs (
  testcase_sid INTEGER NOT NULL REFERENCES strings(string_id),
  error_category TEXT,
  error_message_sid INTEGER REFERENCES strings(string_id),
  use_strict INTEGER NOT NULL,
  version TEXT NOT NULL,
  time REAL
);

CREATE INDEX IF NOT EXISTS idx_runs_version ON runs(version);
"#;

/// Columns every table must have after migration.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("strings", &["string_id", "string"]),
    ("groups", &["path_sid", "group_sid"]),
    (
        "runs",
        &[
            "testcase_sid",
            "error_category",
            "error_message_sid",
            "use_strict",
            "version",
            "time",
        ],
    ),
];
