#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Stand-in runner: honours the strict flag, then runs the last argument as a shell script
/// with `STRICT` and `REV` (read from `./REVISION`) exported.
const FAKE_ENGINE: &str = r#"#!/bin/sh
strict=0
if [ "$1" = "--force-last-strict" ]; then strict=1; shift; fi
for last; do :; done
REV=$(cat REVISION 2>/dev/null)
STRICT=$strict REV=$REV exec sh "$last"
"#;

pub const PASS: &str = r#"echo "loading harness"
echo '{"error": null}'
"#;

pub const FAIL_RUNTIME: &str = r#"echo 'some engine log line'
echo '{"error": {"category": "runtime", "message": "TypeError: x"}}'
"#;

pub const ECHO_MODE: &str = r#"printf '{"error": {"category": "mode", "message": "%s"}}\n' "$STRICT"
"#;

/// Passes on every revision except `bad`, where it fails only in strict mode.
pub const REGRESSES_ON_BAD_STRICT: &str = r#"if [ "$REV" = "bad" ] && [ "$STRICT" = "1" ]; then
  echo '{"error": {"category": "runtime", "message": "regressed"}}'
else
  echo '{"error": null}'
fi
"#;

pub const HANGS: &str = "exec sleep 30\n";

pub const CRASHES: &str = "echo 'thread main panicked'\nexit 3\n";

/// Path to the fake engine, written once per test binary.
///
/// Every test calls this before spawning anything, so no child can hold the script open
/// for writing while it is executed.
pub fn fake_engine() -> &'static Path {
    static ENGINE: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = ENGINE.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake_engine");
        std::fs::write(&path, FAKE_ENGINE).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        (dir, path)
    });
    path
}

/// Writes `files` (relative path, content) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
