//! Line-delimited run records on disk, gzip-compressed when the file name ends in `.gz`.

use crate::errors::MalformedRecord;
use crate::model::Verdict;
use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

pub fn open_reader(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One parsed line: a record, a malformed line, or nothing (blank and `#` comment lines).
pub fn parse_line(
    source_name: &str,
    line_no: usize,
    line: &str,
) -> Option<Result<Verdict, MalformedRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(
        serde_json::from_str::<Verdict>(trimmed).map_err(|e| MalformedRecord {
            source_name: source_name.to_string(),
            line: line_no,
            reason: e.to_string(),
        }),
    )
}

pub fn write_records(path: &Path, records: &[Verdict]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    if is_gzip(path) {
        let mut enc = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_lines(&mut enc, records)?;
        enc.finish()?.flush()?;
    } else {
        let mut out = BufWriter::new(file);
        write_lines(&mut out, records)?;
        out.flush()?;
    }
    Ok(())
}

fn write_lines<W: Write>(out: &mut W, records: &[Verdict]) -> anyhow::Result<()> {
    for r in records {
        // serde_json escapes newlines inside strings, so each record stays on one line
        serde_json::to_writer(&mut *out, r)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
