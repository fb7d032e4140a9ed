use super::{exit_codes, open_store};
use crate::cli::args::IngestArgs;

pub fn cmd_ingest(args: IngestArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let report = store.ingest_files(&args.files, args.clear)?;

    for skipped in &report.skipped {
        eprintln!("skipped {}", skipped);
    }
    eprintln!(
        "ingested {} records from {} files ({} skipped)",
        report.ingested,
        args.files.len(),
        report.skipped.len()
    );
    Ok(exit_codes::OK)
}
