use super::exit_codes;
use crate::cli::args::ScanArgs;
use trag_core::suite;

pub fn cmd_scan(args: ScanArgs) -> anyhow::Result<i32> {
    let cases = suite::read_case_list(&args.cases)?;
    let scanned = suite::scan(&args.test262, &cases)?;
    scanned.save(&args.out)?;

    let without_metadata = scanned
        .testcases
        .values()
        .filter(|e| e.metadata.is_none())
        .count();
    if without_metadata > 0 {
        tracing::warn!(count = without_metadata, "test cases without front matter");
    }
    eprintln!(
        "scanned {} test cases -> {}",
        scanned.testcases.len(),
        args.out.display()
    );
    Ok(exit_codes::OK)
}
