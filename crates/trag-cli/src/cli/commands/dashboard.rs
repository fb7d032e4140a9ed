use super::{exit_codes, open_existing_store};
use crate::cli::args::DashboardArgs;
use trag_core::report::dashboard::write_dashboard;
use trag_core::vcs::read_commit_ids;

pub fn cmd_dashboard(args: DashboardArgs) -> anyhow::Result<i32> {
    let store = open_existing_store(&args.db)?;
    let commits = read_commit_ids(&args.commits)?;

    let report = write_dashboard(&store, &commits, &args.out)?;
    eprintln!(
        "{} commits with results, {} revision files written, {} already present -> {}",
        report.commits,
        report.written,
        report.unchanged,
        args.out.display()
    );
    Ok(exit_codes::OK)
}
