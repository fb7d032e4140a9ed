use super::{exit_codes, open_existing_store, selected_revision};
use crate::cli::args::ListArgs;
use trag_core::errors::ConfigError;
use trag_core::storage::store::OutcomeFilter;

pub async fn cmd_list(args: ListArgs) -> anyhow::Result<i32> {
    let outcome = match args.outcome.as_deref() {
        None => None,
        Some(s) => Some(OutcomeFilter::parse(s).ok_or_else(|| {
            ConfigError(format!("--outcome must be `passed` or `failed`, got `{}`", s))
        })?),
    };

    let store = open_existing_store(&args.db)?;
    let revision = selected_revision(&args.revision).await?;
    let rows = store.list_results(&revision, outcome, &args.filter)?;

    for row in &rows {
        let mode = if row.use_strict { "strict" } else { "sloppy" };
        let status = if row.passed() { "PASS" } else { "FAIL" };
        if args.errors && !row.passed() {
            println!(
                "{} {:<6} {}  [{}] {}",
                status,
                mode,
                row.testcase,
                row.error_category.as_deref().unwrap_or(""),
                row.error_message.as_deref().unwrap_or("").replace('\n', " ")
            );
        } else {
            println!("{} {:<6} {}", status, mode, row.testcase);
        }
    }
    tracing::debug!(revision = %revision, rows = rows.len(), "listed results");
    Ok(exit_codes::OK)
}
