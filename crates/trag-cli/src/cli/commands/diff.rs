use super::{exit_codes, open_existing_store};
use crate::cli::args::DiffArgs;

pub fn cmd_diff(args: DiffArgs) -> anyhow::Result<i32> {
    let store = open_existing_store(&args.db)?;
    for rev in [&args.from, &args.to] {
        if !store.is_tested(rev)? {
            tracing::warn!(revision = %rev, "revision has no results");
        }
    }
    let diff = store.diff(&args.from, &args.to)?;

    if args.json {
        let failures: Vec<_> = diff
            .new_failures
            .iter()
            .map(|f| {
                serde_json::json!({
                    "testcase": f.testcase,
                    "use_strict": f.use_strict,
                    "message": f.message,
                })
            })
            .collect();
        let fixes: Vec<_> = diff
            .new_fixes
            .iter()
            .map(|f| serde_json::json!({ "testcase": f.testcase, "use_strict": f.use_strict }))
            .collect();
        let doc = serde_json::json!({
            "from": args.from,
            "to": args.to,
            "new_failures": failures,
            "new_fixes": fixes,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for f in &diff.new_failures {
            let mode = if f.use_strict { "strict" } else { "sloppy" };
            println!("- {} ({}): {}", f.testcase, mode, f.message.replace('\n', " "));
        }
        for f in &diff.new_fixes {
            let mode = if f.use_strict { "strict" } else { "sloppy" };
            println!("+ {} ({})", f.testcase, mode);
        }
        eprintln!(
            "{}..{}: {} new failures, {} new fixes",
            args.from,
            args.to,
            diff.new_failures.len(),
            diff.new_fixes.len()
        );
    }

    if diff.new_failures.is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::TEST_FAILED)
    }
}
