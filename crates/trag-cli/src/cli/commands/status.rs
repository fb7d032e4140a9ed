use super::{exit_codes, open_existing_store, selected_revision};
use crate::cli::args::StatusArgs;

pub async fn cmd_status(args: StatusArgs) -> anyhow::Result<i32> {
    let store = open_existing_store(&args.db)?;
    let revision = selected_revision(&args.revision).await?;
    let groups = store.pass_rate(&revision)?;

    if groups.is_empty() {
        eprintln!("no results for revision {}", revision);
        return Ok(exit_codes::TEST_FAILED);
    }

    let ok: u64 = groups.iter().map(|g| g.ok).sum();
    let total: u64 = groups.iter().map(|g| g.total).sum();

    if args.json {
        let rows: Vec<_> = groups
            .iter()
            .map(|g| {
                serde_json::json!({
                    "group": g.group,
                    "ok": g.ok,
                    "total": g.total,
                    "percent": g.percent(),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "version": revision,
            "ok": ok,
            "total": total,
            "groups": rows,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(exit_codes::OK);
    }

    println!("revision {}", revision);
    for g in &groups {
        println!("{:>7.2}% {:>6}/{:<6} {}", g.percent(), g.ok, g.total, g.group);
    }
    let percent = ok as f64 / total as f64 * 100.0;
    println!("{:>7.2}% {:>6}/{:<6} (total)", percent, ok, total);
    Ok(exit_codes::OK)
}
