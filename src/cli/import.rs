//! Import command implementation

use anyhow::Result;

use crate::import::import_path;
use crate::provider::Provider;
use crate::store::Store;

pub fn run(store: &Store, path: &str, provider: Provider) -> Result<()> {
    println!("Importing {} export(s) from {}", provider, path);

    let report = import_path(store, path, provider)?;

    for (file, stats) in &report.imported {
        println!(
            "  {}: {} conversations (+{}), {} messages (+{})",
            file.display(),
            stats.conversations_seen,
            stats.conversations_added,
            stats.messages_seen,
            stats.messages_added,
        );
    }
    for failure in &report.failures {
        println!("  {}: FAILED ({:#})", failure.path.display(), failure.error);
    }

    let totals = &report.totals;
    println!("{}", "-".repeat(60));
    println!(
        "Files: {} | Conversations: +{} | Messages: +{} | Empty turns skipped: {} | Issues: {}",
        totals.files,
        totals.conversations_added,
        totals.messages_added,
        totals.skipped_empty,
        totals.issues,
    );

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} file(s) could not be imported",
            report.failures.len(),
            report.failures.len() + totals.files
        );
    }

    Ok(())
}
