//! Stats command implementation

use anyhow::Result;

use crate::store::Store;

pub fn run(store: &Store) -> Result<()> {
    let stats = store.stats()?;

    if let Some(path) = store.path() {
        println!("Archive: {}", path.display());
    }
    println!(
        "Schema version: {}",
        stats.schema_version.as_deref().unwrap_or("?")
    );
    println!(
        "Conversations: {} | Messages: {} | Prompts: {} | Searches logged: {}",
        stats.conversations, stats.messages, stats.prompts, stats.searches_logged
    );

    if !stats.providers.is_empty() {
        println!("\n{:<10} {:>14} {:>10}", "Provider", "Conversations", "Messages");
        println!("{}", "-".repeat(36));
        for provider in &stats.providers {
            println!(
                "{:<10} {:>14} {:>10}",
                provider.provider, provider.conversations, provider.messages
            );
        }
    }

    Ok(())
}
