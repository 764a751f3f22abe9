//! Prompt library commands

use anyhow::{Context, Result};
use std::path::Path;

use super::{short_time, truncate};
use crate::store::{PromptRow, Store};

pub fn add(store: &Store, name: &str, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read prompt file {}", file.display()))?;

    let (prompt, created) = store.add_prompt(name, &content)?;
    if created {
        println!(
            "Added prompt '{}' version {} (id {})",
            prompt.name, prompt.version, prompt.id
        );
    } else {
        println!(
            "Identical content already stored as '{}' version {} (id {})",
            prompt.name, prompt.version, prompt.id
        );
    }

    Ok(())
}

pub fn list(store: &Store) -> Result<()> {
    let prompts = store.list_prompts()?;

    if prompts.is_empty() {
        println!("No prompts stored. Add one with 'llm-archive prompt add <name> <file>'.");
        return Ok(());
    }

    print_table(&prompts);
    Ok(())
}

pub fn search(store: &Store, query: &str, limit: usize) -> Result<usize> {
    let prompts = store.search_prompts(query, limit)?;
    print_table(&prompts);
    eprintln!("{} results", prompts.len());
    Ok(prompts.len())
}

fn print_table(prompts: &[PromptRow]) {
    println!(
        "{:<6} {:<20} {:>4} {:<17} {:<10} {}",
        "ID", "Name", "Ver", "Created", "Hash", "Content"
    );
    println!("{}", "-".repeat(100));
    for prompt in prompts {
        println!(
            "{:<6} {:<20} {:>4} {:<17} {:<10} {}",
            prompt.id,
            truncate(&prompt.name, 20),
            prompt.version,
            short_time(Some(&prompt.created_at)),
            &prompt.content_hash[..prompt.content_hash.len().min(10)],
            truncate(&prompt.content, 40),
        );
    }
}
