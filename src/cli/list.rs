//! List command implementation

use anyhow::Result;

use super::{log_access, print_json_lines, short_time, truncate};
use crate::provider::Provider;
use crate::store::{ConversationRow, ListSort, Store};

pub fn run(
    store: &Store,
    sort: ListSort,
    provider: Option<Provider>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let conversations = store.list_conversations(sort, provider, limit)?;

    if json {
        print_json_lines(&conversations)?;
    } else if conversations.is_empty() {
        println!("No conversations found. Run 'llm-archive import' first.");
    } else {
        print_table(&conversations);
    }

    log_access(store, "list", provider.map(|p| p.as_str()), conversations.len());
    Ok(())
}

fn print_table(conversations: &[ConversationRow]) {
    println!(
        "{:<6} {:<17} {:<9} {:<14} {:>5}  {}",
        "ID", "Created", "Provider", "Source ID", "Msgs", "Title"
    );
    println!("{}", "-".repeat(100));

    for conversation in conversations {
        let title = conversation
            .title
            .as_deref()
            .map(|t| truncate(t, 45))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<6} {:<17} {:<9} {:<14} {:>5}  {}",
            conversation.id,
            short_time(conversation.created_at.as_deref()),
            conversation.provider,
            truncate(&conversation.source_conversation_id, 14),
            conversation.message_count,
            title,
        );
    }
}
