//! Show command implementation

use anyhow::Result;
use serde::Serialize;

use super::log_access;
use crate::store::{ConversationRow, MessageRow, Store};

#[derive(Serialize)]
struct ShowJson<'a> {
    conversation: &'a ConversationRow,
    messages: &'a [MessageRow],
}

pub fn run(store: &Store, identifier: &str, json: bool) -> Result<()> {
    let conversation = match store.resolve_conversation(identifier) {
        Ok(conversation) => conversation,
        Err(err) => {
            log_access(store, "show", Some(identifier), 0);
            return Err(err);
        }
    };
    let messages = store.get_messages(conversation.id)?;

    if json {
        let out = ShowJson {
            conversation: &conversation,
            messages: &messages,
        };
        println!("{}", serde_json::to_string(&out)?);
    } else {
        print_conversation(&conversation, &messages);
    }

    log_access(store, "show", Some(identifier), 1);
    Ok(())
}

fn print_conversation(conversation: &ConversationRow, messages: &[MessageRow]) {
    println!("\n{}", "=".repeat(80));
    println!(
        "Conversation {}: {}:{}",
        conversation.id, conversation.provider, conversation.source_conversation_id
    );
    if let Some(title) = &conversation.title {
        println!("Title: {}", title);
    }
    if let Some(summary) = &conversation.summary {
        println!("Summary: {}", summary);
    }
    println!(
        "Created: {} | Updated: {} | Imported: {}",
        conversation.created_at.as_deref().unwrap_or("?"),
        conversation.updated_at.as_deref().unwrap_or("?"),
        conversation.imported_at,
    );
    println!("{}", "=".repeat(80));

    if messages.is_empty() {
        println!("\nNo messages stored for this conversation.");
        return;
    }

    for msg in messages {
        let model_info = msg
            .model
            .as_deref()
            .map(|m| format!(" | {}", m))
            .unwrap_or_default();
        let parent_info = msg
            .parent_message_id
            .map(|p| format!(" <- #{}", p))
            .unwrap_or_default();

        println!(
            "\n[#{} {}{}{}] ({})",
            msg.position,
            msg.role.to_uppercase(),
            model_info,
            parent_info,
            msg.created_at.as_deref().unwrap_or("?")
        );
        println!("{}", msg.content);
    }
}
