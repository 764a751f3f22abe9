//! Claude export normalizer
//!
//! Flat export: `conversations.json` is an array of
//! `{uuid, name, summary, created_at, updated_at, chat_messages: [...]}` and
//! each turn is `{uuid, sender, text, content: [{type, text}], created_at}`.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use super::{
    conversation_records, parse_role, str_field, ExportBatch, NormalizedConversation,
    NormalizedMessage, Provider,
};

pub(super) fn normalize(export: &Value, source: &Path) -> Result<ExportBatch> {
    let mut batch = ExportBatch::new(Provider::Claude, source);

    for (index, record) in conversation_records(export, source)?.into_iter().enumerate() {
        let Some(uuid) = str_field(record, "uuid") else {
            let location = batch.location(index, None);
            batch.issue(&location, "missing uuid, conversation skipped");
            continue;
        };
        let location = batch.location(index, Some(uuid));

        let mut conversation = NormalizedConversation::new(Provider::Claude, uuid);
        conversation.title = str_field(record, "name").map(String::from);
        conversation.summary = str_field(record, "summary").map(String::from);
        conversation.created_at = batch.timestamp(record.get("created_at"), &location);
        conversation.updated_at = batch.timestamp(record.get("updated_at"), &location);

        let turns = record
            .get("chat_messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for (position, turn) in turns.iter().enumerate() {
            let turn_location = format!("{}, message {}", location, position);

            let Some(sender) = str_field(turn, "sender") else {
                batch.issue(&turn_location, "missing sender, message skipped");
                continue;
            };
            let role = parse_role(sender, &turn_location)?;

            conversation.push(NormalizedMessage {
                source_message_id: str_field(turn, "uuid").map(String::from),
                role,
                model: None,
                content: turn_text(turn),
                position: position as i64,
                parent_position: None,
                created_at: batch.timestamp(turn.get("created_at"), &turn_location),
            });
        }

        batch.finish(conversation);
    }

    Ok(batch)
}

/// Text blocks of `content`, falling back to the plain `text` field
fn turn_text(turn: &Value) -> String {
    let blocks: Vec<&str> = turn
        .get("content")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .filter(|text| !text.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    if blocks.is_empty() {
        turn.get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        blocks.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;
    use crate::provider::Role;
    use serde_json::json;

    fn export() -> Value {
        json!([{
            "uuid": "abc",
            "name": "Rust lifetimes",
            "summary": "",
            "created_at": "2024-03-01T10:00:00.000000Z",
            "updated_at": "2024-03-01T10:05:00.000000Z",
            "chat_messages": [
                {"uuid": "m0", "sender": "human", "text": "what is a lifetime?",
                 "created_at": "2024-03-01T10:00:00Z"},
                {"uuid": "m1", "sender": "assistant", "text": "",
                 "content": [{"type": "text", "text": "A region of code."},
                             {"type": "tool_use", "name": "search"},
                             {"type": "text", "text": "Checked by borrowck."}],
                 "created_at": "2024-03-01T10:01:00Z"},
                {"uuid": "m2", "sender": "human", "text": "   "},
                {"uuid": "m3", "sender": "human", "text": "thanks",
                 "created_at": "not a date"}
            ]
        }])
    }

    #[test]
    fn test_flat_positions_follow_array_order() {
        let batch = normalize(&export(), Path::new("claude.json")).unwrap();
        assert_eq!(batch.conversations.len(), 1);

        let conversation = &batch.conversations[0];
        assert_eq!(conversation.source_conversation_id, "abc");
        assert_eq!(conversation.title.as_deref(), Some("Rust lifetimes"));
        assert_eq!(conversation.summary, None);
        assert_eq!(
            conversation.created_at.as_deref(),
            Some("2024-03-01T10:00:00.000Z")
        );

        let positions: Vec<i64> = conversation.messages.iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![0, 1, 3]);
        assert_eq!(conversation.skipped_empty, 1);
        assert!(conversation.messages.iter().all(|m| m.parent_position.is_none()));

        let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Human, Role::Assistant, Role::Human]);
        assert_eq!(
            conversation.messages[1].content,
            "A region of code.\n\nChecked by borrowck."
        );
    }

    #[test]
    fn test_bad_timestamp_is_a_record_issue() {
        let batch = normalize(&export(), Path::new("claude.json")).unwrap();
        assert_eq!(batch.issues.len(), 1);
        assert!(batch.issues[0].location.contains("message 3"));
        assert_eq!(batch.conversations[0].messages[2].created_at, None);
    }

    #[test]
    fn test_unknown_sender_rejects_file() {
        let export = json!([{
            "uuid": "abc",
            "chat_messages": [{"sender": "narrator", "text": "once upon a time"}]
        }]);
        let err = normalize(&export, Path::new("claude.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_missing_uuid_skips_conversation() {
        let export = json!([{"name": "orphan", "chat_messages": []}, {"uuid": "ok"}]);
        let batch = normalize(&export, Path::new("claude.json")).unwrap();
        assert_eq!(batch.conversations.len(), 1);
        assert_eq!(batch.issues.len(), 1);
    }
}
