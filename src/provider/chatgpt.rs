//! ChatGPT export normalizer
//!
//! Tree export: `conversations.json` is an array of
//! `{id, title, create_time, update_time, mapping}` where `mapping` holds
//! `{node_id: {id, parent, children, message}}` and
//! `message = {author: {role}, content: {parts | text | result}, create_time,
//! metadata: {model_slug}}`. Timestamps are epoch seconds (floats).

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use super::tree;
use super::{
    conversation_records, parse_role, str_field, ExportBatch, NormalizedConversation,
    NormalizedMessage, Provider,
};

pub(super) fn normalize(export: &Value, source: &Path) -> Result<ExportBatch> {
    let mut batch = ExportBatch::new(Provider::ChatGpt, source);

    for (index, record) in conversation_records(export, source)?.into_iter().enumerate() {
        let Some(id) = str_field(record, "id").or_else(|| str_field(record, "conversation_id"))
        else {
            let location = batch.location(index, None);
            batch.issue(&location, "missing id, conversation skipped");
            continue;
        };
        let location = batch.location(index, Some(id));

        let Some(mapping) = record.get("mapping").and_then(Value::as_object) else {
            batch.issue(&location, "missing mapping, conversation skipped");
            continue;
        };

        let mut conversation = NormalizedConversation::new(Provider::ChatGpt, id);
        conversation.title = str_field(record, "title").map(String::from);
        conversation.created_at = batch.timestamp(record.get("create_time"), &location);
        conversation.updated_at = batch.timestamp(record.get("update_time"), &location);

        tree::walk(mapping, |visit| {
            let Some(message) = visit.node.get("message").filter(|m| m.is_object()) else {
                return Ok(false);
            };
            let node_location = format!("{}, node {}", location, visit.node_id);

            let Some(raw_role) = message.pointer("/author/role").and_then(Value::as_str) else {
                batch.issue(&node_location, "missing author.role, message skipped");
                return Ok(false);
            };
            let role = parse_role(raw_role, &node_location)?;

            Ok(conversation.push(NormalizedMessage {
                source_message_id: Some(visit.node_id.to_string()),
                role,
                model: message
                    .pointer("/metadata/model_slug")
                    .and_then(Value::as_str)
                    .map(String::from),
                content: message_text(message.get("content")),
                position: visit.position,
                parent_position: visit.parent_position,
                created_at: batch.timestamp(message.get("create_time"), &node_location),
            }))
        })?;

        batch.finish(conversation);
    }

    Ok(batch)
}

/// String parts joined by newline; object parts contribute their `text`.
fn message_text(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return String::new();
    };

    if let Some(parts) = content.get("parts").and_then(Value::as_array) {
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => part.get("text").and_then(Value::as_str),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect();
        return texts.join("\n");
    }

    content
        .get("text")
        .or_else(|| content.get("result"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;
    use serde_json::json;
    use std::collections::HashMap;

    fn export() -> Value {
        json!([{
            "id": "conv-1",
            "title": "SQLite tuning",
            "create_time": 1700000000.5,
            "update_time": 1700000600.0,
            "mapping": {
                "client-root": {"id": "client-root", "parent": null, "children": ["sys"], "message": null},
                "sys": {"id": "sys", "parent": "client-root", "children": ["u1"],
                        "message": {"author": {"role": "system"},
                                    "content": {"content_type": "text", "parts": [""]}}},
                "u1": {"id": "u1", "parent": "sys", "children": ["a1", "a2"],
                       "message": {"author": {"role": "user"}, "create_time": 1700000001,
                                   "content": {"content_type": "text", "parts": ["how do I enable WAL?"]}}},
                "a1": {"id": "a1", "parent": "u1", "children": [],
                       "message": {"author": {"role": "assistant"}, "create_time": 1700000002,
                                   "metadata": {"model_slug": "gpt-4o"},
                                   "content": {"content_type": "text", "parts": ["PRAGMA journal_mode=WAL;"]}}},
                "a2": {"id": "a2", "parent": "u1", "children": [],
                       "message": {"author": {"role": "tool"},
                                   "content": {"content_type": "execution_output", "text": "wal"}}}
            }
        }])
    }

    #[test]
    fn test_tree_export_keeps_parent_links() {
        let batch = normalize(&export(), Path::new("chatgpt.json")).unwrap();
        assert!(batch.issues.is_empty());
        let conversation = &batch.conversations[0];
        assert_eq!(conversation.source_conversation_id, "conv-1");
        assert_eq!(conversation.title.as_deref(), Some("SQLite tuning"));
        assert_eq!(
            conversation.created_at.as_deref(),
            Some("2023-11-14T22:13:20.500Z")
        );

        // root (0) and empty system node (1) consume positions but are not stored
        let by_node: HashMap<&str, (i64, Option<i64>, Role)> = conversation
            .messages
            .iter()
            .map(|m| {
                (
                    m.source_message_id.as_deref().unwrap(),
                    (m.position, m.parent_position, m.role),
                )
            })
            .collect();
        assert_eq!(by_node.len(), 3);
        assert_eq!(by_node["u1"], (2, None, Role::Human));
        assert_eq!(by_node["a1"], (3, Some(2), Role::Assistant));
        assert_eq!(by_node["a2"], (4, Some(2), Role::Tool));
        assert_eq!(conversation.skipped_empty, 1);

        let a1 = conversation.messages.iter().find(|m| m.position == 3).unwrap();
        assert_eq!(a1.model.as_deref(), Some("gpt-4o"));
        assert_eq!(a1.content, "PRAGMA journal_mode=WAL;");
    }

    #[test]
    fn test_parent_references_point_backwards() {
        let batch = normalize(&export(), Path::new("chatgpt.json")).unwrap();
        let conversation = &batch.conversations[0];
        for message in &conversation.messages {
            if let Some(parent) = message.parent_position {
                assert!(parent < message.position);
                assert!(conversation.messages.iter().any(|m| m.position == parent));
            }
        }
    }

    #[test]
    fn test_unknown_author_role_rejects_file() {
        let export = json!([{
            "id": "conv-2",
            "mapping": {
                "n": {"parent": null, "children": [],
                      "message": {"author": {"role": "critic"}, "content": {"parts": ["hm"]}}}
            }
        }]);
        assert!(normalize(&export, Path::new("chatgpt.json")).is_err());
    }

    #[test]
    fn test_message_text_variants() {
        assert_eq!(
            message_text(Some(&json!({"parts": ["a", {"text": "b"}, {"asset": 1}, ""]}))),
            "a\nb"
        );
        assert_eq!(message_text(Some(&json!({"result": "done"}))), "done");
        assert_eq!(message_text(None), "");
    }
}
