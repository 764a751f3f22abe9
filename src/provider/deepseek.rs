//! DeepSeek export normalizer
//!
//! Tree export with the same node-map layout as ChatGPT, but messages carry
//! typed fragments instead of an author role:
//! `message = {model, inserted_at, fragments: [{type, content}]}`.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use crate::error::ArchiveError;

use super::tree;
use super::{
    conversation_records, str_field, ExportBatch, NormalizedConversation,
    NormalizedMessage, Provider, Role,
};

pub(super) fn normalize(export: &Value, source: &Path) -> Result<ExportBatch> {
    let mut batch = ExportBatch::new(Provider::DeepSeek, source);

    for (index, record) in conversation_records(export, source)?.into_iter().enumerate() {
        let Some(id) = str_field(record, "id") else {
            let location = batch.location(index, None);
            batch.issue(&location, "missing id, conversation skipped");
            continue;
        };
        let location = batch.location(index, Some(id));

        let Some(mapping) = record.get("mapping").and_then(Value::as_object) else {
            batch.issue(&location, "missing mapping, conversation skipped");
            continue;
        };

        let mut conversation = NormalizedConversation::new(Provider::DeepSeek, id);
        conversation.title = str_field(record, "title").map(String::from);
        conversation.created_at = batch.timestamp(record.get("inserted_at"), &location);
        conversation.updated_at = batch.timestamp(record.get("updated_at"), &location);

        tree::walk(mapping, |visit| {
            let Some(message) = visit.node.get("message").filter(|m| m.is_object()) else {
                return Ok(false);
            };
            let node_location = format!("{}, node {}", location, visit.node_id);

            let fragments = message
                .get("fragments")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if fragments.is_empty() {
                batch.issue(&node_location, "no fragments, message skipped");
                return Ok(false);
            }

            let (role, content) = read_fragments(fragments, &node_location)?;

            Ok(conversation.push(NormalizedMessage {
                source_message_id: Some(visit.node_id.to_string()),
                role,
                model: str_field(message, "model").map(String::from),
                content,
                position: visit.position,
                parent_position: visit.parent_position,
                created_at: batch.timestamp(message.get("inserted_at"), &node_location),
            }))
        })?;

        batch.finish(conversation);
    }

    Ok(batch)
}

/// Derive the role and archived text from a message's fragments.
///
/// REQUEST is the human turn and RESPONSE the answer; THINK and SEARCH belong
/// to the assistant but their content is not archived.
fn read_fragments(fragments: &[Value], location: &str) -> Result<(Role, String)> {
    let mut role = Role::Assistant;
    let mut texts: Vec<&str> = vec![];

    for fragment in fragments {
        let kind = fragment.get("type").and_then(Value::as_str).unwrap_or_default();
        let content = fragment.get("content").and_then(Value::as_str);
        match kind {
            "REQUEST" => {
                role = Role::Human;
                texts.extend(content);
            }
            "RESPONSE" => texts.extend(content),
            "THINK" | "SEARCH" => {}
            other => {
                return Err(ArchiveError::UnknownRole {
                    role: other.to_string(),
                    location: location.to_string(),
                }
                .into())
            }
        }
    }

    Ok((role, texts.join("\n\n")))
}
