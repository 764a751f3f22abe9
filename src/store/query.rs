//! Read side: search, list, show resolution, stats and prompts

use anyhow::Result;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use super::{
    ConversationRow, ListSort, MessageRow, PromptRow, ProviderStats, SearchHit, Store, StoreStats,
};
use crate::error::ArchiveError;
use crate::provider::{Provider, Role};

const CONVERSATION_SELECT: &str = r#"SELECT c.id, c.provider, c.source_conversation_id, c.title,
              c.summary, c.created_at, c.updated_at, c.imported_at,
              (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
       FROM conversations c"#;

const PROMPT_SELECT: &str = r#"SELECT p.id, p.name, p.version, p.previous_version_id, p.content,
              p.content_hash, p.created_at
       FROM prompts p"#;

/// How many candidates an ambiguity error lists
const AMBIGUOUS_PREVIEW: usize = 5;

/// Parameters of a full-text message search
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// FTS5 query syntax: terms, "phrases", OR, NOT, prefix*, NEAR(...)
    pub text: String,
    pub provider: Option<Provider>,
    pub role: Option<Role>,
    pub limit: usize,
}

impl ListSort {
    fn order_by(&self) -> &'static str {
        match self {
            ListSort::Newest => "c.created_at IS NULL, c.created_at DESC, c.id DESC",
            ListSort::Oldest => "c.created_at IS NULL, c.created_at ASC, c.id ASC",
            ListSort::Messages => "message_count DESC, c.id DESC",
        }
    }
}

fn map_conversation(row: &Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        provider: row.get(1)?,
        source_conversation_id: row.get(2)?,
        title: row.get(3)?,
        summary: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        imported_at: row.get(7)?,
        message_count: row.get(8)?,
    })
}

fn map_prompt(row: &Row) -> rusqlite::Result<PromptRow> {
    Ok(PromptRow {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        previous_version_id: row.get(3)?,
        content: row.get(4)?,
        content_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Turn FTS5 parse failures into a user-facing error; anything else stays an engine error.
///
/// Only called once the statement is prepared, so a generic SQLITE_ERROR here
/// comes from parsing the MATCH expression.
fn search_error(query: &str, err: rusqlite::Error) -> anyhow::Error {
    match &err {
        rusqlite::Error::SqliteFailure(failure, Some(message))
            if failure.code == ErrorCode::Unknown =>
        {
            ArchiveError::InvalidQuery {
                query: query.to_string(),
                reason: message.clone(),
            }
            .into()
        }
        _ => anyhow::Error::new(err).context("Full-text search failed"),
    }
}

impl Store {
    // ============================================
    // SEARCH
    // ============================================

    /// Full-text search over message content, best match first, then newest.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT m.id, c.id, c.provider, c.source_conversation_id, c.title, m.role,
                      m.position, COALESCE(m.created_at, c.created_at),
                      snippet(messages_fts, 0, '[', ']', '...', 16),
                      bm25(messages_fts) AS score
               FROM messages_fts
               JOIN messages m ON m.id = messages_fts.rowid
               JOIN conversations c ON c.id = m.conversation_id
               WHERE messages_fts MATCH ?1
                 AND (?2 IS NULL OR m.provider = ?2)
                 AND (?3 IS NULL OR m.role = ?3)
               ORDER BY score ASC, COALESCE(m.created_at, c.created_at) DESC, m.id DESC
               LIMIT ?4"#,
        )?;

        let rows = stmt
            .query_map(
                params![
                    query.text,
                    query.provider.map(|p| p.as_str()),
                    query.role.map(|r| r.as_str()),
                    query.limit as i64,
                ],
                |row| {
                    Ok(SearchHit {
                        message_id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        provider: row.get(2)?,
                        source_conversation_id: row.get(3)?,
                        title: row.get(4)?,
                        role: row.get(5)?,
                        position: row.get(6)?,
                        created_at: row.get(7)?,
                        snippet: row.get(8)?,
                        score: row.get(9)?,
                    })
                },
            )
            .map_err(|e| search_error(&query.text, e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| search_error(&query.text, e))
    }

    // ============================================
    // CONVERSATIONS
    // ============================================

    pub fn list_conversations(
        &self,
        sort: ListSort,
        provider: Option<Provider>,
        limit: usize,
    ) -> Result<Vec<ConversationRow>> {
        let sql = format!(
            "{} WHERE (?1 IS NULL OR c.provider = ?1) ORDER BY {} LIMIT ?2",
            CONVERSATION_SELECT,
            sort.order_by()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![provider.map(|p| p.as_str()), limit as i64],
            map_conversation,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE c.id = ?1", CONVERSATION_SELECT),
                params![id],
                map_conversation,
            )
            .optional()?;
        Ok(row)
    }

    /// Resolve a numeric id or a prefix of a provider-native id to exactly one conversation.
    ///
    /// All-digit input is tried as a row id first. An exact source-id match
    /// wins over longer ids sharing the prefix.
    pub fn resolve_conversation(&self, identifier: &str) -> Result<ConversationRow> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ArchiveError::NotFound(identifier.to_string()).into());
        }

        if identifier.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = identifier.parse::<i64>() {
                if let Some(row) = self.get_conversation(id)? {
                    return Ok(row);
                }
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE substr(c.source_conversation_id, 1, length(?1)) = ?1 ORDER BY c.id",
            CONVERSATION_SELECT
        ))?;
        let mut matches = stmt
            .query_map(params![identifier], map_conversation)?
            .collect::<Result<Vec<_>, _>>()?;

        let exact: Vec<usize> = matches
            .iter()
            .enumerate()
            .filter(|(_, c)| c.source_conversation_id == identifier)
            .map(|(i, _)| i)
            .collect();

        if exact.len() == 1 {
            return Ok(matches.swap_remove(exact[0]));
        }

        match matches.len() {
            0 => Err(ArchiveError::NotFound(identifier.to_string()).into()),
            1 => Ok(matches.remove(0)),
            count => {
                let mut candidates: Vec<String> = matches
                    .iter()
                    .take(AMBIGUOUS_PREVIEW)
                    .map(|c| format!("{}:{}", c.provider, c.source_conversation_id))
                    .collect();
                if count > AMBIGUOUS_PREVIEW {
                    candidates.push("...".to_string());
                }
                Err(ArchiveError::Ambiguous {
                    query: identifier.to_string(),
                    count,
                    candidates: candidates.join(", "),
                }
                .into())
            }
        }
    }

    /// All messages of a conversation in original order
    pub fn get_messages(&self, conversation_id: i64) -> Result<Vec<MessageRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, conversation_id, provider, model, source_message_id, role, content,
                      position, parent_message_id, prompt_id, created_at
               FROM messages
               WHERE conversation_id = ?1
               ORDER BY position, id"#,
        )?;

        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                provider: row.get(2)?,
                model: row.get(3)?,
                source_message_id: row.get(4)?,
                role: row.get(5)?,
                content: row.get(6)?,
                position: row.get(7)?,
                parent_message_id: row.get(8)?,
                prompt_id: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // STATS
    // ============================================

    pub fn stats(&self) -> Result<StoreStats> {
        let count =
            |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |row| row.get(0))?) };

        let mut stmt = self.conn.prepare(
            r#"SELECT c.provider, COUNT(DISTINCT c.id), COUNT(m.id)
               FROM conversations c
               LEFT JOIN messages m ON m.conversation_id = c.id
               GROUP BY c.provider
               ORDER BY c.provider"#,
        )?;
        let providers = stmt
            .query_map([], |row| {
                Ok(ProviderStats {
                    provider: row.get(0)?,
                    conversations: row.get(1)?,
                    messages: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            schema_version: self.schema_version()?,
            conversations: count("SELECT COUNT(*) FROM conversations")?,
            messages: count("SELECT COUNT(*) FROM messages")?,
            prompts: count("SELECT COUNT(*) FROM prompts")?,
            searches_logged: count("SELECT COUNT(*) FROM access_log WHERE command = 'search'")?,
            providers,
        })
    }

    // ============================================
    // PROMPTS
    // ============================================

    pub(super) fn find_prompt_by_hash(&self, content_hash: &str) -> Result<Option<PromptRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE p.content_hash = ?1", PROMPT_SELECT),
                params![content_hash],
                map_prompt,
            )
            .optional()?;
        Ok(row)
    }

    /// Latest version of every prompt name
    pub fn list_prompts(&self) -> Result<Vec<PromptRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE p.version = (SELECT MAX(q.version) FROM prompts q WHERE q.name = p.name)
             ORDER BY p.name",
            PROMPT_SELECT
        ))?;
        let rows = stmt.query_map([], map_prompt)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Full-text search over prompt names and content (all versions)
    pub fn search_prompts(&self, text: &str, limit: usize) -> Result<Vec<PromptRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} JOIN prompts_fts ON prompts_fts.rowid = p.id
             WHERE prompts_fts MATCH ?1
             ORDER BY bm25(prompts_fts), p.version DESC
             LIMIT ?2",
            PROMPT_SELECT
        ))?;
        let rows = stmt
            .query_map(params![text, limit as i64], map_prompt)
            .map_err(|e| search_error(text, e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| search_error(text, e))
    }
}
