//! Archive storage with SQLite
//!
//! - One file, WAL journal so an import in one invocation does not block
//!   searches in another
//! - Append-only writes guarded by unique indexes, so re-importing converges
//! - Explicit schema version; a mismatch is fatal and the fix is a rebuild

mod query;
mod schema;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::ValueEnum;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ArchiveError;
use crate::provider::{NormalizedConversation, NormalizedMessage};

pub use query::SearchQuery;
pub use schema::{SCHEMA, SCHEMA_VERSION};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of `Store::create`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyInitialized,
}

pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Create a new archive at `path`, or verify the one already there.
    pub fn create(path: &Path, busy_timeout: Duration) -> Result<(Self, InitOutcome)> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open archive {}", path.display()))?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure(busy_timeout)?;
        let outcome = store.init_schema()?;
        Ok((store, outcome))
    }

    /// Open an existing archive, refusing stores built for another schema version.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(ArchiveError::NotInitialized(path.to_path_buf()).into());
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open archive {}", path.display()))?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure(busy_timeout)?;
        store.check_version()?;
        debug!("opened archive {}", path.display());
        Ok(store)
    }

    /// Fresh, isolated archive that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None };
        store.configure(DEFAULT_BUSY_TIMEOUT)?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn display_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from(":memory:"))
    }

    fn configure(&self, busy_timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(busy_timeout)?;
        let mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("journal_mode = {}", mode);
        self.conn.pragma_update(None, "foreign_keys", true)?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn has_metadata(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn init_schema(&self) -> Result<InitOutcome> {
        if self.has_metadata()? {
            self.check_version()?;
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(SCHEMA).context("Failed to create schema")?;
        tx.execute(
            "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        tx.commit()?;

        info!("created archive schema v{} at {}", SCHEMA_VERSION, self.display_path().display());
        Ok(InitOutcome::Created)
    }

    /// Fail fast unless the store was built by this schema version.
    pub fn check_version(&self) -> Result<()> {
        if !self.has_metadata()? {
            return Err(ArchiveError::NotInitialized(self.display_path()).into());
        }

        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match found {
            Some(version) if version == SCHEMA_VERSION.to_string() => Ok(()),
            other => Err(ArchiveError::SchemaMismatch {
                path: self.display_path(),
                found: other.unwrap_or_else(|| "missing".to_string()),
                expected: SCHEMA_VERSION,
            }
            .into()),
        }
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        let version = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Begin a transaction on the store's connection; dropping it rolls back.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ============================================
    // CONVERSATIONS & MESSAGES
    // ============================================

    /// Insert a conversation unless its (provider, source id) already exists.
    /// Returns the row id and whether a new row was written.
    pub fn insert_conversation(
        &self,
        conversation: &NormalizedConversation,
        imported_at: &str,
    ) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            r#"INSERT INTO conversations
               (provider, source_conversation_id, title, summary, created_at, updated_at, imported_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(provider, source_conversation_id) DO NOTHING"#,
            params![
                conversation.provider.as_str(),
                conversation.source_conversation_id,
                conversation.title,
                conversation.summary,
                conversation.created_at,
                conversation.updated_at,
                imported_at,
            ],
        )? > 0;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM conversations WHERE provider = ?1 AND source_conversation_id = ?2",
            params![
                conversation.provider.as_str(),
                conversation.source_conversation_id
            ],
            |row| row.get(0),
        )?;

        Ok((id, inserted))
    }

    /// Insert a message unless its dedup key already exists. Returns whether a row was written.
    pub fn insert_message(
        &self,
        conversation_id: i64,
        conversation: &NormalizedConversation,
        message: &NormalizedMessage,
        imported_at: &str,
    ) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(
            r#"INSERT INTO messages
               (conversation_id, provider, model, source_conversation_id, source_message_id,
                role, content, position, parent_message_id, created_at, imported_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
               ON CONFLICT(provider, source_conversation_id, position, content) DO NOTHING"#,
        )?;

        let changed = stmt.execute(params![
            conversation_id,
            conversation.provider.as_str(),
            message.model,
            conversation.source_conversation_id,
            message.source_message_id,
            message.role.as_str(),
            message.content,
            message.position,
            message.parent_position,
            message.created_at,
            imported_at,
        ])?;

        Ok(changed > 0)
    }

    // ============================================
    // ACCESS LOG
    // ============================================

    pub fn record_access(
        &self,
        command: &str,
        argument: Option<&str>,
        result_count: usize,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO access_log (command, argument, result_count, accessed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![command, argument, result_count as i64, now()],
        )?;
        Ok(())
    }

    // ============================================
    // PROMPTS
    // ============================================

    /// Add a prompt version. Identical content (by SHA-256) is a no-op that
    /// returns the existing row; otherwise the row links to the latest
    /// version of the same name.
    pub fn add_prompt(&self, name: &str, content: &str) -> Result<(PromptRow, bool)> {
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));

        if let Some(existing) = self.find_prompt_by_hash(&content_hash)? {
            return Ok((existing, false));
        }

        let tx = self.conn.unchecked_transaction()?;
        let previous: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, version FROM prompts WHERE name = ?1 ORDER BY version DESC LIMIT 1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (previous_version_id, version) = match previous {
            Some((id, version)) => (Some(id), version + 1),
            None => (None, 1),
        };

        tx.execute(
            r#"INSERT INTO prompts (name, version, previous_version_id, content, content_hash, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![name, version, previous_version_id, content, content_hash, now()],
        )?;
        tx.commit()?;

        let row = self
            .find_prompt_by_hash(&content_hash)?
            .context("Prompt vanished after insert")?;
        Ok((row, true))
    }
}

/// Current time in the archive's timestamp format
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================
// ROW TYPES
// ============================================

/// `list` ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListSort {
    #[default]
    Newest,
    Oldest,
    Messages,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationRow {
    pub id: i64,
    pub provider: String,
    pub source_conversation_id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub imported_at: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub provider: String,
    pub model: Option<String>,
    pub source_message_id: Option<String>,
    pub role: String,
    pub content: String,
    pub position: i64,
    pub parent_message_id: Option<i64>,
    pub prompt_id: Option<i64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub message_id: i64,
    pub conversation_id: i64,
    pub provider: String,
    pub source_conversation_id: String,
    pub title: Option<String>,
    pub role: String,
    pub position: i64,
    pub created_at: Option<String>,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptRow {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub previous_version_id: Option<i64>,
    pub content: String,
    pub content_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub provider: String,
    pub conversations: i64,
    pub messages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub schema_version: Option<String>,
    pub conversations: i64,
    pub messages: i64,
    pub prompts: i64,
    pub searches_logged: i64,
    pub providers: Vec<ProviderStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, Role};

    pub(crate) fn conversation(provider: Provider, id: &str) -> NormalizedConversation {
        let mut conversation = NormalizedConversation::new(provider, id);
        conversation.created_at = Some("2024-01-01T00:00:00.000Z".to_string());
        conversation
    }

    pub(crate) fn message(position: i64, role: Role, content: &str) -> NormalizedMessage {
        NormalizedMessage {
            source_message_id: None,
            role,
            model: None,
            content: content.to_string(),
            position,
            parent_position: None,
            created_at: None,
        }
    }

    fn count(store: &Store, table: &str) -> i64 {
        store
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_in_memory_store_has_current_version() {
        let store = Store::open_in_memory().unwrap();
        store.check_version().unwrap();
        assert_eq!(store.schema_version().unwrap(), Some(SCHEMA_VERSION.to_string()));
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute("UPDATE metadata SET value = '999' WHERE key = 'schema_version'", [])
            .unwrap();
        let err = store.check_version().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/archive.db");

        let err = Store::open(&path, DEFAULT_BUSY_TIMEOUT).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::NotInitialized(_))
        ));

        let (store, outcome) = Store::create(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(outcome, InitOutcome::Created);
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        drop(store);

        let (_, outcome) = Store::create(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(outcome, InitOutcome::AlreadyInitialized);
        Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    }

    #[test]
    fn test_empty_file_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.db");
        std::fs::write(&path, b"").unwrap();
        let err = Store::open(&path, DEFAULT_BUSY_TIMEOUT).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_conversation_insert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let conv = conversation(Provider::Claude, "abc");

        let (first_id, inserted) = store.insert_conversation(&conv, &now()).unwrap();
        assert!(inserted);
        let (second_id, inserted) = store.insert_conversation(&conv, &now()).unwrap();
        assert!(!inserted);
        assert_eq!(first_id, second_id);

        // Same source id under another provider is a different conversation
        let other = conversation(Provider::ChatGpt, "abc");
        let (other_id, inserted) = store.insert_conversation(&other, &now()).unwrap();
        assert!(inserted);
        assert_ne!(other_id, first_id);
        assert_eq!(count(&store, "conversations"), 2);
    }

    #[test]
    fn test_message_dedup_key() {
        let store = Store::open_in_memory().unwrap();
        let conv = conversation(Provider::Claude, "abc");
        let (id, _) = store.insert_conversation(&conv, &now()).unwrap();

        let hello = message(0, Role::Human, "hello");
        assert!(store.insert_message(id, &conv, &hello, &now()).unwrap());
        assert!(!store.insert_message(id, &conv, &hello, &now()).unwrap());

        // Same content at another position is a distinct message
        assert!(store
            .insert_message(id, &conv, &message(1, Role::Human, "hello"), &now())
            .unwrap());
        assert_eq!(count(&store, "messages"), 2);
    }

    #[test]
    fn test_fts_follows_inserts_and_deletes() {
        let store = Store::open_in_memory().unwrap();
        let conv = conversation(Provider::Claude, "abc");
        let (id, _) = store.insert_conversation(&conv, &now()).unwrap();
        store
            .insert_message(id, &conv, &message(0, Role::Human, "sqlite wal mode"), &now())
            .unwrap();

        let hits = |store: &Store| -> i64 {
            store
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'sqlite'",
                    [],
                    |row| row.get(0),
                )
                .unwrap()
        };
        assert_eq!(hits(&store), 1);

        store
            .conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])
            .unwrap();
        assert_eq!(count(&store, "messages"), 0);
        assert_eq!(hits(&store), 0);
    }

    #[test]
    fn test_transaction_rollback_discards_writes() {
        let store = Store::open_in_memory().unwrap();
        {
            let _tx = store.begin().unwrap();
            store
                .insert_conversation(&conversation(Provider::Claude, "abc"), &now())
                .unwrap();
        }
        assert_eq!(count(&store, "conversations"), 0);
    }

    #[test]
    fn test_prompt_versions_and_hash_dedup() {
        let store = Store::open_in_memory().unwrap();

        let (v1, created) = store.add_prompt("reviewer", "You review Rust code.").unwrap();
        assert!(created);
        assert_eq!(v1.version, 1);
        assert_eq!(v1.previous_version_id, None);
        assert_eq!(v1.content_hash.len(), 64);

        let (again, created) = store.add_prompt("reviewer", "You review Rust code.").unwrap();
        assert!(!created);
        assert_eq!(again.id, v1.id);

        let (v2, created) = store
            .add_prompt("reviewer", "You review Rust code tersely.")
            .unwrap();
        assert!(created);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.previous_version_id, Some(v1.id));
    }

    #[test]
    fn test_access_log() {
        let store = Store::open_in_memory().unwrap();
        store.record_access("search", Some("sqlite"), 3).unwrap();
        store.record_access("list", None, 0).unwrap();
        assert_eq!(count(&store, "access_log"), 2);
    }
}
