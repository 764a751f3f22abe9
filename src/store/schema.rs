//! SQLite schema definition
//!
//! The archive is a rebuildable cache: rows are only ever appended, so the
//! whole file can be deleted and reconstructed from the raw exports. There
//! are no migrations; a version mismatch means "rebuild".

/// Bumped whenever the DDL below changes shape.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- ============================================
-- METADATA
-- ============================================

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- ============================================
-- CONVERSATIONS
-- ============================================

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY,
    provider TEXT NOT NULL,                -- 'claude', 'chatgpt', 'deepseek'
    source_conversation_id TEXT NOT NULL,  -- Provider-native id
    title TEXT,
    summary TEXT,
    created_at TEXT,                       -- RFC 3339, UTC, millisecond precision
    updated_at TEXT,
    imported_at TEXT NOT NULL,
    UNIQUE(provider, source_conversation_id)
);

-- ============================================
-- PROMPTS
-- ============================================

-- Managed prompt catalog; never written by the importer
CREATE TABLE IF NOT EXISTS prompts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    previous_version_id INTEGER,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL UNIQUE,     -- hex SHA-256 of content
    created_at TEXT NOT NULL,
    FOREIGN KEY(previous_version_id) REFERENCES prompts(id)
);

-- ============================================
-- MESSAGES
-- ============================================

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    conversation_id INTEGER NOT NULL,
    provider TEXT NOT NULL,                -- Denormalized from conversations
    model TEXT,
    source_conversation_id TEXT NOT NULL,  -- Denormalized from conversations
    source_message_id TEXT,                -- Provider node/turn id
    role TEXT NOT NULL CHECK (role IN ('human', 'assistant', 'system', 'tool')),
    content TEXT NOT NULL,
    position INTEGER NOT NULL,             -- Order-preserving, not dense
    parent_message_id INTEGER,             -- Position of the parent message (tree exports)
    prompt_id INTEGER,
    created_at TEXT,
    imported_at TEXT NOT NULL,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(prompt_id) REFERENCES prompts(id) ON DELETE SET NULL
);

-- ============================================
-- ACCESS LOG
-- ============================================

CREATE TABLE IF NOT EXISTS access_log (
    id INTEGER PRIMARY KEY,
    command TEXT NOT NULL,                 -- 'search', 'list', 'show'
    argument TEXT,
    result_count INTEGER,
    accessed_at TEXT NOT NULL
);

-- ============================================
-- FULL-TEXT SEARCH
-- ============================================

CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content,
    content=messages,
    content_rowid=id,
    tokenize = 'porter unicode61'
);

CREATE VIRTUAL TABLE IF NOT EXISTS prompts_fts USING fts5(
    name,
    content,
    content=prompts,
    content_rowid=id,
    tokenize = 'porter unicode61'
);

-- Content is immutable once imported, so there is no update trigger
CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS prompts_ai AFTER INSERT ON prompts BEGIN
    INSERT INTO prompts_fts(rowid, name, content) VALUES (NEW.id, NEW.name, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS prompts_ad AFTER DELETE ON prompts BEGIN
    INSERT INTO prompts_fts(prompts_fts, rowid, name, content)
    VALUES ('delete', OLD.id, OLD.name, OLD.content);
END;

-- ============================================
-- INDEXES
-- ============================================

-- Dedup key: re-importing the same turn is a no-op
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedup
    ON messages(provider, source_conversation_id, position, content);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, position);
CREATE INDEX IF NOT EXISTS idx_messages_role ON messages(role);
CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_conversations_source ON conversations(source_conversation_id);
CREATE INDEX IF NOT EXISTS idx_prompts_name ON prompts(name, version DESC);
"#;
