//! User-facing error categories
//!
//! Everything else travels as `anyhow::Error`; these are the cases the CLI
//! reports as plain one-line messages.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no archive at {0}; run `llm-archive init` first")]
    NotInitialized(PathBuf),

    #[error(
        "archive {path} has schema version {found}, this build expects {expected}; \
         delete it and rebuild with `llm-archive init` + `llm-archive import`"
    )]
    SchemaMismatch {
        path: PathBuf,
        found: String,
        expected: i64,
    },

    #[error("no conversation matches '{0}'")]
    NotFound(String),

    #[error("'{query}' is ambiguous, it matches {count} conversations ({candidates}); be more specific")]
    Ambiguous {
        query: String,
        count: usize,
        candidates: String,
    },

    #[error("unrecognized role '{role}' at {location}")]
    UnknownRole { role: String, location: String },

    #[error("unknown provider '{0}' (expected one of: claude, chatgpt, deepseek)")]
    UnknownProvider(String),

    #[error("invalid search query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },
}
