//! Provider normalizers
//!
//! Each provider's raw export is mapped onto one uniform record shape:
//! a list of [`NormalizedConversation`]s, each owning its turns in original
//! order. Two export shapes exist:
//!
//! - Flat: a conversation is a JSON array of turns, `position` = array index
//!   (claude)
//! - Tree: a conversation is a node map with parent/children links, walked
//!   depth-first by [`tree::walk`] (chatgpt, deepseek)

mod chatgpt;
mod claude;
mod deepseek;
mod tree;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::ArchiveError;

/// Supported export sources. Adding a provider means adding a variant here
/// and a normalizer module. Parsed from the command line via `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    ChatGpt,
    DeepSeek,
}

/// Structural variant of a provider's export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportShape {
    Flat,
    Tree,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Claude, Provider::ChatGpt, Provider::DeepSeek];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::ChatGpt => "chatgpt",
            Provider::DeepSeek => "deepseek",
        }
    }

    pub fn shape(&self) -> ExportShape {
        match self {
            Provider::Claude => ExportShape::Flat,
            Provider::ChatGpt | Provider::DeepSeek => ExportShape::Tree,
        }
    }

    /// Normalize an already-parsed export document.
    pub fn normalize(&self, export: &Value, source: &Path) -> Result<ExportBatch> {
        let batch = match self {
            Provider::Claude => claude::normalize(export, source)?,
            Provider::ChatGpt => chatgpt::normalize(export, source)?,
            Provider::DeepSeek => deepseek::normalize(export, source)?,
        };
        debug!(
            "{} ({} {:?} export): {} conversations, {} messages, {} empty turns, {} issues",
            source.display(),
            self,
            self.shape(),
            batch.conversations.len(),
            batch.message_count(),
            batch.skipped_empty(),
            batch.issues.len()
        );
        Ok(batch)
    }

    /// Read and normalize one export file.
    pub fn load(&self, path: &Path) -> Result<ExportBatch> {
        let export = load_export(path)?;
        self.normalize(&export, path)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ArchiveError::UnknownProvider(s.to_string()))
    }
}

// ============================================
// ROLES
// ============================================

/// Closed set of message roles stored in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    /// Map a provider's role label onto the closed set.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "human" | "user" => Some(Role::Human),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized roles reject the whole file so export drift surfaces early.
pub(crate) fn parse_role(raw: &str, location: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| {
        ArchiveError::UnknownRole {
            role: raw.to_string(),
            location: location.to_string(),
        }
        .into()
    })
}

// ============================================
// NORMALIZED RECORDS
// ============================================

#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub source_message_id: Option<String>,
    pub role: Role,
    pub model: Option<String>,
    pub content: String,
    pub position: i64,
    /// Position of the nearest emitted ancestor (tree exports only)
    pub parent_position: Option<i64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NormalizedConversation {
    pub provider: Provider,
    pub source_conversation_id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub messages: Vec<NormalizedMessage>,
    /// Turns dropped for empty content; their positions are left as gaps
    pub skipped_empty: usize,
}

impl NormalizedConversation {
    pub fn new(provider: Provider, source_conversation_id: impl Into<String>) -> Self {
        Self {
            provider,
            source_conversation_id: source_conversation_id.into(),
            title: None,
            summary: None,
            created_at: None,
            updated_at: None,
            messages: vec![],
            skipped_empty: 0,
        }
    }

    /// Append a turn, dropping it if its content is blank. Returns whether it was kept.
    pub fn push(&mut self, message: NormalizedMessage) -> bool {
        if message.content.trim().is_empty() {
            self.skipped_empty += 1;
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Fall back to message timestamps when the export lacks conversation-level ones.
    fn fill_timestamps(&mut self) {
        if self.created_at.is_none() {
            self.created_at = self.messages.iter().find_map(|m| m.created_at.clone());
        }
        if self.updated_at.is_none() {
            self.updated_at = self.messages.iter().rev().find_map(|m| m.created_at.clone());
        }
    }
}

/// Recoverable problem with a single record; logged and counted, never fatal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIssue {
    pub location: String,
    pub reason: String,
}

/// Everything normalized out of one export file
#[derive(Debug)]
pub struct ExportBatch {
    pub provider: Provider,
    pub source: PathBuf,
    pub conversations: Vec<NormalizedConversation>,
    pub issues: Vec<RecordIssue>,
}

impl ExportBatch {
    pub(crate) fn new(provider: Provider, source: &Path) -> Self {
        Self {
            provider,
            source: source.to_path_buf(),
            conversations: vec![],
            issues: vec![],
        }
    }

    pub(crate) fn issue(&mut self, location: &str, reason: impl Into<String>) {
        self.issues.push(RecordIssue {
            location: location.to_string(),
            reason: reason.into(),
        });
    }

    /// Normalize a timestamp field, recording an issue (and yielding None) on failure.
    pub(crate) fn timestamp(&mut self, value: Option<&Value>, location: &str) -> Option<String> {
        match normalize_timestamp(value) {
            Ok(ts) => ts,
            Err(reason) => {
                self.issue(location, reason);
                None
            }
        }
    }

    pub(crate) fn finish(&mut self, mut conversation: NormalizedConversation) {
        conversation.fill_timestamps();
        self.conversations.push(conversation);
    }

    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.messages.len()).sum()
    }

    pub fn skipped_empty(&self) -> usize {
        self.conversations.iter().map(|c| c.skipped_empty).sum()
    }

    /// Human-readable prefix for record locations
    pub(crate) fn location(&self, index: usize, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{} conversation {} ({})", self.source.display(), index, id),
            None => format!("{} conversation {}", self.source.display(), index),
        }
    }
}

// ============================================
// SHARED HELPERS
// ============================================

/// Top-level conversation records: an array, or a single conversation object.
pub(crate) fn conversation_records<'a>(export: &'a Value, source: &Path) -> Result<Vec<&'a Value>> {
    match export {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(_) => Ok(vec![export]),
        _ => anyhow::bail!(
            "{}: expected a JSON array of conversations",
            source.display()
        ),
    }
}

/// Non-empty string field
pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Convert any supported timestamp representation to RFC 3339 UTC.
///
/// Numbers are epoch seconds, or epoch milliseconds above 1e11. Strings may
/// be numeric, RFC 3339, or naive `YYYY-MM-DD HH:MM:SS` (taken as UTC).
/// Output always has millisecond precision so lexical order is chronological.
pub fn normalize_timestamp(value: Option<&Value>) -> std::result::Result<Option<String>, String> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(from_epoch)
            .ok_or_else(|| format!("timestamp out of range: {}", n))?,
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            parse_timestamp_str(s).ok_or_else(|| format!("unrecognized timestamp '{}'", s))?
        }
        Some(other) => return Err(format!("unexpected timestamp value {}", other)),
    };
    Ok(Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true)))
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() > 1e11 { value } else { value * 1000.0 };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(n) = s.parse::<f64>() {
        return from_epoch(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn is_zstd(path: &Path) -> bool {
    path.extension().map(|e| e == "zst").unwrap_or(false)
}

/// Whether a path looks like an export file this tool can read
pub fn is_export_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "json" || e == "zst")
        .unwrap_or(false)
}

/// Read an export file as JSON, decompressing `.zst` files first.
pub fn load_export(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let value = if is_zstd(path) {
        let decoder = zstd::Decoder::new(file)
            .with_context(|| format!("Failed to start zstd decoder for {}", path.display()))?;
        serde_json::from_reader(decoder)
    } else {
        serde_json::from_reader(BufReader::new(file))
    };

    value.with_context(|| format!("{} is not a valid JSON export", path.display()))
}
