//! Command implementations, one module per subcommand

pub mod import;
pub mod init;
pub mod list;
pub mod prompt;
pub mod search;
pub mod show;
pub mod stats;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::store::Store;

/// What a successful command reports back to the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// A search matched nothing (exit status 1, like grep)
    NoResults,
}

impl Outcome {
    pub fn from_hits(hits: usize) -> Self {
        if hits == 0 {
            Outcome::NoResults
        } else {
            Outcome::Done
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Done => 0,
            Outcome::NoResults => 1,
        }
    }
}

/// Append to the access log after a read has printed its results.
///
/// Best-effort: an import in another process may hold the write lock, and
/// reads must not fail because of it.
pub(crate) fn log_access(
    store: &Store,
    command: &str,
    argument: Option<&str>,
    result_count: usize,
) {
    if let Err(err) = store.record_access(command, argument, result_count) {
        warn!("access log not updated: {:#}", err);
    }
}

/// First line of `text`, cut to `max` characters with a trailing "..."
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// `2024-05-01T12:00:00.000Z` -> `2024-05-01 12:00`
pub(crate) fn short_time(ts: Option<&str>) -> String {
    let Some(ts) = ts else {
        return "-".to_string();
    };
    match (ts.get(..10), ts.get(11..16)) {
        (Some(date), Some(time)) => format!("{} {}", date, time),
        _ => ts.to_string(),
    }
}

/// One JSON object per line
pub(crate) fn print_json_lines<T: Serialize>(rows: &[T]) -> Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}
