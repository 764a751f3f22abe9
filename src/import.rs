//! Import pipeline
//!
//! Each export file is normalized first, then written inside one
//! transaction: conversations before the messages that reference them. All
//! writes are no-ops on conflict, so re-running an import from the start
//! always converges to the same archive.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::provider::{is_export_file, ExportBatch, Provider};
use crate::store::{now, Store};

/// Row counts for one file or a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub conversations_seen: usize,
    pub conversations_added: usize,
    pub messages_seen: usize,
    pub messages_added: usize,
    pub skipped_empty: usize,
    pub issues: usize,
}

impl ImportStats {
    fn absorb(&mut self, other: &ImportStats) {
        self.files += other.files;
        self.conversations_seen += other.conversations_seen;
        self.conversations_added += other.conversations_added;
        self.messages_seen += other.messages_seen;
        self.messages_added += other.messages_added;
        self.skipped_empty += other.skipped_empty;
        self.issues += other.issues;
    }
}

/// A file that could not be read or normalized; the rest of the run continues.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub totals: ImportStats,
    pub imported: Vec<(PathBuf, ImportStats)>,
    pub failures: Vec<FileFailure>,
}

/// Persist one normalized export in a single transaction.
pub fn import_batch(store: &Store, batch: &ExportBatch) -> Result<ImportStats> {
    let imported_at = now();
    let mut stats = ImportStats {
        files: 1,
        issues: batch.issues.len(),
        ..Default::default()
    };

    let tx = store.begin()?;
    for conversation in &batch.conversations {
        let (conversation_id, added) = store.insert_conversation(conversation, &imported_at)?;
        stats.conversations_seen += 1;
        if added {
            stats.conversations_added += 1;
        }

        for message in &conversation.messages {
            stats.messages_seen += 1;
            if store.insert_message(conversation_id, conversation, message, &imported_at)? {
                stats.messages_added += 1;
            }
        }
        stats.skipped_empty += conversation.skipped_empty;
    }
    tx.commit()?;

    for issue in &batch.issues {
        warn!("{}: {}", issue.location, issue.reason);
    }

    Ok(stats)
}

/// Expand an import argument: a file, a directory (walked recursively), or a glob pattern.
pub fn collect_export_files(path: &str) -> Result<Vec<PathBuf>> {
    let expanded = shellexpand::tilde(path).to_string();
    let candidate = Path::new(&expanded);

    if candidate.is_file() {
        return Ok(vec![candidate.to_path_buf()]);
    }

    let mut files = vec![];
    if candidate.is_dir() {
        for entry in WalkDir::new(candidate).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", expanded))?;
            if entry.file_type().is_file() && is_export_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        if files.is_empty() {
            warn!("no .json or .zst files under {}", expanded);
        }
    } else if expanded.contains(&['*', '?', '['][..]) {
        for entry in glob::glob(&expanded).with_context(|| format!("Bad pattern {}", expanded))? {
            let entry = entry?;
            if entry.is_file() {
                files.push(entry);
            }
        }
        if files.is_empty() {
            anyhow::bail!("no files match {}", expanded);
        }
    } else {
        anyhow::bail!("cannot read {}: no such file or directory", expanded);
    }

    files.sort();
    Ok(files)
}

/// Import every export file `path` expands to.
///
/// Files that cannot be read or normalized are recorded in the report and
/// skipped. Store errors abort the run; the failing file's transaction is
/// rolled back.
pub fn import_path(store: &Store, path: &str, provider: Provider) -> Result<ImportReport> {
    let files = collect_export_files(path)?;
    let mut report = ImportReport::default();

    for file in files {
        let batch = match provider.load(&file) {
            Ok(batch) => batch,
            Err(error) => {
                warn!("skipping {}: {:#}", file.display(), error);
                report.failures.push(FileFailure { path: file, error });
                continue;
            }
        };

        let stats = import_batch(store, &batch)
            .with_context(|| format!("Failed to import {}", file.display()))?;
        info!(
            "{}: +{} conversations, +{} messages",
            file.display(),
            stats.conversations_added,
            stats.messages_added
        );
        report.totals.absorb(&stats);
        report.imported.push((file, stats));
    }

    Ok(report)
}
