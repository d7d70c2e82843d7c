//! Resumable progress for `harvest collect`.
//!
//! A [`Checkpoint`] records which accounts are done, which one is in flight
//! and at what offset, and which ones stopped early because the remote
//! refused or failed a page. [`CheckpointStore`] persists it as a JSON file
//! bound to one run; [`discover_latest`] is an opt-in helper that finds the
//! newest checkpoint in a directory.
//!
//! Each account is in exactly one state at any time:
//!
//! ```text
//! Pending ──begin──▶ InProgress ──complete──▶ Completed
//!    ▲                   │
//!    │                   └──mark_partial──▶ Partial(offset) ──begin──▶ InProgress
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filename glob for checkpoint files.
pub const CHECKPOINT_PATTERN: &str = "collection_checkpoint_*.json";

/// Where an account stands according to a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Pending,
    InProgress { offset: u64 },
    Partial { offset: u64 },
    Completed,
}

impl AccountStatus {
    /// Offset to start fetching from, or `None` if there is nothing left.
    pub fn resume_offset(&self) -> Option<u64> {
        match self {
            AccountStatus::Pending => Some(0),
            AccountStatus::InProgress { offset } | AccountStatus::Partial { offset } => {
                Some(*offset)
            }
            AccountStatus::Completed => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Output table, relative to the checkpoint's directory.
    pub output_file: String,
    #[serde(default)]
    pub completed_users: Vec<String>,
    /// Accounts whose fetch stopped on a rejected or failed page, keyed to
    /// the offset of that page.
    #[serde(default)]
    pub partial_users: BTreeMap<String, u64>,
    #[serde(default)]
    pub current_user: Option<String>,
    #[serde(default)]
    pub current_offset: u64,
    #[serde(default)]
    pub total_processed: u64,
    #[serde(default)]
    pub total_kept: u64,
    #[serde(default)]
    pub total_filtered: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(output_file: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            output_file: output_file.into(),
            completed_users: Vec::new(),
            partial_users: BTreeMap::new(),
            current_user: None,
            current_offset: 0,
            total_processed: 0,
            total_kept: 0,
            total_filtered: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self, handle: &str) -> AccountStatus {
        if self.completed_users.iter().any(|h| h == handle) {
            AccountStatus::Completed
        } else if self.current_user.as_deref() == Some(handle) {
            AccountStatus::InProgress {
                offset: self.current_offset,
            }
        } else if let Some(&offset) = self.partial_users.get(handle) {
            AccountStatus::Partial { offset }
        } else {
            AccountStatus::Pending
        }
    }

    /// Make `handle` the account in flight, starting at `offset`.
    pub fn begin(&mut self, handle: &str, offset: u64) {
        self.partial_users.remove(handle);
        self.current_user = Some(handle.to_string());
        self.current_offset = offset;
    }

    /// The account in flight reached its end of data.
    pub fn complete(&mut self, handle: &str) {
        self.clear_current(handle);
        self.partial_users.remove(handle);
        if !self.completed_users.iter().any(|h| h == handle) {
            self.completed_users.push(handle.to_string());
        }
    }

    /// The account in flight stopped early; resume it at `offset` next run.
    pub fn mark_partial(&mut self, handle: &str, offset: u64) {
        self.clear_current(handle);
        self.partial_users.insert(handle.to_string(), offset);
    }

    fn clear_current(&mut self, handle: &str) {
        if self.current_user.as_deref() == Some(handle) {
            self.current_user = None;
            self.current_offset = 0;
        }
    }

    /// Nothing in flight and nothing left half-done.
    pub fn is_settled(&self) -> bool {
        self.current_user.is_none() && self.partial_users.is_empty()
    }
}

/// File names for a run started at `started`: `(output_csv, checkpoint_json)`.
pub fn run_file_names(started: DateTime<Local>) -> (String, String) {
    let stamp = started.format("%Y%m%d_%H%M%S");
    (
        format!("tweets_data_filtered_{}.csv", stamp),
        format!("collection_checkpoint_{}.json", stamp),
    )
}

/// A checkpoint file bound to one run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the checkpoint lives in; output files are resolved against it.
    pub fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Read the checkpoint. Absent or unreadable files yield `None`.
    pub fn load(&self) -> Option<Checkpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read checkpoint; starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(cp) => Some(cp),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt checkpoint ignored");
                None
            }
        }
    }

    /// Stamp `updated_at` and rewrite the whole file.
    pub fn save(&self, state: &mut Checkpoint) -> Result<()> {
        state.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write checkpoint: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace checkpoint: {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            current = ?state.current_user,
            offset = state.current_offset,
            completed = state.completed_users.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Delete the checkpoint. A missing file is fine.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove checkpoint: {}", self.path.display())),
        }
    }
}

/// Newest readable checkpoint in `dir`, by modification time.
///
/// Files matching [`CHECKPOINT_PATTERN`] that fail to parse are skipped.
pub fn discover_latest(dir: &Path) -> Result<Option<(CheckpointStore, Checkpoint)>> {
    let matcher = Glob::new(CHECKPOINT_PATTERN)?.compile_matcher();

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !matcher.is_match(Path::new(&name)) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        candidates.push((modified, entry.path()));
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    for (_, path) in candidates {
        let store = CheckpointStore::new(path);
        if let Some(cp) = store.load() {
            return Ok(Some((store, cp)));
        }
    }
    Ok(None)
}

/// Print a checkpoint: the file at `path`, or the newest one in `dir`.
pub fn run_show_checkpoint(path: Option<&Path>, dir: &Path) -> Result<()> {
    let found = match path {
        Some(p) => {
            let store = CheckpointStore::new(p);
            let cp = store
                .load()
                .with_context(|| format!("No readable checkpoint at {}", p.display()))?;
            Some((store, cp))
        }
        None => discover_latest(dir)?,
    };

    let Some((store, cp)) = found else {
        println!("checkpoint");
        println!("  none found in {}", dir.display());
        return Ok(());
    };

    println!("checkpoint {}", store.path().display());
    println!("  output: {}", store.dir().join(&cp.output_file).display());
    println!("  started: {}", cp.started_at.to_rfc3339());
    println!("  updated: {}", cp.updated_at.to_rfc3339());
    println!("  completed accounts: {}", cp.completed_users.len());
    match &cp.current_user {
        Some(handle) => println!("  in progress: {} at offset {}", handle, cp.current_offset),
        None => println!("  in progress: none"),
    }
    for (handle, offset) in &cp.partial_users {
        println!("  partial: {} at offset {}", handle, offset);
    }
    println!("  processed: {}", cp.total_processed);
    println!("  kept: {}", cp.total_kept);
    println!("  filtered: {}", cp.total_filtered);
    Ok(())
}
