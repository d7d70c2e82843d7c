//! Collect and embed progress reporting.
//!
//! Reports observable progress during `harvest collect` and `harvest embed`
//! so users see which account is being fetched, how many posts survived the
//! filter, and how long an embedding pass has left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Starting (or resuming) an account.
    Account {
        handle: String,
        index: usize,
        total: usize,
        offset: u64,
    },
    /// One page of posts went through the filter.
    Page {
        handle: String,
        processed: u64,
        kept: u64,
        filtered: u64,
    },
    /// Embedding pass: `done` of `total` rows, `errors` without a vector.
    Embedding {
        done: u64,
        total: u64,
        errors: u64,
        per_minute: f64,
        eta_minutes: f64,
    },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the collect and embed pipelines.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "collect alice  page  12,000 processed | kept 9,870 | filtered 2,130".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Account {
                handle,
                index,
                total,
                offset,
            } => {
                if *offset > 0 {
                    format!(
                        "collect {}  account {}/{}  resuming at offset {}\n",
                        handle,
                        index,
                        total,
                        format_number(*offset)
                    )
                } else {
                    format!("collect {}  account {}/{}\n", handle, index, total)
                }
            }
            ProgressEvent::Page {
                handle,
                processed,
                kept,
                filtered,
            } => format!(
                "collect {}  {} processed | kept {} | filtered {}\n",
                handle,
                format_number(*processed),
                format_number(*kept),
                format_number(*filtered)
            ),
            ProgressEvent::Embedding {
                done,
                total,
                errors,
                per_minute,
                eta_minutes,
            } => format!(
                "embed  {} / {} rows | {:.1}/min | ETA {:.1} min | errors {}\n",
                format_number(*done),
                format_number(*total),
                per_minute,
                eta_minutes,
                format_number(*errors)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Account {
                handle,
                index,
                total,
                offset,
            } => serde_json::json!({
                "event": "progress",
                "phase": "account",
                "handle": handle,
                "index": index,
                "total": total,
                "offset": offset
            }),
            ProgressEvent::Page {
                handle,
                processed,
                kept,
                filtered,
            } => serde_json::json!({
                "event": "progress",
                "phase": "page",
                "handle": handle,
                "processed": processed,
                "kept": kept,
                "filtered": filtered
            }),
            ProgressEvent::Embedding {
                done,
                total,
                errors,
                per_minute,
                eta_minutes,
            } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": done,
                "total": total,
                "errors": errors,
                "per_minute": per_minute,
                "eta_minutes": eta_minutes
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Resolve `Auto` against the terminal.
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto => {
                if atty::is(atty::Stream::Stderr) {
                    ProgressMode::Human
                } else {
                    ProgressMode::Off
                }
            }
            other => other,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self.resolve() {
            ProgressMode::Off | ProgressMode::Auto => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
