//! Survey import: free-form responses into the `username,full_text` shape.
//!
//! Each non-empty response in the chosen column becomes one row attributed
//! to a single synthetic handle, so `harvest embed --user <handle>` can
//! process survey answers alongside harvested posts.

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::models::{TEXT_FIELD, USERNAME_FIELD};
use crate::writer::CsvSink;

pub const DEFAULT_SURVEY_HANDLE: &str = "breakfast_survey";

/// Zero-based column holding the free-text answer.
pub const DEFAULT_SURVEY_COLUMN: usize = 2;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub handle: String,
    pub column: usize,
    pub output: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            handle: DEFAULT_SURVEY_HANDLE.to_string(),
            column: DEFAULT_SURVEY_COLUMN,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub responses: u64,
    pub converted: u64,
}

/// Flatten a response onto one line.
///
/// Line breaks become spaces, whitespace runs collapse, and surrounding
/// quote characters are stripped.
pub fn normalize_survey_text(raw: &str) -> String {
    let flat = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

/// Convert `input` into `output`. Returns counts of rows read and written.
pub fn import_survey(input: &Path, output: &Path, opts: &ImportOptions) -> Result<ImportSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let header = [USERNAME_FIELD.to_string(), TEXT_FIELD.to_string()];
    let sink = CsvSink::create(output, &header)?;

    let mut summary = ImportSummary::default();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", input.display()))?;
        summary.responses += 1;

        let text = normalize_survey_text(record.get(opts.column).unwrap_or(""));
        if text.trim().is_empty() {
            continue;
        }

        let mut row = Map::new();
        row.insert(USERNAME_FIELD.to_string(), Value::String(opts.handle.clone()));
        row.insert(TEXT_FIELD.to_string(), Value::String(text));
        rows.push(row);
    }

    summary.converted = sink.append(&rows)? as u64;
    Ok(summary)
}

pub fn run_import_survey(input: &Path, opts: &ImportOptions) -> Result<()> {
    let output = opts.output.clone().unwrap_or_else(|| {
        let name = format!("tweets_data_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
        input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(name))
    });

    let summary = import_survey(input, &output, opts)?;

    println!("import-survey");
    println!("  input: {}", input.display());
    println!("  output: {}", output.display());
    println!("  responses: {}", summary.responses);
    println!("  converted: {}", summary.converted);
    println!("  handle: {}", opts.handle);
    println!("ok");
    Ok(())
}
