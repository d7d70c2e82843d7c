//! Append-only CSV output with a fixed header.
//!
//! The header is decided once, when the file is created, and every later
//! append is projected onto it: unknown fields are dropped and missing ones
//! are left empty. Each append opens the file, writes, and flushes, so a
//! crash loses at most the batch being written.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    header: Vec<String>,
}

impl CsvSink {
    /// Create (or truncate) `path` and write `header`.
    pub fn create(path: &Path, header: &[String]) -> Result<Self> {
        if header.is_empty() {
            bail!("CSV header must have at least one column");
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(header)?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            header: header.to_vec(),
        })
    }

    /// Reuse an existing file and the header on its first line.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let header: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect();
        if header.is_empty() || header.iter().all(String::is_empty) {
            bail!("{} has no header row", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
            header,
        })
    }

    /// [`open`](Self::open) when `path` exists and is non-empty, otherwise
    /// [`create`](Self::create).
    pub fn open_or_create(path: &Path, header: &[String]) -> Result<Self> {
        let has_content = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            Self::open(path)
        } else {
            Self::create(path, header)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Append `rows` in header order. Returns the number written.
    pub fn append(&self, rows: &[Map<String, Value>]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {} for append", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for row in rows {
            let record = self
                .header
                .iter()
                .map(|column| row.get(column).map(cell_text).unwrap_or_default());
            writer.write_record(record)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;

        Ok(rows.len())
    }
}

/// Render a JSON value as a CSV cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
