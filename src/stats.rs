//! Table inspection: per-handle row counts and column listing.
//!
//! Backs `harvest stats` and `harvest columns`, a quick check that a
//! harvested or imported CSV has the shape the embedding pass expects.
//! Neither command needs a config file.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::progress::format_number;

/// Rows per value of `column`, most frequent first.
///
/// Ties keep the order in which values first appear.
pub fn user_counts(path: &Path, column: &str) -> Result<Vec<(String, u64)>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let idx = match reader.headers()?.iter().position(|h| h == column) {
        Some(i) => i,
        None => bail!("{} has no '{}' column", path.display(), column),
    };

    let mut counts: Vec<(String, u64)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let value = record.get(idx).unwrap_or("");
        match slots.get(value) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(value.to_string(), counts.len());
                counts.push((value.to_string(), 1));
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(counts)
}

/// Header names in file order.
pub fn list_columns(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect())
}

pub fn run_stats(input: &Path, column: &str) -> Result<()> {
    let counts = user_counts(input, column)?;
    let total: u64 = counts.iter().map(|(_, n)| n).sum();

    println!("stats {}", input.display());
    for (value, n) in &counts {
        let label = if value.is_empty() { "(empty)" } else { value.as_str() };
        println!("  {}: {}", label, format_number(*n));
    }
    println!("  distinct: {}", counts.len());
    println!("  total: {}", format_number(total));
    Ok(())
}

pub fn run_columns(input: &Path) -> Result<()> {
    let columns = list_columns(input)?;
    println!("columns {}", input.display());
    for (i, name) in columns.iter().enumerate() {
        println!("  {}: {}", i, name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(tmp: &TempDir, body: &str) -> std::path::PathBuf {
        let path = tmp.path().join("t.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn counts_most_common_first_ties_by_first_seen() {
        let tmp = TempDir::new().unwrap();
        let path = table(
            &tmp,
            "username,full_text\ncarol,a\nbob,b\nalice,c\nbob,d\nalice,e\nbob,f\n",
        );
        let counts = user_counts(&path, "username").unwrap();
        assert_eq!(
            counts,
            vec![
                ("bob".to_string(), 3),
                ("alice".to_string(), 2),
                ("carol".to_string(), 1),
            ]
        );
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let tmp = TempDir::new().unwrap();
        let path = table(&tmp, "username\nzed\namy\nzed\namy\n");
        let names: Vec<_> = user_counts(&path, "username")
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, ["zed", "amy"]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = table(&tmp, "handle\nx\n");
        assert!(user_counts(&path, "username").is_err());
    }

    #[test]
    fn lists_columns_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = table(&tmp, "tweet_id,username,full_text\n1,a,b\n");
        assert_eq!(
            list_columns(&path).unwrap(),
            ["tweet_id", "username", "full_text"]
        );
    }
}
