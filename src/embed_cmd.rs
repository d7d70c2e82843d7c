use anyhow::{bail, Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

use crate::config::{Config, EmbeddingConfig};
use crate::embedding::{self, check_connection, Embedder, HttpEmbedder};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Name of the column holding the vector.
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Command-line choices for `harvest embed`.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    pub output: Option<PathBuf>,
    /// Keep only rows from these handles.
    pub users: Vec<String>,
    /// Stop after this many target rows.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedSummary {
    /// Rows selected for embedding.
    pub targets: u64,
    pub embedded: u64,
    pub errors: u64,
    /// Target rows with no text; written with an empty vector.
    pub empty: u64,
    /// Rows from other handles, left out of the output.
    pub skipped: u64,
}

/// Column names and reporting cadence for one pass.
#[derive(Debug, Clone)]
pub struct EmbedSettings {
    pub text_column: String,
    pub user_column: String,
    pub progress_every: u64,
}

impl From<&EmbeddingConfig> for EmbedSettings {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            text_column: config.text_column.clone(),
            user_column: config.user_column.clone(),
            progress_every: config.progress_every,
        }
    }
}

/// Default output name next to `input`.
pub fn default_output(input: &Path, filtered: bool) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let name = if filtered {
        format!("tweets_with_embeddings_filtered_{}.csv", stamp)
    } else {
        format!("tweets_with_embeddings_{}.csv", stamp)
    };
    input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.join(&name))
        .unwrap_or_else(|| PathBuf::from(name))
}

pub async fn run_embed(
    config: &Config,
    input: &Path,
    opts: &EmbedOptions,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let embedder = HttpEmbedder::new(&config.embedding)?;
    let dims = check_connection(&embedder)
        .await
        .with_context(|| format!("Probe of {} failed", embedder.url()))?;

    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| default_output(input, !opts.users.is_empty()));

    let started = Instant::now();
    let summary = embed_table(
        &embedder,
        input,
        &output,
        &EmbedSettings::from(&config.embedding),
        &opts.users,
        opts.limit,
        reporter,
    )
    .await?;
    let minutes = started.elapsed().as_secs_f64() / 60.0;

    println!("embed");
    println!("  input: {}", input.display());
    println!("  output: {}", output.display());
    println!("  model: {} ({} dims)", embedder.model_name(), dims);
    println!("  rows: {}", summary.targets);
    println!("  embedded: {}", summary.embedded);
    println!("  errors: {}", summary.errors);
    println!("  empty text: {}", summary.empty);
    if !opts.users.is_empty() {
        println!("  skipped (other users): {}", summary.skipped);
    }
    println!("  elapsed: {:.1} min", minutes);
    if minutes > 0.0 {
        println!("  rate: {:.1}/min", summary.embedded as f64 / minutes);
    }
    println!("ok");
    Ok(())
}

/// Copy `input` to `output` with an embedding column, one request per row.
///
/// With `users` set, rows from other handles are dropped. A failed request
/// leaves that row's cell empty and is counted in `errors`.
pub async fn embed_table(
    embedder: &dyn Embedder,
    input: &Path,
    output: &Path,
    settings: &EmbedSettings,
    users: &[String],
    limit: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> Result<EmbedSummary> {
    let mut reader = open_reader(input)?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", input.display()))?
        .clone();

    let text_idx = column_index(&headers, &settings.text_column, input)?;
    let user_idx = if users.is_empty() {
        None
    } else {
        Some(column_index(&headers, &settings.user_column, input)?)
    };
    let is_target = |record: &csv::StringRecord| match user_idx {
        None => true,
        Some(i) => users.iter().any(|u| u == record.get(i).unwrap_or("")),
    };

    let mut total = 0u64;
    for record in reader.records() {
        if is_target(&record?) {
            total += 1;
        }
    }
    if let Some(limit) = limit {
        total = total.min(limit as u64);
    }

    let mut out_header: Vec<String> = headers.iter().map(str::to_string).collect();
    let embed_idx = match out_header.iter().position(|h| h == EMBEDDING_COLUMN) {
        Some(i) => i,
        None => {
            out_header.push(EMBEDDING_COLUMN.to_string());
            out_header.len() - 1
        }
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&out_header)?;

    let mut summary = EmbedSummary {
        targets: total,
        ..Default::default()
    };
    let started = Instant::now();
    let mut reader = open_reader(input)?;

    for record in reader.records() {
        let record = record?;
        if !is_target(&record) {
            summary.skipped += 1;
            continue;
        }
        let done = summary.embedded + summary.errors + summary.empty;
        if done >= total {
            break;
        }

        let text = record.get(text_idx).unwrap_or("").trim();
        let cell = if text.is_empty() {
            summary.empty += 1;
            String::new()
        } else {
            match embedding::embed_one(embedder, text).await {
                Ok(vector) => {
                    summary.embedded += 1;
                    embedding::vector_cell(&vector)
                }
                Err(e) => {
                    warn!(row = done + 1, error = %format!("{:#}", e), "embedding failed; leaving cell empty");
                    summary.errors += 1;
                    String::new()
                }
            }
        };

        let mut row: Vec<&str> = record.iter().collect();
        row.resize(out_header.len(), "");
        row[embed_idx] = &cell;
        writer.write_record(&row)?;

        let done = done + 1;
        if done % settings.progress_every == 0 || done == total {
            writer.flush()?;
            report_progress(reporter, &summary, done, total, started);
        }
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", output.display()))?;
    Ok(summary)
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    match headers.iter().position(|h| h == name) {
        Some(i) => Ok(i),
        None => bail!("{} has no '{}' column", path.display(), name),
    }
}

fn report_progress(
    reporter: &dyn ProgressReporter,
    summary: &EmbedSummary,
    done: u64,
    total: u64,
    started: Instant,
) {
    let minutes = started.elapsed().as_secs_f64() / 60.0;
    let per_minute = if minutes > 0.0 {
        done as f64 / minutes
    } else {
        0.0
    };
    let eta_minutes = if per_minute > 0.0 {
        total.saturating_sub(done) as f64 / per_minute
    } else {
        0.0
    };
    reporter.report(ProgressEvent::Embedding {
        done,
        total,
        errors: summary.errors,
        per_minute,
        eta_minutes,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Vector is `[len]`; texts containing "fail" error out.
    #[derive(Default)]
    struct LengthEmbedder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.seen.lock().unwrap().extend(texts.iter().cloned());
            if texts.iter().any(|t| t.contains("fail")) {
                bail!("service unavailable");
            }
            Ok(texts.iter().map(|t| vec![t.chars().count() as f32]).collect())
        }
    }

    fn settings() -> EmbedSettings {
        EmbedSettings {
            text_column: "full_text".into(),
            user_column: "username".into(),
            progress_every: 2,
        }
    }

    fn read(path: &Path) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn fixture(tmp: &TempDir) -> PathBuf {
        let input = tmp.path().join("in.csv");
        std::fs::write(
            &input,
            "tweet_id,username,full_text\n\
             1,alice,  hello  \n\
             2,bob,this will fail\n\
             3,alice,\n\
             4,carol,\"quoted, text\"\n",
        )
        .unwrap();
        input
    }

    #[tokio::test]
    async fn appends_embedding_column() {
        let tmp = TempDir::new().unwrap();
        let input = fixture(&tmp);
        let output = tmp.path().join("out.csv");
        let embedder = LengthEmbedder::default();

        let summary = embed_table(&embedder, &input, &output, &settings(), &[], None, &NoProgress)
            .await
            .unwrap();

        assert_eq!(
            summary,
            EmbedSummary {
                targets: 4,
                embedded: 2,
                errors: 1,
                empty: 1,
                skipped: 0
            }
        );
        let rows = read(&output);
        assert_eq!(rows[0], ["tweet_id", "username", "full_text", "embedding"]);
        assert_eq!(rows[1][3], "[5.0]");
        assert_eq!(rows[2][3], "");
        assert_eq!(rows[3][3], "");
        assert_eq!(rows[4][2], "quoted, text");
        assert_eq!(rows[4][3], "[12.0]");
        // Text is trimmed before embedding; empty text is never sent.
        assert_eq!(
            *embedder.seen.lock().unwrap(),
            vec!["hello", "this will fail", "quoted, text"]
        );
    }

    #[tokio::test]
    async fn target_users_and_limit() {
        let tmp = TempDir::new().unwrap();
        let input = fixture(&tmp);
        let output = tmp.path().join("out.csv");
        let users = vec!["alice".to_string(), "carol".to_string()];

        let summary = embed_table(
            &LengthEmbedder::default(),
            &input,
            &output,
            &settings(),
            &users,
            Some(2),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(summary.targets, 2);
        assert_eq!(summary.skipped, 1);
        let rows = read(&output);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], "alice");
        assert_eq!(rows[2][0], "3");
    }

    #[tokio::test]
    async fn existing_embedding_column_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.csv");
        std::fs::write(&input, "username,full_text,embedding\nalice,abc,stale\n").unwrap();
        let output = tmp.path().join("out.csv");

        let embedder = LengthEmbedder::default();
        embed_table(&embedder, &input, &output, &settings(), &[], None, &NoProgress)
            .await
            .unwrap();

        let rows = read(&output);
        assert_eq!(rows[0], ["username", "full_text", "embedding"]);
        assert_eq!(rows[1], ["alice", "abc", "[3.0]"]);
    }

    #[tokio::test]
    async fn missing_text_column_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.csv");
        std::fs::write(&input, "username,text\nalice,abc\n").unwrap();

        let err = embed_table(
            &LengthEmbedder::default(),
            &input,
            &tmp.path().join("out.csv"),
            &settings(),
            &[],
            None,
            &NoProgress,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("full_text"));
    }

    #[test]
    fn default_output_names() {
        let plain = default_output(Path::new("data/in.csv"), false);
        assert!(plain.starts_with("data"));
        assert!(plain
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tweets_with_embeddings_2"));

        let filtered = default_output(Path::new("in.csv"), true);
        assert!(filtered
            .to_string_lossy()
            .starts_with("tweets_with_embeddings_filtered_"));
    }
}
