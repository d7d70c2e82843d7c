use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "HARVEST_API_KEY".to_string()
}
fn default_page_size() -> u64 {
    1000
}
fn default_api_timeout_secs() -> u64 {
    30
}

impl ApiConfig {
    /// Returns the inline `api_key`, falling back to the `api_key_env` variable.
    pub fn resolve_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(&self.api_key_env).with_context(|| {
            format!(
                "No API key: set api.api_key or the {} environment variable",
                self.api_key_env
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_mention_ratio")]
    pub max_mention_ratio: f64,
    #[serde(default = "default_max_hashtag_ratio")]
    pub max_hashtag_ratio: f64,
    #[serde(default = "default_min_text_without_urls")]
    pub min_text_without_urls: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_mention_ratio: default_max_mention_ratio(),
            max_hashtag_ratio: default_max_hashtag_ratio(),
            min_text_without_urls: default_min_text_without_urls(),
        }
    }
}

fn default_min_length() -> usize {
    15
}
fn default_max_mention_ratio() -> f64 {
    0.5
}
fn default_max_hashtag_ratio() -> f64 {
    0.6
}
fn default_min_text_without_urls() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_flush_rows")]
    pub flush_rows: usize,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,
    /// Handles to collect. Empty means every account the API lists.
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            flush_rows: default_flush_rows(),
            checkpoint_every: default_checkpoint_every(),
            accounts: Vec::new(),
            columns: default_columns(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_flush_rows() -> usize {
    500
}
fn default_checkpoint_every() -> u64 {
    5000
}
fn default_columns() -> Vec<String> {
    [
        "tweet_id",
        "account_id",
        "username",
        "created_at",
        "full_text",
        "retweet_count",
        "favorite_count",
        "reply_to_tweet_id",
        "reply_to_user_id",
        "reply_to_username",
        "collected_at",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_text_column")]
    pub text_column: String,
    #[serde(default = "default_user_column")]
    pub user_column: String,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
            text_column: default_text_column(),
            user_column: default_user_column(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:1234/v1/embeddings".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-nomic-embed-text-v1.5".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    10
}
fn default_text_column() -> String {
    "full_text".to_string()
}
fn default_user_column() -> String {
    "username".to_string()
}
fn default_progress_every() -> u64 {
    50
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate api
    if config.api.base_url.trim().is_empty() {
        bail!("api.base_url must not be empty");
    }
    if config.api.page_size == 0 {
        bail!("api.page_size must be > 0");
    }

    // Validate filter
    for (name, ratio) in [
        ("filter.max_mention_ratio", config.filter.max_mention_ratio),
        ("filter.max_hashtag_ratio", config.filter.max_hashtag_ratio),
    ] {
        if !(0.0..=1.0).contains(&ratio) {
            bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    // Validate collect
    if config.collect.flush_rows == 0 {
        bail!("collect.flush_rows must be > 0");
    }
    if config.collect.checkpoint_every == 0 {
        bail!("collect.checkpoint_every must be > 0");
    }
    if config.collect.columns.is_empty() {
        bail!("collect.columns must list at least one column");
    }

    // Validate embedding
    if config.embedding.url.trim().is_empty() {
        bail!("embedding.url must not be empty");
    }
    if config.embedding.progress_every == 0 {
        bail!("embedding.progress_every must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse("[api]\nbase_url = \"http://localhost:3000\"\n").unwrap();
        assert_eq!(cfg.api.page_size, 1000);
        assert_eq!(cfg.filter.min_length, 15);
        assert_eq!(cfg.collect.flush_rows, 500);
        assert_eq!(cfg.collect.checkpoint_every, 5000);
        assert_eq!(cfg.embedding.timeout_secs, 10);
        assert!(cfg.collect.columns.contains(&"full_text".to_string()));
        assert!(cfg.collect.accounts.is_empty());
    }

    #[test]
    fn rejects_zero_page_size() {
        let err = parse("[api]\nbase_url = \"http://x\"\npage_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let src = "[api]\nbase_url = \"http://x\"\n[filter]\nmax_hashtag_ratio = 1.5\n";
        let err = parse(src).unwrap_err();
        assert!(err.to_string().contains("max_hashtag_ratio"));
    }

    #[test]
    fn inline_key_wins_over_env() {
        let src = "[api]\nbase_url = \"http://x\"\napi_key = \"inline\"\n\
                   api_key_env = \"HARVEST_TEST_UNSET_VAR\"\n";
        let cfg = parse(src).unwrap();
        assert_eq!(cfg.api.resolve_key().unwrap(), "inline");
    }

    #[test]
    fn missing_key_names_the_variable() {
        let src = "[api]\nbase_url = \"http://x\"\napi_key_env = \"HARVEST_TEST_SURELY_UNSET\"\n";
        let cfg = parse(src).unwrap();
        let err = cfg.api.resolve_key().unwrap_err();
        assert!(err.to_string().contains("HARVEST_TEST_SURELY_UNSET"));
    }
}
