//! PostgREST-style connector for the hosted post archive.
//!
//! Reads two tables over plain `GET` requests:
//!
//! | Resource | Request |
//! |----------|---------|
//! | accounts | `GET {base_url}/account?limit=N&offset=M` |
//! | one account | `GET {base_url}/account?username=eq.<handle>` |
//! | posts | `GET {base_url}/tweets?account_id=eq.<id>&limit=N&offset=M` |
//!
//! Every request carries the key twice, as `apikey` and as a bearer token.
//!
//! # Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://<project>.supabase.co/rest/v1"
//! api_key_env = "HARVEST_API_KEY"
//! page_size = 1000
//! timeout_secs = 30
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::models::Account;
use crate::traits::{Page, PostSource};

pub struct RestSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestSource {
    /// Build a connector from `[api]` settings, resolving the key.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_key = config.resolve_key()?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &ApiConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_rows(&self, table: &str, query: &[(&str, String)]) -> Result<Page<Value>> {
        let url = format!("{}/{}", self.base_url, table);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Ok(Page::Rejected(status.as_u16()));
        }

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))?;

        match json {
            Value::Array(rows) => Ok(Page::Items(rows)),
            other => anyhow::bail!(
                "Expected a JSON array from {}, got {}",
                url,
                json_kind(&other)
            ),
        }
    }
}

#[async_trait]
impl PostSource for RestSource {
    async fn accounts_page(&self, offset: u64, limit: u64) -> Result<Page<Value>> {
        self.get_rows(
            "account",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    async fn lookup_account(&self, handle: &str) -> Result<Page<Value>> {
        self.get_rows("account", &[("username", format!("eq.{}", handle))])
            .await
    }

    async fn posts_page(&self, account: &Account, offset: u64, limit: u64) -> Result<Page<Value>> {
        self.get_rows(
            "tweets",
            &[
                ("account_id", format!("eq.{}", account.id)),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
