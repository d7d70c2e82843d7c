//! Client for an OpenAI-compatible embeddings endpoint.
//!
//! Defines the [`Embedder`] trait and [`HttpEmbedder`], which posts
//! `{"model": ..., "input": [...]}` to the configured URL (LM Studio,
//! llama.cpp server, OpenAI) and reads back `data[].embedding`.
//!
//! There is no retry: a failed call is reported to the caller, which leaves
//! that row without a vector and moves on.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Text that [`check_connection`] sends before a batch.
pub const PROBE_TEXT: &str = "test";

/// Something that turns texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier sent with each request.
    fn model_name(&self) -> &str;

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// [`Embedder`] backed by an HTTP embeddings endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Embedding request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Embedding API error {}: {}", status, body_text);
        }

        let json: Value = response
            .json()
            .await
            .context("Embedding response is not JSON")?;
        let vectors = parse_embedding_response(&json)?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding API returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Send [`PROBE_TEXT`] and return the vector's dimensionality.
pub async fn check_connection(embedder: &dyn Embedder) -> Result<usize> {
    let vector = embed_one(embedder, PROBE_TEXT)
        .await
        .context("Embedding service is not reachable")?;
    Ok(vector.len())
}

/// Extract `data[].embedding` from a response body.
///
/// Items carrying an `index` are put back in input order.
pub fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid embedding response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Invalid embedding response: missing embedding"))?;

        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Invalid embedding response: non-numeric component"))
            })
            .collect::<Result<Vec<f32>>>()?;

        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Render a vector as a JSON array for a CSV cell.
pub fn vector_cell(vector: &[f32]) -> String {
    serde_json::to_string(vector).unwrap_or_default()
}
