//! Cross-encoder reranking seam.
//!
//! A [`Reranker`] scores `(query, passage)` pairs jointly; the retrieval
//! pipeline reorders fused candidates by these scores alone. The HTTP
//! implementation targets rerank endpoints of the
//! `{model, query, documents} -> results[{index, relevance_score}]`
//! shape; `RERANK_API_KEY`, when set, is sent as a bearer token.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RerankerConfig;

#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_name(&self) -> &str;
    /// Relevance score per passage, in passage order. Stateless per call.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>>;
}

/// Keeps the incoming (fused) order: earlier passages score higher.
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    fn model_name(&self) -> &str {
        "none"
    }

    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f64>> {
        let n = passages.len();
        Ok((0..n).map(|i| (n - i) as f64).collect())
    }
}

pub struct HttpReranker {
    endpoint: String,
    model: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("reranker.endpoint required for HTTP reranker"))?;
        Ok(Self {
            endpoint,
            model: config.model.clone().unwrap_or_else(|| "default".to_string()),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": passages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = client.post(&self.endpoint).json(&body);
            if let Ok(key) = std::env::var("RERANK_API_KEY") {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_rerank_response(&json, passages.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Rerank API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Rerank API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Rerank failed after retries")))
    }
}

/// Results may arrive in relevance order; map them back to passage order
/// through the `index` field.
fn parse_rerank_response(json: &serde_json::Value, expected: usize) -> Result<Vec<f64>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid rerank response: missing results array"))?;

    let mut scores = vec![0.0f64; expected];
    let mut seen = 0usize;

    for item in results {
        let idx = item
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Invalid rerank response: missing index"))? as usize;
        let score = item
            .get("relevance_score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| anyhow::anyhow!("Invalid rerank response: missing relevance_score"))?;

        if idx >= expected {
            bail!("Invalid rerank response: index {} out of range", idx);
        }
        scores[idx] = score;
        seen += 1;
    }

    if seen != expected {
        bail!(
            "Invalid rerank response: expected {} scores, got {}",
            expected,
            seen
        );
    }

    Ok(scores)
}

/// Instantiate the reranker named by the configuration.
pub fn create_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "none" => Ok(Arc::new(NoopReranker)),
        "http" => Ok(Arc::new(HttpReranker::new(config)?)),
        other => bail!("Unknown reranker provider: {}", other),
    }
}
