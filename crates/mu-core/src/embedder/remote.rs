//! OpenAI-compatible HTTP embeddings provider.
//!
//! Batched, with exponential-backoff retry on transient (5xx, timeout)
//! failures, matching the Upstream error kind's `retryable` contract.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{MuError, MuResult};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct RemoteProvider {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

impl RemoteProvider {
    /// Build a remote provider from config. The API key is read from the
    /// environment variable named by `config.api_key_env` at call time, not
    /// stored in config.
    #[must_use]
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            model: config.remote_model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            dimensions: config.dimensions,
        }
    }

    /// Whether an API key was found for this provider.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Returns the embedding dimensions this provider was configured for.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a batch of texts, one HTTP call per batch, retrying transient
    /// failures with exponential backoff. Returns `None` for every chunk
    /// when no API key is configured, rather than failing the batch.
    pub async fn embed_batch(&self, chunks: &[&str]) -> MuResult<Vec<Option<Vec<f32>>>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(vec![None; chunks.len()]);
        };

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.try_embed(api_key, chunks).await {
                Ok(embeddings) => return Ok(embeddings),
                Err((err, retryable)) => {
                    last_err = Some(err);
                    if !retryable || attempt + 1 == MAX_ATTEMPTS {
                        break;
                    }
                    tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt)).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| MuError::Internal("embed_batch exhausted retries with no error".into())))
    }

    async fn try_embed(&self, api_key: &str, chunks: &[&str]) -> Result<Vec<Option<Vec<f32>>>, (MuError, bool)> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: chunks,
        };

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| (upstream(format!("embeddings request failed: {e}"), true), true))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err((upstream(format!("embeddings endpoint returned {status}"), true), true));
        }
        if !status.is_success() {
            return Err((upstream(format!("embeddings endpoint returned {status}"), false), false));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| (upstream(format!("invalid embeddings response: {e}"), false), false))?;

        let mut results = vec![None; chunks.len()];
        for datum in parsed.data {
            if let Some(slot) = results.get_mut(datum.index) {
                *slot = Some(datum.embedding);
            }
        }
        Ok(results)
    }
}

fn upstream(message: String, retryable: bool) -> MuError {
    MuError::Upstream {
        message,
        retryable,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_batch_without_api_key_returns_none_for_all() {
        let config = EmbeddingConfig {
            api_key_env: "MU_TEST_NONEXISTENT_KEY_VAR".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = RemoteProvider::new(&config);
        assert!(!provider.is_available());

        let results = provider.embed_batch(&["hello", "world"]).await.expect("embed_batch");
        assert_eq!(results, vec![None, None]);
    }

    #[test]
    fn test_dimensions_reflects_config() {
        let config = EmbeddingConfig {
            dimensions: 1536,
            ..EmbeddingConfig::default()
        };
        let provider = RemoteProvider::new(&config);
        assert_eq!(provider.dimensions(), 1536);
    }
}
