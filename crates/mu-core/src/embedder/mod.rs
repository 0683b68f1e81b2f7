//! Embedding provider abstraction.
//!
//! [`EmbeddingProvider`] dispatches to either a local ONNX model
//! ([`local::LocalProvider`]) or a remote OpenAI-compatible HTTP endpoint
//! ([`remote::RemoteProvider`]), selected by
//! [`crate::config::EmbeddingConfig::provider`].
//!
//! An enum rather than a trait object: native async fns in traits are not
//! object-safe, and the workspace carries no `async-trait` dependency. A
//! `match` on two variants dispatches the same way without one.

pub mod local;
pub mod model_manager;
pub mod remote;

use std::sync::Arc;

pub use local::{format_chunk_for_embedding, LocalProvider};
pub use model_manager::{model_dir, model_path, tokenizer_path, ModelSpec, DEFAULT_MODEL, FALLBACK_MODEL};
pub use remote::RemoteProvider;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{MuError, MuResult};

/// Embedding provider, dispatching to a local ONNX model or a remote HTTP API.
pub enum EmbeddingProvider {
    /// Local ONNX inference, run on a blocking thread pool.
    Local(Arc<LocalProvider>),
    /// Remote OpenAI-compatible embeddings endpoint.
    Remote(RemoteProvider),
}

impl EmbeddingProvider {
    /// Build a provider from config, selecting the variant named by
    /// `config.provider`.
    pub fn from_config(config: &EmbeddingConfig) -> MuResult<Self> {
        match config.provider {
            EmbeddingProviderKind::Local => Ok(Self::Local(Arc::new(LocalProvider::new(config)?))),
            EmbeddingProviderKind::Openai => Ok(Self::Remote(RemoteProvider::new(config))),
        }
    }

    /// Embed a batch of text chunks. Each output slot is `None` if that
    /// chunk failed to embed (model unavailable, provider error, etc.);
    /// callers fall back to keyword-only search for those chunks.
    pub async fn embed_batch(&self, chunks: &[&str]) -> MuResult<Vec<Option<Vec<f32>>>> {
        match self {
            Self::Local(provider) => {
                let provider = Arc::clone(provider);
                let owned: Vec<String> = chunks.iter().map(|s| (*s).to_string()).collect();
                tokio::task::spawn_blocking(move || {
                    let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
                    provider.embed_batch(&refs)
                })
                .await
                .map_err(|e| MuError::Internal(format!("embedding task panicked: {e}")))
            }
            Self::Remote(provider) => provider.embed_batch(chunks).await,
        }
    }

    /// Returns the embedding dimensions produced by this provider.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        match self {
            Self::Local(provider) => provider.dimensions(),
            Self::Remote(provider) => provider.dimensions(),
        }
    }

    /// Whether this provider is ready to produce real embeddings (as
    /// opposed to degraded, keyword-only fallback).
    #[must_use]
    pub fn is_available(&self) -> bool {
        match self {
            Self::Local(provider) => provider.is_available(),
            Self::Remote(provider) => provider.is_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_provider_degraded_embed_batch_returns_none() {
        let config = EmbeddingConfig {
            model_path: "/nonexistent/model.onnx".into(),
            ..EmbeddingConfig::default()
        };
        let provider = EmbeddingProvider::Local(Arc::new(LocalProvider::degraded(&config)));
        assert!(!provider.is_available());

        let results = provider.embed_batch(&["hello", "world"]).await.expect("embed_batch");
        assert_eq!(results, vec![None, None]);
    }

    #[test]
    fn test_from_config_selects_remote_provider() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Openai,
            api_key_env: "MU_TEST_NONEXISTENT_KEY_VAR".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = EmbeddingProvider::from_config(&config).expect("from_config");
        assert!(matches!(provider, EmbeddingProvider::Remote(_)));
        assert!(!provider.is_available());
    }

    #[test]
    fn test_from_config_selects_local_provider_by_default() {
        let config = EmbeddingConfig {
            model_path: "/nonexistent/model.onnx".into(),
            ..EmbeddingConfig::default()
        };
        let provider = EmbeddingProvider::from_config(&config).expect("from_config");
        assert!(matches!(provider, EmbeddingProvider::Local(_)));
    }
}
