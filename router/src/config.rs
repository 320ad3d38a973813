//! Configuration for the prompt router.

use std::path::Path;
use std::sync::Arc;

use prompt_router_embeddings::{
    EmbeddingCache, EmbeddingProvider, HashingProvider, OpenAIProvider, VectorCodec,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::completion::OpenAIChatProvider;
use crate::error::{Result, RouterError};
use crate::registry::UnregisterPolicy;

/// Configuration for the prompt router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Completion provider configuration.
    pub completion: CompletionConfig,

    /// Query processing configuration.
    pub query: QueryConfig,

    /// Registry behaviour.
    pub registry: RegistryConfig,
}

impl RouterConfig {
    /// Parse a configuration from TOML. Missing sections take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RouterError::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded router configuration from {}", path.display());
        Ok(config)
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the completion configuration.
    pub fn with_completion(mut self, config: CompletionConfig) -> Self {
        self.completion = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Set the unregister policy.
    pub fn with_unregister_policy(mut self, policy: UnregisterPolicy) -> Self {
        self.registry.unregister_policy = policy;
        self
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// Requested vector length. For OpenAI this shortens the vectors; for
    /// the hashing provider it sets the bucket count.
    pub dimensions: Option<usize>,

    /// Alternative API base URL (OpenAI-compatible servers).
    pub base_url: Option<String>,

    /// Whether to cache embeddings.
    pub cache_enabled: bool,

    /// Maximum cache size (0 = unbounded).
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: None,
            dimensions: None,
            base_url: None,
            cache_enabled: true,
            cache_max_entries: 10000,
        }
    }
}

impl EmbeddingConfig {
    /// Configuration for the offline hashing provider.
    pub fn hashing() -> Self {
        Self {
            provider: EmbeddingProviderType::Hashing,
            ..Self::default()
        }
    }

    /// Build the provider described by this configuration.
    pub fn build_provider(&self) -> Arc<dyn EmbeddingProvider> {
        match self.provider {
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new();
                if let Some(model) = &self.model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(dimensions) = self.dimensions {
                    provider = provider.with_dimensions(dimensions);
                }
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url.clone());
                }
                Arc::new(provider)
            }
            EmbeddingProviderType::Hashing => Arc::new(HashingProvider::with_dimension(
                self.dimensions.unwrap_or(HashingProvider::DEFAULT_DIMENSION),
            )),
        }
    }

    /// Build a codec around the configured provider.
    pub fn build_codec(&self) -> VectorCodec {
        let codec = VectorCodec::new(self.build_provider());
        if self.cache_enabled {
            codec.with_cache(EmbeddingCache::new(self.cache_max_entries))
        } else {
            codec.without_cache()
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline feature-hashing model.
    Hashing,
}

/// Configuration for the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Chat model to use.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Upper bound on generated tokens.
    pub max_tokens: u32,

    /// Alternative API base URL (OpenAI-compatible servers).
    pub base_url: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            base_url: None,
        }
    }
}

impl CompletionConfig {
    /// Build the chat-completions provider described by this configuration.
    pub fn build_provider(&self) -> OpenAIChatProvider {
        let provider = OpenAIChatProvider::new()
            .with_model(self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        match &self.base_url {
            Some(url) => provider.with_base_url(url.clone()),
            None => provider,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of matches returned when the caller does not ask for a count.
    pub top_k: usize,

    /// Matches scoring below this are dropped.
    pub min_score: Option<f32>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 1,
            min_score: None,
        }
    }
}

/// Registry behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// What `unregister` does with an unknown name.
    pub unregister_policy: UnregisterPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RouterConfig::from_toml_str(
            r#"
            [embedding]
            provider = "hashing"
            dimensions = 128

            [query]
            top_k = 3

            [registry]
            unregister_policy = "lenient"
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, EmbeddingProviderType::Hashing);
        assert_eq!(config.embedding.dimensions, Some(128));
        assert!(config.embedding.cache_enabled);
        assert_eq!(config.query.top_k, 3);
        assert_eq!(config.query.min_score, None);
        assert_eq!(config.registry.unregister_policy, UnregisterPolicy::Lenient);
        assert_eq!(config.completion, CompletionConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = RouterConfig::from_toml_str("[embedding]\nprovider = \"carrier-pigeon\"")
            .unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_hashing_codec_dimension() {
        let config = EmbeddingConfig {
            dimensions: Some(96),
            ..EmbeddingConfig::hashing()
        };
        let codec = config.build_codec();
        assert_eq!(codec.dimension(), 96);
        assert_eq!(codec.provider_name(), "hashing");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        tokio::fs::write(&path, "[completion]\nmodel = \"gpt-4o-mini\"\n")
            .await
            .unwrap();

        let config = RouterConfig::load(&path).await.unwrap();
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
    }
}
