//! Validated, memoized text-to-vector conversion.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Embedding;
use crate::cache::{CacheStats, EmbeddingCache};
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};
use crate::similarity::magnitude;

/// Default number of memoized texts.
pub const DEFAULT_CACHE_ENTRIES: usize = 10_000;

/// Converts text into vectors of one fixed dimension.
///
/// The codec is the only path from text to vector: it rejects blank input,
/// checks every provider answer (length, finiteness, non-zero magnitude) and
/// memoizes successful results by exact text. Failed embeddings are never
/// cached.
pub struct VectorCodec {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    dimension: usize,
    cache: Option<EmbeddingCache>,
}

impl VectorCodec {
    /// Create a codec around `provider`, using its declared dimension.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            model: provider.default_model().to_string(),
            dimension: provider.dimension(),
            provider,
            cache: Some(EmbeddingCache::new(DEFAULT_CACHE_ENTRIES)),
        }
    }

    /// Replace the memoization cache.
    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Disable memoization.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Override the expected dimension (e.g. when the provider was asked
    /// for shortened vectors).
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Dimension of every vector this codec returns.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Model used for embedding.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        if let Some(cache) = &self.cache {
            if let Some(embedding) = cache.get(text, &self.model).await {
                debug!("Cache hit for embedding");
                return Ok(embedding);
            }
        }

        let response = self
            .provider
            .embed(EmbeddingRequest::new(text).with_model(self.model.clone()))
            .await?;
        self.validate(&response.embedding)?;

        Ok(self.remember(text, response.embedding).await)
    }

    /// Embed several texts with at most one provider call.
    ///
    /// Cache misses are sent to the provider as one batch. Each vector of a
    /// successful batch is validated on its own, so a malformed vector only
    /// fails its own text. A failed batch call fails every text that was
    /// part of it; nothing is retried.
    pub async fn embed_many(&self, texts: &[&str]) -> Vec<Result<Embedding>> {
        let mut results: Vec<Option<Result<Embedding>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results.push(Some(Err(EmbeddingError::EmptyText)));
                continue;
            }
            let cached = match &self.cache {
                Some(cache) => cache.get(text, &self.model).await,
                None => None,
            };
            match cached {
                Some(embedding) => results.push(Some(Ok(embedding))),
                None => {
                    results.push(None);
                    misses.push(i);
                }
            }
        }

        if !misses.is_empty() {
            let requests = misses
                .iter()
                .map(|&i| EmbeddingRequest::new(texts[i]).with_model(self.model.clone()))
                .collect();

            match self.provider.embed_batch(requests).await {
                Ok(responses) if responses.len() == misses.len() => {
                    for (&i, response) in misses.iter().zip(responses) {
                        let result = match self.validate(&response.embedding) {
                            Ok(()) => Ok(self.remember(texts[i], response.embedding).await),
                            Err(e) => Err(e),
                        };
                        results[i] = Some(result);
                    }
                }
                Ok(responses) => {
                    warn!(
                        "Batch embedding returned {} vectors for {} texts",
                        responses.len(),
                        misses.len()
                    );
                    for &i in &misses {
                        results[i] = Some(Err(EmbeddingError::InvalidResponse(format!(
                            "expected {} embeddings, got {}",
                            misses.len(),
                            responses.len()
                        ))));
                    }
                }
                Err(e) => {
                    warn!("Batch embedding of {} texts failed: {e}", misses.len());
                    for &i in &misses {
                        results[i] = Some(Err(batch_failure(&e)));
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| {
                    Err(EmbeddingError::InvalidResponse("missing batch result".to_string()))
                })
            })
            .collect()
    }

    /// Statistics of the memoization cache, if enabled.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            Some(cache) => Some(cache.stats().await),
            None => None,
        }
    }

    fn validate(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} returned {} dimensions, expected {}",
                self.provider.name(),
                embedding.len(),
                self.dimension
            )));
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} returned non-finite components",
                self.provider.name()
            )));
        }
        if magnitude(embedding) == 0.0 {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} returned a zero-magnitude vector",
                self.provider.name()
            )));
        }
        Ok(())
    }

    async fn remember(&self, text: &str, embedding: Embedding) -> Embedding {
        match &self.cache {
            Some(cache) => cache.insert_if_absent(text, &self.model, embedding).await,
            None => embedding,
        }
    }
}

/// Copy of a batch error for each text of the batch.
fn batch_failure(error: &EmbeddingError) -> EmbeddingError {
    match error {
        EmbeddingError::ProviderNotConfigured => EmbeddingError::ProviderNotConfigured,
        EmbeddingError::RateLimited { retry_after_secs } => EmbeddingError::RateLimited {
            retry_after_secs: *retry_after_secs,
        },
        EmbeddingError::InvalidResponse(msg) => EmbeddingError::InvalidResponse(msg.clone()),
        other => EmbeddingError::ApiRequest(other.to_string()),
    }
}
