//! Embedding cache for efficient retrieval.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::Embedding;

/// Cache key: the exact text and the model that embedded it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    text: String,
}

/// Cache for embeddings to avoid redundant provider calls.
///
/// Lookups are by exact text; no normalization or hashing is applied, so a
/// hit is always the vector that was produced for that very string.
pub struct EmbeddingCache {
    /// Least-recently-used map of embedded texts.
    cache: Mutex<LruCache<CacheKey, Embedding>>,

    /// Maximum cache size (`None` = unbounded).
    max_entries: Option<NonZeroUsize>,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache holding at most `max_entries` embeddings.
    ///
    /// A capacity of zero yields an unbounded cache.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries);
        let cache = match max_entries {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            cache: Mutex::new(cache),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache that never evicts.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    fn key(text: &str, model: &str) -> CacheKey {
        CacheKey {
            model: model.to_string(),
            text: text.to_string(),
        }
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let key = Self::key(text, model);
        let found = self.cache.lock().await.get(&key).cloned();

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Put an embedding in the cache, evicting the least recently used
    /// entry when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        let key = Self::key(text, model);
        let evicted = self.cache.lock().await.push(key.clone(), embedding);

        if let Some((old_key, _)) = evicted.filter(|(old_key, _)| *old_key != key) {
            debug!("Evicted cached embedding (model: {})", old_key.model);
        }
        debug!("Cached embedding for text (model: {model})");
    }

    /// Store `embedding` unless the text is already cached, returning the
    /// vector that ends up in the cache. The first writer wins, so racing
    /// callers all observe the same vector for the same text.
    pub async fn insert_if_absent(
        &self,
        text: &str,
        model: &str,
        embedding: Embedding,
    ) -> Embedding {
        let key = Self::key(text, model);
        let mut cache = self.cache.lock().await;

        if let Some(existing) = cache.get(&key) {
            return existing.clone();
        }

        cache.push(key, embedding.clone());
        embedding
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, text: &str, model: &str) -> bool {
        let key = Self::key(text, model);
        self.cache.lock().await.contains(&key)
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.lock().await;
        CacheStats {
            entries: cache.len(),
            max_entries: self.max_entries.map(NonZeroUsize::get),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size, if bounded.
    pub max_entries: Option<usize>,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to go to the provider.
    pub misses: u64,
}
