//! Similarity index for exact embedding lookups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{SimilarityResult, magnitude, rank_top_k};

/// An entry in the similarity index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Name of the catalog entry this vector belongs to.
    pub name: String,

    /// The embedding vector, as produced by the provider.
    pub embedding: Embedding,

    /// Revision of the description the vector was computed from.
    pub revision: u64,
}

/// Outcome of [`SimilarityIndex::rebuild`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Number of vectors now in the index.
    pub indexed: usize,

    /// Entries left out because they had no vector.
    pub skipped: Vec<String>,
}

/// A similarity index over named vectors.
///
/// Search is a brute-force scan computing cosine similarity against every
/// stored vector. That is exact and deterministic, and for catalogs of up to
/// a few thousand entries it is fast enough that an approximate structure
/// would buy nothing.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    /// Stored entries.
    entries: HashMap<String, IndexEntry>,

    /// Expected dimension of embeddings.
    dimension: usize,
}

impl SimilarityIndex {
    /// Create a new similarity index.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimension,
        }
    }

    /// Dimension shared by every vector in the index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn prepare(&self, name: &str, embedding: Embedding) -> Result<Embedding> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if magnitude(&embedding) == 0.0 {
            return Err(EmbeddingError::InvalidResponse(format!(
                "zero-magnitude vector for {name}"
            )));
        }

        Ok(embedding)
    }

    /// Add or replace the vector stored under `name`.
    pub fn upsert(
        &mut self,
        name: impl Into<String>,
        embedding: Embedding,
        revision: u64,
    ) -> Result<()> {
        let name = name.into();
        let embedding = self.prepare(&name, embedding)?;

        self.entries.insert(
            name.clone(),
            IndexEntry {
                name: name.clone(),
                embedding,
                revision,
            },
        );
        debug!("Added embedding to index: {name}");

        Ok(())
    }

    /// Replace the index contents wholesale.
    ///
    /// Entries without a vector are skipped and reported. A vector of the
    /// wrong dimension fails the whole call and leaves the previous contents
    /// untouched.
    pub fn rebuild<I>(&mut self, entries: I) -> Result<RebuildReport>
    where
        I: IntoIterator<Item = (String, Option<Embedding>, u64)>,
    {
        let mut rebuilt = HashMap::new();
        let mut skipped = Vec::new();

        for (name, embedding, revision) in entries {
            let Some(embedding) = embedding else {
                warn!("Skipping {name}: no embedding available");
                skipped.push(name);
                continue;
            };

            let embedding = self.prepare(&name, embedding)?;
            rebuilt.insert(
                name.clone(),
                IndexEntry {
                    name,
                    embedding,
                    revision,
                },
            );
        }

        self.entries = rebuilt;
        info!(
            "Rebuilt similarity index with {} entries ({} skipped)",
            self.entries.len(),
            skipped.len()
        );

        Ok(RebuildReport {
            indexed: self.entries.len(),
            skipped,
        })
    }

    /// Get an embedding by name.
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(name)
    }

    /// Check if a name exists in the index.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All indexed names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Ties are broken by ascending name. An empty index yields an empty
    /// result; `k` larger than the index yields every entry.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>> {
        self.query_with_floor(query, k, None)
    }

    /// Like [`SimilarityIndex::query`], discarding scores below `min_score`.
    pub fn query_with_floor(
        &self,
        query: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<SimilarityResult>> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        rank_top_k(
            query,
            self.entries
                .values()
                .map(|e| (e.name.as_str(), e.embedding.as_slice())),
            k,
            min_score,
        )
    }
}
