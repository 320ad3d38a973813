//! # Embeddings
//!
//! This crate turns text into dense vectors and answers nearest-neighbor
//! questions over a small catalog of named vectors.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors (OpenAI or an
//!   offline feature-hashing model)
//! - **Vector Codec**: Validated, memoized embedding with a fixed dimension
//! - **Similarity Search**: Exact cosine top-k with deterministic tie-breaks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► VectorCodec ──► SimilarityIndex          │
//! │       │                    │                 │                  │
//! │       ▼                    ▼                 ▼                  │
//! │  OpenAI/Hashing      EmbeddingCache     top-k ranking           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod codec;
pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, EmbeddingCache};
pub use codec::VectorCodec;
pub use error::{EmbeddingError, Result};
pub use index::{IndexEntry, RebuildReport, SimilarityIndex};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use similarity::{SimilarityResult, TIE_EPSILON, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings (varies by model).
pub const DEFAULT_DIMENSION: usize = 1536; // OpenAI text-embedding-3-small
