//! Error types for the prompt router.

use thiserror::Error;

use crate::completion::CompletionError;
use crate::registry::BatchFailure;

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors that can occur while registering or routing.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The embedding provider was unavailable or answered with malformed
    /// output.
    #[error("embedding failed while {context}: {source}")]
    Embedding {
        context: String,
        #[source]
        source: prompt_router_embeddings::EmbeddingError,
    },

    /// Vectors of different lengths were mixed.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Referenced candidate does not exist.
    #[error("candidate not found: {0}")]
    NotFound(String),

    /// Dispatch was attempted with nothing to match against.
    #[error("no candidates available for matching")]
    NoCandidates,

    /// A candidate failed validation.
    #[error("invalid candidate {name:?}: {reason}")]
    InvalidEntry { name: String, reason: String },

    /// Some entries of a bulk load were rejected.
    #[error("{} entries of the batch failed", .0.len())]
    PartialBatchFailure(Vec<BatchFailure>),

    /// The completion provider failed for the matched candidate.
    #[error("completion failed for candidate {candidate}: {source}")]
    Completion {
        candidate: String,
        #[source]
        source: CompletionError,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Wrap an embedding failure with what the router was doing at the time.
    ///
    /// Dimension mismatches are lifted into [`RouterError::DimensionMismatch`]
    /// since they indicate a configuration bug rather than a provider fault.
    pub(crate) fn embedding(
        context: impl Into<String>,
        source: prompt_router_embeddings::EmbeddingError,
    ) -> Self {
        match source {
            prompt_router_embeddings::EmbeddingError::DimensionMismatch { expected, actual } => {
                RouterError::DimensionMismatch { expected, actual }
            }
            source => RouterError::Embedding {
                context: context.into(),
                source,
            },
        }
    }
}
