//! # Prompt Router
//!
//! Routes free-text queries to the best matching entry of a catalog of
//! named candidates (typically system prompts) by semantic similarity, and
//! optionally hands the winner's payload plus the query to a completion
//! provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Semantic Router                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐   revisions   ┌──────────────┐                │
//! │  │   Registry   │ ────────────► │  Similarity  │ ◄── VectorCodec│
//! │  │ name → (desc,│               │    Index     │                │
//! │  │   payload)   │ ◄──────────── │  (snapshot)  │                │
//! │  └──────────────┘  resolve hits └──────────────┘                │
//! │         │                                                       │
//! │         ▼                                                       │
//! │  ┌──────────────┐                                               │
//! │  │  Completion  │  payload + query ──► generated text           │
//! │  │   Provider   │                                               │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prompt_router_core::{PromptLibrary, RouterConfig, SemanticRouter};
//!
//! let router = SemanticRouter::from_config(&RouterConfig::default());
//! router.load_library(PromptLibrary::builtin()).await?;
//!
//! let matches = router.find_matches("help me fix a bug in my program", 3).await?;
//! let outcome = router.dispatch("help me fix a bug in my program").await?;
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod library;
pub mod registry;
pub mod router;

pub use completion::{Completion, CompletionError, CompletionProvider, OpenAIChatProvider};
pub use config::{
    CompletionConfig, EmbeddingConfig, EmbeddingProviderType, QueryConfig, RegistryConfig,
    RouterConfig,
};
pub use error::{Result, RouterError};
pub use library::{LibraryLoad, PromptLibrary, PromptSpec};
pub use registry::{
    BatchFailure, BatchReport, CandidateEntry, EntryOutcome, RegisterOutcome, Registry,
    RegistrySnapshot, UnregisterPolicy,
};
pub use router::{DispatchOutcome, RefreshReport, RouteMatch, RouterStats, SemanticRouter};

// Re-export from dependencies for convenience
pub use prompt_router_embeddings::{EmbeddingProvider, HashingProvider, VectorCodec};
