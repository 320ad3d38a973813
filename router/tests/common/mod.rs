//! Test doubles shared by the router integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use prompt_router_core::{
    Completion, CompletionError, CompletionProvider, SemanticRouter, VectorCodec,
};
use prompt_router_embeddings::{
    EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, Result,
};

/// Concept axes of [`LexiconProvider`]; the last one collects every word
/// the lexicon does not know.
const CONCEPTS: &[&[&str]] = &[
    &[
        "code", "coding", "program", "programs", "programming", "bug", "bugs", "debug", "fix",
        "function", "software", "compile", "rust",
    ],
    &["legal", "law", "lawyer", "contract", "court", "rights", "attorney"],
    &["cook", "cooking", "recipe", "recipes", "bake", "dinner", "chef"],
    &["story", "stories", "poem", "creative", "novel", "fiction"],
];

/// Texts containing this word fail to embed.
pub const POISON: &str = "unembeddable";

/// Deterministic bag-of-concepts embedder.
///
/// Each known word adds 1.0 to its concept axis; unknown words add 0.1 to
/// a shared background axis so no text maps to the zero vector.
#[derive(Default)]
pub struct LexiconProvider {
    pub embed_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl LexiconProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; CONCEPTS.len() + 1];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            match CONCEPTS.iter().position(|axis| axis.contains(&word.as_str())) {
                Some(axis) => vector[axis] += 1.0,
                None => vector[CONCEPTS.len()] += 0.1,
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for LexiconProvider {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn default_model(&self) -> &str {
        "lexicon-v1"
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len() + 1
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if request.text.contains(POISON) {
            return Err(EmbeddingError::ApiRequest("model refused input".to_string()));
        }

        let embedding = Self::vectorize(&request.text);
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "lexicon-v1".to_string(),
            tokens_used: None,
        })
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.embed(request).await?);
        }
        Ok(responses)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Completion provider that echoes its inputs, or fails on demand.
pub struct EchoCompletion {
    pub fail: bool,
}

#[async_trait]
impl CompletionProvider<String> for EchoCompletion {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        instruction: &String,
        query: &str,
    ) -> std::result::Result<Completion, CompletionError> {
        if self.fail {
            return Err(CompletionError::RateLimited {
                retry_after_secs: 1,
            });
        }
        Ok(Completion {
            text: format!("[{instruction}] {query}"),
            model: "echo".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub fn router_with(
    provider: Arc<LexiconProvider>,
    fail_completion: bool,
) -> SemanticRouter<String> {
    let codec = Arc::new(VectorCodec::new(provider));
    SemanticRouter::new(
        codec,
        Arc::new(EchoCompletion {
            fail: fail_completion,
        }),
    )
}

pub fn router() -> SemanticRouter<String> {
    router_with(LexiconProvider::new(), false)
}
