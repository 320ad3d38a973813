//! Semantic router implementation.

use std::collections::HashMap;
use std::sync::Arc;

use prompt_router_embeddings::{
    CacheStats, Embedding, SimilarityIndex, SimilarityResult, VectorCodec,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::completion::{Completion, CompletionProvider};
use crate::config::{QueryConfig, RouterConfig};
use crate::error::{Result, RouterError};
use crate::library::PromptLibrary;
use crate::registry::{
    BatchFailure, BatchReport, CandidateEntry, RegisterOutcome, Registry, RegistrySnapshot,
    UnregisterPolicy,
};

/// A ranked match resolved back to its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<P> {
    /// Name of the matched candidate.
    pub name: String,

    /// Cosine similarity between the query and the candidate description.
    pub score: f32,

    /// The candidate's payload.
    pub payload: P,
}

/// Result of [`SemanticRouter::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Candidate whose payload was used.
    pub name: String,

    /// Its similarity score.
    pub score: f32,

    /// What the completion provider produced.
    pub completion: Completion,
}

/// What a refresh of the similarity index did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Registry generation the index now reflects.
    pub generation: u64,

    /// Vectors carried over from the previous index.
    pub reused: usize,

    /// Candidates that were (re-)embedded.
    pub embedded: Vec<String>,

    /// Candidates that could not be embedded and are not matchable.
    pub failed: Vec<BatchFailure>,
}

/// Statistics about the router.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Registered candidates.
    pub candidates: usize,

    /// Vectors in the current index.
    pub indexed: usize,

    /// Vector dimension.
    pub dimension: usize,

    /// Embedding provider name.
    pub provider: String,

    /// Embedding cache statistics, if caching is enabled.
    pub cache: Option<CacheStats>,
}

/// A candidate revision that could not be embedded.
#[derive(Debug, Clone)]
struct FailedRevision {
    revision: u64,
    reason: String,
}

/// An immutable index together with the registry state it was built from.
struct IndexSnapshot {
    index: SimilarityIndex,
    generation: u64,
    /// Entries left out of `index`, keyed by name.
    failed: HashMap<String, FailedRevision>,
}

impl IndexSnapshot {
    fn is_current(&self, generation: u64, retry_failed: bool) -> bool {
        self.generation == generation && (!retry_failed || self.failed.is_empty())
    }

    fn failure<P>(&self, entry: &CandidateEntry<P>) -> Option<&FailedRevision> {
        self.failed
            .get(&entry.name)
            .filter(|failed| failed.revision == entry.revision)
    }
}

/// Routes free-text queries to the best matching registered candidate.
///
/// The router owns no catalog state of its own beyond a derived index:
/// candidates live in the [`Registry`], vectors come from the injected
/// [`VectorCodec`]. The index is rebuilt lazily, on the first query after
/// the registry changed, as a new snapshot that is swapped in whole, so a
/// reader always sees either the old or the new index.
pub struct SemanticRouter<P> {
    registry: Registry<P>,
    codec: Arc<VectorCodec>,
    completion: Arc<dyn CompletionProvider<P>>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Serializes rebuilds.
    refresh_lock: Mutex<()>,
    query: QueryConfig,
}

impl<P> SemanticRouter<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Create a router with an empty registry.
    pub fn new(codec: Arc<VectorCodec>, completion: Arc<dyn CompletionProvider<P>>) -> Self {
        let dimension = codec.dimension();
        Self {
            registry: Registry::new(),
            codec,
            completion,
            snapshot: RwLock::new(Arc::new(IndexSnapshot {
                index: SimilarityIndex::new(dimension),
                generation: 0,
                failed: HashMap::new(),
            })),
            refresh_lock: Mutex::new(()),
            query: QueryConfig::default(),
        }
    }

    /// Route against an existing registry (shared with other handles).
    pub fn with_registry(mut self, registry: Registry<P>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the query configuration.
    pub fn with_query_config(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    /// Set the unregister policy of the registry.
    pub fn with_unregister_policy(mut self, policy: UnregisterPolicy) -> Self {
        self.registry = self.registry.with_policy(policy);
        self
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry<P> {
        &self.registry
    }

    /// Register or replace a candidate. Its vector is computed on the next
    /// query or refresh.
    pub async fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        payload: P,
    ) -> Result<RegisterOutcome> {
        self.registry.register(name, description, payload).await
    }

    /// Remove a candidate; see [`Registry::unregister`].
    pub async fn unregister(&self, name: &str) -> Result<bool> {
        self.registry.unregister(name).await
    }

    /// Get a candidate by name.
    pub async fn get(&self, name: &str) -> Option<CandidateEntry<P>> {
        self.registry.get(name).await
    }

    /// `(name, description)` pairs in registration order.
    pub async fn list(&self) -> Vec<(String, String)> {
        self.registry.list().await
    }

    /// Keyword search over names and descriptions.
    pub async fn search(&self, keyword: &str) -> Vec<CandidateEntry<P>> {
        self.registry.search(keyword).await
    }

    /// Register many candidates and index them with a single refresh.
    ///
    /// Entries that fail validation or embedding are reported individually;
    /// everything else stays registered and becomes matchable. An entry
    /// that failed embedding stays in the registry, unmatchable, until an
    /// explicit [`SemanticRouter::refresh`] or a re-registration.
    pub async fn bulk_load<I>(&self, entries: I) -> Result<BatchReport>
    where
        I: IntoIterator<Item = (String, String, P)>,
    {
        let mut report = self.registry.bulk_load(entries).await;
        let refresh = self.refresh().await?;

        for failure in refresh.failed {
            report.mark_failed(&failure.name, failure.reason);
        }

        let failures = report.failures().len();
        if failures > 0 {
            warn!("Bulk load finished with {failures} failed entries");
        }
        Ok(report)
    }

    /// Bring the index up to date with the registry now rather than on the
    /// next query, retrying every candidate that previously failed to embed.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let (_, report) = self.sync(true).await?;
        Ok(report)
    }

    /// Return up to `k` candidates ranked by similarity to `query_text`.
    ///
    /// Candidates removed or re-described while the query was in flight are
    /// left out rather than reported as errors. Candidates whose current
    /// description already failed to embed are not retried here.
    pub async fn find_matches(&self, query_text: &str, k: usize) -> Result<Vec<RouteMatch<P>>> {
        let (snapshot, _) = self.sync(false).await?;

        if snapshot.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .codec
            .embed(query_text)
            .await
            .map_err(|e| RouterError::embedding("embedding the query", e))?;

        let hits = snapshot
            .index
            .query_with_floor(&vector, k, self.query.min_score)
            .map_err(|e| RouterError::embedding("querying the index", e))?;

        let mut matches = Vec::with_capacity(hits.len());
        for SimilarityResult { name, score } in hits {
            let indexed_revision = snapshot.index.get(&name).map(|e| e.revision);
            match self.registry.get(&name).await {
                Some(entry) if Some(entry.revision) == indexed_revision => {
                    matches.push(RouteMatch {
                        name,
                        score,
                        payload: entry.payload,
                    });
                }
                _ => debug!("Dropping match {name}: changed since the index was built"),
            }
        }

        debug!("Query matched {} candidates", matches.len());
        Ok(matches)
    }

    /// [`SemanticRouter::find_matches`] with the configured `top_k`.
    pub async fn find_best_matches(&self, query_text: &str) -> Result<Vec<RouteMatch<P>>> {
        self.find_matches(query_text, self.query.top_k).await
    }

    /// Pick the best candidate and run the completion provider with its
    /// payload.
    pub async fn dispatch(&self, query_text: &str) -> Result<DispatchOutcome> {
        let best = self
            .find_matches(query_text, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(RouterError::NoCandidates)?;

        info!(candidate = %best.name, score = best.score, "Dispatching query");
        self.complete_match(&best, query_text).await
    }

    /// Run the completion provider with the payload of an already ranked
    /// match. Failures name the matched candidate.
    pub async fn complete_match(
        &self,
        matched: &RouteMatch<P>,
        query_text: &str,
    ) -> Result<DispatchOutcome> {
        let completion = self
            .completion
            .complete(&matched.payload, query_text)
            .await
            .map_err(|source| RouterError::Completion {
                candidate: matched.name.clone(),
                source,
            })?;

        Ok(DispatchOutcome {
            name: matched.name.clone(),
            score: matched.score,
            completion,
        })
    }

    /// Run the completion provider with a caller-supplied payload, skipping
    /// matching altogether. Failures are attributed to `"custom"`.
    pub async fn respond_with(&self, payload: &P, query_text: &str) -> Result<Completion> {
        self.completion
            .complete(payload, query_text)
            .await
            .map_err(|source| RouterError::Completion {
                candidate: "custom".to_string(),
                source,
            })
    }

    /// The current vector of `name`, if it has been computed for the
    /// candidate's present description.
    pub async fn embedding(&self, name: &str) -> Option<Embedding> {
        let snapshot = self.snapshot.read().await.clone();
        let entry = self.registry.get(name).await?;
        snapshot
            .index
            .get(name)
            .filter(|indexed| indexed.revision == entry.revision)
            .map(|indexed| indexed.embedding.clone())
    }

    /// Get router statistics.
    pub async fn stats(&self) -> RouterStats {
        let indexed = self.snapshot.read().await.index.len();
        RouterStats {
            candidates: self.registry.len().await,
            indexed,
            dimension: self.codec.dimension(),
            provider: self.codec.provider_name().to_string(),
            cache: self.codec.cache_stats().await,
        }
    }

    /// Return an index that reflects the current registry generation,
    /// rebuilding it if needed. Failed candidates are only embedded again
    /// when `retry_failed` is set or their revision changed.
    async fn sync(&self, retry_failed: bool) -> Result<(Arc<IndexSnapshot>, RefreshReport)> {
        let current = self.snapshot.read().await.clone();
        let generation = self.registry.generation().await;
        if current.is_current(generation, retry_failed) {
            return Ok((current.clone(), Self::unchanged(&current)));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have rebuilt while we waited.
        let current = self.snapshot.read().await.clone();
        let registry = self.registry.snapshot().await;
        if current.is_current(registry.generation, retry_failed) {
            return Ok((current.clone(), Self::unchanged(&current)));
        }

        let (next, report) = self.rebuild(&current, registry, retry_failed).await?;
        *self.snapshot.write().await = Arc::clone(&next);
        Ok((next, report))
    }

    fn unchanged(snapshot: &IndexSnapshot) -> RefreshReport {
        RefreshReport {
            generation: snapshot.generation,
            reused: snapshot.index.len(),
            embedded: Vec::new(),
            failed: Vec::new(),
        }
    }

    async fn rebuild(
        &self,
        current: &IndexSnapshot,
        registry: RegistrySnapshot<P>,
        retry_failed: bool,
    ) -> Result<(Arc<IndexSnapshot>, RefreshReport)> {
        let mut report = RefreshReport {
            generation: registry.generation,
            ..RefreshReport::default()
        };

        let mut rows: Vec<(String, Option<Embedding>, u64)> =
            Vec::with_capacity(registry.entries.len());
        let mut stale: Vec<(usize, &CandidateEntry<P>)> = Vec::new();
        let mut failed = HashMap::new();

        for entry in &registry.entries {
            if let Some(indexed) = current
                .index
                .get(&entry.name)
                .filter(|indexed| indexed.revision == entry.revision)
            {
                report.reused += 1;
                rows.push((
                    entry.name.clone(),
                    Some(indexed.embedding.clone()),
                    entry.revision,
                ));
                continue;
            }

            match current.failure(entry) {
                Some(previous) if !retry_failed => {
                    debug!(
                        "Candidate {} still unembeddable at revision {}",
                        entry.name, entry.revision
                    );
                    report.failed.push(BatchFailure {
                        name: entry.name.clone(),
                        reason: previous.reason.clone(),
                    });
                    failed.insert(entry.name.clone(), previous.clone());
                }
                _ => stale.push((rows.len(), entry)),
            }
            rows.push((entry.name.clone(), None, entry.revision));
        }

        if !stale.is_empty() {
            let texts: Vec<&str> = stale
                .iter()
                .map(|(_, entry)| entry.description.as_str())
                .collect();
            let results = self.codec.embed_many(&texts).await;

            for ((row, entry), result) in stale.iter().zip(results) {
                match result {
                    Ok(embedding) => {
                        rows[*row].1 = Some(embedding);
                        report.embedded.push(entry.name.clone());
                    }
                    Err(e) => {
                        let error = RouterError::embedding(
                            format!("embedding candidate {}", entry.name),
                            e,
                        );
                        warn!("Candidate {} is not matchable: {error}", entry.name);
                        report.failed.push(BatchFailure {
                            name: entry.name.clone(),
                            reason: error.to_string(),
                        });
                        failed.insert(
                            entry.name.clone(),
                            FailedRevision {
                                revision: entry.revision,
                                reason: error.to_string(),
                            },
                        );
                    }
                }
            }
        }

        let mut index = SimilarityIndex::new(self.codec.dimension());
        index
            .rebuild(rows)
            .map_err(|e| RouterError::embedding("rebuilding the similarity index", e))?;

        info!(
            generation = registry.generation,
            reused = report.reused,
            embedded = report.embedded.len(),
            failed = report.failed.len(),
            "Refreshed similarity index"
        );

        let snapshot = Arc::new(IndexSnapshot {
            index,
            generation: registry.generation,
            failed,
        });
        Ok((snapshot, report))
    }
}

impl SemanticRouter<String> {
    /// Build a router from configuration, using the OpenAI chat provider
    /// for completions.
    pub fn from_config(config: &RouterConfig) -> Self {
        let codec = Arc::new(config.embedding.build_codec());
        let completion: Arc<dyn CompletionProvider<String>> =
            Arc::new(config.completion.build_provider());

        Self::new(codec, completion)
            .with_query_config(config.query.clone())
            .with_unregister_policy(config.registry.unregister_policy)
    }

    /// Register every prompt of a library as one batch.
    pub async fn load_library(&self, library: PromptLibrary) -> Result<BatchReport> {
        self.bulk_load(library.into_entries()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use prompt_router_embeddings::{
        EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider,
    };

    struct Silent;

    /// Four-dimensional provider that answers "short" texts with three
    /// components.
    struct Truncating;

    #[async_trait]
    impl EmbeddingProvider for Truncating {
        fn name(&self) -> &str {
            "truncating"
        }

        fn default_model(&self) -> &str {
            "truncating-v1"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> prompt_router_embeddings::Result<EmbeddingResponse> {
            let embedding = if request.text.contains("short") {
                vec![1.0, 0.0, 0.0]
            } else {
                vec![1.0, 0.0, 0.0, 1.0]
            };
            Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model: "truncating-v1".to_string(),
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl CompletionProvider<u32> for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn complete(
            &self,
            instruction: &u32,
            _query: &str,
        ) -> std::result::Result<Completion, CompletionError> {
            Ok(Completion {
                text: instruction.to_string(),
                model: "silent".to_string(),
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn router() -> SemanticRouter<u32> {
        let codec = Arc::new(VectorCodec::new(Arc::new(HashingProvider::with_dimension(64))));
        SemanticRouter::new(codec, Arc::new(Silent))
    }

    #[tokio::test]
    async fn test_refresh_without_changes_reuses_everything() {
        let router = router();
        router.register("a", "alpha particles", 1).await.unwrap();
        router.register("b", "beta decay", 2).await.unwrap();

        let first = router.refresh().await.unwrap();
        assert_eq!(first.reused, 0);
        assert_eq!(first.embedded, vec!["a".to_string(), "b".to_string()]);

        let second = router.refresh().await.unwrap();
        assert_eq!(
            second,
            RefreshReport {
                generation: first.generation,
                reused: 2,
                embedded: Vec::new(),
                failed: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_removed_entries_leave_the_index() {
        let router = router();
        router.register("a", "alpha particles", 1).await.unwrap();
        router.register("b", "beta decay", 2).await.unwrap();
        router.refresh().await.unwrap();

        router.unregister("a").await.unwrap();
        let report = router.refresh().await.unwrap();
        assert_eq!(report.reused, 1);
        assert_eq!(router.stats().await.indexed, 1);
        assert!(router.embedding("a").await.is_none());
        assert!(router.embedding("b").await.is_some());
    }

    #[tokio::test]
    async fn test_wrong_dimension_fails_only_its_candidate() {
        let codec = Arc::new(VectorCodec::new(Arc::new(Truncating)));
        let router = SemanticRouter::new(codec, Arc::new(Silent));
        router.register("full", "a full vector", 1).await.unwrap();
        router.register("cut", "a short vector", 2).await.unwrap();

        let report = router.refresh().await.unwrap();
        assert_eq!(report.embedded, vec!["full".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "cut");
        assert!(report.failed[0].reason.contains("3 dimensions, expected 4"));

        let matches = router.find_matches("anything", 5).await.unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["full"]);
        assert!(matches!(
            router.codec.embed("short").await,
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_passes_payload_through() {
        let router = router();
        router.register("a", "alpha particles", 7).await.unwrap();

        let outcome = router.dispatch("alpha").await.unwrap();
        assert_eq!(outcome.name, "a");
        assert_eq!(outcome.completion.text, "7");
    }
}
