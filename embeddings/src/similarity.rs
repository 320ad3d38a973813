//! Similarity computation and top-k ranking for embeddings.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

/// Scores closer than this are considered equal when ranking.
pub const TIE_EPSILON: f64 = 1e-9;

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// A zero-magnitude operand has no direction and scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (magnitude_a * magnitude_b))
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Euclidean length of an embedding.
pub fn magnitude(embedding: &[f32]) -> f32 {
    embedding.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize an embedding to unit length.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude = magnitude(embedding);
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// A similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Name of the matched entry.
    pub name: String,

    /// Cosine similarity score.
    pub score: f32,
}

impl SimilarityResult {
    /// Create a new similarity result.
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Ranking key: higher bucketed score first, then ascending name.
///
/// `Ord` is arranged so that a "greater" key is a better match.
#[derive(Debug, Clone)]
struct Ranked<'a> {
    bucket: OrderedFloat<f64>,
    name: &'a str,
    score: f32,
}

impl<'a> Ranked<'a> {
    fn new(name: &'a str, score: f32) -> Self {
        Self {
            bucket: OrderedFloat((f64::from(score) / TIE_EPSILON).round()),
            name,
            score,
        }
    }
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bucket
            .cmp(&other.bucket)
            .then_with(|| other.name.cmp(self.name))
    }
}

/// Select the `k` best-scoring candidates.
///
/// Results are ordered by descending score; scores within [`TIE_EPSILON`]
/// of each other are ordered by ascending name. Candidates scoring below
/// `min_score` are discarded. The selection keeps a bounded heap of `k`
/// entries, so a scan over `n` candidates costs `O(n log k)`.
pub fn rank_top_k<'a, I>(
    query: &[f32],
    candidates: I,
    k: usize,
    min_score: Option<f32>,
) -> Result<Vec<SimilarityResult>>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut heap: BinaryHeap<Reverse<Ranked<'a>>> = BinaryHeap::with_capacity(k + 1);

    for (name, embedding) in candidates {
        let score = cosine_similarity(query, embedding)?;
        if min_score.is_some_and(|floor| score < floor) {
            continue;
        }

        heap.push(Reverse(Ranked::new(name, score)));
        if heap.len() > k {
            // Drop the current worst.
            heap.pop();
        }
    }

    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(ranked)| SimilarityResult::new(ranked.name, ranked.score))
        .collect())
}
