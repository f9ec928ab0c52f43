//! Similarity ranker.
//!
//! Scores every indexed entry against a query vector and orders them by
//! descending cosine similarity. Entries whose vector is empty (a failed
//! embedding batch) receive the [`MISSING_VECTOR_SCORE`] sentinel, so
//! they always sort last and can never tie with a real match.
//!
//! The sort is stable: equal scores keep their original corpus order.

use crate::embedding::cosine_similarity;
use crate::index::EmbeddingIndex;
use crate::models::ScoredEntry;

/// Score assigned to entries without a vector.
pub const MISSING_VECTOR_SCORE: f64 = -1.0;

/// Similarity of one entry vector to the query vector.
pub fn score(query_vec: &[f32], entry_vec: &[f32]) -> f64 {
    if entry_vec.is_empty() {
        return MISSING_VECTOR_SCORE;
    }
    cosine_similarity(query_vec, entry_vec)
}

/// Score and sort all entries of `index`, best first.
pub fn rank_entries(index: &EmbeddingIndex, query_vec: &[f32]) -> Vec<ScoredEntry> {
    let mut scored: Vec<ScoredEntry> = index
        .meta
        .iter()
        .zip(index.vectors.iter())
        .enumerate()
        .map(|(position, (entry, vec))| ScoredEntry {
            entry: entry.clone(),
            position,
            score: score(query_vec, vec),
        })
        .collect();

    // `sort_by` is stable, so ties keep corpus order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// The first `k` entries of an already ranked list.
pub fn top_k(ranked: &[ScoredEntry], k: usize) -> Vec<ScoredEntry> {
    ranked.iter().take(k).cloned().collect()
}
