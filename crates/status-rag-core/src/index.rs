//! Embedding index construction.
//!
//! Embeds every corpus entry in fixed-size batches and assembles an
//! [`EmbeddingIndex`] whose `vectors` are positionally aligned with its
//! `meta` entries.
//!
//! # Failure tolerance
//!
//! A failed batch does not abort the build. Every entry in that batch
//! receives an empty vector (preserving alignment) and the build moves on
//! to the next batch. Once all batches are done, the share of empty vectors
//! is checked against `max_blank_ratio`. A build that is too degraded is
//! rejected with [`IndexBuildError::TooManyBlanks`] so the caller never
//! caches it.
//!
//! Caching and single-flight coordination live in the app crate; this
//! module only builds.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::corpus::truncate_chars;
use crate::embedding::EmbeddingProvider;
use crate::models::CorpusEntry;

/// Tuning for [`build_index`].
#[derive(Debug, Clone)]
pub struct IndexParams {
    /// Entries per provider call.
    pub batch_size: usize,
    /// Characters of entry text sent to the provider.
    pub max_input_chars: usize,
    /// Reject the build when `blank / total` exceeds this.
    pub max_blank_ratio: f64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_input_chars: 8000,
            max_blank_ratio: 0.5,
        }
    }
}

/// Corpus vectors plus the entries they belong to.
///
/// Invariant: `vectors.len() == meta.len()`, and `vectors[i]` is the
/// embedding of `meta[i]` (empty if its batch failed).
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    pub vectors: Vec<Vec<f32>>,
    pub meta: Vec<CorpusEntry>,
    /// Model that produced the vectors.
    pub model: String,
    /// SHA-256 over entry ids and texts.
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

impl EmbeddingIndex {
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Number of entries without a usable vector.
    pub fn blank_count(&self) -> usize {
        self.vectors.iter().filter(|v| v.is_empty()).count()
    }
}

/// A batch the provider failed to embed.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Index of the first entry in the batch.
    pub start: usize,
    /// Index one past the last entry in the batch.
    pub end: usize,
    pub message: String,
}

/// A successful build, with the batches that were blanked along the way.
#[derive(Debug)]
pub struct IndexBuild {
    pub index: EmbeddingIndex,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexBuildError {
    #[error(
        "More than {:.0}% of embedding attempts failed ({blank}/{total}). Check deployment / quota.",
        .max_ratio * 100.0
    )]
    TooManyBlanks {
        blank: usize,
        total: usize,
        max_ratio: f64,
        failures: Vec<BatchFailure>,
    },
}

/// Embed `entries` in batches and assemble an index.
///
/// Calls the provider once per batch of `params.batch_size` entries, in
/// order. See the module docs for the failure policy.
pub async fn build_index(
    provider: &dyn EmbeddingProvider,
    entries: Vec<CorpusEntry>,
    params: &IndexParams,
) -> Result<IndexBuild, IndexBuildError> {
    let batch_size = params.batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();

    for (batch_no, batch) in entries.chunks(batch_size).enumerate() {
        let start = batch_no * batch_size;
        let inputs: Vec<String> = batch
            .iter()
            .map(|e| truncate_chars(&e.text, params.max_input_chars).to_string())
            .collect();

        let outcome = match provider.embed(&inputs).await {
            Ok(batch_vectors) if batch_vectors.len() == batch.len() => Ok(batch_vectors),
            Ok(batch_vectors) => Err(format!(
                "provider returned {} vectors for {} inputs",
                batch_vectors.len(),
                batch.len()
            )),
            Err(e) => Err(format!("{:#}", e)),
        };

        match outcome {
            Ok(batch_vectors) => vectors.extend(batch_vectors),
            Err(message) => {
                vectors.extend(std::iter::repeat_with(Vec::new).take(batch.len()));
                failures.push(BatchFailure {
                    start,
                    end: start + batch.len(),
                    message,
                });
            }
        }
    }

    let total = entries.len();
    let blank = vectors.iter().filter(|v| v.is_empty()).count();
    if total > 0 && (blank as f64 / total as f64) > params.max_blank_ratio {
        return Err(IndexBuildError::TooManyBlanks {
            blank,
            total,
            max_ratio: params.max_blank_ratio,
            failures,
        });
    }

    let fingerprint = fingerprint_entries(&entries);
    Ok(IndexBuild {
        index: EmbeddingIndex {
            vectors,
            meta: entries,
            model: provider.model_name().to_string(),
            fingerprint,
            built_at: Utc::now(),
        },
        failures,
    })
}

/// SHA-256 over each entry's id and text, hex-encoded.
pub fn fingerprint_entries(entries: &[CorpusEntry]) -> String {
    let mut hasher = Sha256::new();
    for e in entries {
        hasher.update(e.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(e.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
