//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus the cosine similarity used by the ranker.
//!
//! Concrete provider implementations (OpenAI, Azure OpenAI, Gemini,
//! Ollama, fastembed) live in the `status-rag` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Added to the norm product so that zero vectors never divide by zero.
pub const SIMILARITY_EPSILON: f64 = 1e-8;

/// Trait for embedding providers.
///
/// `embed` must return one vector per input text, in input order. The
/// index builder treats a length mismatch as a failed batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    /// Cheap reachability check of the model or deployment.
    ///
    /// The default does nothing; network providers override it with a
    /// minimal request so a missing deployment surfaces before a full
    /// index build.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// ```text
///               a · b
/// cos(θ) = ───────────────
///          ‖a‖ × ‖b‖ + ε
/// ```
///
/// Accumulates in `f64`. Vectors of different lengths are compared over
/// their common prefix. The result is clamped to `[-1.0, 1.0]`, and a
/// zero vector scores `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt() + SIMILARITY_EPSILON);
    sim.clamp(-1.0, 1.0)
}
