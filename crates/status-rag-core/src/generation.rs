//! Text-generation provider trait.
//!
//! Concrete providers (OpenAI, Azure OpenAI, Gemini, Ollama) live in the
//! `status-rag` app crate. The answer generator owns timeouts, retries,
//! and failure classification; providers make exactly one call per
//! `generate` and surface transport or API errors unchanged.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model or deployment identifier.
    fn model_name(&self) -> &str;

    /// Single-shot completion of `prompt`. May return an empty string.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Cheap reachability check of the model or deployment. Defaults to a
    /// no-op.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}
