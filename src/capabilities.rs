//! Per-process record of which models have been probed.
//!
//! Probing costs a provider round trip, so each `(kind, model)` pair is
//! checked at most once per [`CapabilityCache`]. The cache is owned by the
//! query engine and passed explicitly; nothing here is global.
//!
//! - Embedding probes are strict: a 404 means the deployment is missing
//!   and fails the index build. Other probe errors are left for the build
//!   itself to surface, and the model stays unverified.
//! - Generation probes are best-effort: a failure is logged and the real
//!   generation call reports it. The probe runs once either way.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::http::is_not_found;
use status_rag_core::embedding::EmbeddingProvider;
use status_rag_core::generation::GenerationProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Embedding,
    Generation,
}

impl CapabilityKind {
    fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Embedding => "embedding",
            CapabilityKind::Generation => "generation",
        }
    }
}

/// The probed model does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{kind} deployment \"{model}\" not found (404). Check the deployment name & api-version.")]
pub struct DeploymentNotFound {
    pub kind: &'static str,
    pub model: String,
}

#[derive(Debug, Default)]
pub struct CapabilityCache {
    verified: Mutex<HashSet<String>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(kind: CapabilityKind, model: &str) -> String {
        format!("{}:{}", kind.as_str(), model)
    }

    pub fn is_verified(&self, kind: CapabilityKind, model: &str) -> bool {
        self.verified
            .lock()
            .map(|set| set.contains(&Self::key(kind, model)))
            .unwrap_or(false)
    }

    pub fn mark_verified(&self, kind: CapabilityKind, model: &str) {
        if let Ok(mut set) = self.verified.lock() {
            set.insert(Self::key(kind, model));
        }
    }

    /// Probe the embedding model unless already verified.
    pub async fn ensure_embedding(&self, provider: &dyn EmbeddingProvider) -> Result<()> {
        let model = provider.model_name();
        if self.is_verified(CapabilityKind::Embedding, model) {
            return Ok(());
        }
        match provider.probe().await {
            Ok(()) => {
                self.mark_verified(CapabilityKind::Embedding, model);
                Ok(())
            }
            Err(e) if is_not_found(&e) => Err(DeploymentNotFound {
                kind: "embedding",
                model: model.to_string(),
            }
            .into()),
            Err(e) => {
                tracing::warn!(model, error = %format!("{:#}", e), "embedding probe failed");
                Ok(())
            }
        }
    }

    /// Probe the generation model once, never failing.
    ///
    /// Returns whether this call's probe passed; `true` when an earlier
    /// call already probed the model.
    pub async fn probe_generation(&self, provider: &dyn GenerationProvider) -> bool {
        let model = provider.model_name();
        if self.is_verified(CapabilityKind::Generation, model) {
            return true;
        }
        let result = provider.probe().await;
        if let Err(e) = &result {
            if is_not_found(e) {
                tracing::warn!(
                    "{}",
                    DeploymentNotFound {
                        kind: "generation",
                        model: model.to_string(),
                    }
                );
            } else {
                tracing::warn!(model, error = %format!("{:#}", e), "generation probe failed");
            }
        }
        self.mark_verified(CapabilityKind::Generation, model);
        result.is_ok()
    }
}
