//! Process-wide embedding index with single-flight construction.
//!
//! The first query builds the index; concurrent first queries await the
//! same build instead of starting their own. A failed build leaves the
//! cache empty so a later query can try again. A built index is never
//! invalidated for the life of the process.

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

use crate::capabilities::CapabilityCache;
use status_rag_core::embedding::EmbeddingProvider;
use status_rag_core::index::{build_index, EmbeddingIndex, IndexParams};
use status_rag_core::models::CorpusEntry;

#[derive(Debug, Default)]
pub struct IndexCache {
    cell: OnceCell<Arc<EmbeddingIndex>>,
    builds: AtomicUsize,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached index, if one has been built.
    pub fn get(&self) -> Option<Arc<EmbeddingIndex>> {
        self.cell.get().cloned()
    }

    /// Number of builds started, successful or not.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Return the cached index, building it on first use.
    pub async fn ensure(
        &self,
        provider: &dyn EmbeddingProvider,
        capabilities: &CapabilityCache,
        entries: &[CorpusEntry],
        params: &IndexParams,
    ) -> Result<Arc<EmbeddingIndex>> {
        self.cell
            .get_or_try_init(|| async {
                self.builds.fetch_add(1, Ordering::SeqCst);
                let index = build_logged(provider, capabilities, entries, params).await?;
                Ok(Arc::new(index))
            })
            .await
            .cloned()
    }
}

/// Probe the model, build the index, and log the outcome.
pub async fn build_logged(
    provider: &dyn EmbeddingProvider,
    capabilities: &CapabilityCache,
    entries: &[CorpusEntry],
    params: &IndexParams,
) -> Result<EmbeddingIndex> {
    let start = Instant::now();
    tracing::info!(
        entries = entries.len(),
        model = provider.model_name(),
        batch_size = params.batch_size,
        "building embedding index"
    );

    capabilities.ensure_embedding(provider).await?;

    let build = build_index(provider, entries.to_vec(), params).await?;
    for failure in &build.failures {
        tracing::warn!(
            start = failure.start,
            end = failure.end,
            error = %failure.message,
            "embedding batch failed; entries left without vectors"
        );
    }

    tracing::info!(
        entries = build.index.len(),
        blank = build.index.blank_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        fingerprint = %build.index.fingerprint,
        "embedding index ready"
    );
    Ok(build.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowProvider {
        calls: AtomicUsize,
        fail_first_build: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn model_name(&self) -> &str {
            "slow"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_first_build && call == 0 {
                anyhow::bail!("OpenAI API error 503 Service Unavailable: busy");
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn entries(n: usize) -> Vec<CorpusEntry> {
        (0..n)
            .map(|i| CorpusEntry {
                id: format!("upd-{}", i),
                project: format!("P{}", i),
                date: String::new(),
                text: format!("text {}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_share_one_build() {
        let cache = Arc::new(IndexCache::new());
        let caps = Arc::new(CapabilityCache::new());
        let provider = Arc::new(SlowProvider {
            calls: AtomicUsize::new(0),
            fail_first_build: false,
        });
        let es = Arc::new(entries(5));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (cache, caps, provider, es) =
                (cache.clone(), caps.clone(), provider.clone(), es.clone());
            handles.push(tokio::spawn(async move {
                cache
                    .ensure(provider.as_ref(), &caps, &es, &IndexParams::default())
                    .await
                    .map(|idx| idx.len())
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 5);
        }

        assert_eq!(cache.build_count(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache = IndexCache::new();
        let caps = CapabilityCache::new();
        let provider = SlowProvider {
            calls: AtomicUsize::new(0),
            fail_first_build: true,
        };
        let es = entries(3);

        let err = cache
            .ensure(&provider, &caps, &es, &IndexParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("More than 50%"));
        assert!(cache.get().is_none());

        let index = cache
            .ensure(&provider, &caps, &es, &IndexParams::default())
            .await
            .unwrap();
        assert_eq!(index.blank_count(), 0);
        assert_eq!(cache.build_count(), 2);
        assert!(cache.get().is_some());
    }
}
