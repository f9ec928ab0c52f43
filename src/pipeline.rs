//! The natural-language query pipeline.
//!
//! ```text
//! query ─▶ ensure index ─▶ embed query ─▶ rank ─▶ select context
//!       ─▶ generate answer (mentions, retries, rewrite) ─▶ citations ─▶ response
//! ```
//!
//! A [`QueryEngine`] owns everything that outlives a request: the corpus
//! entries, both providers, the prompt template, the single-flight index
//! cache, and the capability cache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::answer::{generate_answer, AnswerOutcome, AnswerSettings, GenerationAttempt};
use crate::capabilities::{CapabilityCache, DeploymentNotFound};
use crate::config::Config;
use crate::corpus::load_entries;
use crate::embedding::create_provider;
use crate::error::{Diagnostics, ErrorKind, QueryError};
use crate::generation::create_generator;
use crate::http::{is_not_found, MissingApiKey};
use crate::index::IndexCache;
use status_rag_core::citation::{
    citation_matches, extract_citations, relevance_matches, MatchSource,
};
use status_rag_core::context::select_context;
use status_rag_core::embedding::EmbeddingProvider;
use status_rag_core::generation::GenerationProvider;
use status_rag_core::index::EmbeddingIndex;
use status_rag_core::mention::AbsenceFlag;
use status_rag_core::models::{CorpusEntry, MatchResult, ScoredEntry};
use status_rag_core::rank::{rank_entries, top_k};

/// Prompt template used when `generation.prompt_path` is unset.
pub const DEFAULT_TEMPLATE: &str = include_str!("../prompts/nl-search.md");

const EMPTY_CORPUS_WARNING: &str = "Empty corpus";

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub matches: Vec<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

impl QueryResponse {
    fn empty() -> Self {
        Self {
            answer: String::new(),
            matches: Vec::new(),
            meta: None,
            warning: None,
            debug: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub elapsed_ms: u64,
    pub corpus: usize,
    pub context_entries: usize,
    pub context_chars: usize,
    pub attempt_count: usize,
    pub fallback_used: bool,
    pub trimmed: bool,
    pub absence_flag: AbsenceFlag,
    pub mentioned_count: usize,
    pub unverified_claim: bool,
    pub rewrite_applied: bool,
    pub matches_from: MatchSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub attempts: Vec<GenerationAttempt>,
    pub mentioned: Vec<usize>,
    pub query_terms: Vec<String>,
    pub top_scores: Vec<TopScore>,
    pub prompt_chars: usize,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopScore {
    pub id: String,
    pub project: String,
    pub score: f64,
}

/// Load the configured prompt template, or the bundled one.
pub fn load_template(config: &Config) -> Result<String> {
    match &config.generation.prompt_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template: {}", path.display())),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Turn a provider construction failure into the error every query reports.
fn provider_error(stage: &str, kind: ErrorKind, err: anyhow::Error) -> QueryError {
    if let Some(missing) = err.downcast_ref::<MissingApiKey>() {
        return QueryError::new(ErrorKind::NoApiKey, "No API key configured")
            .with_detail(missing.to_string());
    }
    QueryError::new(kind, format!("Failed to initialize {} provider", stage))
        .with_detail(format!("{:#}", err))
}

pub struct QueryEngine {
    config: Config,
    entries: Vec<CorpusEntry>,
    embedder: Result<Arc<dyn EmbeddingProvider>, QueryError>,
    generator: Result<Arc<dyn GenerationProvider>, QueryError>,
    settings: AnswerSettings,
    index: IndexCache,
    capabilities: CapabilityCache,
}

impl QueryEngine {
    /// Load the corpus and template, and construct both providers.
    ///
    /// A missing API key does not fail construction; every query then
    /// reports `NO_API_KEY`.
    pub fn from_config(config: Config) -> Result<Self> {
        let entries = load_entries(&config.corpus.path)?;
        let embedder = create_provider(&config.embedding);
        let generator = create_generator(&config.generation);
        Self::from_parts(config, entries, embedder, generator)
    }

    /// Build an engine around already-constructed providers.
    pub fn with_providers(
        config: Config,
        entries: Vec<CorpusEntry>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        Self::from_parts(config, entries, Ok(embedder), Ok(generator))
    }

    pub fn from_parts(
        config: Config,
        entries: Vec<CorpusEntry>,
        embedder: Result<Arc<dyn EmbeddingProvider>>,
        generator: Result<Arc<dyn GenerationProvider>>,
    ) -> Result<Self> {
        let template = load_template(&config)?;
        let embedder =
            embedder.map_err(|e| provider_error("embedding", ErrorKind::EmbedInitFail, e));
        let generator =
            generator.map_err(|e| provider_error("generation", ErrorKind::Unknown, e));
        if let Err(e) = &embedder {
            tracing::warn!(code = %e.kind, detail = ?e.detail, "embedding provider unavailable");
        }
        if let Err(e) = &generator {
            tracing::warn!(code = %e.kind, detail = ?e.detail, "generation provider unavailable");
        }
        Ok(Self {
            settings: AnswerSettings::from_config(&config, template),
            config,
            entries,
            embedder,
            generator,
            index: IndexCache::new(),
            capabilities: CapabilityCache::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn corpus_len(&self) -> usize {
        self.entries.len()
    }

    /// The cached index, if the first query has built it.
    pub fn index(&self) -> Option<Arc<EmbeddingIndex>> {
        self.index.get()
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, QueryError> {
        self.embedder.clone()
    }

    pub fn generator(&self) -> Result<Arc<dyn GenerationProvider>, QueryError> {
        self.generator.clone()
    }

    /// Return the corpus index, building it on first use.
    pub async fn ensure_index(&self) -> Result<Arc<EmbeddingIndex>, QueryError> {
        let embedder = self.embedder()?;
        self.index
            .ensure(
                embedder.as_ref(),
                &self.capabilities,
                &self.entries,
                &self.config.index_params(),
            )
            .await
            .map_err(|e| {
                let message = match e.downcast_ref::<DeploymentNotFound>() {
                    Some(missing) => missing.to_string(),
                    None => "Failed to build embedding index".to_string(),
                };
                QueryError::new(ErrorKind::EmbedInitFail, message).with_detail(format!("{:#}", e))
            })
    }

    async fn embed_query(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
    ) -> Result<Vec<f32>, QueryError> {
        match embedder.embed_query(query).await {
            Ok(vector) if !vector.is_empty() => Ok(vector),
            Ok(_) => Err(QueryError::new(ErrorKind::EmbedQueryFail, "Failed to embed query")
                .with_detail("embedding provider returned an empty vector")),
            Err(e) if is_not_found(&e) => Err(QueryError::new(
                ErrorKind::EmbedDeploymentNotFound,
                format!(
                    "Embedding deployment \"{}\" not found",
                    embedder.model_name()
                ),
            )
            .with_detail(format!("{:#}", e))),
            Err(e) => Err(QueryError::new(ErrorKind::EmbedQueryFail, "Failed to embed query")
                .with_detail(format!("{:#}", e))),
        }
    }

    /// Answer one natural-language query.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let started = Instant::now();
        let query = request.query.trim();
        let retrieval = &self.config.retrieval;

        if query.chars().count() < retrieval.min_query_chars {
            tracing::debug!(query_chars = query.chars().count(), "query too short; skipping");
            return Ok(QueryResponse::empty());
        }

        let embedder = self.embedder()?;
        let generator = self.generator()?;

        if self.entries.is_empty() {
            tracing::warn!("query against an empty corpus");
            return Ok(QueryResponse {
                warning: Some(EMPTY_CORPUS_WARNING.to_string()),
                ..QueryResponse::empty()
            });
        }

        tracing::info!(
            query_chars = query.chars().count(),
            corpus = self.entries.len(),
            "nl-search request"
        );

        let index = self.ensure_index().await?;
        self.capabilities.probe_generation(generator.as_ref()).await;

        let query_vec = self.embed_query(embedder.as_ref(), query).await?;
        let ranked = rank_entries(&index, &query_vec);
        let top = top_k(&ranked, retrieval.top_k);

        let selection = select_context(
            &self.entries,
            retrieval.max_context_entries,
            retrieval.max_context_chars,
        );
        tracing::debug!(
            context_entries = selection.len(),
            context_chars = selection.char_count,
            "context selected"
        );

        let outcome = generate_answer(generator.as_ref(), &self.settings, query, selection)
            .await
            .map_err(|failure| {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::error!(
                    code = %failure.kind,
                    error = %failure.message,
                    attempts = failure.attempts.len(),
                    elapsed_ms,
                    "nl-search failed"
                );
                QueryError::new(failure.kind, "Failed to generate answer")
                    .with_detail(failure.message.clone())
                    .with_diagnostics(Diagnostics {
                        error_kind: failure.kind,
                        raw_message: failure.message,
                        elapsed_ms,
                        corpus: self.entries.len(),
                        context_entries: failure.selection.len(),
                        context_chars: failure.selection.char_count,
                        attempt_count: failure.attempts.len(),
                        trimmed: failure.trimmed,
                    })
            })?;

        let (matches, matches_from) = self.build_matches(&outcome, &top);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            elapsed_ms,
            attempts = outcome.attempts.len(),
            matches = matches.len(),
            absence_flag = %outcome.mentions.absence_flag,
            "nl-search answered"
        );

        let debug = request.debug.then(|| DebugInfo {
            attempts: outcome.attempts.clone(),
            mentioned: outcome.mentions.mentioned_indices.clone(),
            query_terms: outcome.mentions.terms.clone(),
            top_scores: top
                .iter()
                .map(|s| TopScore {
                    id: s.entry.id.clone(),
                    project: s.entry.project.clone(),
                    score: s.score,
                })
                .collect(),
            prompt_chars: outcome.attempts.last().map(|a| a.prompt_chars).unwrap_or(0),
            fingerprint: index.fingerprint.clone(),
        });

        Ok(QueryResponse {
            meta: Some(ResponseMeta {
                elapsed_ms,
                corpus: self.entries.len(),
                context_entries: outcome.selection.len(),
                context_chars: outcome.selection.char_count,
                attempt_count: outcome.attempts.len(),
                fallback_used: outcome.fallback_used,
                trimmed: outcome.trimmed,
                absence_flag: outcome.mentions.absence_flag,
                mentioned_count: outcome.mentions.mentioned_indices.len(),
                unverified_claim: outcome.unverified_claim,
                rewrite_applied: outcome.rewrite_applied,
                matches_from,
            }),
            answer: outcome.answer,
            matches,
            warning: None,
            debug,
        })
    }

    fn build_matches(
        &self,
        outcome: &AnswerOutcome,
        top: &[ScoredEntry],
    ) -> (Vec<MatchResult>, MatchSource) {
        let snippet_chars = self.config.retrieval.snippet_chars;
        if outcome.fallback_used || is_fallback(&outcome.answer, &self.settings.fallback) {
            return (Vec::new(), MatchSource::None);
        }

        let cited = extract_citations(&outcome.answer, outcome.selection.len());
        if !cited.is_empty() {
            return (
                citation_matches(&cited, &outcome.selection, top, snippet_chars),
                MatchSource::Citations,
            );
        }

        let matches = relevance_matches(&outcome.selection, top, snippet_chars);
        if matches.is_empty() {
            (matches, MatchSource::None)
        } else {
            (matches, MatchSource::Relevance)
        }
    }
}

fn is_fallback(answer: &str, fallback: &str) -> bool {
    let normalize = |s: &str| s.trim().trim_end_matches('.').to_lowercase();
    normalize(answer) == normalize(fallback)
}

/// Run a query on its own task so a panic surfaces as `UNCAUGHT`.
pub async fn run_query(
    engine: Arc<QueryEngine>,
    request: QueryRequest,
) -> Result<QueryResponse, QueryError> {
    let handle = tokio::spawn(async move { engine.query(&request).await });
    match handle.await {
        Ok(result) => result,
        Err(join_err) => {
            tracing::error!(error = %join_err, "query task failed");
            Err(QueryError::new(ErrorKind::Uncaught, "Unexpected error")
                .with_detail(join_err.to_string()))
        }
    }
}
