//! Core data models used throughout status-rag.
//!
//! These types represent the update records, searchable entries, and
//! response-facing matches that flow through the query pipeline.

use serde::{Deserialize, Serialize};

/// One canonical project-status update, as supplied by the corpus.
///
/// Field names follow the canonical update shape; the `alias` attributes
/// accept the long-form keys produced by the normalization step.
/// Missing and `null` fields both read as `None`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CorpusRecord {
    #[serde(default, alias = "update_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(
        default,
        alias = "key_developments_and_decisions",
        alias = "key_achievements"
    )]
    pub achievements: Option<String>,
    #[serde(default, alias = "key_new_insights_and_decisions")]
    pub insights: Option<String>,
    #[serde(default, alias = "key_blockers_and_concerns")]
    pub blockers: Option<String>,
    #[serde(default, alias = "emerging_themes")]
    pub themes: Option<String>,
    #[serde(default, alias = "overall_project_status")]
    pub status: Option<String>,
    #[serde(default, alias = "funding_conversation")]
    pub funding: Option<String>,
}

/// A flat, searchable text entry derived from one [`CorpusRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusEntry {
    /// Explicit record id, or `upd-{index}` when the record has none.
    pub id: String,
    pub project: String,
    pub date: String,
    /// Non-empty free-text fields joined by newlines.
    pub text: String,
}

/// A [`CorpusEntry`] paired with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: CorpusEntry,
    /// Index of the entry in corpus order. Ids need not be unique, so
    /// matches are keyed by this.
    #[serde(skip)]
    pub position: usize,
    /// Cosine similarity in `[-1.0, 1.0]`, or `-1.0` when the entry has no vector.
    pub score: f64,
}

/// A source entry surfaced to the caller alongside the answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub id: String,
    pub project: String,
    pub date: String,
    /// Relevance score, `None` when the entry was not among the top-ranked.
    pub score: Option<f64>,
    /// 1-based position in the match list.
    pub rank: usize,
    /// The `[n]` number the entry carried in the prompt context.
    pub source_number: usize,
    pub snippet: String,
}
