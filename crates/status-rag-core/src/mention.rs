//! Mention/absence detector.
//!
//! A deterministic, lexical check of whether the query's terms literally
//! appear in the selected context. The result is injected into the prompt
//! as explicit directives, so the model is neither allowed to claim "no
//! information" when the terms are present nor left to guess which
//! sources mention them.
//!
//! # Tokenization
//!
//! The query is split on runs of non-alphanumeric characters and
//! lowercased. Tokens of two characters or fewer and common English stop
//! words are dropped, then duplicates are removed (first occurrence wins).
//!
//! # Matching
//!
//! An entry *mentions* the query when its lowercased text contains all of
//! the tokens ([`MentionPolicy::All`], the default) or
//! at least one ([`MentionPolicy::Any`]). The project name is not
//! searched. Matching is substring-based, so
//! `"budget"` also matches `"budgets"`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::ContextSelection;

/// Words ignored when tokenizing a query.
const STOP_WORDS: &[&str] = &[
    "about", "across", "after", "all", "also", "and", "any", "are", "been", "but", "can",
    "could", "did", "does", "for", "from", "had", "has", "have", "how", "into", "its", "just",
    "let", "like", "may", "more", "most", "not", "now", "our", "out", "over", "project",
    "projects", "should", "show", "some", "tell", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "update", "updates", "was", "were",
    "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// How query tokens combine when testing an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionPolicy {
    /// Every token must appear.
    #[default]
    All,
    /// Any single token suffices.
    Any,
}

/// Whether the query terms are absent from the whole selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AbsenceFlag {
    /// At least one entry mentions the query.
    No,
    /// No entry mentions the query.
    Yes,
}

impl fmt::Display for AbsenceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsenceFlag::No => write!(f, "NO"),
            AbsenceFlag::Yes => write!(f, "YES"),
        }
    }
}

/// Outcome of [`detect_mentions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionResult {
    /// Query tokens that were tested.
    pub terms: Vec<String>,
    /// 1-based positions in the selection whose text mentions the query.
    pub mentioned_indices: Vec<usize>,
    pub absence_flag: AbsenceFlag,
}

/// Split a query into lowercase search tokens.
///
/// ```rust
/// use status_rag_core::mention::query_terms;
///
/// assert_eq!(query_terms("What's the Q2 budget shortfall?"), vec!["budget", "shortfall"]);
/// ```
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        if !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}

/// Test each selected entry for the query's terms.
pub fn detect_mentions(
    query: &str,
    selection: &ContextSelection,
    policy: MentionPolicy,
) -> MentionResult {
    let terms = query_terms(query);

    let mentioned_indices: Vec<usize> = if terms.is_empty() {
        Vec::new()
    } else {
        selection
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                let haystack = entry.text.to_lowercase();
                match policy {
                    MentionPolicy::All => terms.iter().all(|t| haystack.contains(t.as_str())),
                    MentionPolicy::Any => terms.iter().any(|t| haystack.contains(t.as_str())),
                }
            })
            .map(|(i, _)| i + 1)
            .collect()
    };

    let absence_flag = if mentioned_indices.is_empty() {
        AbsenceFlag::Yes
    } else {
        AbsenceFlag::No
    };

    MentionResult {
        terms,
        mentioned_indices,
        absence_flag,
    }
}
