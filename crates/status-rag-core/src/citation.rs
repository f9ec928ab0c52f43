//! Citation extraction.
//!
//! Answers cite sources as `[n]` or `[n, m, …]`, where `n` is the 1-based
//! position in the [`ContextSelection`]. Extraction keeps only in-range
//! numbers, in first-seen order, without duplicates; everything else in
//! the answer (including `[abc]` or `[0]`) is ignored.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::context::ContextSelection;
use crate::corpus::build_snippet;
use crate::models::{MatchResult, ScoredEntry};

static CITATION_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\d+(?:\s*,\s*\d+)*\s*\]").unwrap());

/// Where the response's match list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    /// Entries cited by the answer.
    Citations,
    /// No valid citations; top-ranked entries from the selection.
    Relevance,
    /// No matches at all.
    None,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Citations => "citations",
            MatchSource::Relevance => "relevance",
            MatchSource::None => "none",
        }
    }
}

/// Cited source numbers in `1..=selection_len`, first-seen and de-duplicated.
///
/// ```rust
/// use status_rag_core::citation::extract_citations;
///
/// assert_eq!(extract_citations("A [2]. B [2, 5]. C [9].", 5), vec![2, 5]);
/// ```
pub fn extract_citations(answer: &str, selection_len: usize) -> Vec<usize> {
    let mut cited = Vec::new();
    for group in CITATION_GROUP.find_iter(answer) {
        let inner = group.as_str().trim_start_matches('[').trim_end_matches(']');
        for part in inner.split(',') {
            let Ok(n) = part.trim().parse::<usize>() else {
                continue;
            };
            if (1..=selection_len).contains(&n) && !cited.contains(&n) {
                cited.push(n);
            }
        }
    }
    cited
}

/// Map cited numbers to match results.
///
/// `rank` follows citation order. `score` comes from the `ranked_top` entry
/// at the same corpus position, or is `None` when the cited entry did not
/// make the top-K.
pub fn citation_matches(
    cited: &[usize],
    selection: &ContextSelection,
    ranked_top: &[ScoredEntry],
    snippet_chars: usize,
) -> Vec<MatchResult> {
    cited
        .iter()
        .filter_map(|&n| selection.by_number(n).map(|entry| (n, entry)))
        .enumerate()
        .map(|(i, (n, entry))| MatchResult {
            id: entry.id.clone(),
            project: entry.project.clone(),
            date: entry.date.clone(),
            score: ranked_top
                .iter()
                .find(|s| s.position + 1 == n)
                .map(|s| s.score),
            rank: i + 1,
            source_number: n,
            snippet: build_snippet(&entry.text, snippet_chars),
        })
        .collect()
}

/// Match list used when the answer cites nothing: the top-K entries that
/// made it into the selection, in relevance order.
pub fn relevance_matches(
    selection: &ContextSelection,
    ranked_top: &[ScoredEntry],
    snippet_chars: usize,
) -> Vec<MatchResult> {
    ranked_top
        .iter()
        .filter_map(|s| selection.number_for_position(s.position).map(|n| (n, s)))
        .enumerate()
        .map(|(i, (n, s))| MatchResult {
            id: s.entry.id.clone(),
            project: s.entry.project.clone(),
            date: s.entry.date.clone(),
            score: Some(s.score),
            rank: i + 1,
            source_number: n,
            snippet: build_snippet(&s.entry.text, snippet_chars),
        })
        .collect()
}
