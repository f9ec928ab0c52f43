//! Corpus entry builder.
//!
//! Flattens each [`CorpusRecord`] into a [`CorpusEntry`] whose `text` is
//! the concatenation of the record's non-empty free-text fields, in a
//! fixed order:
//!
//! 1. achievements
//! 2. insights
//! 3. blockers
//! 4. themes
//! 5. overall status
//! 6. funding
//!
//! The mapping is one-to-one and order-preserving. Records with no text
//! still produce an entry (with empty `text`) so that positional
//! alignment with the embedding vectors is never broken downstream.

use crate::models::{CorpusEntry, CorpusRecord};

/// Build one entry per record, preserving order.
///
/// # Example
///
/// ```rust
/// use status_rag_core::corpus::build_entries;
/// use status_rag_core::models::CorpusRecord;
///
/// let records = vec![CorpusRecord {
///     project: Some("Atlas".into()),
///     achievements: Some("Shipped v2".into()),
///     blockers: Some("Vendor delay".into()),
///     ..Default::default()
/// }];
/// let entries = build_entries(&records);
/// assert_eq!(entries[0].id, "upd-0");
/// assert_eq!(entries[0].text, "Shipped v2\nVendor delay");
/// ```
pub fn build_entries(records: &[CorpusRecord]) -> Vec<CorpusEntry> {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| build_entry(idx, record))
        .collect()
}

fn build_entry(idx: usize, record: &CorpusRecord) -> CorpusEntry {
    let id = match record.id.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => explicit.to_string(),
        _ => format!("upd-{}", idx),
    };

    let fields = [
        &record.achievements,
        &record.insights,
        &record.blockers,
        &record.themes,
        &record.status,
        &record.funding,
    ];
    let text = fields
        .iter()
        .filter_map(|f| f.as_deref())
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    CorpusEntry {
        id,
        project: record.project.clone().unwrap_or_default(),
        date: record.date.clone().unwrap_or_default(),
        text,
    }
}

/// Truncate `text` to at most `max_chars` characters.
///
/// Counts Unicode scalar values, so a multi-byte character is never split.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build a display snippet: the first `max_chars` characters, with `…`
/// appended when the text was cut.
pub fn build_snippet(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}…", cut)
    } else {
        cut.to_string()
    }
}
