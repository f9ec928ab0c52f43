//! Corpus file loading.
//!
//! Reads already-canonical update records from a JSON file. Two shapes are
//! accepted: a bare array of records, or an object with an `updates` array.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use status_rag_core::corpus::build_entries;
use status_rag_core::models::{CorpusEntry, CorpusRecord};

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Records(Vec<CorpusRecord>),
    Wrapped { updates: Vec<CorpusRecord> },
}

/// Parse corpus records from JSON text.
pub fn parse_records(json: &str) -> Result<Vec<CorpusRecord>> {
    let file: CorpusFile = serde_json::from_str(json)
        .context("corpus must be a JSON array of updates or an object with an \"updates\" array")?;
    Ok(match file {
        CorpusFile::Records(records) => records,
        CorpusFile::Wrapped { updates } => updates,
    })
}

/// Load the corpus file and build searchable entries from it.
pub fn load_entries(path: &Path) -> Result<Vec<CorpusEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let records = parse_records(&content)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;
    let entries = build_entries(&records);
    tracing::info!(path = %path.display(), entries = entries.len(), "corpus loaded");
    Ok(entries)
}
