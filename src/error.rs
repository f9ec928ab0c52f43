//! Query failures as reported to callers.

use serde::Serialize;

pub use status_rag_core::error::ErrorKind;

/// Enough context to tell a configuration problem from a transient
/// provider failure without reading logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub error_kind: ErrorKind,
    pub raw_message: String,
    pub elapsed_ms: u64,
    pub corpus: usize,
    pub context_entries: usize,
    pub context_chars: usize,
    pub attempt_count: usize,
    pub trimmed: bool,
}

/// A terminal failure of the query pipeline.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    pub kind: ErrorKind,
    /// Short, stable description (e.g. "Failed to embed query").
    pub message: String,
    /// Underlying provider or build error.
    pub detail: Option<String>,
    pub diagnostics: Option<Diagnostics>,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            diagnostics: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// JSON error body: `{ error, code, detail?, diagnostics? }`.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message.clone(),
            code: self.kind,
            detail: self.detail.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}
