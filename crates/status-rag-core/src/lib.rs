//! # status-rag core
//!
//! Runtime-agnostic logic for answering questions over project-status
//! updates: data model, corpus entry builder, provider traits, embedding
//! index build, similarity ranking, context budgeting, mention/absence
//! detection, prompt rendering, error classification, and citation
//! extraction.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. The
//! `status-rag` application crate supplies concrete providers, timeouts,
//! caching, and the HTTP surface.
//!
//! ## Pipeline
//!
//! ```text
//! records ─▶ corpus::build_entries ─▶ index::build_index ─┐
//!                                                         ▼
//! query ─▶ embed ─▶ rank::rank_entries ─▶ context::select_context
//!                                                         │
//!                      mention::detect_mentions ◀─────────┘
//!                                 │
//!                                 ▼
//!          prompt::render_prompt ─▶ generate ─▶ citation::extract_citations
//! ```

pub mod citation;
pub mod context;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod mention;
pub mod models;
pub mod prompt;
pub mod rank;
