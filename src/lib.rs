//! # status-rag
//!
//! Retrieval-augmented question answering over a corpus of project-status
//! updates.
//!
//! A question is embedded and ranked against the corpus, a numbered
//! context window is assembled in corpus order, and a generation model
//! answers from it. A deterministic lexical check tells the model whether
//! the query terms actually occur in the context, so it neither denies
//! information that is there nor invents citations for information that
//! is not. Citations in the answer are mapped back to source entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Corpus  │──▶│ Embedding     │──▶│ Rank +      │──▶│ Answer       │
//! │  (JSON)  │   │ index (once)  │   │ context     │   │ generator    │
//! └──────────┘   └───────────────┘   └─────────────┘   └──────┬───────┘
//!                                                             │
//!                                     ┌───────────────────────┤
//!                                     ▼                       ▼
//!                                ┌──────────┐           ┌──────────┐
//!                                │   CLI    │           │   HTTP   │
//!                                │  (srag)  │           │  (axum)  │
//!                                └──────────┘           └──────────┘
//! ```
//!
//! The pure pieces (ranking, budgeting, mention detection, prompt
//! rendering, citation parsing) live in `status-rag-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`corpus`] | Corpus file loading |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`capabilities`] | Once-per-process model probes |
//! | [`index`] | Single-flight embedding index cache |
//! | [`answer`] | Generation with retry, trim, and rewrite |
//! | [`pipeline`] | The query pipeline |
//! | [`server`] | HTTP server |

pub mod answer;
pub mod ask;
pub mod capabilities;
pub mod check;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod http;
pub mod index;
pub mod index_cmd;
pub mod logging;
pub mod pipeline;
pub mod server;
