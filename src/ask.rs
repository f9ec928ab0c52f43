//! One-shot query from the command line.
//!
//! Runs the same pipeline as `POST /api/nl-search` and prints the answer,
//! the matched sources, and the response meta. With `--json` the raw
//! response body is printed instead.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::{run_query, QueryEngine, QueryRequest, QueryResponse};

pub async fn run_ask(config: &Config, question: &str, debug: bool, json: bool) -> Result<()> {
    let engine = Arc::new(QueryEngine::from_config(config.clone())?);
    let request = QueryRequest {
        query: question.to_string(),
        debug,
    };

    match run_query(engine, request).await {
        Ok(response) if json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Ok(response) => {
            print_response(&response)?;
            Ok(())
        }
        Err(err) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&err.to_body())?);
            }
            match &err.detail {
                Some(detail) => bail!("{} [{}]: {}", err.message, err.kind, detail),
                None => bail!("{} [{}]", err.message, err.kind),
            }
        }
    }
}

fn print_response(response: &QueryResponse) -> Result<()> {
    if let Some(warning) = &response.warning {
        println!("Warning: {}", warning);
    }
    if response.answer.is_empty() && response.meta.is_none() {
        println!("No answer (query too short).");
        return Ok(());
    }

    println!("{}", response.answer);

    if !response.matches.is_empty() {
        println!();
        println!("Sources:");
        for m in &response.matches {
            let score = m
                .score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  [{}] {} ({})  score={}  id={}",
                m.source_number, m.project, m.date, score, m.id
            );
        }
    }

    if let Some(meta) = &response.meta {
        println!();
        println!(
            "elapsed={}ms corpus={} context={} entries/{} chars attempts={} trimmed={} absence={} mentioned={} matches_from={}",
            meta.elapsed_ms,
            meta.corpus,
            meta.context_entries,
            meta.context_chars,
            meta.attempt_count,
            meta.trimmed,
            meta.absence_flag,
            meta.mentioned_count,
            meta.matches_from.as_str(),
        );
        if meta.fallback_used {
            println!("note: fallback answer used");
        }
        if meta.rewrite_applied {
            println!("note: answer rewritten after a false absence claim");
        }
        if meta.unverified_claim {
            println!("warning: answer is not backed by any source mentioning the query");
        }
    }

    if let Some(debug) = &response.debug {
        println!();
        println!("Debug:");
        println!("{}", serde_json::to_string_pretty(debug)?);
    }

    Ok(())
}
