//! `srag check`: validate config and corpus, then probe both models.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::pipeline::QueryEngine;

/// Validate config and corpus, then probe both models once.
///
/// Prints one row per component. Fails if any component is unusable.
pub async fn run_check(config: &Config) -> Result<()> {
    let engine = QueryEngine::from_config(config.clone())?;
    let mut healthy = true;

    println!("{:<12} {:<28} STATUS", "COMPONENT", "DETAIL");
    println!(
        "{:<12} {:<28} OK",
        "config",
        format!("bind {}", config.server.bind)
    );
    println!(
        "{:<12} {:<28} {}",
        "corpus",
        format!("{} entries", engine.corpus_len()),
        if engine.corpus_len() == 0 { "EMPTY" } else { "OK" }
    );

    match engine.embedder() {
        Ok(embedder) => {
            let status = match engine.capabilities().ensure_embedding(embedder.as_ref()).await {
                Ok(()) => "OK".to_string(),
                Err(e) => {
                    healthy = false;
                    format!("FAILED ({})", e)
                }
            };
            println!(
                "{:<12} {:<28} {}",
                "embedding",
                embedder.model_name(),
                status
            );
        }
        Err(e) => {
            healthy = false;
            println!(
                "{:<12} {:<28} {} ({})",
                "embedding",
                config.embedding.provider,
                e.kind,
                e.detail.unwrap_or_default()
            );
        }
    }

    match engine.generator() {
        Ok(generator) => {
            let passed = engine
                .capabilities()
                .probe_generation(generator.as_ref())
                .await;
            if !passed {
                healthy = false;
            }
            println!(
                "{:<12} {:<28} {}",
                "generation",
                generator.model_name(),
                if passed { "OK" } else { "FAILED (see log)" }
            );
        }
        Err(e) => {
            healthy = false;
            println!(
                "{:<12} {:<28} {} ({})",
                "generation",
                config.generation.provider,
                e.kind,
                e.detail.unwrap_or_default()
            );
        }
    }

    if !healthy {
        bail!("check failed");
    }
    Ok(())
}
