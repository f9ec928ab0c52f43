//! `srag index`: build the embedding index once and report on it.
//!
//! The index lives only in memory, so this is a dry run of what the first
//! query does: useful for checking quota and deployment names before
//! serving traffic.

use anyhow::{bail, Result};
use std::time::Instant;

use crate::config::Config;
use crate::pipeline::QueryEngine;

pub async fn run_index(config: &Config) -> Result<()> {
    let engine = QueryEngine::from_config(config.clone())?;
    let start = Instant::now();

    let index = match engine.ensure_index().await {
        Ok(index) => index,
        Err(err) => match &err.detail {
            Some(detail) => bail!("{} [{}]: {}", err.message, err.kind, detail),
            None => bail!("{} [{}]", err.message, err.kind),
        },
    };

    println!("Embedding index built");
    println!("  model:       {}", index.model);
    println!("  entries:     {}", index.len());
    println!("  blank:       {}", index.blank_count());
    println!("  fingerprint: {}", index.fingerprint);
    println!("  built at:    {}", index.built_at.to_rfc3339());
    println!("  elapsed:     {}ms", start.elapsed().as_millis());

    Ok(())
}
