#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use status_rag::config::Config;
use status_rag::http::ProviderHttpError;
use status_rag::pipeline::QueryEngine;
use status_rag_core::embedding::EmbeddingProvider;
use status_rag_core::generation::GenerationProvider;
use status_rag_core::models::CorpusEntry;

const VOCABULARY: &[&str] = &[
    "budget",
    "shortfall",
    "q2",
    "shipped",
    "v2",
    "release",
    "update",
    "xylophone",
];

/// Bag-of-words embedder over a fixed vocabulary.
pub struct KeywordEmbedder {
    pub embed_calls: AtomicUsize,
    /// Fail every corpus batch.
    pub fail_batches: bool,
    /// Fail query embedding with this HTTP status.
    pub query_status: Option<reqwest::StatusCode>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            embed_calls: AtomicUsize::new(0),
            fail_batches: false,
            query_status: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    VOCABULARY
        .iter()
        .map(|word| tokens.iter().filter(|t| *t == word).count() as f32)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches {
            anyhow::bail!("OpenAI API error 503 Service Unavailable: overloaded");
        }
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.query_status {
            return Err(ProviderHttpError {
                provider: "Azure OpenAI",
                status,
                body: "DeploymentNotFound".to_string(),
            }
            .into());
        }
        Ok(bag_of_words(text))
    }
}

pub enum Step {
    Answer(&'static str),
    Fail(&'static str),
    Hang,
    Panic,
}

/// Generator that replays a fixed script and records every prompt.
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Answer(text)) => Ok(text.to_string()),
            Some(Step::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            }
            Some(Step::Panic) => panic!("generator exploded"),
            None => Err(anyhow::anyhow!("script exhausted")),
        }
    }
}

pub fn entry(i: usize, project: &str, text: &str) -> CorpusEntry {
    CorpusEntry {
        id: format!("upd-{}", i),
        project: project.to_string(),
        date: "2024-05-01".to_string(),
        text: text.to_string(),
    }
}

/// The three-update corpus: A is over budget, B shipped, C has nothing.
pub fn three_entries() -> Vec<CorpusEntry> {
    vec![
        entry(0, "A", "budget shortfall in Q2"),
        entry(1, "B", "shipped v2 release"),
        entry(2, "C", "no update"),
    ]
}

pub fn test_config(extra: &str) -> Config {
    let toml_str = format!(
        "[corpus]\npath = \"unused.json\"\n[generation]\ntimeout_secs = 1\n{}",
        extra
    );
    toml::from_str(&toml_str).unwrap()
}

pub fn engine(
    entries: Vec<CorpusEntry>,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<ScriptedGenerator>,
) -> Arc<QueryEngine> {
    Arc::new(QueryEngine::with_providers(test_config(""), entries, embedder, generator).unwrap())
}
