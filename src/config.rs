//! TOML configuration.
//!
//! Every section except `[corpus]` may be omitted; omitted keys take the
//! defaults below. API keys are never read from the file, only from the
//! environment (see [`crate::embedding`] and [`crate::generation`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use status_rag_core::index::IndexParams;
use status_rag_core::mention::MentionPolicy;

pub const DEFAULT_FALLBACK_ANSWER: &str =
    "The provided updates do not contain information about this.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// JSON array of update records.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL (OpenAI, Ollama) or resource endpoint (Azure).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            url: None,
            api_version: None,
            batch_size: default_batch_size(),
            max_input_chars: default_max_input_chars(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    20
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Prompt template; the bundled template is used when unset.
    #[serde(default)]
    pub prompt_path: Option<PathBuf>,
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            api_version: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            prompt_path: None,
            fallback_answer: default_fallback_answer(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> usize {
    800
}
fn default_max_attempts() -> usize {
    2
}
fn default_fallback_answer() -> String {
    DEFAULT_FALLBACK_ANSWER.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_entries")]
    pub max_context_entries: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_min_trim_entries")]
    pub min_trim_entries: usize,
    #[serde(default = "default_trim_entry_chars")]
    pub trim_entry_chars: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_max_blank_ratio")]
    pub max_blank_ratio: f64,
    #[serde(default)]
    pub mention_policy: MentionPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_entries: default_max_context_entries(),
            max_context_chars: default_max_context_chars(),
            min_trim_entries: default_min_trim_entries(),
            trim_entry_chars: default_trim_entry_chars(),
            snippet_chars: default_snippet_chars(),
            min_query_chars: default_min_query_chars(),
            max_blank_ratio: default_max_blank_ratio(),
            mention_policy: MentionPolicy::default(),
        }
    }
}

fn default_top_k() -> usize {
    25
}
fn default_max_context_entries() -> usize {
    60
}
fn default_max_context_chars() -> usize {
    45_000
}
fn default_min_trim_entries() -> usize {
    8
}
fn default_trim_entry_chars() -> usize {
    1200
}
fn default_snippet_chars() -> usize {
    420
}
fn default_min_query_chars() -> usize {
    3
}
fn default_max_blank_ratio() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Config {
    /// Parameters for [`status_rag_core::index::build_index`].
    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            batch_size: self.embedding.batch_size,
            max_input_chars: self.embedding.max_input_chars,
            max_blank_ratio: self.retrieval.max_blank_ratio,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "azure" | "gemini" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, azure, gemini, ollama, or local.",
            other
        ),
    }
    if config.embedding.provider == "azure" && config.embedding.url.is_none() {
        anyhow::bail!("embedding.url (the Azure resource endpoint) is required for provider 'azure'");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "openai" | "azure" | "gemini" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be openai, azure, gemini, or ollama.",
            other
        ),
    }
    if config.generation.provider == "azure" && config.generation.url.is_none() {
        anyhow::bail!("generation.url (the Azure resource endpoint) is required for provider 'azure'");
    }
    if config.generation.max_attempts < 1 {
        anyhow::bail!("generation.max_attempts must be >= 1");
    }
    if config.generation.timeout_secs == 0 {
        anyhow::bail!("generation.timeout_secs must be > 0");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if r.max_context_entries < 1 {
        anyhow::bail!("retrieval.max_context_entries must be >= 1");
    }
    if r.max_context_chars < 1 {
        anyhow::bail!("retrieval.max_context_chars must be >= 1");
    }
    if r.min_trim_entries < 1 {
        anyhow::bail!("retrieval.min_trim_entries must be >= 1");
    }
    if r.trim_entry_chars < 1 {
        anyhow::bail!("retrieval.trim_entry_chars must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.max_blank_ratio) {
        anyhow::bail!("retrieval.max_blank_ratio must be in [0.0, 1.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_takes_defaults() {
        let config = parse("[corpus]\npath = \"data/updates.json\"\n").unwrap();
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.embedding.batch_size, 20);
        assert_eq!(config.embedding.max_input_chars, 8000);
        assert_eq!(config.generation.max_attempts, 2);
        assert_eq!(config.generation.timeout_secs, 30);
        assert_eq!(config.generation.fallback_answer, DEFAULT_FALLBACK_ANSWER);
        assert_eq!(config.retrieval.top_k, 25);
        assert_eq!(config.retrieval.max_context_entries, 60);
        assert_eq!(config.retrieval.max_context_chars, 45_000);
        assert_eq!(config.retrieval.min_trim_entries, 8);
        assert_eq!(config.retrieval.trim_entry_chars, 1200);
        assert_eq!(config.retrieval.min_query_chars, 3);
        assert_eq!(config.retrieval.mention_policy, MentionPolicy::All);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
    }

    #[test]
    fn test_mention_policy_any() {
        let config = parse(
            "[corpus]\npath = \"u.json\"\n[retrieval]\nmention_policy = \"any\"\n",
        )
        .unwrap();
        assert_eq!(config.retrieval.mention_policy, MentionPolicy::Any);
    }

    #[test]
    fn test_rejects_unknown_providers() {
        let err = parse("[corpus]\npath = \"u.json\"\n[embedding]\nprovider = \"cohere\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));

        let err = parse("[corpus]\npath = \"u.json\"\n[generation]\nprovider = \"palm\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let err = parse(
            "[corpus]\npath = \"u.json\"\n[embedding]\nprovider = \"azure\"\nmodel = \"embed\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.url"));
    }

    #[test]
    fn test_rejects_bad_ratio_and_zero_caps() {
        assert!(parse("[corpus]\npath = \"u.json\"\n[retrieval]\nmax_blank_ratio = 1.5\n").is_err());
        assert!(parse("[corpus]\npath = \"u.json\"\n[retrieval]\nmax_context_entries = 0\n").is_err());
        assert!(parse("[corpus]\npath = \"u.json\"\n[generation]\nmax_attempts = 0\n").is_err());
        assert!(parse("[corpus]\npath = \"u.json\"\n[embedding]\nbatch_size = 0\n").is_err());
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srag.toml");
        std::fs::write(&path, "[corpus]\npath = \"u.json\"\n[server]\nbind = \"0.0.0.0:9000\"\n")
            .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");

        let missing = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
