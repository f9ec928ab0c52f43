//! Embedding provider implementations.
//!
//! Concrete backends for the [`EmbeddingProvider`] trait defined in
//! `status-rag-core`:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: `POST {url}/embeddings` with bearer auth.
//! - **[`AzureOpenAIProvider`]**: `POST {endpoint}/openai/deployments/{deployment}/embeddings`.
//! - **[`GeminiProvider`]**: `POST {url}/models/{model}:batchEmbedContents`.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama instance.
//! - **`LocalProvider`**: fastembed, behind the `local-embeddings-fastembed` feature.
//!
//! # Provider Selection
//!
//! ```rust
//! # use status_rag::config::EmbeddingConfig;
//! # use status_rag::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! Each batch is retried with exponential backoff on 429, 5xx, and
//! network errors, up to `embedding.max_retries` times. Other 4xx
//! responses fail immediately. A batch that still fails is blanked by the
//! index builder rather than aborting the build.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::http::{api_key, build_client, join_url, send_json_with_retry};
pub use status_rag_core::embedding::EmbeddingProvider;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

fn require_model(config: &EmbeddingConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))
}

// ============ Disabled Provider ============

/// Always fails. Used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config, "OpenAI")?;
        let api_key = api_key("OPENAI_API_KEY")?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client: build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = join_url(&self.url, "embeddings");
        let json = send_json_with_retry("OpenAI", max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn probe(&self) -> Result<()> {
        self.request(&["ping".to_string()], 0).await.map(|_| ())
    }
}

// ============ Azure OpenAI Provider ============

/// Embedding provider using an Azure OpenAI deployment.
///
/// `embedding.model` names the deployment and `embedding.url` the resource
/// endpoint. Requires `AZURE_OPENAI_API_KEY`.
pub struct AzureOpenAIProvider {
    deployment: String,
    endpoint: String,
    api_version: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl AzureOpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let deployment = require_model(config, "Azure OpenAI")?;
        let endpoint = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.url required for Azure OpenAI provider"))?;
        let api_key = api_key("AZURE_OPENAI_API_KEY")?;
        Ok(Self {
            deployment,
            endpoint,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            api_key,
            max_retries: config.max_retries,
            client: build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "input": texts });
        let url = join_url(
            &self.endpoint,
            &format!("openai/deployments/{}/embeddings", self.deployment),
        );
        let json = send_json_with_retry("Azure OpenAI", max_retries, || {
            self.client
                .post(&url)
                .query(&[("api-version", self.api_version.as_str())])
                .header("api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAIProvider {
    fn model_name(&self) -> &str {
        &self.deployment
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn probe(&self) -> Result<()> {
        self.request(&["ping".to_string()], 0).await.map(|_| ())
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, json_to_vec(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Convert a JSON number array. Any non-numeric component fails the vector.
fn json_to_vec(values: &[serde_json::Value], provider: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid {} response: embedding component {} is not a number",
                    provider,
                    i
                )
            })
        })
        .collect()
}

// ============ Gemini Provider ============

/// Embedding provider using the Google Gemini API.
///
/// Requires the `GOOGLE_API_KEY` environment variable.
pub struct GeminiProvider {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config, "Gemini")?;
        let api_key = api_key("GOOGLE_API_KEY")?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client: build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let model_path = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });
        let url = join_url(&self.url, &format!("{}:batchEmbedContents", model_path));
        let json = send_json_with_retry("Gemini", max_retries, || {
            self.client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
        })
        .await?;
        parse_gemini_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn probe(&self) -> Result<()> {
        self.request(&["ping".to_string()], 0).await.map(|_| ())
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            let values = e
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
            json_to_vec(values, "Gemini")
        })
        .collect()
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config, "Ollama")?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            max_retries: config.max_retries,
            client: build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = join_url(&self.url, "api/embed");
        let json = send_json_with_retry("Ollama", max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await
        .map_err(|e| e.context(format!("Ollama request failed (is Ollama running at {}?)", self.url)))?;
        parse_ollama_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn probe(&self) -> Result<()> {
        self.request(&["ping".to_string()], 0).await.map(|_| ())
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            let values = e.as_array().ok_or_else(|| {
                anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
            })?;
            json_to_vec(values, "Ollama")
        })
        .collect()
}

/// Create the [`EmbeddingProvider`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"azure"` | [`AzureOpenAIProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
///
/// # Errors
///
/// Unknown provider names, missing model or endpoint settings, and
/// missing API keys (as [`crate::http::MissingApiKey`]).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "azure" => Ok(Arc::new(AzureOpenAIProvider::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
