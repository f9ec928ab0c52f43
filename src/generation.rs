//! Text-generation provider implementations.
//!
//! Each provider makes exactly one HTTP call per `generate` and returns
//! the raw completion text (possibly empty). Timeouts, retries, and
//! failure classification belong to [`crate::answer`]; non-success
//! statuses surface as [`crate::http::ProviderHttpError`] so the
//! classifier sees the status line.
//!
//! | `generation.provider` | Endpoint |
//! |-----------------------|----------|
//! | `openai` | `POST {url}/chat/completions` |
//! | `azure` | `POST {endpoint}/openai/deployments/{deployment}/chat/completions` |
//! | `gemini` | `POST {url}/models/{model}:generateContent` |
//! | `ollama` | `POST {url}/api/generate` |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::embedding::DEFAULT_AZURE_API_VERSION;
use crate::http::{api_key, build_client, join_url, send_json};
pub use status_rag_core::generation::GenerationProvider;

const SYSTEM_PROMPT: &str = "You answer questions about internal project status updates. \
Use only the numbered context you are given and cite sources as [n] or [n,m].";

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Slack added to the HTTP client timeout so the generator's own timeout
/// fires first and is classified as `TIMEOUT`.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

fn client_for(config: &GenerationConfig) -> Result<reqwest::Client> {
    build_client(Duration::from_secs(config.timeout_secs) + CLIENT_TIMEOUT_SLACK)
}

fn require_model(config: &GenerationConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generation.model required for {} provider", provider))
}

// ============ Chat Completions (OpenAI, Azure) ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_request<'a>(
    model: Option<&'a str>,
    prompt: &'a str,
    temperature: f32,
    max_tokens: usize,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        temperature,
        max_tokens,
        messages: vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
    }
}

fn parse_chat_response(json: serde_json::Value, provider: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_value(json)
        .with_context(|| format!("failed to parse {} response", provider))?;
    Ok(parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default())
}

/// Generation via the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = require_model(config, "OpenAI")?;
        let api_key = api_key("OPENAI_API_KEY")?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: client_for(config)?,
        })
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let body = chat_request(Some(&self.model), prompt, self.temperature, max_tokens);
        let request = self
            .client
            .post(join_url(&self.url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = send_json("OpenAI", request).await?;
        parse_chat_response(json, "OpenAI")
    }
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt, self.max_tokens).await
    }

    async fn probe(&self) -> Result<()> {
        self.complete("ping", 1).await.map(|_| ())
    }
}

/// Generation via an Azure OpenAI chat deployment.
///
/// Requires `AZURE_OPENAI_API_KEY`.
pub struct AzureOpenAiGenerator {
    deployment: String,
    endpoint: String,
    api_version: String,
    api_key: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl AzureOpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let deployment = require_model(config, "Azure OpenAI")?;
        let endpoint = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.url required for Azure OpenAI provider"))?;
        let api_key = api_key("AZURE_OPENAI_API_KEY")?;
        Ok(Self {
            deployment,
            endpoint,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: client_for(config)?,
        })
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let body = chat_request(None, prompt, self.temperature, max_tokens);
        let url = join_url(
            &self.endpoint,
            &format!("openai/deployments/{}/chat/completions", self.deployment),
        );
        let request = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body);
        let json = send_json("Azure OpenAI", request).await?;
        parse_chat_response(json, "Azure OpenAI")
    }
}

#[async_trait]
impl GenerationProvider for AzureOpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.deployment
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt, self.max_tokens).await
    }

    async fn probe(&self) -> Result<()> {
        self.complete("ping", 1).await.map(|_| ())
    }
}

// ============ Gemini ============

/// Generation via the Gemini `generateContent` API.
///
/// Requires the `GOOGLE_API_KEY` environment variable.
pub struct GeminiGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = require_model(config, "Gemini")?;
        let api_key = api_key("GOOGLE_API_KEY")?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: client_for(config)?,
        })
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": max_tokens,
            },
        });
        let url = join_url(&self.url, &format!("models/{}:generateContent", self.model));
        let request = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let json = send_json("Gemini", request).await?;
        Ok(parse_gemini_text(&json))
    }
}

fn parse_gemini_text(json: &serde_json::Value) -> String {
    json.pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt, self.max_tokens).await
    }

    async fn probe(&self) -> Result<()> {
        self.complete("ping", 1).await.map(|_| ())
    }
}

// ============ Ollama ============

/// Generation via a local Ollama instance (`stream: false`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = require_model(config, "Ollama")?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: client_for(config)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        let request = self.client.post(join_url(&self.url, "api/generate")).json(&body);
        let json = send_json("Ollama", request).await?;
        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// Create the [`GenerationProvider`] named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        "azure" => Ok(Arc::new(AzureOpenAiGenerator::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let body = chat_request(Some("gpt-4o-mini"), "hello", 0.3, 800);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["max_tokens"], 800);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");

        let azure = serde_json::to_value(chat_request(None, "hello", 0.3, 1)).unwrap();
        assert!(azure.get("model").is_none());
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Budget is short [1]." } }]
        });
        assert_eq!(parse_chat_response(json, "OpenAI").unwrap(), "Budget is short [1].");

        let empty = serde_json::json!({ "choices": [] });
        assert_eq!(parse_chat_response(empty, "OpenAI").unwrap(), "");

        let null_content = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        });
        assert_eq!(parse_chat_response(null_content, "OpenAI").unwrap(), "");
    }

    #[test]
    fn test_parse_gemini_text() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "A " }, { "text": "[1]" }] } }]
        });
        assert_eq!(parse_gemini_text(&json), "A [1]");
        assert_eq!(parse_gemini_text(&serde_json::json!({})), "");
    }

    #[test]
    fn test_unknown_generator() {
        let config = GenerationConfig {
            provider: "palm".to_string(),
            ..Default::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
