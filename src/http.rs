//! Shared HTTP plumbing for the provider clients.

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;

/// A provider answered with a non-success status.
///
/// Carried inside `anyhow::Error` so callers can recover the status with
/// `downcast_ref` (a 404 means the model or deployment does not exist).
#[derive(Debug, thiserror::Error)]
#[error("{provider} API error {status}: {body}")]
pub struct ProviderHttpError {
    pub provider: &'static str,
    pub status: StatusCode,
    pub body: String,
}

impl ProviderHttpError {
    pub fn is_retryable(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS || self.status.is_server_error()
    }
}

/// A provider's API key is missing from the environment.
#[derive(Debug, thiserror::Error)]
#[error("{0} environment variable not set")]
pub struct MissingApiKey(pub &'static str);

/// Read a required API key.
pub fn api_key(var: &'static str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(MissingApiKey(var).into()),
    }
}

/// HTTP status of a provider failure, if it was one.
pub fn error_status(err: &anyhow::Error) -> Option<StatusCode> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ProviderHttpError>())
        .map(|e| e.status)
}

/// Whether `err` reports a missing model or deployment.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    error_status(err) == Some(StatusCode::NOT_FOUND)
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Send one request and decode a JSON success body.
pub async fn send_json(provider: &'static str, request: RequestBuilder) -> Result<serde_json::Value> {
    let response = request
        .header("Content-Type", "application/json")
        .send()
        .await
        .with_context(|| format!("{} request failed", provider))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderHttpError {
            provider,
            status,
            body,
        }
        .into());
    }

    response
        .json()
        .await
        .with_context(|| format!("failed to parse {} response", provider))
}

/// [`send_json`] with exponential backoff.
///
/// Retries on 429, 5xx, and transport errors; fails immediately on other
/// client errors. Backoff: 1s, 2s, 4s, ... capped at 2^5.
pub async fn send_json_with_retry<F>(
    provider: &'static str,
    max_retries: u32,
    make_request: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match send_json(provider, make_request()).await {
            Ok(json) => return Ok(json),
            Err(e) => {
                let retryable = match e.downcast_ref::<ProviderHttpError>() {
                    Some(http) => http.is_retryable(),
                    None => true,
                };
                if !retryable {
                    return Err(e);
                }
                tracing::debug!(provider, attempt, error = %e, "retrying provider request");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", provider)))
}

/// Join a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
