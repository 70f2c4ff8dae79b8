//! Ollama HTTP client implementing the oracle traits.
//!
//! Talks to `/api/generate` and `/api/embeddings`. Transient failures
//! (connect errors, timeouts, HTTP 429/5xx) are retried a bounded number of
//! times with exponential backoff; anything else surfaces immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use deskbot_shared::{DeskbotError, Result};

use crate::{CompletionModel, EmbeddingModel};

/// Attempts per oracle call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between attempts.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Per-request timeout for oracle calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for one Ollama model.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: Url,
    model: String,
}

impl OllamaClient {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DeskbotError::config(format!("invalid ollama_url '{base_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeskbotError::Oracle(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
        })
    }

    /// POST `body` to an API path, with bounded retry on transient failures.
    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| DeskbotError::Oracle(format!("bad API path '{path}': {e}")))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_post(&url, body).await {
                Ok(response) => return Ok(response),
                Err((err, transient)) => {
                    if !transient || attempt >= MAX_ATTEMPTS {
                        return Err(err);
                    }
                    let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        model = %self.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "oracle call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// A single POST attempt. The boolean marks retryable failures.
    async fn try_post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &Url,
        body: &B,
    ) -> std::result::Result<R, (DeskbotError, bool)> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let transient = e.is_timeout() || e.is_connect();
                (DeskbotError::Oracle(format!("{url}: {e}")), transient)
            })?;

        let status = response.status();
        if !status.is_success() {
            let transient = status.is_server_error() || status.as_u16() == 429;
            return Err((
                DeskbotError::Oracle(format!("{url}: HTTP {status}")),
                transient,
            ));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| (DeskbotError::Oracle(format!("{url}: bad response: {e}")), false))
    }
}

#[async_trait]
impl CompletionModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_len = prompt.len(), "completion request");

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response: GenerateResponse = self.post_json("/api/generate", &request).await?;
        Ok(response.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingModel for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, text_len = text.len(), "embedding request");

        let request = EmbeddingsRequest {
            model: &self.model,
            prompt: text,
        };
        let response: EmbeddingsResponse = self.post_json("/api/embeddings", &request).await?;

        if response.embedding.is_empty() {
            return Err(DeskbotError::Oracle(format!(
                "model '{}' returned an empty embedding",
                self.model
            )));
        }
        Ok(response.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
