//! OpenAI-compatible embedding and chat-completion adapters.
//!
//! - **[`OpenAiEmbedder`]** calls `POST {base}/embeddings` with retry and backoff.
//! - **[`OpenAiChatClient`]** calls `POST {base}/chat/completions`, either
//!   as a single JSON response or as a server-sent event stream.
//!
//! # Retry Strategy
//!
//! The embedder retries on its own:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! The chat client makes exactly one attempt per call and reports *why*
//! it failed through [`CompletionError`]; the response generator decides
//! whether to retry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use folio_rag_core::completion::{CompletionClient, CompletionRequest, CompletionResponse, Usage};
use folio_rag_core::embedding::Embedder;
use folio_rag_core::error::CompletionError;

use crate::config::Config;

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

// ============ Embeddings ============

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    backoff: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: endpoint(base_url, "embeddings"),
            api_key: api_key.into(),
            model: model.into(),
            max_retries: 5,
            backoff: Duration::from_secs(1),
        })
    }

    /// Build from the `[embedding]` section, reading the API key from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.embedding_base_url(),
            config.api_key()?,
            config.embedding.model.clone(),
            Duration::from_secs(config.embedding.timeout_secs),
        )?
        .with_max_retries(config.embedding.max_retries))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay; retry `n` waits `backoff * 2^(n-1)`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = self.backoff * (1 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return parse_embedding_response(&json, texts.len());
                    }

                    // Rate limited or server error, retry
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Embedding API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error other than 429 is final
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Extract `data[].embedding` in input order.
fn parse_embedding_response(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    if indexed.len() != expected {
        bail!(
            "Invalid embedding response: expected {} embeddings, got {}",
            expected,
            indexed.len()
        );
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

// ============ Chat completions ============

/// Completion client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: endpoint(base_url, "chat/completions"),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from the `[llm]` section, reading the API key from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.llm.base_url,
            config.api_key()?,
            config.llm.model.clone(),
            config.llm.timeout(),
        )
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": stream,
        })
    }

    /// Send one request, mapping transport and HTTP failures.
    async fn send(&self, body: &Value) -> Result<reqwest::Response, CompletionError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "completion request failed");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited { retry_after_secs });
        }
        Err(CompletionError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport_error(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Connection(e.to_string())
    }
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let response = self.send(&self.body(request, false)).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        parse_completion(&json)
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<(), CompletionError> {
        let response = self.send(&self.body(request, true)).await?;

        let mut byte_stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(transport_error)?;
            pending.extend_from_slice(&bytes);

            while let Some(line) = next_line(&mut pending) {
                let Some(data) = line.trim().strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(());
                }
                if let Some(delta) = parse_stream_delta(data)? {
                    if tx.send(delta).await.is_err() {
                        // Receiver gone; stop reading.
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Text and usage of a non-streamed completion.
fn parse_completion(json: &Value) -> Result<CompletionResponse, CompletionError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| CompletionError::Malformed("missing choices[0].message.content".into()))?
        .to_string();

    let usage = json.get("usage").and_then(|u| {
        Some(Usage {
            prompt_tokens: u.get("prompt_tokens")?.as_u64()? as usize,
            completion_tokens: u.get("completion_tokens")?.as_u64()? as usize,
        })
    });

    Ok(CompletionResponse { text, usage })
}

/// Pops the next `\n`-terminated line off `pending`.
///
/// Bytes are only decoded once the whole line has arrived, so a multi-byte
/// character split across network chunks stays intact.
fn next_line(pending: &mut Vec<u8>) -> Option<String> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = pending.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Content delta of one SSE `data:` payload, if it carries any text.
fn parse_stream_delta(data: &str) -> Result<Option<String>, CompletionError> {
    let json: Value = serde_json::from_str(data)
        .map_err(|e| CompletionError::Malformed(format!("bad stream chunk: {e}")))?;
    Ok(json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}
