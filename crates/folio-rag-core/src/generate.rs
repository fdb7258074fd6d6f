//! Answer generation with retry, streaming and usage accounting.
//!
//! [`ResponseGenerator`] assembles the prompt with a [`ContextAssembler`],
//! calls the completion service and records the call in the
//! [`UsageLedger`] once it has finished.
//!
//! Retry strategy:
//! - Rate limits, connection errors, timeouts and 5xx → retry after
//!   1s, 2s, 4s (configurable), or after the server's `Retry-After` when
//!   that is longer
//! - Other errors → fail immediately
//! - Streams are only retried while nothing has been forwarded
//!
//! [`ResponseGenerator::generate`] and
//! [`ResponseGenerator::generate_stream`] never fail: unrecoverable errors
//! become a fixed apology flagged `degraded`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::completion::{CompletionClient, CompletionRequest, CompletionResponse};
use crate::context::{AssembledPrompt, ContextAssembler};
use crate::error::{CompletionError, GenerationError};
use crate::intent::Intent;
use crate::ledger::{RequestType, UsageLedger};
use crate::models::{ConversationExchange, GeneratedAnswer, ScoredCandidate};
use crate::prompts::PromptSet;

/// How often and how long to wait between completion attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before retry `n` is `delays[n - 1]`; the last entry repeats.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            delays: Vec::new(),
        }
    }

    fn delay(&self, retry: usize) -> Duration {
        self.delays
            .get(retry.saturating_sub(1))
            .or(self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Wait before retry `retry` after `error`; a server `Retry-After` is honoured if longer.
    fn wait(&self, retry: usize, error: &CompletionError) -> Duration {
        let backoff = self.delay(retry);
        match error {
            CompletionError::RateLimited {
                retry_after_secs: Some(secs),
            } => backoff.max(Duration::from_secs(*secs)),
            _ => backoff,
        }
    }
}

/// Fixed knobs for answer generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_response_tokens: usize,
    /// Returned when a non-streamed generation fails.
    pub fallback_message: String,
    /// Sent into the stream when a streamed generation fails.
    pub stream_error_message: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_response_tokens: 600,
            fallback_message: "I apologize, but I encountered an error. Please try again."
                .to_string(),
            stream_error_message: "I encountered an error generating the response.".to_string(),
        }
    }
}

/// Inputs for one answer.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    pub intent: Intent,
    pub candidates: &'a [ScoredCandidate],
    pub history: &'a [ConversationExchange],
    pub session_id: Option<&'a str>,
}

pub struct ResponseGenerator {
    client: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    prompts: PromptSet,
    ledger: Arc<UsageLedger>,
    retry: RetryPolicy,
    settings: GenerationSettings,
}

impl ResponseGenerator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        assembler: ContextAssembler,
        prompts: PromptSet,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            client,
            assembler,
            prompts,
            ledger,
            retry: RetryPolicy::default(),
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    fn prepare(&self, req: &GenerationRequest<'_>) -> (AssembledPrompt, CompletionRequest) {
        let system_prompt = self.prompts.system_prompt(req.intent);
        let assembled = self
            .assembler
            .assemble(&system_prompt, req.candidates, req.history, req.query);
        tracing::debug!(
            input_tokens = assembled.input_tokens,
            context_docs = assembled.context.documents_used,
            history = assembled.history_exchanges,
            "assembled prompt"
        );
        let request = CompletionRequest::new(
            assembled.messages.clone(),
            self.settings.temperature,
            self.settings.max_response_tokens,
        );
        (assembled, request)
    }

    /// Sources and document count come from what the prompt actually carried.
    fn answer(&self, intent: Intent, text: String, assembled: AssembledPrompt) -> GeneratedAnswer {
        GeneratedAnswer {
            text,
            suggestions: self.prompts.suggestions(intent),
            sources: assembled.context.sources,
            input_tokens: assembled.input_tokens,
            context_docs: assembled.context.documents_used,
            degraded: false,
        }
    }

    /// Generate a complete answer, surfacing the failure if every attempt fails.
    pub async fn try_generate(
        &self,
        req: &GenerationRequest<'_>,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let (assembled, request) = self.prepare(req);
        let response = self.complete_with_retry(&request).await?;

        let (prompt_tokens, completion_tokens) = match response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (
                assembled.input_tokens,
                self.assembler.counter().count(&response.text),
            ),
        };
        self.ledger.track(
            prompt_tokens,
            completion_tokens,
            self.client.model_name(),
            RequestType::Chat,
            req.session_id,
        );

        Ok(self.answer(req.intent, response.text, assembled))
    }

    /// Generate a complete answer, or the fallback message on failure.
    pub async fn generate(&self, req: &GenerationRequest<'_>) -> GeneratedAnswer {
        match self.try_generate(req).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, intent = %req.intent, "response generation failed");
                GeneratedAnswer::fallback(self.settings.fallback_message.clone())
            }
        }
    }

    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GenerationError> {
        let mut attempt = 0;
        loop {
            match self.client.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_transient() => return Err(GenerationError::Permanent(e)),
                Err(e) if attempt >= self.retry.max_retries => {
                    return Err(GenerationError::Exhausted {
                        attempts: attempt + 1,
                        source: e,
                    })
                }
                Err(e) => {
                    attempt += 1;
                    let wait = self.retry.wait(attempt, &e);
                    tracing::warn!(attempt, ?wait, error = %e, "completion failed, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Stream an answer into `sink`, returning the accumulated result.
    ///
    /// Usage is recorded only after the stream has finished.
    pub async fn try_generate_stream(
        &self,
        req: &GenerationRequest<'_>,
        sink: &mpsc::Sender<String>,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let (assembled, request) = self.prepare(req);

        let mut attempt = 0;
        let text = loop {
            let outcome = self.stream_once(&request, sink).await;
            if outcome.sink_closed {
                return Err(GenerationError::Cancelled);
            }
            match outcome.result {
                Ok(()) => break outcome.text,
                Err(e) if !outcome.text.is_empty() => {
                    return Err(GenerationError::StreamInterrupted(e))
                }
                Err(e) if !e.is_transient() => return Err(GenerationError::Permanent(e)),
                Err(e) if attempt >= self.retry.max_retries => {
                    return Err(GenerationError::Exhausted {
                        attempts: attempt + 1,
                        source: e,
                    })
                }
                Err(e) => {
                    attempt += 1;
                    let wait = self.retry.wait(attempt, &e);
                    tracing::warn!(attempt, ?wait, error = %e, "stream failed before output, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        };

        let completion_tokens = self.assembler.counter().count(&text);
        self.ledger.track(
            assembled.input_tokens,
            completion_tokens,
            self.client.model_name(),
            RequestType::ChatStream,
            req.session_id,
        );

        Ok(self.answer(req.intent, text, assembled))
    }

    /// Stream an answer into `sink`; on failure the error message is streamed instead.
    pub async fn generate_stream(
        &self,
        req: &GenerationRequest<'_>,
        sink: &mpsc::Sender<String>,
    ) -> GeneratedAnswer {
        match self.try_generate_stream(req, sink).await {
            Ok(answer) => answer,
            Err(GenerationError::Cancelled) => {
                tracing::info!("stream receiver dropped, abandoning generation");
                GeneratedAnswer::fallback(String::new())
            }
            Err(e) => {
                tracing::error!(error = %e, intent = %req.intent, "stream generation failed");
                let message = self.settings.stream_error_message.clone();
                // Receiver may already be gone; nothing left to report to.
                let _ = sink.send(message.clone()).await;
                GeneratedAnswer::fallback(message)
            }
        }
    }

    async fn stream_once(&self, request: &CompletionRequest, sink: &mpsc::Sender<String>) -> StreamOutcome {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let produce = self.client.complete_streaming(request, tx);
        let forward = async move {
            let mut text = String::new();
            let mut sink_closed = false;
            while let Some(delta) = rx.recv().await {
                if sink.send(delta.clone()).await.is_err() {
                    sink_closed = true;
                    break;
                }
                text.push_str(&delta);
            }
            (text, sink_closed)
        };
        let (result, (text, sink_closed)) = tokio::join!(produce, forward);
        StreamOutcome {
            result,
            text,
            sink_closed,
        }
    }
}

struct StreamOutcome {
    result: Result<(), CompletionError>,
    text: String,
    sink_closed: bool,
}
