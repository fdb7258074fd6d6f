//! End-to-end handling of one chat message.
//!
//! ```text
//! classify → cache lookup → retrieve (+rerank) → generate → session append → cache store
//! ```
//!
//! The streaming path skips the cache lookup and reranking, and never
//! stores its answer. Fallback answers are neither cached nor appended to
//! the session. Cache and session writes only happen after generation has
//! completed, so an abandoned request leaves no partial state behind.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::cache::{CacheStats, ResponseCache};
use crate::classify::{ClassifierContext, IntentClassifier};
use crate::generate::{GenerationRequest, ResponseGenerator};
use crate::intent::Intent;
use crate::ledger::{UsageLedger, UsageStats};
use crate::models::{ConversationExchange, GeneratedAnswer};
use crate::retrieve::Retriever;
use crate::session::HistoryStore;

/// One incoming message.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    /// A new session ID is generated when absent.
    pub session_id: Option<String>,
    pub current_section: Option<String>,
    /// Defaults to the session's current topic.
    pub previous_topic: Option<Intent>,
    /// Skip classification and use this intent.
    pub intent: Option<Intent>,
    /// Bypass the response cache for this message.
    pub skip_cache: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The answer to one message and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub answer: GeneratedAnswer,
    pub intent: Intent,
    pub session_id: String,
    pub cached: bool,
}

/// Cache and usage counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub cache: CacheStats,
    pub usage: UsageStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_usage: Option<UsageStats>,
}

pub struct ChatPipeline {
    classifier: IntentClassifier,
    retriever: Retriever,
    generator: ResponseGenerator,
    cache: Arc<ResponseCache>,
    sessions: Arc<dyn HistoryStore>,
    ledger: Arc<UsageLedger>,
    cache_enabled: bool,
}

impl ChatPipeline {
    pub fn new(
        classifier: IntentClassifier,
        retriever: Retriever,
        generator: ResponseGenerator,
        cache: Arc<ResponseCache>,
        sessions: Arc<dyn HistoryStore>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            classifier,
            retriever,
            generator,
            cache,
            sessions,
            ledger,
            cache_enabled: true,
        }
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn stats(&self, session_id: Option<&str>) -> PipelineStats {
        PipelineStats {
            cache: self.cache.stats(),
            usage: self.ledger.total_stats(),
            session_usage: session_id.map(|id| self.ledger.session_stats(id)),
        }
    }

    /// Session ID, prior history and classified intent for `req`.
    async fn prepare(&self, req: &ChatRequest) -> (String, Vec<ConversationExchange>, Intent) {
        let session_id = req
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let history = self.sessions.history(&session_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, %session_id, "session history unavailable");
            Vec::new()
        });

        let previous_topic = match req.previous_topic {
            Some(topic) => Some(topic),
            None => self
                .sessions
                .current_topic(&session_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, %session_id, "session topic unavailable");
                    None
                }),
        };

        let intent = match req.intent {
            Some(intent) => intent,
            None => {
                let ctx = ClassifierContext {
                    current_section: req.current_section.clone(),
                    previous_topic,
                };
                self.classifier
                    .classify(req.message.trim(), &ctx, Some(&session_id))
                    .await
            }
        };
        tracing::info!(intent = %intent, previous_topic = ?previous_topic, "classified intent");

        (session_id, history, intent)
    }

    async fn record_exchange(&self, session_id: &str, message: &str, answer: &GeneratedAnswer, intent: Intent) {
        let exchange = ConversationExchange::new(message, answer.text.clone()).with_intent(intent);
        if let Err(e) = self.sessions.append(session_id, exchange).await {
            tracing::warn!(error = %e, session_id, "failed to update session");
        }
    }

    /// Answer one message.
    pub async fn chat(&self, req: &ChatRequest) -> ChatReply {
        let message = req.message.trim();
        let (session_id, history, intent) = self.prepare(req).await;
        let use_cache = self.cache_enabled && !req.skip_cache;

        if use_cache {
            if let Some(answer) = self.cache.get(message, intent) {
                tracing::info!(%session_id, "cache hit");
                self.record_exchange(&session_id, message, &answer, intent).await;
                return ChatReply {
                    answer,
                    intent,
                    session_id,
                    cached: true,
                };
            }
        }

        let candidates = self
            .retriever
            .retrieve(message, intent, None, true, Some(&session_id))
            .await;
        tracing::info!(documents = candidates.len(), "retrieved documents");

        let answer = self
            .generator
            .generate(&GenerationRequest {
                query: message,
                intent,
                candidates: &candidates,
                history: &history,
                session_id: Some(&session_id),
            })
            .await;

        if !answer.degraded {
            self.record_exchange(&session_id, message, &answer, intent).await;
            if use_cache {
                self.cache.set(message, intent, answer.clone());
            }
        }

        ChatReply {
            answer,
            intent,
            session_id,
            cached: false,
        }
    }

    /// Answer one message, streaming text deltas into `sink`.
    pub async fn chat_stream(&self, req: &ChatRequest, sink: &mpsc::Sender<String>) -> ChatReply {
        let message = req.message.trim();
        let (session_id, history, intent) = self.prepare(req).await;

        let candidates = self
            .retriever
            .retrieve(message, intent, None, false, Some(&session_id))
            .await;

        let answer = self
            .generator
            .generate_stream(
                &GenerationRequest {
                    query: message,
                    intent,
                    candidates: &candidates,
                    history: &history,
                    session_id: Some(&session_id),
                },
                sink,
            )
            .await;

        if !answer.degraded {
            self.record_exchange(&session_id, message, &answer, intent).await;
        }

        ChatReply {
            answer,
            intent,
            session_id,
            cached: false,
        }
    }
}
