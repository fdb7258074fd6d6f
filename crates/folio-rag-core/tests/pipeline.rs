//! End-to-end tests of the chat pipeline over in-memory services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use folio_rag_core::cache::ResponseCache;
use folio_rag_core::classify::{IntentClassifier, RuleClassifier};
use folio_rag_core::completion::{CompletionClient, CompletionRequest, CompletionResponse, Usage};
use folio_rag_core::context::{ContextAssembler, ContextBudget};
use folio_rag_core::embedding::Embedder;
use folio_rag_core::error::{CompletionError, RerankError};
use folio_rag_core::generate::{ResponseGenerator, RetryPolicy};
use folio_rag_core::intent::Intent;
use folio_rag_core::ledger::{RequestType, UsageLedger};
use folio_rag_core::models::{DocumentChunk, ScoredCandidate};
use folio_rag_core::pipeline::{ChatPipeline, ChatRequest};
use folio_rag_core::prompts::PromptSet;
use folio_rag_core::rerank::Reranker;
use folio_rag_core::retrieve::Retriever;
use folio_rag_core::session::{HistoryStore, InMemorySessionStore};
use folio_rag_core::store::memory::InMemoryIndex;
use folio_rag_core::store::VectorIndex;
use folio_rag_core::tokens::TokenCounter;

const QUERY: &str = "what is your experience with caching?";

/// Every text embeds to the x axis, so a chunk's similarity is its x component.
struct AxisEmbedder;

#[async_trait]
impl Embedder for AxisEmbedder {
    fn model_name(&self) -> &str {
        "axis"
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        text.split_whitespace()
            .take(max_tokens)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Answers every request with the same text and records what it was sent.
struct EchoClient {
    reply: &'static str,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl EchoClient {
    fn new(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CompletionClient for EchoClient {
    fn model_name(&self) -> &str {
        "gpt-4o-mini"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CompletionResponse {
            text: self.reply.to_string(),
            usage: Some(Usage {
                prompt_tokens: 120,
                completion_tokens: 30,
            }),
        })
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<(), CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        for word in self.reply.split_inclusive(' ') {
            if tx.send(word.to_string()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Always fails with a server error.
struct DownClient;

#[async_trait]
impl CompletionClient for DownClient {
    fn model_name(&self) -> &str {
        "gpt-4o-mini"
    }

    async fn complete(&self, _: &CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        Err(CompletionError::Api {
            status: 503,
            message: "unavailable".into(),
        })
    }

    async fn complete_streaming(
        &self,
        _: &CompletionRequest,
        _: mpsc::Sender<String>,
    ) -> Result<(), CompletionError> {
        Err(CompletionError::Api {
            status: 503,
            message: "unavailable".into(),
        })
    }
}

struct BrokenReranker;

#[async_trait]
impl Reranker for BrokenReranker {
    async fn rerank(
        &self,
        _query: &str,
        _candidates: &[ScoredCandidate],
    ) -> Result<Vec<ScoredCandidate>, RerankError> {
        Err(RerankError::Timeout)
    }
}

fn unit(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}

/// Four experience chunks; only the first two clear the 0.25 threshold.
fn corpus() -> Arc<InMemoryIndex> {
    let index = InMemoryIndex::new();
    index.insert(
        DocumentChunk::new("Led the caching layer rewrite for the billing platform.")
            .with_meta("category", "experience")
            .with_meta("source", "experience/billing.md"),
        unit(0.9),
    );
    index.insert(
        DocumentChunk::new("Ran the on-call rotation for the payments team.")
            .with_meta("category", "experience")
            .with_meta("source", "experience/payments.md"),
        unit(0.6),
    );
    index.insert(
        DocumentChunk::new("Mentored interns on frontend testing.")
            .with_meta("category", "experience")
            .with_meta("source", "experience/mentoring.md"),
        unit(0.2),
    );
    index.insert(
        DocumentChunk::new("Organised the office book club.")
            .with_meta("category", "experience")
            .with_meta("source", "experience/club.md"),
        unit(0.1),
    );
    Arc::new(index)
}

struct Harness {
    pipeline: ChatPipeline,
    sessions: Arc<InMemorySessionStore>,
    ledger: Arc<UsageLedger>,
}

fn harness(client: Arc<dyn CompletionClient>) -> Harness {
    let ledger = Arc::new(UsageLedger::default());
    let sessions = Arc::new(InMemorySessionStore::default());
    let retriever = Retriever::new(
        Arc::new(AxisEmbedder),
        Some(corpus() as Arc<dyn VectorIndex>),
    )
    .with_usage(ledger.clone(), Arc::new(WordCounter));
    let assembler = ContextAssembler::new(Arc::new(WordCounter), ContextBudget::default());
    let generator = ResponseGenerator::new(client, assembler, PromptSet::default(), ledger.clone())
        .with_retry(RetryPolicy::immediate(1));
    let pipeline = ChatPipeline::new(
        IntentClassifier::new(RuleClassifier::new().unwrap()),
        retriever,
        generator,
        Arc::new(ResponseCache::new(Duration::from_secs(3600), 100)),
        sessions.clone(),
        ledger.clone(),
    );
    Harness {
        pipeline,
        sessions,
        ledger,
    }
}

fn experience_request(session: &str) -> ChatRequest {
    ChatRequest {
        intent: Some(Intent::ExperienceDeepdive),
        ..ChatRequest::new(QUERY).in_session(session)
    }
}

#[tokio::test]
async fn test_only_documents_above_threshold_reach_the_prompt() {
    let retriever = Retriever::new(
        Arc::new(AxisEmbedder),
        Some(corpus() as Arc<dyn VectorIndex>),
    );
    let candidates = retriever
        .retrieve(QUERY, Intent::ExperienceDeepdive, None, false, None)
        .await;

    let contents: Vec<&str> = candidates.iter().map(|c| c.chunk.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "Led the caching layer rewrite for the billing platform.",
            "Ran the on-call rotation for the payments team.",
        ]
    );
    assert!(candidates[0].keyword_score > 0.0);
    assert!(candidates[0].hybrid_score > candidates[1].hybrid_score);

    let assembler = ContextAssembler::new(Arc::new(WordCounter), ContextBudget::default());
    let context = assembler.prepare_context(&candidates);
    assert_eq!(context.documents_used, 2);
    assert!(!context.truncated);
}

#[tokio::test]
async fn test_chat_answers_from_retrieved_context() {
    let client = EchoClient::new("I rebuilt the billing cache.");
    let h = harness(client.clone());

    let reply = h.pipeline.chat(&experience_request("s1")).await;

    assert_eq!(reply.answer.text, "I rebuilt the billing cache.");
    assert_eq!(reply.intent, Intent::ExperienceDeepdive);
    assert_eq!(reply.session_id, "s1");
    assert!(!reply.cached);
    assert!(!reply.answer.degraded);
    assert_eq!(reply.answer.context_docs, 2);
    assert_eq!(
        reply.answer.sources,
        vec!["experience/billing.md", "experience/payments.md"]
    );

    let request = client.last_request();
    let context = &request.messages[1].content;
    assert!(context.contains("caching layer rewrite"));
    assert!(context.contains("on-call rotation"));
    assert!(!context.contains("book club"));
    assert_eq!(request.messages.last().unwrap().content, QUERY);

    let history = h.sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].intent, Some(Intent::ExperienceDeepdive));

    let stats = h.ledger.session_stats("s1");
    assert_eq!(stats.request_count, 2);
    assert_eq!(stats.by_type[&RequestType::Chat].tokens, 150);
}

#[tokio::test]
async fn test_query_embedding_is_billed_to_the_session() {
    let h = harness(EchoClient::new("Sure."));

    h.pipeline.chat(&experience_request("s1")).await;

    let stats = h.ledger.session_stats("s1");
    let embedding = &stats.by_type[&RequestType::Embedding];
    assert_eq!(embedding.count, 1);
    // six query words plus four expansion terms
    assert_eq!(embedding.tokens, 10);
    assert_eq!(stats.total_tokens, 160);
}

#[tokio::test]
async fn test_repeat_question_is_served_from_cache() {
    let client = EchoClient::new("Cached answer.");
    let h = harness(client.clone());

    let first = h.pipeline.chat(&experience_request("s1")).await;
    let second = h.pipeline.chat(&experience_request("s1")).await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.answer, first.answer);
    assert_eq!(client.request_count(), 1);

    let stats = h.pipeline.stats(Some("s1"));
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache.misses, 1);
    assert_eq!(stats.cache.size, 1);
    assert_eq!(h.sessions.history("s1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cache_can_be_bypassed() {
    let client = EchoClient::new("Fresh answer.");
    let h = harness(client.clone());

    h.pipeline.chat(&experience_request("s1")).await;
    let bypass = ChatRequest {
        skip_cache: true,
        ..experience_request("s1")
    };
    let reply = h.pipeline.chat(&bypass).await;

    assert!(!reply.cached);
    assert_eq!(client.request_count(), 2);
}

#[tokio::test]
async fn test_failed_generation_is_not_remembered() {
    let h = harness(Arc::new(DownClient));

    let reply = h.pipeline.chat(&experience_request("s1")).await;

    assert!(reply.answer.degraded);
    assert_eq!(
        reply.answer.text,
        "I apologize, but I encountered an error. Please try again."
    );
    assert_eq!(h.pipeline.cache().len(), 0);
    assert!(h.sessions.history("s1").await.unwrap().is_empty());
    let usage = h.ledger.total_stats();
    assert!(!usage.by_type.contains_key(&RequestType::Chat));
    assert_eq!(usage.by_type[&RequestType::Embedding].count, 1);
}

#[tokio::test]
async fn test_missing_session_id_is_generated() {
    let h = harness(EchoClient::new("Hello."));

    let reply = h.pipeline.chat(&ChatRequest::new("hello")).await;

    assert!(uuid::Uuid::parse_str(&reply.session_id).is_ok());
    assert_eq!(h.sessions.history(&reply.session_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stream_forwards_deltas_and_skips_cache() {
    let client = EchoClient::new("Streaming works fine.");
    let h = harness(client.clone());
    let (tx, mut rx) = mpsc::channel(16);

    let reply = h.pipeline.chat_stream(&experience_request("s2"), &tx).await;
    drop(tx);

    let mut streamed = String::new();
    while let Some(delta) = rx.recv().await {
        streamed.push_str(&delta);
    }
    assert_eq!(streamed, "Streaming works fine.");
    assert_eq!(reply.answer.text, "Streaming works fine.");
    assert!(!reply.cached);
    assert_eq!(h.pipeline.cache().len(), 0);
    assert_eq!(h.sessions.history("s2").await.unwrap().len(), 1);
    assert!(h
        .ledger
        .session_stats("s2")
        .by_type
        .contains_key(&RequestType::ChatStream));
}

#[tokio::test]
async fn test_stream_failure_sends_error_message() {
    let h = harness(Arc::new(DownClient));
    let (tx, mut rx) = mpsc::channel(16);

    let reply = h.pipeline.chat_stream(&experience_request("s3"), &tx).await;
    drop(tx);

    assert!(reply.answer.degraded);
    assert_eq!(
        rx.recv().await.as_deref(),
        Some("I encountered an error generating the response.")
    );
    assert!(h.sessions.history("s3").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rerank_failure_keeps_fused_order() {
    let plain = Retriever::new(
        Arc::new(AxisEmbedder),
        Some(corpus() as Arc<dyn VectorIndex>),
    );
    let with_broken = Retriever::new(
        Arc::new(AxisEmbedder),
        Some(corpus() as Arc<dyn VectorIndex>),
    )
    .with_reranker(Arc::new(BrokenReranker));

    let expected = plain
        .retrieve(QUERY, Intent::ExperienceDeepdive, None, false, None)
        .await;
    let actual = with_broken
        .retrieve(QUERY, Intent::ExperienceDeepdive, None, true, None)
        .await;

    assert_eq!(actual, expected);
    assert!(actual.iter().all(|c| c.rerank_position.is_none()));
}

#[tokio::test]
async fn test_uninitialized_index_still_answers() {
    let ledger = Arc::new(UsageLedger::default());
    let client = EchoClient::new("I don't have details on that.");
    let generator = ResponseGenerator::new(
        client.clone(),
        ContextAssembler::new(Arc::new(WordCounter), ContextBudget::default()),
        PromptSet::default(),
        ledger.clone(),
    );
    let pipeline = ChatPipeline::new(
        IntentClassifier::new(RuleClassifier::new().unwrap()),
        Retriever::new(Arc::new(AxisEmbedder), None),
        generator,
        Arc::new(ResponseCache::new(Duration::from_secs(60), 10)),
        Arc::new(InMemorySessionStore::default()),
        ledger,
    );

    let reply = pipeline.chat(&experience_request("s4")).await;

    assert!(!reply.answer.degraded);
    assert_eq!(reply.answer.context_docs, 0);
    // system prompt and the user message only
    assert_eq!(client.last_request().messages.len(), 2);
}
