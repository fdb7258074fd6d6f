//! Wires configuration and network adapters into a [`ChatPipeline`].
//!
//! The vector index is optional at runtime: if Chroma is disabled or
//! unreachable, the app starts anyway and answers without retrieved
//! context (degraded mode).

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use folio_rag_core::cache::ResponseCache;
use folio_rag_core::classify::{IntentClassifier, LlmClassifier, RuleClassifier};
use folio_rag_core::completion::CompletionClient;
use folio_rag_core::context::ContextAssembler;
use folio_rag_core::embedding::Embedder;
use folio_rag_core::generate::{GenerationSettings, ResponseGenerator, RetryPolicy};
use folio_rag_core::ledger::UsageLedger;
use folio_rag_core::merge::HybridMerger;
use folio_rag_core::pipeline::ChatPipeline;
use folio_rag_core::prompts::PromptSet;
use folio_rag_core::rerank::LlmReranker;
use folio_rag_core::retrieve::Retriever;
use folio_rag_core::session::InMemorySessionStore;
use folio_rag_core::store::VectorIndex;
use folio_rag_core::tokens::{TiktokenCounter, TokenCounter};

use crate::chroma::ChromaIndex;
use crate::config::Config;
use crate::openai::{OpenAiChatClient, OpenAiEmbedder};

/// External services the pipeline is built on.
pub struct Services {
    pub completion: Arc<dyn CompletionClient>,
    pub embedder: Arc<dyn Embedder>,
    /// `None` in degraded mode.
    pub index: Option<Arc<dyn VectorIndex>>,
    pub counter: Arc<dyn TokenCounter>,
}

impl Services {
    /// Connect to the configured OpenAI-compatible service and vector index.
    pub async fn connect(config: &Config) -> Result<Self> {
        let completion: Arc<dyn CompletionClient> = Arc::new(OpenAiChatClient::from_config(config)?);
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::from_config(config)?);
        let counter: Arc<dyn TokenCounter> = Arc::new(TiktokenCounter::for_model(&config.llm.model)?);
        Ok(Self {
            completion,
            embedder,
            index: connect_index(config).await,
            counter,
        })
    }
}

/// The configured vector index, or `None` if it is disabled or unreachable.
pub async fn connect_index(config: &Config) -> Option<Arc<dyn VectorIndex>> {
    if !config.vector.is_enabled() {
        tracing::info!("vector index disabled, answering without retrieved context");
        return None;
    }
    match ChromaIndex::from_config(&config.vector).await {
        Ok(index) => Some(Arc::new(index)),
        Err(e) => {
            tracing::warn!(error = %e, "vector index unavailable, running in degraded mode");
            None
        }
    }
}

/// Assemble the full chat pipeline over `services`.
pub fn build_pipeline(config: &Config, services: Services) -> Result<ChatPipeline> {
    let ledger = Arc::new(UsageLedger::new(config.price_table()));

    let mut retriever = Retriever::new(services.embedder, services.index)
        .with_merger(HybridMerger::new(config.retrieval.fusion))
        .with_usage(ledger.clone(), services.counter.clone());
    if config.retrieval.rerank {
        let reranker = LlmReranker::new(services.completion.clone())
            .with_ledger(ledger.clone())
            .with_window(config.retrieval.rerank_window)
            .with_timeout(Duration::from_secs(config.retrieval.rerank_timeout_secs));
        retriever = retriever.with_reranker(Arc::new(reranker));
    }

    let mut assembler = ContextAssembler::new(services.counter, config.context);
    if let Some(heading) = &config.prompts.context_heading {
        assembler = assembler.with_context_heading(heading.clone());
    }

    let prompts = match &config.prompts.persona {
        Some(persona) => PromptSet::new(persona.clone()),
        None => PromptSet::default(),
    };

    let generator = ResponseGenerator::new(
        services.completion.clone(),
        assembler,
        prompts,
        ledger.clone(),
    )
    .with_retry(RetryPolicy {
        max_retries: config.llm.max_retries,
        ..RetryPolicy::default()
    })
    .with_settings(GenerationSettings {
        temperature: config.llm.temperature,
        max_response_tokens: config.llm.max_response_tokens,
        ..GenerationSettings::default()
    });

    let mut classifier = IntentClassifier::new(RuleClassifier::new()?);
    if config.llm.uses_llm_classifier() {
        classifier = classifier.with_llm(
            LlmClassifier::new(services.completion.clone()).with_ledger(ledger.clone()),
        );
    }

    let cache = Arc::new(ResponseCache::new(
        Duration::from_secs(config.cache.ttl_secs),
        config.cache.max_size,
    ));
    let sessions = Arc::new(InMemorySessionStore::new(
        config.session.max_history_length,
        Duration::from_secs(config.session.expiry_secs),
    ));

    Ok(ChatPipeline::new(classifier, retriever, generator, cache, sessions, ledger)
        .with_cache_enabled(config.cache.enabled))
}

/// Connect and build in one step.
pub async fn init_pipeline(config: &Config) -> Result<ChatPipeline> {
    let services = Services::connect(config).await?;
    build_pipeline(config, services)
}
