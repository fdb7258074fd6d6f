//! Intent-aware retrieval orchestration.
//!
//! One call to [`Retriever::retrieve`] runs
//!
//! ```text
//! Idle → QueryRewritten → SemanticFetched → Merged → (Reranked | SkippedRerank) → Done
//! ```
//!
//! Retrieval degrades, it never fails: without a vector index, or when the
//! embedding or index call errors, the result is an empty list. A failed
//! rerank leaves the fused order untouched.

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::{similarity_from_distance, Embedder};
use crate::intent::Intent;
use crate::keyword::keyword_search;
use crate::ledger::{RequestType, UsageLedger};
use crate::merge::{HybridMerger, KeywordHit, SemanticHit};
use crate::models::ScoredCandidate;
use crate::rerank::Reranker;
use crate::rewrite::rewrite_query;
use crate::store::VectorIndex;
use crate::tokens::TokenCounter;

/// Semantic and keyword passes fetch this many times `k` before fusion.
const OVERFETCH: usize = 2;

/// Orchestrator states, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Idle,
    QueryRewritten,
    SemanticFetched,
    Merged,
    Reranked,
    SkippedRerank,
    Done,
}

/// Result of one retrieval with the path it took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalTrace {
    pub candidates: Vec<ScoredCandidate>,
    pub stages: Vec<RetrievalStage>,
    pub rewritten_query: Option<String>,
    /// Set when a dependency failure cut retrieval short.
    pub degraded: bool,
}

impl RetrievalTrace {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            stages: vec![RetrievalStage::Idle],
            rewritten_query: None,
            degraded: false,
        }
    }

    fn enter(&mut self, stage: RetrievalStage) {
        self.stages.push(stage);
    }

    fn finish_degraded(mut self) -> Self {
        self.degraded = true;
        self.enter(RetrievalStage::Done);
        self
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Option<Arc<dyn VectorIndex>>,
    reranker: Option<Arc<dyn Reranker>>,
    merger: HybridMerger,
    usage: Option<(Arc<UsageLedger>, Arc<dyn TokenCounter>)>,
}

impl Retriever {
    /// `index` is `None` when the vector store could not be reached at startup.
    pub fn new(embedder: Arc<dyn Embedder>, index: Option<Arc<dyn VectorIndex>>) -> Self {
        Self {
            embedder,
            index,
            reranker: None,
            merger: HybridMerger::default(),
            usage: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_merger(mut self, merger: HybridMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Record query embeddings in `ledger`, counting input tokens with `counter`.
    pub fn with_usage(mut self, ledger: Arc<UsageLedger>, counter: Arc<dyn TokenCounter>) -> Self {
        self.usage = Some((ledger, counter));
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    /// Ranked candidates for `query`; `k` defaults to the intent's configured value.
    pub async fn retrieve(
        &self,
        query: &str,
        intent: Intent,
        k: Option<usize>,
        use_reranking: bool,
        session_id: Option<&str>,
    ) -> Vec<ScoredCandidate> {
        self.retrieve_with_trace(query, intent, k, use_reranking, session_id)
            .await
            .candidates
    }

    pub async fn retrieve_with_trace(
        &self,
        query: &str,
        intent: Intent,
        k: Option<usize>,
        use_reranking: bool,
        session_id: Option<&str>,
    ) -> RetrievalTrace {
        let mut trace = RetrievalTrace::new();

        let Some(index) = &self.index else {
            tracing::warn!("vector index not initialized, returning no documents");
            return trace.finish_degraded();
        };

        let config = intent.retrieval_config();
        let k = k.unwrap_or(config.k);

        let rewritten = rewrite_query(query, intent);
        trace.enter(RetrievalStage::QueryRewritten);

        let vector = match self.embedder.embed(&rewritten).await {
            Ok(v) => {
                if let Some((ledger, counter)) = &self.usage {
                    ledger.track(
                        counter.count(&rewritten),
                        0,
                        self.embedder.model_name(),
                        RequestType::Embedding,
                        session_id,
                    );
                }
                v
            }
            Err(e) => {
                tracing::error!(error = %e, "query embedding failed");
                trace.rewritten_query = Some(rewritten);
                return trace.finish_degraded();
            }
        };
        trace.rewritten_query = Some(rewritten);

        let fetch = k.saturating_mul(OVERFETCH);
        let matches = match index
            .query(&vector, fetch, config.category_filter)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "vector query failed");
                return trace.finish_degraded();
            }
        };
        let semantic: Vec<SemanticHit> = matches
            .into_iter()
            .map(|m| SemanticHit {
                similarity: similarity_from_distance(m.distance),
                chunk: m.chunk,
            })
            .collect();
        trace.enter(RetrievalStage::SemanticFetched);

        let keyword: Vec<KeywordHit> =
            keyword_search(query, semantic.iter().map(|h| &h.chunk), fetch)
                .into_iter()
                .map(|(chunk, score)| KeywordHit {
                    chunk: chunk.clone(),
                    score,
                })
                .collect();

        let merged = self
            .merger
            .merge(&semantic, &keyword, config.similarity_threshold, k);
        trace.enter(RetrievalStage::Merged);

        trace.candidates = match &self.reranker {
            Some(reranker) if use_reranking && merged.len() >= 2 => {
                match reranker.rerank(query, &merged).await {
                    Ok(reranked) => {
                        trace.enter(RetrievalStage::Reranked);
                        reranked
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reranking failed, keeping fused order");
                        trace.enter(RetrievalStage::SkippedRerank);
                        merged
                    }
                }
            }
            _ => {
                trace.enter(RetrievalStage::SkippedRerank);
                merged
            }
        };
        trace.enter(RetrievalStage::Done);

        tracing::debug!(
            intent = %intent,
            fetched = semantic.len(),
            returned = trace.candidates.len(),
            threshold = config.similarity_threshold,
            "retrieved documents"
        );
        trace
    }
}
