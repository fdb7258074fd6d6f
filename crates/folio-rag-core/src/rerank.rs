//! Second-pass reordering of fused candidates by a language model.
//!
//! [`LlmReranker`] shows the model a numbered excerpt of each of the top
//! candidates and asks for a comma-separated relevance order. The result
//! is a permutation: candidates the model leaves out are appended in their
//! original order, so reranking never drops anything.
//!
//! Errors are returned, not swallowed. The retrieval orchestrator decides
//! to fall back to the fused order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::RerankError;
use crate::ledger::{RequestType, UsageLedger};
use crate::models::{ChatMessage, ScoredCandidate};

const PREVIEW_CHARS: usize = 200;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `candidates` for `query`, assigning `rerank_position` to each.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredCandidate],
    ) -> Result<Vec<ScoredCandidate>, RerankError>;
}

pub struct LlmReranker {
    client: Arc<dyn CompletionClient>,
    ledger: Option<Arc<UsageLedger>>,
    window: usize,
    timeout: Duration,
}

impl LlmReranker {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            ledger: None,
            window: 5,
            timeout: Duration::from_secs(10),
        }
    }

    /// Record rerank calls in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// How many top candidates are shown to the model.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredCandidate],
    ) -> Result<Vec<ScoredCandidate>, RerankError> {
        let shown = candidates.len().min(self.window);
        let request = CompletionRequest::new(
            vec![ChatMessage::user(build_prompt(query, &candidates[..shown]))],
            0.0,
            50,
        );

        let response = tokio::time::timeout(self.timeout, self.client.complete(&request))
            .await
            .map_err(|_| RerankError::Timeout)??;

        if let (Some(ledger), Some(usage)) = (&self.ledger, response.usage) {
            ledger.track(
                usage.prompt_tokens,
                usage.completion_tokens,
                self.client.model_name(),
                RequestType::Rerank,
                None,
            );
        }

        let order = parse_ranking(&response.text, shown)?;
        tracing::debug!(?order, "reranked candidates");
        Ok(apply_ranking(candidates, &order))
    }
}

/// Prompt listing `[i] excerpt` lines for each candidate.
pub fn build_prompt(query: &str, candidates: &[ScoredCandidate]) -> String {
    let listing: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let preview: String = c
                .chunk
                .content
                .chars()
                .take(PREVIEW_CHARS)
                .collect::<String>()
                .replace('\n', " ");
            format!("[{i}] {preview}")
        })
        .collect();

    format!(
        "Rate the relevance of each document to the query.\n\
         Query: \"{query}\"\n\n\
         Documents:\n{}\n\n\
         Return ONLY a comma-separated list of document indices ordered by relevance \
         (most relevant first).\nExample: 2,0,1,3",
        listing.join("\n")
    )
}

/// Parse `"2, 0,1"` into indices below `len`, first occurrence wins.
///
/// Non-numeric items are skipped. A response with no usable index is malformed.
pub fn parse_ranking(text: &str, len: usize) -> Result<Vec<usize>, RerankError> {
    let mut seen = HashSet::new();
    let order: Vec<usize> = text
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && item.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|item| item.parse::<usize>().ok())
        .filter(|&i| i < len && seen.insert(i))
        .collect();

    if order.is_empty() {
        return Err(RerankError::Malformed(text.to_string()));
    }
    Ok(order)
}

/// Reorder by `order`, then append everything else in original order.
pub fn apply_ranking(candidates: &[ScoredCandidate], order: &[usize]) -> Vec<ScoredCandidate> {
    let mut placed = vec![false; candidates.len()];
    let mut reranked = Vec::with_capacity(candidates.len());

    let ranked = order.iter().copied().filter(|&i| i < candidates.len());
    for i in ranked.chain(0..candidates.len()) {
        if placed[i] {
            continue;
        }
        placed[i] = true;
        let mut c = candidates[i].clone();
        c.rerank_position = Some(reranked.len());
        reranked.push(c);
    }
    reranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionResponse, Usage};
    use crate::error::CompletionError;
    use crate::models::DocumentChunk;
    use tokio::sync::mpsc;

    fn candidates(n: usize) -> Vec<ScoredCandidate> {
        (0..n)
            .map(|i| ScoredCandidate {
                chunk: DocumentChunk::new(format!("doc {i}")),
                semantic_score: 0.5,
                keyword_score: 0.0,
                hybrid_score: 1.0 - i as f64 * 0.1,
                rerank_position: None,
            })
            .collect()
    }

    fn contents(c: &[ScoredCandidate]) -> Vec<&str> {
        c.iter().map(|c| c.chunk.content.as_str()).collect()
    }

    struct ScriptedClient {
        reply: Result<&'static str, CompletionError>,
        delay: Duration,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "gpt-4o-mini"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map(|text| CompletionResponse {
                text: text.to_string(),
                usage: Some(Usage {
                    prompt_tokens: 120,
                    completion_tokens: 5,
                }),
            })
        }

        async fn complete_streaming(
            &self,
            _request: &CompletionRequest,
            _tx: mpsc::Sender<String>,
        ) -> Result<(), CompletionError> {
            Ok(())
        }
    }

    fn reranker(reply: Result<&'static str, CompletionError>) -> LlmReranker {
        LlmReranker::new(Arc::new(ScriptedClient {
            reply,
            delay: Duration::ZERO,
        }))
    }

    #[test]
    fn test_prompt_flattens_newlines_and_truncates() {
        let mut c = candidates(1);
        c[0].chunk.content = format!("line one\nline two {}", "x".repeat(300));
        let prompt = build_prompt("caching?", &c);
        assert!(prompt.contains("Query: \"caching?\""));
        let line = prompt
            .lines()
            .find(|l| l.starts_with("[0] "))
            .unwrap();
        assert!(line.starts_with("[0] line one line two"));
        assert_eq!(line.chars().count(), 4 + PREVIEW_CHARS);
    }

    #[test]
    fn test_parse_ranking() {
        assert_eq!(parse_ranking("2,0,1", 3).unwrap(), vec![2, 0, 1]);
        assert_eq!(parse_ranking(" 1 , x, 1, 9, 0 ", 3).unwrap(), vec![1, 0]);
        assert!(matches!(
            parse_ranking("I think the first one", 3),
            Err(RerankError::Malformed(_))
        ));
        assert!(parse_ranking("", 3).is_err());
    }

    #[test]
    fn test_apply_ranking_appends_missing() {
        let reranked = apply_ranking(&candidates(4), &[2]);
        assert_eq!(contents(&reranked), vec!["doc 2", "doc 0", "doc 1", "doc 3"]);
        let positions: Vec<Option<usize>> = reranked.iter().map(|c| c.rerank_position).collect();
        assert_eq!(positions, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_rerank_orders_window_and_keeps_tail() {
        let r = reranker(Ok("1,0")).with_window(2);
        let out = r.rerank("q", &candidates(3)).await.unwrap();
        assert_eq!(contents(&out), vec!["doc 1", "doc 0", "doc 2"]);
    }

    #[tokio::test]
    async fn test_rerank_records_usage() {
        let ledger = Arc::new(UsageLedger::default());
        let r = reranker(Ok("0,1")).with_ledger(Arc::clone(&ledger));
        r.rerank("q", &candidates(2)).await.unwrap();
        let stats = ledger.total_stats();
        assert_eq!(stats.by_type[&RequestType::Rerank].tokens, 125);
    }

    #[tokio::test]
    async fn test_rerank_errors_surface() {
        let failed = reranker(Err(CompletionError::Connection("refused".into())));
        assert!(matches!(
            failed.rerank("q", &candidates(2)).await,
            Err(RerankError::Completion(_))
        ));

        let garbage = reranker(Ok("no idea"));
        assert!(matches!(
            garbage.rerank("q", &candidates(2)).await,
            Err(RerankError::Malformed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerank_timeout() {
        let slow = LlmReranker::new(Arc::new(ScriptedClient {
            reply: Ok("0"),
            delay: Duration::from_secs(30),
        }))
        .with_timeout(Duration::from_secs(1));
        assert!(matches!(
            slow.rerank("q", &candidates(2)).await,
            Err(RerankError::Timeout)
        ));
    }
}
