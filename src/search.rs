//! Retrieval inspection (`folio search`).
//!
//! Runs only the retrieval half of the pipeline and prints every scored
//! candidate, which is the quickest way to tune thresholds and fusion
//! weights against a real corpus.

use anyhow::Result;

use folio_rag_core::classify::{ClassifierContext, RuleClassifier};
use folio_rag_core::intent::Intent;
use folio_rag_core::models::ScoredCandidate;
use folio_rag_core::retrieve::RetrievalTrace;

use crate::bootstrap::init_pipeline;
use crate::config::Config;

/// Length of the excerpt printed for each candidate.
const EXCERPT_CHARS: usize = 160;

pub async fn run_search(
    config: &Config,
    query: &str,
    intent: Option<Intent>,
    k: Option<usize>,
    rerank: bool,
) -> Result<()> {
    let intent = match intent {
        Some(intent) => intent,
        None => RuleClassifier::new()?.classify(query, &ClassifierContext::default()),
    };

    let pipeline = init_pipeline(config).await?;
    if !pipeline.retriever().is_initialized() {
        println!("Vector index unavailable; nothing to search.");
        return Ok(());
    }

    let trace = pipeline
        .retriever()
        .retrieve_with_trace(query, intent, k, rerank, None)
        .await;
    print_trace(intent, &trace);
    Ok(())
}

fn print_trace(intent: Intent, trace: &RetrievalTrace) {
    println!("intent: {}", intent);
    if let Some(rewritten) = &trace.rewritten_query {
        println!("query:  {}", rewritten);
    }
    if trace.degraded {
        println!("(retrieval degraded; see logs)");
    }
    println!();

    if trace.candidates.is_empty() {
        println!("No results.");
        return;
    }

    for (i, candidate) in trace.candidates.iter().enumerate() {
        print_candidate(i + 1, candidate);
    }
}

fn print_candidate(rank: usize, candidate: &ScoredCandidate) {
    let chunk = &candidate.chunk;
    println!(
        "{}. [{:.3}] {} / {}",
        rank,
        candidate.hybrid_score,
        chunk.category().unwrap_or("-"),
        chunk.source().unwrap_or("(no source)")
    );
    println!(
        "    semantic: {:.3}  keyword: {:.4}{}",
        candidate.semantic_score,
        candidate.keyword_score,
        candidate
            .rerank_position
            .map(|p| format!("  rerank: #{}", p + 1))
            .unwrap_or_default()
    );
    println!("    excerpt: \"{}\"", excerpt(&chunk.content));
    println!();
}

fn excerpt(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}
