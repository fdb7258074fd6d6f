//! Term-frequency keyword scoring over an already-retrieved candidate set.
//!
//! This is a reranking signal, not a standalone retriever: it only ever
//! sees the chunks returned by the semantic pass.
//!
//! # Scoring
//!
//! ```text
//! score(doc) = Σ_{t ∈ terms(query)} tf(t, doc) / (|tokens(doc)| + 1)
//! ```
//!
//! Query terms are a lowercase *set*; document tokens are the full
//! lowercase stream. Documents scoring zero are dropped.

use std::collections::{HashMap, HashSet};

use crate::models::DocumentChunk;

/// Split text into lowercase word tokens (alphanumerics and `_`).
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Score `candidates` against `query`, best first, truncated to `top_k`.
///
/// Ties keep their input order.
pub fn keyword_search<'a, I>(query: &str, candidates: I, top_k: usize) -> Vec<(&'a DocumentChunk, f64)>
where
    I: IntoIterator<Item = &'a DocumentChunk>,
{
    let terms: HashSet<String> = tokenize(query).into_iter().collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(&DocumentChunk, f64)> = candidates
        .into_iter()
        .filter_map(|chunk| {
            let score = score_text(&terms, &chunk.content);
            (score > 0.0).then_some((chunk, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

fn score_text(terms: &HashSet<String>, text: &str) -> f64 {
    let tokens = tokenize(text);
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for t in &tokens {
        *freq.entry(t.as_str()).or_insert(0) += 1;
    }
    let matched: usize = terms
        .iter()
        .map(|t| freq.get(t.as_str()).copied().unwrap_or(0))
        .sum();
    if matched == 0 {
        return 0.0;
    }
    matched as f64 / (tokens.len() + 1) as f64
}
