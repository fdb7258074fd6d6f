//! Hybrid fusion of semantic and keyword result lists.
//!
//! Two strategies are supported, selected with [`FusionStrategy`]:
//!
//! - **Weighted** (default):
//!   `hybrid = w_sem × semantic + w_kw × keyword × scale`.
//!   The scale compensates for keyword scores being an order of magnitude
//!   smaller than cosine similarities.
//! - **Reciprocal rank**: each list contributes `weight / (rank + 1)` per
//!   document, summed across lists by content identity.
//!
//! In both modes a semantic hit below the similarity threshold never
//! appears in the output, the output is sorted by non-increasing
//! `hybrid_score`, ties keep semantic order, and at most `k` candidates
//! are returned.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{DocumentChunk, ScoredCandidate};

/// A chunk returned by the vector index, with similarity already derived.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub chunk: DocumentChunk,
    pub similarity: f64,
}

/// A chunk scored by the keyword pass.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// How the two signals are combined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FusionStrategy {
    Weighted {
        semantic_weight: f64,
        keyword_weight: f64,
        keyword_scale: f64,
    },
    ReciprocalRank {
        semantic_weight: f64,
        keyword_weight: f64,
    },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::Weighted {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            keyword_scale: 10.0,
        }
    }
}

impl FusionStrategy {
    pub fn reciprocal_rank() -> Self {
        FusionStrategy::ReciprocalRank {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
        }
    }
}

/// Fuses semantic and keyword hits into a ranked candidate list.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridMerger {
    strategy: FusionStrategy,
}

impl HybridMerger {
    pub fn new(strategy: FusionStrategy) -> Self {
        Self { strategy }
    }

    /// Merge `semantic` (closest first) with `keyword` (best first).
    pub fn merge(
        &self,
        semantic: &[SemanticHit],
        keyword: &[KeywordHit],
        similarity_threshold: f64,
        k: usize,
    ) -> Vec<ScoredCandidate> {
        let matches = admitted(semantic, similarity_threshold);
        let keyword_scores: HashMap<String, f64> = keyword
            .iter()
            .map(|h| (h.chunk.identity_key(), h.score))
            .collect();

        let mut candidates: Vec<ScoredCandidate> = match self.strategy {
            FusionStrategy::Weighted {
                semantic_weight,
                keyword_weight,
                keyword_scale,
            } => matches
                .into_iter()
                .map(|hit| {
                    let kw = keyword_scores
                        .get(&hit.chunk.identity_key())
                        .copied()
                        .unwrap_or(0.0);
                    ScoredCandidate {
                        chunk: hit.chunk.clone(),
                        semantic_score: hit.similarity,
                        keyword_score: kw,
                        hybrid_score: semantic_weight * hit.similarity
                            + keyword_weight * kw * keyword_scale,
                        rerank_position: None,
                    }
                })
                .collect(),
            FusionStrategy::ReciprocalRank {
                semantic_weight,
                keyword_weight,
            } => {
                let keyword_ranks: HashMap<String, usize> = keyword
                    .iter()
                    .enumerate()
                    .map(|(rank, h)| (h.chunk.identity_key(), rank))
                    .collect();
                matches
                    .into_iter()
                    .enumerate()
                    .map(|(rank, hit)| {
                        let key = hit.chunk.identity_key();
                        let mut score = semantic_weight / (rank as f64 + 1.0);
                        if let Some(kw_rank) = keyword_ranks.get(&key) {
                            score += keyword_weight / (*kw_rank as f64 + 1.0);
                        }
                        ScoredCandidate {
                            chunk: hit.chunk.clone(),
                            semantic_score: hit.similarity,
                            keyword_score: keyword_scores.get(&key).copied().unwrap_or(0.0),
                            hybrid_score: score,
                            rerank_position: None,
                        }
                    })
                    .collect()
            }
        };

        // sort_by is stable, so equal scores keep semantic order
        candidates.sort_by(|a, b| {
            b.hybrid_score
                .partial_cmp(&a.hybrid_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        candidates
    }
}

/// Semantic hits at or above the threshold, first occurrence per identity.
fn admitted(semantic: &[SemanticHit], threshold: f64) -> Vec<&SemanticHit> {
    let mut seen = HashSet::new();
    semantic
        .iter()
        .filter(|hit| hit.similarity >= threshold)
        .filter(|hit| seen.insert(hit.chunk.identity_key()))
        .collect()
}
