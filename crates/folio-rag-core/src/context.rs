//! Token-budgeted assembly of retrieved context and conversation history.
//!
//! Three budgets are independent: the system prompt is fixed, retrieved
//! documents share `max_context_tokens`, and history shares
//! `max_history_tokens`.
//!
//! # Context
//!
//! Candidates are ranked (reranker position if present, otherwise hybrid
//! score) and formatted as
//!
//! ```text
//! [CATEGORY] source
//! content
//! ```
//!
//! Blocks are appended greedily and joined with `\n\n---\n\n`; separator
//! tokens count against the budget. The first block that doesn't fit is
//! truncated to the remaining budget minus a buffer, suffixed with `...`,
//! and assembly stops. The highest-ranked document is always kept in that
//! case; a lower-ranked one is kept only if its truncated tail exceeds
//! `min_truncated_tokens`.
//!
//! # History
//!
//! The most recent `max_history_exchanges` exchanges are walked newest
//! first, stopping at the first whole exchange that would exceed the
//! budget. Exchanges are never partially included.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ConversationExchange, ScoredCandidate};
use crate::tokens::TokenCounter;

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";
const TRUNCATION_MARKER: &str = "...";

/// Token limits for context and history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudget {
    pub max_context_tokens: usize,
    pub max_history_tokens: usize,
    pub max_history_exchanges: usize,
    /// Tokens held back when truncating a block.
    pub truncation_buffer: usize,
    /// A lower-ranked block is truncated only if more than this many tokens remain.
    pub min_truncated_tokens: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_context_tokens: 2000,
            max_history_tokens: 500,
            max_history_exchanges: 10,
            truncation_buffer: 50,
            min_truncated_tokens: 100,
        }
    }
}

/// Formatted context text and what went into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedContext {
    pub text: String,
    /// Number of documents included, counting a truncated one.
    pub documents_used: usize,
    /// Distinct sources of the included documents, in prompt order.
    pub sources: Vec<String>,
    /// Tokens of `text`, including separators and any truncation marker.
    pub tokens: usize,
    pub truncated: bool,
}

/// A complete message sequence ready for the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub messages: Vec<ChatMessage>,
    pub context: PreparedContext,
    pub history_exchanges: usize,
    /// Token count of every message's content.
    pub input_tokens: usize,
}

pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
    budget: ContextBudget,
    context_heading: String,
}

impl ContextAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>, budget: ContextBudget) -> Self {
        Self {
            counter,
            budget,
            context_heading: "Relevant information from the knowledge base".to_string(),
        }
    }

    /// Heading placed before the context block in its system message.
    pub fn with_context_heading(mut self, heading: impl Into<String>) -> Self {
        self.context_heading = heading.into();
        self
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Build the context block from ranked candidates.
    pub fn prepare_context(&self, candidates: &[ScoredCandidate]) -> PreparedContext {
        let max = self.budget.max_context_tokens;
        let separator_tokens = self.counter.count(BLOCK_SEPARATOR);
        let mut blocks: Vec<String> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        let mut used = 0usize;
        let mut truncated = false;

        for (rank, candidate) in ranked(candidates).into_iter().enumerate() {
            let formatted = format_block(candidate);
            let overhead = if blocks.is_empty() { 0 } else { separator_tokens };
            let block_tokens = self.counter.count(&formatted);

            if used + overhead + block_tokens > max {
                let remaining = max
                    .saturating_sub(used + overhead)
                    .saturating_sub(self.budget.truncation_buffer);
                let keep = if rank == 0 {
                    remaining > 0
                } else {
                    remaining > self.budget.min_truncated_tokens
                };
                if keep {
                    let cut = format!(
                        "{}{TRUNCATION_MARKER}",
                        self.counter.truncate(&formatted, remaining)
                    );
                    used += overhead + self.counter.count(&cut);
                    blocks.push(cut);
                    push_source(&mut sources, candidate);
                    truncated = true;
                }
                tracing::debug!(
                    rank,
                    block_tokens,
                    remaining,
                    kept = keep,
                    "context budget reached"
                );
                break;
            }

            used += overhead + block_tokens;
            blocks.push(formatted);
            push_source(&mut sources, candidate);
        }

        PreparedContext {
            documents_used: blocks.len(),
            sources,
            text: blocks.join(BLOCK_SEPARATOR),
            tokens: used,
            truncated,
        }
    }

    /// The most recent whole exchanges that fit the history budget, oldest first.
    pub fn prepare_history<'a>(
        &self,
        history: &'a [ConversationExchange],
    ) -> &'a [ConversationExchange] {
        let window_start = history
            .len()
            .saturating_sub(self.budget.max_history_exchanges);
        let window = &history[window_start..];

        let mut used = 0usize;
        let mut start = window.len();
        for exchange in window.iter().rev() {
            let tokens =
                self.counter.count(&exchange.user_text) + self.counter.count(&exchange.assistant_text);
            if used + tokens > self.budget.max_history_tokens {
                break;
            }
            used += tokens;
            start -= 1;
        }
        &window[start..]
    }

    /// `[system, context?, ...history pairs, query]`.
    pub fn assemble(
        &self,
        system_prompt: &str,
        candidates: &[ScoredCandidate],
        history: &[ConversationExchange],
        query: &str,
    ) -> AssembledPrompt {
        let context = self.prepare_context(candidates);
        let history = self.prepare_history(history);

        let mut messages = Vec::with_capacity(3 + history.len() * 2);
        messages.push(ChatMessage::system(system_prompt));
        if !context.text.is_empty() {
            messages.push(ChatMessage::system(format!(
                "{}:\n\n{}",
                self.context_heading, context.text
            )));
        }
        for exchange in history {
            messages.push(ChatMessage::user(exchange.user_text.clone()));
            messages.push(ChatMessage::assistant(exchange.assistant_text.clone()));
        }
        messages.push(ChatMessage::user(query));

        let input_tokens = messages.iter().map(|m| self.counter.count(&m.content)).sum();
        AssembledPrompt {
            messages,
            context,
            history_exchanges: history.len(),
            input_tokens,
        }
    }
}

/// Reranked candidates keep their assigned positions; otherwise hybrid score descending.
fn ranked(candidates: &[ScoredCandidate]) -> Vec<&ScoredCandidate> {
    let mut ordered: Vec<&ScoredCandidate> = candidates.iter().collect();
    if ordered.iter().any(|c| c.rerank_position.is_some()) {
        ordered.sort_by_key(|c| c.rerank_position.unwrap_or(usize::MAX));
    } else {
        ordered.sort_by(|a, b| {
            b.hybrid_score
                .partial_cmp(&a.hybrid_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    ordered
}

fn push_source(sources: &mut Vec<String>, candidate: &ScoredCandidate) {
    if let Some(source) = candidate.chunk.source() {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
}

fn format_block(candidate: &ScoredCandidate) -> String {
    let chunk = &candidate.chunk;
    let source = chunk.source().unwrap_or("");
    let header = match chunk.category() {
        Some(category) if !category.is_empty() => {
            format!("[{}] {}", category.to_uppercase(), source)
        }
        _ => source.to_string(),
    };
    if header.is_empty() {
        chunk.content.clone()
    } else {
        format!("{header}\n{}", chunk.content)
    }
}
