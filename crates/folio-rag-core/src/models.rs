//! Core data types shared by the retrieval, assembly and generation stages.
//!
//! - [`DocumentChunk`]: immutable unit of corpus text plus metadata.
//! - [`ScoredCandidate`]: a chunk with its per-request retrieval scores.
//! - [`ConversationExchange`]: one user/assistant turn of session history.
//! - [`ChatMessage`]: a role-tagged message sent to the completion service.
//! - [`GeneratedAnswer`]: the value produced by generation and memoised by the cache.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Number of leading characters used as a chunk's content-derived identity.
///
/// Chunk IDs are not shared between the vector store and the keyword pass,
/// so fusion keys on a stable content prefix instead.
pub const IDENTITY_PREFIX_CHARS: usize = 100;

/// A metadata value: either text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            MetadataValue::Text(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Number(n) => write!(f, "{n}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

/// Chunk metadata. Ordered so formatting and serialization are deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// An immutable unit of corpus text.
///
/// Owned by the external corpus store; this crate only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata setter.
    pub fn with_meta(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The `category` metadata value, if present and textual.
    pub fn category(&self) -> Option<&str> {
        self.metadata.get("category").and_then(MetadataValue::as_str)
    }

    /// The `source` metadata value, if present and textual.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(MetadataValue::as_str)
    }

    /// Content-derived identity used to match the same chunk across result lists.
    pub fn identity_key(&self) -> String {
        self.content.chars().take(IDENTITY_PREFIX_CHARS).collect()
    }
}

/// A chunk with the scores assigned to it during one request.
///
/// Created by the hybrid merger and discarded when the request completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub chunk: DocumentChunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub semantic_score: f64,
    /// Length-normalised term frequency, `>= 0.0`.
    pub keyword_score: f64,
    /// Fused score; the ranking key until a reranker assigns positions.
    pub hybrid_score: f64,
    /// Position assigned by the reranker, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_position: Option<usize>,
}

/// One user/assistant turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExchange {
    pub user_text: String,
    pub assistant_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationExchange {
    pub fn new(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            intent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// Message author role for the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A follow-up action offered alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub action: String,
    pub target: String,
}

/// The result of answering one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    /// `source` metadata of the documents the answer was grounded on.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Prompt tokens sent to the completion service.
    pub input_tokens: usize,
    /// Number of retrieved documents offered as context.
    pub context_docs: usize,
    /// True when generation failed and `text` is the fallback message.
    #[serde(default)]
    pub degraded: bool,
}

impl GeneratedAnswer {
    /// A fallback answer carrying only the given text.
    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            suggestions: Vec::new(),
            sources: Vec::new(),
            input_tokens: 0,
            context_docs: 0,
            degraded: true,
        }
    }
}
