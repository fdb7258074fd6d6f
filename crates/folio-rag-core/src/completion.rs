//! Completion service contract.
//!
//! The reranker, the model-based intent classifier and the response
//! generator all talk to a chat-completion model through
//! [`CompletionClient`]. The OpenAI-compatible HTTP implementation lives
//! in the app crate; tests use in-process fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CompletionError;
use crate::models::ChatMessage;

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            messages,
            temperature,
            max_tokens,
        }
    }
}

/// Token counters reported by the service on non-streamed calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A complete (non-streamed) response.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier used for pricing and token counting.
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest)
        -> Result<CompletionResponse, CompletionError>;

    /// Stream text deltas into `tx` as they arrive.
    ///
    /// Returns once the stream has ended. A closed receiver ends the
    /// stream early without error.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<(), CompletionError>;
}
