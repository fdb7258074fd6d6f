//! Typed errors for the fallible pipeline stages.
//!
//! Adapter seams ([`Embedder`](crate::embedding::Embedder),
//! [`VectorIndex`](crate::store::VectorIndex)) use `anyhow`. The stages
//! below return typed errors because callers branch on them: the
//! generator retries transient completion failures, and the reranker and
//! classifier errors select a fallback.

use thiserror::Error;

/// Failure of a single completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("rate limited by completion service")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("connection to completion service failed: {0}")]
    Connection(String),

    #[error("completion service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion call timed out")]
    Timeout,
}

impl CompletionError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::RateLimited { .. }
            | CompletionError::Connection(_)
            | CompletionError::Timeout => true,
            CompletionError::Api { status, .. } => *status >= 500,
            CompletionError::Malformed(_) => false,
        }
    }
}

/// Why a rerank attempt produced no ordering.
#[derive(Debug, Error)]
pub enum RerankError {
    #[error("rerank completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("unparseable rerank response: {0:?}")]
    Malformed(String),

    #[error("rerank call timed out")]
    Timeout,
}

/// Why the model-based intent classifier produced no label.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("intent completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("model returned unknown intent label {0:?}")]
    UnknownLabel(String),
}

/// Generation failed after all retries.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: CompletionError,
    },

    #[error("completion failed: {0}")]
    Permanent(#[source] CompletionError),

    #[error("stream interrupted after partial output: {0}")]
    StreamInterrupted(#[source] CompletionError),

    #[error("stream receiver dropped")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CompletionError::RateLimited {
            retry_after_secs: None
        }
        .is_transient());
        assert!(CompletionError::Connection("reset".into()).is_transient());
        assert!(CompletionError::Timeout.is_transient());
        assert!(CompletionError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!CompletionError::Api {
            status: 401,
            message: "bad key".into()
        }
        .is_transient());
        assert!(!CompletionError::Malformed("no choices".into()).is_transient());
    }

    #[test]
    fn test_rerank_error_from_completion() {
        let err: RerankError = CompletionError::Timeout.into();
        assert!(matches!(err, RerankError::Completion(CompletionError::Timeout)));
    }
}
