//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the narrow contract the retrieval
//! orchestrator needs from an external vector store: nearest-neighbour
//! lookup with an optional category filter, plus a document count.
//! Approximate-nearest-neighbour indexing itself is the store's job.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::DocumentChunk;

/// One nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub chunk: DocumentChunk,
    /// Cosine distance (`1 - similarity`).
    pub distance: f64,
}

/// Nearest-neighbour lookup against a persisted vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`query`](VectorIndex::query) | Top-`k` matches, closest first |
/// | [`count`](VectorIndex::count) | Number of indexed chunks |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` matches ordered by ascending distance.
    ///
    /// When `category_filter` is set, only chunks whose `category`
    /// metadata is one of the given values are considered.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        category_filter: Option<&[&str]>,
    ) -> Result<Vec<VectorMatch>>;

    /// Number of chunks in the index.
    async fn count(&self) -> Result<usize>;
}
