//! In-memory [`VectorIndex`] implementation for tests and small corpora.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety.
//! Search is brute-force cosine similarity over all stored vectors,
//! which is fine for the hundreds-to-thousands of chunks this system targets.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::DocumentChunk;

use super::{VectorIndex, VectorMatch};

struct StoredVector {
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

/// Brute-force in-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk with its embedding.
    pub fn insert(&self, chunk: DocumentChunk, vector: Vec<f32>) {
        self.vectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredVector { chunk, vector });
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        category_filter: Option<&[&str]>,
    ) -> Result<Vec<VectorMatch>> {
        let stored = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .filter(|sv| match category_filter {
                Some(categories) => sv
                    .chunk
                    .category()
                    .map(|c| categories.contains(&c))
                    .unwrap_or(false),
                None => true,
            })
            .map(|sv| VectorMatch {
                chunk: sv.chunk.clone(),
                distance: 1.0 - cosine_similarity(vector, &sv.vector) as f64,
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}
