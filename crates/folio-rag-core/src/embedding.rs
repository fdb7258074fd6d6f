//! Query embedding seam and vector math.
//!
//! The retrieval orchestrator embeds each rewritten query through
//! [`Embedder`]; the OpenAI-compatible implementation lives in the
//! `folio-rag` app crate. Distances reported by the vector index are
//! cosine distances, converted back with [`similarity_from_distance`].

use anyhow::Result;
use async_trait::async_trait;

/// Turns text into vectors via an external embedding service.
///
/// Implementations may fail transiently; callers in the retrieval path
/// treat any error as "no semantic signal" rather than failing the request.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, used for usage accounting.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Convert a cosine distance into a similarity (`1 - distance`).
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 - distance
}

/// Cosine of the angle between `a` and `b`, in `[-1.0, 1.0]`.
///
/// Mismatched lengths, empty input and zero vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = (norm_a * norm_b).sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
