//! The `Embedder` external interface (spec.md §6).
//!
//! The embedding model itself is out of scope for this core; callers
//! inject an implementation. Vectors are fixed-dimension, unit-normalised
//! floats.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedderError {
    #[error("embedder failed: {0}")]
    Failed(String),
    #[error("embedder timed out")]
    Timeout,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text. Returns `None` when the embedder
    /// declines (e.g. empty input) rather than erroring, matching the
    /// external interface's `vector | null` contract; returns `Err` only
    /// on hard failure.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbedderError>;

    /// Batched form. The default implementation calls `embed` sequentially;
    /// real embedders should override for batching.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbedderError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    /// Dimensionality this embedder produces, when known statically.
    fn dimensions(&self) -> Option<usize> {
        None
    }

    /// Identifier persisted into `MemoryItem::embedding.model_id`.
    fn model_id(&self) -> &str;
}

/// L2-normalise a vector in place. Embedders are expected to return
/// unit-normalised vectors already; this is provided for adapters that
/// wrap a raw model.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
