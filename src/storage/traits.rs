//! Encoding store abstraction
//!
//! Defines the interface for persisting enrolled encodings, so the service
//! and handlers can run against a test double.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One persisted enrollment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingRecord {
    /// Caller-supplied identifier, unique key into the store
    pub student_id: String,
    /// L2-normalized face encoding
    pub encoding: Vec<f32>,
}

/// Mapping of identifier to face encoding.
/// Implementations must be thread-safe and async-compatible.
#[async_trait]
pub trait EncodingStore: Send + Sync + 'static {
    /// Insert or overwrite the encoding for `student_id` and persist the mapping
    async fn put(&self, student_id: &str, encoding: &[f32]) -> Result<()>;

    /// Linear scan over all entries; returns the first identifier whose stored
    /// encoding is within `threshold` of the query. Tie-break between multiple
    /// matching entries follows iteration order.
    async fn find_match(&self, encoding: &[f32], threshold: f32) -> Result<Option<String>>;

    /// Fetch a single stored encoding
    async fn get(&self, student_id: &str) -> Result<Option<Vec<f32>>>;

    /// Number of enrolled identifiers
    async fn count(&self) -> Result<usize>;
}

/// Compute cosine similarity between two encodings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_length_mismatch_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
