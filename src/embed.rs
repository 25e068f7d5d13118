//! Text-to-vector collaborator.
//!
//! The engine only needs a fixed dimensionality and dot-product comparable
//! output. `HashEmbedder` is a deterministic feature-hashing stand-in for an
//! external embedding model.

use anyhow::{Result, bail};

use crate::error::RadarError;
use crate::index::tokenize;

pub trait Embedder: Send + Sync {
    /// Length of every vector returned by `embed`.
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Feature-hashing embedder: each token picks a bucket and a sign from its
/// BLAKE3 digest, and the summed vector is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            bail!(RadarError::input("Nothing to embed: text has no tokens"));
        }

        let mut vector = vec![0.0f32; self.dim];
        for token in &tokens {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dim as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Cosine similarity; 0 when either side is the zero vector or dims differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
