// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Client
//!
//! [`EmbeddingProvider`] is the seam to whatever turns text into vectors. The
//! bundled [`HashEmbeddingClient`] is a deterministic token-bag embedder:
//! each lower-cased token hashes (FNV-1a) to one bucket with a sign taken
//! from the hash's high bit, and the result is L2-normalized. It captures
//! lexical overlap only, which is enough for signature text built from a
//! small controlled vocabulary.

use async_trait::async_trait;
use thiserror::Error;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Shorter tokens carry no signal
const MIN_TOKEN_LEN: usize = 2;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Cannot embed empty text")]
    EmptyInput,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identical text must yield identical vectors for a given provider
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// A zero dimension is bumped to 1
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            let hash = fnv1a_hash(token.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 1 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }

        l2_normalize(embedding)
    }
}

impl Default for HashEmbeddingClient {
    fn default() -> Self {
        Self::new(768)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Lower-cased words; `_` is kept so `is_valid` stays one token
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
    if !norm_sq.is_finite() || norm_sq < f32::EPSILON {
        return vec![0.0; vector.len()];
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vector.iter_mut().for_each(|x| *x *= inv_norm);
    vector
}
