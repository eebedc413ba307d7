// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Vector index interface
//! Nearest-neighbour search over embeddings with a JSON payload per point

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub type Payload = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collection not found: {0}")]
    CollectionMissing(String),

    #[error("Vector index backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
}

#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A query result; `score` is a similarity in `[0, 1]`, higher is closer
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: Uuid,
    pub score: f64,
    pub payload: Payload,
}

/// Conjunction of exact string matches on payload fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub must_match: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.must_match.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        self.must_match.iter().all(|(key, expected)| {
            matches!(payload.get(key), Some(Value::String(actual)) if actual == expected)
        })
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist yet
    async fn create_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<(), IndexError>;

    async fn delete_collection(&self) -> Result<(), IndexError>;

    /// Insert or replace the point with `record.id`
    async fn upsert(&self, record: IndexRecord) -> Result<(), IndexError>;

    /// Up to `top_k` hits sorted by descending score
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, IndexError>;

    async fn get(&self, id: Uuid) -> Result<Option<Payload>, IndexError>;

    /// Every point's id and payload, in no particular order
    async fn scroll(&self) -> Result<Vec<(Uuid, Payload)>, IndexError>;
}
