// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory cosine vector index for development and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::vector_index::{
    DistanceMetric, IndexError, IndexHit, IndexRecord, MetadataFilter, Payload, VectorIndex,
};

struct Collection {
    dimension: usize,
    points: HashMap<Uuid, IndexRecord>,
}

#[derive(Clone)]
pub struct InMemoryVectorIndex {
    name: String,
    collection: Arc<RwLock<Option<Collection>>>,
}

impl InMemoryVectorIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn len(&self) -> usize {
        self.collection
            .read()
            .await
            .as_ref()
            .map_or(0, |c| c.points.len())
    }

    /// Cosine similarity clamped to `[0, 1]`
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if magnitude_a == 0.0 || magnitude_b == 0.0 {
            return 0.0;
        }

        ((dot_product / (magnitude_a * magnitude_b)) as f64).clamp(0.0, 1.0)
    }

    fn check_dimension(collection: &Collection, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != collection.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: collection.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new("patterns")
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn create_collection(&self, dimension: usize, _metric: DistanceMetric) -> Result<(), IndexError> {
        let mut guard = self.collection.write().await;
        match guard.as_ref() {
            Some(existing) if existing.dimension != dimension => Err(IndexError::DimensionMismatch {
                expected: existing.dimension,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                *guard = Some(Collection {
                    dimension,
                    points: HashMap::new(),
                });
                Ok(())
            }
        }
    }

    async fn delete_collection(&self) -> Result<(), IndexError> {
        *self.collection.write().await = None;
        Ok(())
    }

    async fn upsert(&self, record: IndexRecord) -> Result<(), IndexError> {
        let mut guard = self.collection.write().await;
        let collection = guard
            .as_mut()
            .ok_or_else(|| IndexError::CollectionMissing(self.name.clone()))?;
        Self::check_dimension(collection, &record.vector)?;
        collection.points.insert(record.id, record);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let guard = self.collection.read().await;
        let collection = guard
            .as_ref()
            .ok_or_else(|| IndexError::CollectionMissing(self.name.clone()))?;
        Self::check_dimension(collection, vector)?;

        let mut hits: Vec<IndexHit> = collection
            .points
            .values()
            .filter(|record| filter.map_or(true, |f| f.matches(&record.payload)))
            .map(|record| IndexHit {
                id: record.id,
                score: Self::cosine_similarity(vector, &record.vector),
                payload: record.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payload>, IndexError> {
        let guard = self.collection.read().await;
        let collection = guard
            .as_ref()
            .ok_or_else(|| IndexError::CollectionMissing(self.name.clone()))?;
        Ok(collection.points.get(&id).map(|r| r.payload.clone()))
    }

    async fn scroll(&self) -> Result<Vec<(Uuid, Payload)>, IndexError> {
        let guard = self.collection.read().await;
        let collection = guard
            .as_ref()
            .ok_or_else(|| IndexError::CollectionMissing(self.name.clone()))?;
        Ok(collection
            .points
            .values()
            .map(|r| (r.id, r.payload.clone()))
            .collect())
    }
}
