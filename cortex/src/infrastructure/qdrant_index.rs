// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Qdrant production implementation of [`VectorIndex`]
//!
//! Points are keyed by the pattern UUID; the payload is stored as-is and
//! searched with cosine distance. Every client failure surfaces as
//! [`IndexError::Unavailable`] so callers can retry at a higher layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Feature:** `qdrant`

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        Condition, CreateCollectionBuilder, Distance, Filter, GetPointsBuilder, PointId,
        PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder,
    },
    Payload as QdrantPayload, Qdrant,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::StoreConfig;

use super::vector_index::{
    DistanceMetric, IndexError, IndexHit, IndexRecord, MetadataFilter, Payload, VectorIndex,
};

/// Endpoint used when `store.qdrant_url` is not set
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

const SCROLL_PAGE_SIZE: u32 = 256;

pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantVectorIndex {
    pub fn new(url: &str, collection: impl Into<String>, dimension: usize) -> Result<Self, IndexError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| IndexError::Unavailable(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: collection.into(),
            dimension,
        })
    }

    /// Build from the `store` configuration section
    pub fn from_config(config: &StoreConfig) -> Result<Self, IndexError> {
        let url = config.qdrant_url.as_deref().unwrap_or(DEFAULT_QDRANT_URL);
        Self::new(url, config.collection_name.clone(), config.embedding_dimension)
    }

    fn unavailable(context: &str, error: impl std::fmt::Display) -> IndexError {
        IndexError::Unavailable(format!("{}: {}", context, error))
    }

    fn to_filter(filter: &MetadataFilter) -> Filter {
        Filter::must(
            filter
                .must_match
                .iter()
                .map(|(key, value)| Condition::matches(key.clone(), value.clone())),
        )
    }

    fn to_payload(payload: Payload) -> Result<QdrantPayload, IndexError> {
        let object = serde_json::Value::Object(payload.into_iter().collect());
        QdrantPayload::try_from(object).map_err(|e| IndexError::Backend(e.to_string()))
    }

    fn from_payload(payload: HashMap<String, Value>) -> Payload {
        payload
            .into_iter()
            .map(|(key, value)| (key, value.into_json()))
            .collect()
    }

    fn point_uuid(id: Option<PointId>) -> Option<Uuid> {
        use qdrant_client::qdrant::point_id::PointIdOptions;
        match id?.point_id_options? {
            PointIdOptions::Uuid(s) => Uuid::parse_str(&s).ok(),
            PointIdOptions::Num(_) => None,
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn create_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<(), IndexError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| Self::unavailable("Failed to check collection existence", e))?;

        if !exists {
            let distance = match metric {
                DistanceMetric::Cosine => Distance::Cosine,
            };
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, distance)),
                )
                .await
                .map_err(|e| Self::unavailable("Failed to create Qdrant collection", e))?;
        }

        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), IndexError> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| Self::unavailable("Failed to delete Qdrant collection", e))?;
        Ok(())
    }

    async fn upsert(&self, record: IndexRecord) -> Result<(), IndexError> {
        if record.vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }

        let point = PointStruct::new(
            record.id.to_string(),
            record.vector,
            Self::to_payload(record.payload)?,
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| Self::unavailable("Failed to upsert point", e))?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let mut builder = SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            builder = builder.filter(Self::to_filter(filter));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Self::unavailable("Failed to search Qdrant", e))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = Self::point_uuid(point.id)?;
                Some(IndexHit {
                    id,
                    score: (point.score as f64).clamp(0.0, 1.0),
                    payload: Self::from_payload(point.payload),
                })
            })
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payload>, IndexError> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![PointId::from(id.to_string())])
                    .with_payload(true),
            )
            .await
            .map_err(|e| Self::unavailable("Failed to fetch point", e))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .map(|point| Self::from_payload(point.payload)))
    }

    async fn scroll(&self) -> Result<Vec<(Uuid, Payload)>, IndexError> {
        let mut points = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| Self::unavailable("Failed to scroll Qdrant collection", e))?;

            points.extend(response.result.into_iter().filter_map(|point| {
                let id = Self::point_uuid(point.id)?;
                Some((id, Self::from_payload(point.payload)))
            }));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://localhost:6334";

    #[test]
    fn test_filter_translation() {
        let filter = MetadataFilter::new().eq("domain", "authentication").eq("intent", "validate");
        assert_eq!(QdrantVectorIndex::to_filter(&filter).must.len(), 2);
    }

    #[test]
    fn test_from_config_uses_store_section() {
        let config = StoreConfig {
            qdrant_url: Some("http://qdrant.internal:6334".to_string()),
            collection_name: "patterns_test".to_string(),
            embedding_dimension: 16,
            ..StoreConfig::default()
        };
        let index = QdrantVectorIndex::from_config(&config).expect("client");
        assert_eq!(index.collection, "patterns_test");
        assert_eq!(index.dimension, 16);
    }

    #[tokio::test]
    #[ignore] // Requires running Qdrant instance
    async fn test_upsert_and_query() {
        let index = QdrantVectorIndex::new(URL, "aegis_task_patterns_test", 4).expect("client");
        index.create_collection(4, DistanceMetric::Cosine).await.expect("collection");

        let id = Uuid::new_v4();
        let mut payload = Payload::new();
        payload.insert("domain".to_string(), serde_json::Value::from("api"));
        index
            .upsert(IndexRecord { id, vector: vec![0.5, 0.5, 0.5, 0.5], payload })
            .await
            .expect("upsert");

        let filter = MetadataFilter::new().eq("domain", "api");
        let hits = index.query(&[0.5, 0.5, 0.5, 0.5], 5, Some(&filter)).await.expect("query");
        assert!(hits.iter().any(|hit| hit.id == id && hit.score > 0.99));

        let payload = index.get(id).await.expect("get").expect("point exists");
        assert_eq!(payload["domain"], "api");
        assert!(index.scroll().await.expect("scroll").iter().any(|(point, _)| *point == id));

        index.delete_collection().await.expect("cleanup");
    }

    #[tokio::test]
    #[ignore] // Requires running Qdrant instance
    async fn test_dimension_mismatch_rejected_locally() {
        let index = QdrantVectorIndex::new(URL, "aegis_task_patterns_test", 4).expect("client");
        let result = index
            .upsert(IndexRecord { id: Uuid::new_v4(), vector: vec![1.0], payload: Payload::new() })
            .await;
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }
}
