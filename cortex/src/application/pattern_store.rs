// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Store
//!
//! Owns the collection of promoted patterns. Each pattern is embedded from its
//! signature's semantic text blended with an excerpt of its code, and
//! upserted into the [`VectorIndex`] with a payload carrying the full record.
//! The index is the durable copy: [`initialize`](PatternStore::initialize)
//! loads every persisted pattern into the in-process catalog, and hits on
//! patterns stored by another instance are rebuilt from their payload. The
//! catalog holds the live usage counters.
//!
//! ## Retrieval
//!
//! - [`search`](PatternStore::search): pure vector similarity, filtered at
//!   `similarity_threshold`, sorted descending.
//! - [`hybrid_search`](PatternStore::hybrid_search): with a domain, restricts
//!   to that domain and ranks by
//!   `vector_weight * vector_score + metadata_weight * metadata_score`;
//!   without one, falls back to pure vector ranking. Either way hits below
//!   `hybrid_min_vector_score` are dropped first.
//!
//! Every returned pattern counts as a retrieval hit and has its
//! `usage_count` incremented under the catalog's per-entry lock, so
//! concurrent searches never lose increments.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::domain::{
    HybridMatch, PatternId, PatternMatch, SemanticTaskSignature, SignatureCodec, StoreMetrics,
    StoredPattern, MIN_STORED_SUCCESS_RATE,
};
use crate::infrastructure::embedding_client::{EmbeddingError, EmbeddingProvider};
use crate::infrastructure::vector_index::{
    DistanceMetric, IndexError, IndexHit, IndexRecord, MetadataFilter, Payload, VectorIndex,
};

/// Number of entries reported in `StoreMetrics::most_used_patterns`
const MOST_USED_LIMIT: usize = 10;

/// Candidates fetched per requested hybrid result before re-ranking
const HYBRID_OVERFETCH: usize = 3;

#[derive(Debug, Error)]
pub enum PatternStoreError {
    #[error("Success rate {success_rate:.3} is below the store floor {floor:.2}")]
    BelowQualityFloor { success_rate: f64, floor: f64 },

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Vector index error: {0}")]
    Index(IndexError),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(#[from] EmbeddingError),

    #[error("Pattern not found: {0}")]
    NotFound(PatternId),

    #[error("Invalid success rate {0}: must be within [0, 1]")]
    InvalidSuccessRate(f64),
}

impl From<IndexError> for PatternStoreError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::Unavailable(_) | IndexError::CollectionMissing(_) => {
                PatternStoreError::IndexUnavailable(error.to_string())
            }
            other => PatternStoreError::Index(other),
        }
    }
}

/// Relevance of a stored pattern to a query, independent of embeddings
pub trait MetadataScorer: Send + Sync {
    /// Score in `[0, 1]`
    fn score(&self, query: &SemanticTaskSignature, pattern: &StoredPattern) -> f64;
}

/// Fraction of the query's keywords (purpose words, intent, domain) found
/// among the pattern's tags, domain and purpose words
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordOverlapScorer;

impl KeywordOverlapScorer {
    fn keywords<'a>(purpose: &'a str, extra: impl Iterator<Item = &'a str>) -> HashSet<String> {
        purpose
            .split_whitespace()
            .chain(extra)
            .map(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                    .to_lowercase()
            })
            .filter(|word| !word.is_empty())
            .collect()
    }
}

impl MetadataScorer for KeywordOverlapScorer {
    fn score(&self, query: &SemanticTaskSignature, pattern: &StoredPattern) -> f64 {
        let wanted = Self::keywords(
            query.purpose(),
            [query.intent(), query.domain()].into_iter(),
        );
        if wanted.is_empty() {
            return 0.0;
        }

        let available = Self::keywords(
            pattern.signature.purpose(),
            pattern
                .tags
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(pattern.domain.as_str())),
        );

        let overlap = wanted.intersection(&available).count();
        (overlap as f64 / wanted.len() as f64).clamp(0.0, 1.0)
    }
}

pub struct PatternStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    scorer: Arc<dyn MetadataScorer>,
    catalog: DashMap<PatternId, StoredPattern>,
    config: StoreConfig,
}

/// Catalog entry inserted ahead of the index upsert; removed again on drop
/// unless committed
struct CatalogReservation<'a> {
    catalog: &'a DashMap<PatternId, StoredPattern>,
    pattern_id: PatternId,
    committed: bool,
}

impl<'a> CatalogReservation<'a> {
    fn insert(catalog: &'a DashMap<PatternId, StoredPattern>, pattern: StoredPattern) -> Self {
        let pattern_id = pattern.id;
        catalog.insert(pattern_id, pattern);
        Self {
            catalog,
            pattern_id,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for CatalogReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.catalog.remove(&self.pattern_id);
        }
    }
}

impl PatternStore {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: StoreConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            scorer: Arc::new(KeywordOverlapScorer),
            catalog: DashMap::new(),
            config,
        }
    }

    /// Replace the default [`KeywordOverlapScorer`]
    pub fn with_scorer(mut self, scorer: Arc<dyn MetadataScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Create the index collection sized to the embedder and load every
    /// pattern already persisted in it
    pub async fn initialize(&self) -> Result<(), PatternStoreError> {
        let dimension = self.embedder.dimension();
        if dimension != self.config.embedding_dimension {
            warn!(
                configured = self.config.embedding_dimension,
                embedder = dimension,
                "Embedding dimension differs from configuration; using the embedder's"
            );
        }

        self.index
            .create_collection(dimension, DistanceMetric::Cosine)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to initialize pattern collection"))?;

        let points = self.index.scroll().await?;
        let mut loaded = 0;
        for (id, payload) in points {
            let pattern_id = PatternId(id);
            match pattern_from_payload(pattern_id, &payload) {
                Some(pattern) => {
                    self.catalog.entry(pattern_id).or_insert(pattern);
                    loaded += 1;
                }
                None => warn!(pattern_id = %pattern_id, "Skipping indexed point with unreadable payload"),
            }
        }

        info!(
            collection = %self.config.collection_name,
            dimension,
            loaded,
            "Pattern store initialized"
        );
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Admit a pattern. Fails below the success-rate floor without touching
    /// the index.
    pub async fn store(
        &self,
        signature: SemanticTaskSignature,
        code: String,
        success_rate: f64,
    ) -> Result<PatternId, PatternStoreError> {
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(PatternStoreError::InvalidSuccessRate(success_rate));
        }
        if success_rate < MIN_STORED_SUCCESS_RATE {
            counter!("aegis_pattern_store_failures_total", "reason" => "below_floor").increment(1);
            return Err(PatternStoreError::BelowQualityFloor {
                success_rate,
                floor: MIN_STORED_SUCCESS_RATE,
            });
        }

        let pattern = StoredPattern::new(signature, code, success_rate);
        let vector = self.embed_pattern(&pattern).await?;

        let record = IndexRecord {
            id: pattern.id.0,
            vector,
            payload: self.payload_for(&pattern),
        };

        let pattern_id = pattern.id;
        let domain = pattern.domain.clone();
        let reservation = CatalogReservation::insert(&self.catalog, pattern);

        if let Err(e) = self.index.upsert(record).await {
            counter!("aegis_pattern_store_failures_total", "reason" => "index").increment(1);
            warn!(pattern_id = %pattern_id, error = %e, "Failed to index pattern");
            return Err(e.into());
        }
        reservation.commit();

        info!(
            pattern_id = %pattern_id,
            domain = %domain,
            success_rate,
            "Stored pattern"
        );
        counter!("aegis_patterns_stored_total", "domain" => domain).increment(1);

        Ok(pattern_id)
    }

    /// Vector search. `top_k` defaults to `default_top_k` and
    /// `similarity_threshold` to the configured floor.
    pub async fn search(
        &self,
        query: &SemanticTaskSignature,
        top_k: Option<usize>,
        similarity_threshold: Option<f64>,
    ) -> Result<Vec<PatternMatch>, PatternStoreError> {
        let threshold = similarity_threshold.unwrap_or(self.config.similarity_threshold);
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        let hits = self.query_index(query, top_k, None).await?;

        let mut matches: Vec<PatternMatch> = hits
            .iter()
            .filter(|hit| hit.score >= threshold)
            .filter_map(|hit| {
                self.record_hit(hit).map(|pattern| PatternMatch {
                    pattern,
                    similarity_score: hit.score,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(results = matches.len(), threshold, "Pattern search completed");
        counter!("aegis_pattern_search_hits_total").increment(matches.len() as u64);
        Ok(matches)
    }

    pub async fn hybrid_search(
        &self,
        query: &SemanticTaskSignature,
        domain: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<HybridMatch>, PatternStoreError> {
        let scorer = Arc::clone(&self.scorer);
        self.hybrid_search_with_scorer(query, domain, top_k, scorer.as_ref())
            .await
    }

    /// Hybrid search with a caller-supplied relevance signal. Hits below
    /// `hybrid_min_vector_score` never reach the ranking.
    pub async fn hybrid_search_with_scorer(
        &self,
        query: &SemanticTaskSignature,
        domain: Option<&str>,
        top_k: Option<usize>,
        scorer: &dyn MetadataScorer,
    ) -> Result<Vec<HybridMatch>, PatternStoreError> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        let floor = self.config.hybrid_min_vector_score;

        let Some(domain) = domain else {
            let hits = self.query_index(query, top_k, None).await?;
            let matches: Vec<HybridMatch> = hits
                .iter()
                .filter(|hit| hit.score >= floor)
                .filter_map(|hit| {
                    self.record_hit(hit).map(|pattern| HybridMatch {
                        pattern,
                        vector_score: hit.score,
                        metadata_score: 0.0,
                        final_score: hit.score,
                    })
                })
                .collect();
            counter!("aegis_pattern_search_hits_total").increment(matches.len() as u64);
            return Ok(matches);
        };

        let filter = MetadataFilter::new().eq("domain", domain);
        let hits = self
            .query_index(query, top_k.saturating_mul(HYBRID_OVERFETCH), Some(&filter))
            .await?;

        let mut ranked: Vec<(&IndexHit, f64, f64)> = hits
            .iter()
            .filter(|hit| hit.score >= floor)
            .filter_map(|hit| {
                let pattern = self.resolve(hit)?;
                let metadata_score = scorer.score(query, &pattern).clamp(0.0, 1.0);
                let final_score = self.config.vector_weight * hit.score
                    + self.config.metadata_weight * metadata_score;
                Some((hit, metadata_score, final_score))
            })
            .collect();

        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        let matches: Vec<HybridMatch> = ranked
            .into_iter()
            .filter_map(|(hit, metadata_score, final_score)| {
                self.record_hit(hit).map(|pattern| HybridMatch {
                    pattern,
                    vector_score: hit.score,
                    metadata_score,
                    final_score,
                })
            })
            .collect();

        debug!(results = matches.len(), domain, "Hybrid search completed");
        counter!("aegis_pattern_search_hits_total").increment(matches.len() as u64);
        Ok(matches)
    }

    /// Set a new success rate; returns the previous one. `usage_count` is untouched.
    pub fn update_success(&self, pattern_id: PatternId, new_rate: f64) -> Result<f64, PatternStoreError> {
        if !(0.0..=1.0).contains(&new_rate) {
            return Err(PatternStoreError::InvalidSuccessRate(new_rate));
        }

        let mut entry = self
            .catalog
            .get_mut(&pattern_id)
            .ok_or(PatternStoreError::NotFound(pattern_id))?;
        let old_rate = entry.success_rate;
        entry.success_rate = new_rate;

        if new_rate < MIN_STORED_SUCCESS_RATE {
            warn!(
                pattern_id = %pattern_id,
                new_rate,
                floor = MIN_STORED_SUCCESS_RATE,
                "Pattern success rate fell below the store floor"
            );
        }
        Ok(old_rate)
    }

    pub fn get(&self, pattern_id: PatternId) -> Option<StoredPattern> {
        self.catalog.get(&pattern_id).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn metrics(&self) -> StoreMetrics {
        let snapshot: Vec<(PatternId, f64, u64, String)> = self
            .catalog
            .iter()
            .map(|p| (p.id, p.success_rate, p.usage_count, p.domain.clone()))
            .collect();

        if snapshot.is_empty() {
            return StoreMetrics::default();
        }

        let total = snapshot.len();
        let avg_success_rate = snapshot.iter().map(|s| s.1).sum::<f64>() / total as f64;
        let avg_usage_count = snapshot.iter().map(|s| s.2 as f64).sum::<f64>() / total as f64;

        let mut domain_distribution = BTreeMap::new();
        for (_, _, _, domain) in &snapshot {
            *domain_distribution.entry(domain.clone()).or_insert(0) += 1;
        }

        let mut most_used: Vec<(PatternId, u64)> =
            snapshot.iter().map(|(id, _, usage, _)| (*id, *usage)).collect();
        most_used.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        most_used.truncate(MOST_USED_LIMIT);

        StoreMetrics {
            total_patterns: total,
            avg_success_rate,
            avg_usage_count,
            domain_distribution,
            most_used_patterns: most_used,
        }
    }

    async fn query_index(
        &self,
        query: &SemanticTaskSignature,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, PatternStoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(&query.semantic_text()).await?;
        self.index.query(&vector, top_k, filter).await.map_err(|e| {
            warn!(error = %e, "Vector index query failed");
            PatternStoreError::from(e)
        })
    }

    /// Signature text embedding blended with the code excerpt's, weighted by
    /// `code_weight`, then re-normalized
    async fn embed_pattern(&self, pattern: &StoredPattern) -> Result<Vec<f32>, PatternStoreError> {
        let mut vector = self.embedder.embed(&pattern.signature.semantic_text()).await?;

        let excerpt = self.excerpt(&pattern.code);
        let weight = self.config.code_weight as f32;
        if weight > 0.0 && !excerpt.trim().is_empty() {
            let code_vector = self.embedder.embed(&excerpt).await?;
            if code_vector.len() == vector.len() {
                for (value, code) in vector.iter_mut().zip(&code_vector) {
                    *value += weight * code;
                }
                normalize(&mut vector);
            }
        }

        Ok(vector)
    }

    fn excerpt(&self, code: &str) -> String {
        code.chars().take(self.config.code_excerpt_chars).collect()
    }

    /// The catalog record for an index hit. A pattern persisted by another
    /// store instance is rebuilt from the hit's payload and cached.
    fn resolve(&self, hit: &IndexHit) -> Option<StoredPattern> {
        let pattern_id = PatternId(hit.id);
        match self.catalog.entry(pattern_id) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => match pattern_from_payload(pattern_id, &hit.payload) {
                Some(pattern) => {
                    debug!(pattern_id = %pattern_id, "Loaded pattern from index payload");
                    Some(entry.insert(pattern).value().clone())
                }
                None => {
                    warn!(pattern_id = %pattern_id, "Index hit with unreadable payload; skipping");
                    None
                }
            },
        }
    }

    /// Increment usage for a returned pattern and hand back the updated record
    fn record_hit(&self, hit: &IndexHit) -> Option<StoredPattern> {
        self.resolve(hit)?;
        let mut pattern = self.catalog.get_mut(&PatternId(hit.id))?;
        pattern.usage_count += 1;
        Some(pattern.value().clone())
    }

    fn payload_for(&self, pattern: &StoredPattern) -> Payload {
        let mut payload = Payload::new();
        payload.insert("pattern_id".to_string(), Value::from(pattern.id.to_string()));
        payload.insert("domain".to_string(), Value::from(pattern.domain.clone()));
        payload.insert("intent".to_string(), Value::from(pattern.signature.intent()));
        payload.insert("purpose".to_string(), Value::from(pattern.signature.purpose()));
        payload.insert("semantic_hash".to_string(), Value::from(pattern.semantic_hash.clone()));
        payload.insert("success_rate".to_string(), Value::from(pattern.success_rate));
        payload.insert("usage_count".to_string(), Value::from(pattern.usage_count));
        payload.insert("tags".to_string(), Value::from(pattern.tags.clone()));
        payload.insert("code".to_string(), Value::from(pattern.code.clone()));
        payload.insert("code_excerpt".to_string(), Value::from(self.excerpt(&pattern.code)));
        payload.insert("created_at".to_string(), Value::from(pattern.created_at.to_rfc3339()));
        payload.insert(
            "signature".to_string(),
            serde_json::to_value(&pattern.signature).unwrap_or_default(),
        );
        payload
    }
}

/// Rebuild a stored pattern from its index payload. `usage_count` is the
/// value at storage time.
fn pattern_from_payload(pattern_id: PatternId, payload: &Payload) -> Option<StoredPattern> {
    let signature: SemanticTaskSignature =
        serde_json::from_value(payload.get("signature")?.clone()).ok()?;
    let code = payload.get("code")?.as_str()?.to_string();
    let success_rate = payload.get("success_rate")?.as_f64()?;

    let usage_count = payload
        .get("usage_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let tags = payload
        .get("tags")
        .and_then(|tags| serde_json::from_value(tags.clone()).ok())
        .unwrap_or_default();
    let semantic_hash = payload
        .get("semantic_hash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| SignatureCodec::hash(&signature));
    let created_at = payload
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(StoredPattern {
        id: pattern_id,
        domain: signature.domain().to_string(),
        signature,
        code,
        success_rate,
        usage_count,
        tags,
        semantic_hash,
        created_at,
    })
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::embedding_client::HashEmbeddingClient;
    use crate::infrastructure::in_memory_index::InMemoryVectorIndex;
    use async_trait::async_trait;
    use uuid::Uuid;

    /// Index double whose backend is always down
    struct UnreachableIndex;

    #[async_trait]
    impl VectorIndex for UnreachableIndex {
        async fn create_collection(&self, _: usize, _: DistanceMetric) -> Result<(), IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
        async fn delete_collection(&self) -> Result<(), IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
        async fn upsert(&self, _: IndexRecord) -> Result<(), IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
        async fn query(
            &self,
            _: &[f32],
            _: usize,
            _: Option<&MetadataFilter>,
        ) -> Result<Vec<IndexHit>, IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
        async fn get(&self, _: Uuid) -> Result<Option<Payload>, IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
        async fn scroll(&self) -> Result<Vec<(Uuid, Payload)>, IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
    }

    /// Index double whose upserts never complete
    struct HangingIndex(InMemoryVectorIndex);

    #[async_trait]
    impl VectorIndex for HangingIndex {
        async fn create_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<(), IndexError> {
            self.0.create_collection(dimension, metric).await
        }
        async fn delete_collection(&self) -> Result<(), IndexError> {
            self.0.delete_collection().await
        }
        async fn upsert(&self, _: IndexRecord) -> Result<(), IndexError> {
            std::future::pending::<Result<(), IndexError>>().await
        }
        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<IndexHit>, IndexError> {
            self.0.query(vector, top_k, filter).await
        }
        async fn get(&self, id: Uuid) -> Result<Option<Payload>, IndexError> {
            self.0.get(id).await
        }
        async fn scroll(&self) -> Result<Vec<(Uuid, Payload)>, IndexError> {
            self.0.scroll().await
        }
    }

    /// Scores every pattern identically
    struct ConstantScorer(f64);

    impl MetadataScorer for ConstantScorer {
        fn score(&self, _: &SemanticTaskSignature, _: &StoredPattern) -> f64 {
            self.0
        }
    }

    async fn store() -> PatternStore {
        let store = PatternStore::new(
            Arc::new(InMemoryVectorIndex::default()),
            Arc::new(HashEmbeddingClient::new(768)),
            StoreConfig::default(),
        );
        store.initialize().await.unwrap();
        store
    }

    fn email_signature(purpose: &str) -> SemanticTaskSignature {
        SemanticTaskSignature::new(purpose, "validate")
            .unwrap()
            .with_input("email", "str")
            .with_output("is_valid", "bool")
            .with_domain("authentication")
    }

    fn sort_signature() -> SemanticTaskSignature {
        SemanticTaskSignature::new("Sort numbers", "sort")
            .unwrap()
            .with_input("values", "list")
            .with_output("sorted", "list")
            .with_domain("data_processing")
    }

    #[tokio::test]
    async fn test_store_enforces_floor() {
        let store = store().await;

        let err = store
            .store(email_signature("Validate email format"), "code".to_string(), 0.92)
            .await
            .unwrap_err();
        match err {
            PatternStoreError::BelowQualityFloor { success_rate, floor } => {
                assert_eq!(success_rate, 0.92);
                assert_eq!(floor, 0.95);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_empty());

        let id = store
            .store(email_signature("Validate email format"), "code".to_string(), 0.96)
            .await
            .unwrap();
        assert!(!id.to_string().is_empty());
        assert_eq!(store.get(id).unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn test_store_rejects_out_of_range_rate() {
        let store = store().await;
        let result = store.store(email_signature("Validate email"), "code".to_string(), 1.2).await;
        assert!(matches!(result, Err(PatternStoreError::InvalidSuccessRate(_))));
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_counts_usage() {
        let store = store().await;
        let email_id = store
            .store(email_signature("Validate email format"), "def validate(email): ...".to_string(), 0.97)
            .await
            .unwrap();
        let sort_id = store
            .store(sort_signature(), "def sort(values): ...".to_string(), 0.99)
            .await
            .unwrap();

        let results = store.search(&email_signature("Validate user email"), Some(5), None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pattern.id, email_id);
        assert!(results[0].similarity_score >= 0.85);
        assert_eq!(results[0].pattern.usage_count, 1);
        assert_eq!(store.get(sort_id).unwrap().usage_count, 0);

        let everything = store.search(&email_signature("Validate user email"), Some(5), Some(0.0)).await.unwrap();
        assert_eq!(everything.len(), 2);
        assert!(everything[0].similarity_score >= everything[1].similarity_score);
        assert_eq!(store.get(email_id).unwrap().usage_count, 2);
        assert_eq!(store.get(sort_id).unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn test_hybrid_search_with_domain() {
        let store = store().await;
        let email_id = store
            .store(email_signature("Validate email format"), "code".to_string(), 0.97)
            .await
            .unwrap();
        store.store(sort_signature(), "code".to_string(), 0.97).await.unwrap();

        let results = store
            .hybrid_search(&email_signature("Validate user email"), Some("authentication"), Some(5))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.pattern.id, email_id);
        assert!((hit.final_score - (0.7 * hit.vector_score + 0.3 * hit.metadata_score)).abs() < 1e-9);
        assert!(hit.metadata_score > 0.5);
        assert_eq!(hit.pattern.usage_count, 1);
    }

    #[tokio::test]
    async fn test_hybrid_search_custom_scorer() {
        let store = store().await;
        store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await.unwrap();

        let results = store
            .hybrid_search_with_scorer(
                &email_signature("Validate email format"),
                Some("authentication"),
                Some(5),
                &ConstantScorer(0.0),
            )
            .await
            .unwrap();
        assert!((results[0].final_score - 0.7 * results[0].vector_score).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hybrid_search_without_domain_is_vector_only() {
        let store = store().await;
        store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await.unwrap();
        store.store(email_signature("Validate email address"), "code".to_string(), 0.97).await.unwrap();
        let sort_id = store.store(sort_signature(), "code".to_string(), 0.97).await.unwrap();

        let results = store
            .hybrid_search(&email_signature("Validate user email"), None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        for hit in &results {
            assert_eq!(hit.final_score, hit.vector_score);
            assert_eq!(hit.metadata_score, 0.0);
            assert_ne!(hit.pattern.id, sort_id);
        }
        assert!(results[0].final_score >= results[1].final_score);
    }

    #[tokio::test]
    async fn test_hybrid_search_drops_weak_vector_matches() {
        let store = store().await;
        let sort_id = store.store(sort_signature(), "code".to_string(), 0.97).await.unwrap();

        // Same domain, unrelated task: the metadata blend alone must not surface it
        let query = SemanticTaskSignature::new("Merge customer records", "merge")
            .unwrap()
            .with_domain("data_processing");
        let results = store
            .hybrid_search_with_scorer(&query, Some("data_processing"), None, &ConstantScorer(1.0))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(store.get(sort_id).unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn test_update_success_leaves_usage() {
        let store = store().await;
        let id = store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await.unwrap();
        store.search(&email_signature("Validate email format"), Some(1), None).await.unwrap();

        let old = store.update_success(id, 0.99).unwrap();
        assert_eq!(old, 0.97);
        let pattern = store.get(id).unwrap();
        assert_eq!(pattern.success_rate, 0.99);
        assert_eq!(pattern.usage_count, 1);

        assert!(matches!(
            store.update_success(PatternId::new(), 0.99),
            Err(PatternStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_metrics() {
        let store = store().await;
        assert_eq!(store.metrics().total_patterns, 0);

        let email_id = store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await.unwrap();
        store.store(sort_signature(), "code".to_string(), 0.99).await.unwrap();
        store.search(&email_signature("Validate email format"), Some(1), None).await.unwrap();

        let metrics = store.metrics();
        assert_eq!(metrics.total_patterns, 2);
        assert!((metrics.avg_success_rate - 0.98).abs() < 1e-9);
        assert!((metrics.avg_usage_count - 0.5).abs() < 1e-9);
        assert_eq!(metrics.domain_distribution["authentication"], 1);
        assert_eq!(metrics.domain_distribution["data_processing"], 1);
        assert_eq!(metrics.most_used_patterns[0], (email_id, 1));
    }

    #[tokio::test]
    async fn test_index_unavailable_surfaces() {
        let store = PatternStore::new(
            Arc::new(UnreachableIndex),
            Arc::new(HashEmbeddingClient::new(768)),
            StoreConfig::default(),
        );

        assert!(matches!(store.initialize().await, Err(PatternStoreError::IndexUnavailable(_))));

        let stored = store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await;
        assert!(matches!(stored, Err(PatternStoreError::IndexUnavailable(_))));
        assert!(store.is_empty());

        let searched = store.search(&email_signature("Validate email"), Some(5), None).await;
        assert!(matches!(searched, Err(PatternStoreError::IndexUnavailable(_))));
    }

    #[tokio::test]
    async fn test_payload_carries_excerpt() {
        let index = Arc::new(InMemoryVectorIndex::default());
        let store = PatternStore::new(
            index.clone(),
            Arc::new(HashEmbeddingClient::new(768)),
            StoreConfig { code_excerpt_chars: 4, ..StoreConfig::default() },
        );
        store.initialize().await.unwrap();
        let id = store.store(email_signature("Validate email format"), "abcdefgh".to_string(), 0.97).await.unwrap();

        let payload = index.get(id.0).await.unwrap().unwrap();
        assert_eq!(payload["code_excerpt"], "abcd");
        assert_eq!(payload["code"], "abcdefgh");
        assert_eq!(payload["domain"], "authentication");
        assert_eq!(payload["semantic_hash"].as_str().unwrap().len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_searches_do_not_lose_increments() {
        let store = Arc::new(store().await);
        let id = store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let hits = store.search(&email_signature("Validate email format"), Some(1), None).await.unwrap();
                    assert_eq!(hits.len(), 1);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(id).unwrap().usage_count, 160);
    }

    #[test]
    fn test_keyword_overlap_scorer() {
        let pattern = StoredPattern::new(email_signature("Validate email format"), String::new(), 0.97);
        let scorer = KeywordOverlapScorer;

        // query keywords: validate, user, email, authentication
        let score = scorer.score(&email_signature("Validate user email"), &pattern);
        assert!((score - 0.75).abs() < 1e-9);
        assert_eq!(scorer.score(&sort_signature(), &pattern), 0.0);
    }

    #[tokio::test]
    async fn test_store_over_populated_index_loads_patterns() {
        let index = Arc::new(InMemoryVectorIndex::default());
        let embedder = Arc::new(HashEmbeddingClient::new(768));
        let first = PatternStore::new(index.clone(), embedder.clone(), StoreConfig::default());
        first.initialize().await.unwrap();
        let stored = first
            .store(email_signature("Validate email format"), "def validate(email): ...".to_string(), 0.97)
            .await
            .unwrap();

        let second = PatternStore::new(index.clone(), embedder.clone(), StoreConfig::default());
        second.initialize().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.metrics().total_patterns, 1);

        let loaded = second.get(stored).unwrap();
        assert_eq!(loaded.code, "def validate(email): ...");
        assert_eq!(loaded.signature, email_signature("Validate email format"));
        assert_eq!(loaded.domain, "authentication");
        assert_eq!(loaded.success_rate, 0.97);

        // Stored by the first instance after the second loaded
        let later = first.store(sort_signature(), "def sort(values): ...".to_string(), 0.98).await.unwrap();
        let results = second.search(&sort_signature(), None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pattern.id, later);
        assert_eq!(second.get(later).unwrap().usage_count, 1);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_code_excerpt_shapes_stored_vector() {
        let code_only_signature = PatternStore::new(
            Arc::new(InMemoryVectorIndex::default()),
            Arc::new(HashEmbeddingClient::new(768)),
            StoreConfig { code_weight: 0.0, ..StoreConfig::default() },
        );
        code_only_signature.initialize().await.unwrap();
        let blended = store().await;

        let code = "def validate(email): return '@' in email".to_string();
        for store in [&code_only_signature, &blended] {
            store.store(email_signature("Validate email format"), code.clone(), 0.97).await.unwrap();
        }

        let query = email_signature("Validate email format");
        let plain = code_only_signature.search(&query, None, Some(0.0)).await.unwrap();
        let mixed = blended.search(&query, None, Some(0.0)).await.unwrap();
        assert!(plain[0].similarity_score > 0.999);
        assert!(mixed[0].similarity_score < plain[0].similarity_score);
        assert!(mixed[0].similarity_score >= 0.85);
    }

    #[tokio::test]
    async fn test_configured_top_k_applies_when_unset() {
        let store = PatternStore::new(
            Arc::new(InMemoryVectorIndex::default()),
            Arc::new(HashEmbeddingClient::new(768)),
            StoreConfig { default_top_k: 1, ..StoreConfig::default() },
        );
        store.initialize().await.unwrap();
        store.store(email_signature("Validate email format"), "code".to_string(), 0.97).await.unwrap();
        store.store(email_signature("Validate email address"), "code".to_string(), 0.97).await.unwrap();

        let query = email_signature("Validate user email");
        assert_eq!(store.search(&query, None, Some(0.0)).await.unwrap().len(), 1);
        assert_eq!(store.search(&query, Some(5), Some(0.0)).await.unwrap().len(), 2);
        assert_eq!(store.hybrid_search(&query, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_store_leaves_no_catalog_entry() {
        let store = PatternStore::new(
            Arc::new(HangingIndex(InMemoryVectorIndex::default())),
            Arc::new(HashEmbeddingClient::new(768)),
            StoreConfig::default(),
        );
        store.initialize().await.unwrap();

        let pending = store.store(email_signature("Validate email format"), "code".to_string(), 0.97);
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), pending).await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
