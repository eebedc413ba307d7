// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for pattern storage and retrieval through the public API.
//!
//! Covers the success-rate floor, threshold-filtered search, hybrid ranking,
//! and usage counting under concurrent callers.

use std::sync::Arc;

use aegis_pattern_cortex::{
    HashEmbeddingClient, InMemoryVectorIndex, PatternStore, PatternStoreError, PromotionConfig,
    SemanticTaskSignature, SignatureCodec,
};

async fn store_from_config(config: &PromotionConfig) -> Arc<PatternStore> {
    let store = PatternStore::new(
        Arc::new(InMemoryVectorIndex::new(config.store.collection_name.clone())),
        Arc::new(HashEmbeddingClient::new(config.store.embedding_dimension)),
        config.store.clone(),
    );
    store.initialize().await.expect("in-memory index initializes");
    Arc::new(store)
}

fn email_signature(purpose: &str) -> SemanticTaskSignature {
    SemanticTaskSignature::new(purpose, "validate")
        .unwrap()
        .with_input("email", "str")
        .with_output("is_valid", "bool")
        .with_domain("authentication")
}

#[tokio::test]
async fn test_stored_email_validator_is_retrievable_by_similar_task() {
    let store = store_from_config(&PromotionConfig::default()).await;

    let stored = store
        .store(
            email_signature("Validate email format"),
            "def validate_email(email: str) -> bool: ...".to_string(),
            0.97,
        )
        .await
        .unwrap();

    let query = email_signature("Validate user email");
    let results = store.search(&query, Some(5), Some(0.85)).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pattern.id, stored);
    assert!(results[0].similarity_score >= 0.85, "score {}", results[0].similarity_score);
    assert_eq!(results[0].pattern.usage_count, 1);
}

#[tokio::test]
async fn test_success_rate_floor() {
    let store = store_from_config(&PromotionConfig::default()).await;

    let rejected = store
        .store(email_signature("Validate email format"), "code".to_string(), 0.92)
        .await;
    assert!(matches!(
        rejected,
        Err(PatternStoreError::BelowQualityFloor { success_rate, floor }) if success_rate == 0.92 && floor == 0.95
    ));

    let accepted = store
        .store(email_signature("Validate email format"), "code".to_string(), 0.96)
        .await
        .unwrap();
    assert!(store.get(accepted).is_some());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_search_never_returns_below_threshold() {
    let store = store_from_config(&PromotionConfig::default()).await;
    store
        .store(email_signature("Validate email format"), "a".to_string(), 0.97)
        .await
        .unwrap();
    store
        .store(email_signature("Validate email domain and format"), "b".to_string(), 0.98)
        .await
        .unwrap();
    store
        .store(
            SemanticTaskSignature::new("Parse CSV records", "parse")
                .unwrap()
                .with_input("path", "str")
                .with_output("rows", "list"),
            "c".to_string(),
            0.99,
        )
        .await
        .unwrap();

    for threshold in [0.0, 0.5, 0.85, 0.95] {
        let results = store
            .search(&email_signature("Validate email format"), Some(10), Some(threshold))
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.similarity_score >= threshold));
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
    }
}

#[tokio::test]
async fn test_hybrid_search_restricts_domain() {
    let store = store_from_config(&PromotionConfig::default()).await;
    store
        .store(email_signature("Validate email format"), "auth".to_string(), 0.97)
        .await
        .unwrap();
    store
        .store(
            SemanticTaskSignature::new("Validate email format", "validate")
                .unwrap()
                .with_input("email", "str")
                .with_output("is_valid", "bool")
                .with_domain("api"),
            "api".to_string(),
            0.97,
        )
        .await
        .unwrap();

    let results = store
        .hybrid_search(&email_signature("Validate email format"), Some("api"), Some(5))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pattern.domain, "api");
    assert!(results[0].final_score <= 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_search_hits_are_all_counted() {
    let store = store_from_config(&PromotionConfig::default()).await;
    let id = store
        .store(email_signature("Validate email format"), "code".to_string(), 0.97)
        .await
        .unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .search(&email_signature("Validate user email"), Some(3), None)
                    .await
                    .unwrap()
                    .len()
            })
        })
        .collect();

    let mut total_hits = 0;
    for task in tasks {
        total_hits += task.await.unwrap();
    }

    assert_eq!(total_hits, 32);
    assert_eq!(store.get(id).unwrap().usage_count, 32);
    assert_eq!(store.metrics().most_used_patterns[0], (id, 32));
}

#[tokio::test]
async fn test_store_rebuilt_over_shared_index_finds_patterns() {
    let config = PromotionConfig::default();
    let index = Arc::new(InMemoryVectorIndex::new(config.store.collection_name.clone()));
    let embedder = Arc::new(HashEmbeddingClient::new(config.store.embedding_dimension));

    let before_restart = PatternStore::new(index.clone(), embedder.clone(), config.store.clone());
    before_restart.initialize().await.unwrap();
    let stored = before_restart
        .store(
            email_signature("Validate email format"),
            "def validate_email(email: str) -> bool: ...".to_string(),
            0.97,
        )
        .await
        .unwrap();
    drop(before_restart);

    let after_restart = PatternStore::new(index, embedder, config.store.clone());
    after_restart.initialize().await.unwrap();
    assert_eq!(after_restart.metrics().total_patterns, 1);

    let results = after_restart
        .search(&email_signature("Validate user email"), None, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pattern.id, stored);
    assert_eq!(results[0].pattern.code, "def validate_email(email: str) -> bool: ...");
    assert_eq!(results[0].pattern.usage_count, 1);
    assert_eq!(after_restart.metrics().avg_usage_count, 1.0);
}

#[test]
fn test_signature_codec_properties() {
    let a = email_signature("Validate email format");
    let b = email_signature("Validate user email");

    assert_eq!(SignatureCodec::hash(&a), SignatureCodec::hash(&a.clone()));
    assert_ne!(SignatureCodec::hash(&a), SignatureCodec::hash(&b));
    assert_eq!(SignatureCodec::similarity(&a, &a), 1.0);
    assert_eq!(SignatureCodec::similarity(&a, &b), SignatureCodec::similarity(&b, &a));
}
