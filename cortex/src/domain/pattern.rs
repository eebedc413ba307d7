// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use super::signature::SemanticTaskSignature;
use super::signature_codec::SignatureCodec;

/// Success-rate floor for admission into the pattern store
pub const MIN_STORED_SUCCESS_RATE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A previously successful code solution, indexed by its signature.
///
/// Only `usage_count` (on retrieval hits) and `success_rate` (explicit update)
/// change after creation, and only through the pattern store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPattern {
    pub id: PatternId,
    pub signature: SemanticTaskSignature,
    pub code: String,
    pub success_rate: f64,
    pub usage_count: u64,
    pub domain: String,
    pub tags: Vec<String>,
    pub semantic_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StoredPattern {
    pub fn new(signature: SemanticTaskSignature, code: String, success_rate: f64) -> Self {
        let semantic_hash = SignatureCodec::hash(&signature);
        let domain = signature.domain().to_string();
        let tags = derive_tags(&signature);

        Self {
            id: PatternId::new(),
            signature,
            code,
            success_rate,
            usage_count: 0,
            domain,
            tags,
            semantic_hash,
            created_at: Utc::now(),
        }
    }
}

/// Tags are the intent, the domain and every parameter name, deduplicated
fn derive_tags(signature: &SemanticTaskSignature) -> Vec<String> {
    let mut tags = vec![signature.intent().to_string(), signature.domain().to_string()];
    for name in signature.parameter_names() {
        let name = name.to_lowercase();
        if !tags.contains(&name) {
            tags.push(name);
        }
    }
    tags
}

/// A `search` hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: StoredPattern,
    pub similarity_score: f64,
}

/// A `hybrid_search` hit with its score breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridMatch {
    pub pattern: StoredPattern,
    pub vector_score: f64,
    pub metadata_score: f64,
    pub final_score: f64,
}

/// Aggregate, read-only view over the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub total_patterns: usize,
    pub avg_success_rate: f64,
    pub avg_usage_count: f64,
    pub domain_distribution: BTreeMap<String, usize>,
    /// Pattern ids with their usage counts, most used first
    pub most_used_patterns: Vec<(PatternId, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pattern_defaults() {
        let sig = SemanticTaskSignature::new("Validate email format", "validate")
            .unwrap()
            .with_input("email", "str")
            .with_output("is_valid", "bool")
            .with_domain("authentication");
        let pattern = StoredPattern::new(sig.clone(), "def f(email): ...".to_string(), 0.97);

        assert_eq!(pattern.usage_count, 0);
        assert_eq!(pattern.domain, "authentication");
        assert_eq!(pattern.semantic_hash, SignatureCodec::hash(&sig));
        assert_eq!(pattern.tags, vec!["validate", "authentication", "email", "is_valid"]);
    }

    #[test]
    fn test_pattern_ids_are_unique() {
        assert_ne!(PatternId::new(), PatternId::new());
    }
}
