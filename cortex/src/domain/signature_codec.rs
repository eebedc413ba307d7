// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Signature Codec
//!
//! Deterministic hashing and pairwise similarity for [`SemanticTaskSignature`].
//! Pure functions, no I/O.
//!
//! Similarity is a weighted sum of four Jaccard-style components:
//!
//! | Component | Weight | Basis |
//! |-----------|--------|-------|
//! | purpose | 0.40 | lower-cased whitespace tokens |
//! | i/o | 0.30 | union of input and output parameter names |
//! | domain | 0.20 | 1.0 if equal, else 0.5 |
//! | constraints | 0.10 | constraint strings |

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use super::signature::SemanticTaskSignature;

const HASH_SEPARATOR: &str = "|";

const PURPOSE_WEIGHT: f64 = 0.40;
const IO_WEIGHT: f64 = 0.30;
const DOMAIN_WEIGHT: f64 = 0.20;
const CONSTRAINT_WEIGHT: f64 = 0.10;

/// Domain score for signatures in different domains. Never zero so that
/// patterns can be reused across domains.
const CROSS_DOMAIN_SIMILARITY: f64 = 0.5;

pub struct SignatureCodec;

impl SignatureCodec {
    /// SHA-256 over purpose, intent, key-sorted inputs, key-sorted outputs,
    /// security level and performance tier, as a 64-char lower-case hex string.
    pub fn hash(signature: &SemanticTaskSignature) -> String {
        let material = [
            signature.purpose().to_string(),
            signature.intent().to_string(),
            render_parameters(signature.inputs().iter()),
            render_parameters(signature.outputs().iter()),
            signature.security_level().as_str().to_string(),
            signature.performance_tier().as_str().to_string(),
        ]
        .join(HASH_SEPARATOR);

        hex::encode(Sha256::digest(material.as_bytes()))
    }

    /// Symmetric similarity in `[0.0, 1.0]`, rounded to 3 decimal places
    pub fn similarity(a: &SemanticTaskSignature, b: &SemanticTaskSignature) -> f64 {
        let purpose = jaccard(&purpose_tokens(a), &purpose_tokens(b));

        let io_a: BTreeSet<&str> = a.parameter_names().collect();
        let io_b: BTreeSet<&str> = b.parameter_names().collect();
        let io = jaccard(&io_a, &io_b);

        let domain = if a.domain() == b.domain() { 1.0 } else { CROSS_DOMAIN_SIMILARITY };

        let constraints_a: BTreeSet<&str> = a.constraints().iter().map(String::as_str).collect();
        let constraints_b: BTreeSet<&str> = b.constraints().iter().map(String::as_str).collect();
        let constraints = jaccard(&constraints_a, &constraints_b);

        let score = PURPOSE_WEIGHT * purpose
            + IO_WEIGHT * io
            + DOMAIN_WEIGHT * domain
            + CONSTRAINT_WEIGHT * constraints;

        round3(score.clamp(0.0, 1.0))
    }
}

/// Parameters rendered as `name:type` in key order
fn render_parameters<'a>(params: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let mut rendered: Vec<String> = params.map(|(name, ty)| format!("{}:{}", name, ty)).collect();
    rendered.sort();
    rendered.join(",")
}

fn purpose_tokens(signature: &SemanticTaskSignature) -> BTreeSet<String> {
    signature
        .purpose()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard index; two empty sets are identical
pub(crate) fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signature::{PerformanceTier, SecurityRequirement};

    fn email_signature() -> SemanticTaskSignature {
        SemanticTaskSignature::new("Validate email format", "validate")
            .unwrap()
            .with_input("email", "str")
            .with_output("is_valid", "bool")
            .with_domain("authentication")
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let sig = email_signature();
        let h1 = SignatureCodec::hash(&sig);
        let h2 = SignatureCodec::hash(&sig.clone());
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_independent_of_insertion_order() {
        let a = SemanticTaskSignature::new("Merge two records", "merge")
            .unwrap()
            .with_input("left", "dict")
            .with_input("right", "dict");
        let b = SemanticTaskSignature::new("Merge two records", "merge")
            .unwrap()
            .with_input("right", "dict")
            .with_input("left", "dict");
        assert_eq!(SignatureCodec::hash(&a), SignatureCodec::hash(&b));
    }

    #[test]
    fn test_hash_changes_with_each_field() {
        let base = email_signature();
        let base_hash = SignatureCodec::hash(&base);

        let variants = vec![
            SemanticTaskSignature::new("Validate email syntax", "validate")
                .unwrap()
                .with_input("email", "str")
                .with_output("is_valid", "bool"),
            SemanticTaskSignature::new("Validate email format", "parse")
                .unwrap()
                .with_input("email", "str")
                .with_output("is_valid", "bool"),
            base.clone().with_input("strict", "bool"),
            base.clone().with_output("reason", "str"),
            base.clone().with_security_level(SecurityRequirement::Critical),
            base.clone().with_performance_tier(PerformanceTier::Batch),
        ];

        for variant in variants {
            assert_ne!(SignatureCodec::hash(&variant), base_hash);
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let sig = email_signature();
        assert_eq!(SignatureCodec::similarity(&sig, &sig), 1.0);

        let bare = SemanticTaskSignature::new("x", "map").unwrap();
        assert_eq!(SignatureCodec::similarity(&bare, &bare), 1.0);
    }

    #[test]
    fn test_similarity_symmetric_and_bounded() {
        let a = email_signature();
        let b = SemanticTaskSignature::new("Upload a file to storage", "store")
            .unwrap()
            .with_input("path", "str")
            .with_constraint("max 10MB");
        let ab = SignatureCodec::similarity(&a, &b);
        let ba = SignatureCodec::similarity(&b, &a);
        assert_eq!(ab, ba);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn test_similarity_components() {
        let a = email_signature();
        let b = SemanticTaskSignature::new("Validate user email", "validate")
            .unwrap()
            .with_input("email", "str")
            .with_output("is_valid", "bool")
            .with_domain("authentication");
        // purpose: {validate, email} / {validate, email, format, user} = 0.5
        // 0.4*0.5 + 0.3*1.0 + 0.2*1.0 + 0.1*1.0 = 0.8
        assert_eq!(SignatureCodec::similarity(&a, &b), 0.8);
    }

    #[test]
    fn test_cross_domain_is_half_weight() {
        let a = email_signature();
        let b = email_signature().with_domain("billing");
        // Everything equal except domain: 1.0 - 0.2 * 0.5
        assert_eq!(SignatureCodec::similarity(&a, &b), 0.9);
    }

    #[test]
    fn test_jaccard_empty_sets() {
        let empty: BTreeSet<&str> = BTreeSet::new();
        let one: BTreeSet<&str> = ["a"].into_iter().collect();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&empty, &one), 0.0);
    }
}
