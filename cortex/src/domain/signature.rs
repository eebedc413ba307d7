// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Semantic Task Signature
//!
//! Immutable description of what a task is meant to do. Signatures are the
//! retrieval key for pattern reuse: two tasks with similar signatures are
//! expected to be solvable by the same stored pattern.
//!
//! Construction always goes through [`SemanticTaskSignature::new`] or the
//! [`SignatureSpec`] conversion, both of which reject malformed input with a
//! [`SignatureError`] instead of silently defaulting required fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on the trimmed purpose length
pub const MAX_PURPOSE_LEN: usize = 500;

/// Domain assigned when classification finds no keyword match
pub const GENERAL_DOMAIN: &str = "general";

/// Sentinel domain that requests keyword-based classification
pub const AUTO_DOMAIN: &str = "auto";

/// Action verbs accepted as a signature intent (lower-case)
pub const KNOWN_INTENTS: &[&str] = &[
    "validate", "transform", "parse", "generate", "calculate", "compute",
    "filter", "aggregate", "convert", "format", "fetch", "send", "store",
    "retrieve", "search", "sort", "merge", "analyze", "authenticate",
    "authorize", "encrypt", "decrypt", "compress", "decompress", "notify",
    "schedule", "process", "create", "update", "delete", "extract", "map",
];

/// Fixed domain vocabulary used when the caller asks for `"auto"`
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("authentication", &[
        "auth", "authenticate", "login", "logout", "password", "credential",
        "credentials", "session", "token", "email", "oauth", "jwt", "signin", "signup",
    ]),
    ("data_processing", &[
        "csv", "json", "parse", "transform", "record", "records", "dataset",
        "data", "normalize", "aggregate", "etl", "xml",
    ]),
    ("api", &[
        "http", "request", "response", "endpoint", "rest", "api", "webhook",
        "graphql", "route",
    ]),
    ("database", &[
        "sql", "query", "table", "database", "db", "migration", "postgres",
        "schema", "row", "rows",
    ]),
    ("file_io", &[
        "file", "files", "path", "directory", "read", "write", "upload", "download",
    ]),
    ("security", &[
        "encrypt", "decrypt", "hash", "signature", "sanitize", "secure",
        "cipher", "certificate", "vulnerability",
    ]),
    ("networking", &[
        "socket", "tcp", "udp", "network", "dns", "packet", "connection",
    ]),
    ("machine_learning", &[
        "model", "train", "predict", "inference", "embedding", "classifier", "features",
    ]),
];

/// Signature construction errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Signature purpose must not be empty")]
    EmptyPurpose,

    #[error("Signature purpose is {len} characters, maximum is {max}")]
    PurposeTooLong { len: usize, max: usize },

    #[error("Unknown intent '{0}'")]
    UnknownIntent(String),

    #[error("Unknown security level '{0}' (expected low|medium|high|critical)")]
    UnknownSecurityLevel(String),

    #[error("Unknown performance tier '{0}' (expected fast|standard|slow|batch)")]
    UnknownPerformanceTier(String),
}

/// Security requirement declared by the task author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityRequirement {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl SecurityRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityRequirement::Low => "low",
            SecurityRequirement::Medium => "medium",
            SecurityRequirement::High => "high",
            SecurityRequirement::Critical => "critical",
        }
    }
}

impl FromStr for SecurityRequirement {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(SecurityRequirement::Low),
            "medium" => Ok(SecurityRequirement::Medium),
            "high" => Ok(SecurityRequirement::High),
            "critical" => Ok(SecurityRequirement::Critical),
            other => Err(SignatureError::UnknownSecurityLevel(other.to_string())),
        }
    }
}

impl fmt::Display for SecurityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected latency class of the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Fast,
    #[default]
    Standard,
    Slow,
    Batch,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Fast => "fast",
            PerformanceTier::Standard => "standard",
            PerformanceTier::Slow => "slow",
            PerformanceTier::Batch => "batch",
        }
    }
}

impl FromStr for PerformanceTier {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(PerformanceTier::Fast),
            "standard" => Ok(PerformanceTier::Standard),
            "slow" => Ok(PerformanceTier::Slow),
            "batch" => Ok(PerformanceTier::Batch),
            other => Err(SignatureError::UnknownPerformanceTier(other.to_string())),
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a task's intent.
///
/// Fields are private so the purpose/intent invariants established at
/// construction cannot be broken afterwards. Inputs and outputs are kept in
/// `BTreeMap`s so every rendering of them is key-ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SignatureSpec", into = "SignatureSpec")]
pub struct SemanticTaskSignature {
    purpose: String,
    intent: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
    domain: String,
    constraints: Vec<String>,
    security_level: SecurityRequirement,
    performance_tier: PerformanceTier,
    idempotency: bool,
}

impl SemanticTaskSignature {
    /// Create a signature with a validated purpose and intent.
    ///
    /// The domain is classified from the purpose until [`with_domain`](Self::with_domain)
    /// sets it explicitly.
    pub fn new(purpose: impl Into<String>, intent: &str) -> Result<Self, SignatureError> {
        let purpose = normalize_purpose(purpose.into())?;
        let intent = normalize_intent(intent)?;
        let domain = classify_domain(&purpose);

        Ok(Self {
            purpose,
            intent,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            domain,
            constraints: Vec::new(),
            security_level: SecurityRequirement::default(),
            performance_tier: PerformanceTier::default(),
            idempotency: false,
        })
    }

    pub fn with_input(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), ty.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), ty.into());
        self
    }

    /// Set the domain. `"auto"` re-runs keyword classification on the purpose.
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = resolve_domain(domain, &self.purpose);
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_security_level(mut self, level: SecurityRequirement) -> Self {
        self.security_level = level;
        self
    }

    pub fn with_performance_tier(mut self, tier: PerformanceTier) -> Self {
        self.performance_tier = tier;
        self
    }

    pub fn with_idempotency(mut self, idempotent: bool) -> Self {
        self.idempotency = idempotent;
        self
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn constraints(&self) -> &[String] {
        &self.constraints
    }

    pub fn security_level(&self) -> SecurityRequirement {
        self.security_level
    }

    pub fn performance_tier(&self) -> PerformanceTier {
        self.performance_tier
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotency
    }

    /// Names of all input and output parameters
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().chain(self.outputs.keys()).map(String::as_str)
    }

    /// Text handed to the embedding provider when indexing or querying
    pub fn semantic_text(&self) -> String {
        let mut parts = vec![self.purpose.clone(), self.intent.clone()];
        parts.extend(self.parameter_names().map(str::to_string));
        parts.push(self.domain.clone());
        parts.join(" ")
    }
}

/// Unvalidated signature fields, as received over the wire or from config.
///
/// Converting into [`SemanticTaskSignature`] performs all validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub purpose: String,
    pub intent: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default = "default_security_level")]
    pub security_level: String,
    #[serde(default = "default_performance_tier")]
    pub performance_tier: String,
    #[serde(default)]
    pub idempotency: bool,
}

fn default_domain() -> String {
    AUTO_DOMAIN.to_string()
}

fn default_security_level() -> String {
    SecurityRequirement::default().as_str().to_string()
}

fn default_performance_tier() -> String {
    PerformanceTier::default().as_str().to_string()
}

impl TryFrom<SignatureSpec> for SemanticTaskSignature {
    type Error = SignatureError;

    fn try_from(spec: SignatureSpec) -> Result<Self, Self::Error> {
        let security_level = spec.security_level.parse::<SecurityRequirement>()?;
        let performance_tier = spec.performance_tier.parse::<PerformanceTier>()?;

        let mut signature = SemanticTaskSignature::new(spec.purpose, &spec.intent)?
            .with_domain(&spec.domain)
            .with_security_level(security_level)
            .with_performance_tier(performance_tier)
            .with_idempotency(spec.idempotency);
        signature.inputs = spec.inputs;
        signature.outputs = spec.outputs;
        signature.constraints = spec.constraints;

        Ok(signature)
    }
}

impl From<SemanticTaskSignature> for SignatureSpec {
    fn from(signature: SemanticTaskSignature) -> Self {
        Self {
            purpose: signature.purpose,
            intent: signature.intent,
            inputs: signature.inputs,
            outputs: signature.outputs,
            domain: signature.domain,
            constraints: signature.constraints,
            security_level: signature.security_level.as_str().to_string(),
            performance_tier: signature.performance_tier.as_str().to_string(),
            idempotency: signature.idempotency,
        }
    }
}

fn normalize_purpose(purpose: String) -> Result<String, SignatureError> {
    let trimmed = purpose.trim();
    if trimmed.is_empty() {
        return Err(SignatureError::EmptyPurpose);
    }
    let len = trimmed.chars().count();
    if len > MAX_PURPOSE_LEN {
        return Err(SignatureError::PurposeTooLong { len, max: MAX_PURPOSE_LEN });
    }
    Ok(trimmed.to_string())
}

fn normalize_intent(intent: &str) -> Result<String, SignatureError> {
    let normalized = intent.trim().to_lowercase();
    if KNOWN_INTENTS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(SignatureError::UnknownIntent(intent.to_string()))
    }
}

fn resolve_domain(domain: &str, purpose: &str) -> String {
    let normalized = domain.trim().to_lowercase();
    if normalized.is_empty() || normalized == AUTO_DOMAIN {
        classify_domain(purpose)
    } else {
        normalized
    }
}

/// Keyword classification of a purpose into the fixed domain vocabulary.
///
/// The domain with the most keyword hits wins; ties go to the earlier entry
/// in the vocabulary. No hits yields [`GENERAL_DOMAIN`].
pub fn classify_domain(purpose: &str) -> String {
    let lowered = purpose.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();

    let mut best: Option<(&str, usize)> = None;
    for (domain, keywords) in DOMAIN_KEYWORDS {
        let hits = tokens.iter().filter(|t| keywords.contains(*t)).count();
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((*domain, hits));
        }
    }

    best.map(|(domain, _)| domain.to_string())
        .unwrap_or_else(|| GENERAL_DOMAIN.to_string())
}
