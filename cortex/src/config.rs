// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Promotion Configuration
//
// Tunables for the pattern cortex, loadable from YAML:
// - Fixed promotion thresholds
// - Pattern store retrieval settings (similarity floor, hybrid weights)
// - Adaptive per-domain threshold behaviour
// - Usage-based re-validation gate
// - Quality evaluation ceilings
//
// Every field has a default so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionConfig {
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    #[serde(default)]
    pub usage_gate: UsageGateConfig,

    #[serde(default)]
    pub quality: QualityConfig,
}

/// Fixed promotion bars applied by the validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    #[serde(default = "default_min_test_coverage")]
    pub min_test_coverage: f64,

    #[serde(default = "default_min_performance_score")]
    pub min_performance_score: f64,

    /// Base for the adaptive per-domain quality threshold
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Results returned by a search when the caller passes no `top_k`
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Characters of code kept in the index payload as an excerpt
    #[serde(default = "default_code_excerpt_chars")]
    pub code_excerpt_chars: usize,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,

    #[serde(default = "default_metadata_weight")]
    pub metadata_weight: f64,

    /// Weight of the code excerpt's embedding relative to the signature
    /// text's when a pattern is indexed
    #[serde(default = "default_code_weight")]
    pub code_weight: f64,

    /// Hybrid hits whose vector score falls below this are dropped before ranking
    #[serde(default = "default_hybrid_min_vector_score")]
    pub hybrid_min_vector_score: f64,

    /// Qdrant endpoint for `QdrantVectorIndex::from_config`; the `qdrant`
    /// feature's default endpoint when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Below this many recorded outcomes the base threshold is returned unchanged
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Rolling history length per domain
    #[serde(default = "default_window")]
    pub window: usize,

    #[serde(default = "default_high_success_ratio")]
    pub high_success_ratio: f64,

    #[serde(default = "default_low_success_ratio")]
    pub low_success_ratio: f64,

    /// Largest shift applied in either direction
    #[serde(default = "default_max_shift")]
    pub max_shift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageGateConfig {
    #[serde(default = "default_min_usage")]
    pub min_usage: u64,

    #[serde(default = "default_max_errors")]
    pub max_errors: u64,

    #[serde(default = "default_min_validation_ratio")]
    pub min_validation_ratio: f64,

    /// Rolling validation-outcome history length per pattern
    #[serde(default = "default_usage_window")]
    pub window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Latency at or above which the performance score reaches zero
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: f64,
}

fn default_min_success_rate() -> f64 {
    0.95
}

fn default_min_test_coverage() -> f64 {
    0.80
}

fn default_min_performance_score() -> f64 {
    0.70
}

fn default_min_quality_score() -> f64 {
    0.75
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_top_k() -> usize {
    5
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_collection_name() -> String {
    "aegis_task_patterns".to_string()
}

fn default_code_excerpt_chars() -> usize {
    500
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_metadata_weight() -> f64 {
    0.3
}

fn default_code_weight() -> f64 {
    0.3
}

fn default_hybrid_min_vector_score() -> f64 {
    0.5
}

fn default_min_samples() -> usize {
    10
}

fn default_window() -> usize {
    100
}

fn default_high_success_ratio() -> f64 {
    0.90
}

fn default_low_success_ratio() -> f64 {
    0.65
}

fn default_max_shift() -> f64 {
    0.05
}

fn default_min_usage() -> u64 {
    5
}

fn default_max_errors() -> u64 {
    2
}

fn default_min_validation_ratio() -> f64 {
    0.80
}

fn default_usage_window() -> usize {
    20
}

fn default_latency_ceiling_ms() -> f64 {
    1000.0
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            min_test_coverage: default_min_test_coverage(),
            min_performance_score: default_min_performance_score(),
            min_quality_score: default_min_quality_score(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            default_top_k: default_top_k(),
            embedding_dimension: default_embedding_dimension(),
            collection_name: default_collection_name(),
            code_excerpt_chars: default_code_excerpt_chars(),
            vector_weight: default_vector_weight(),
            metadata_weight: default_metadata_weight(),
            code_weight: default_code_weight(),
            hybrid_min_vector_score: default_hybrid_min_vector_score(),
            qdrant_url: None,
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            window: default_window(),
            high_success_ratio: default_high_success_ratio(),
            low_success_ratio: default_low_success_ratio(),
            max_shift: default_max_shift(),
        }
    }
}

impl Default for UsageGateConfig {
    fn default() -> Self {
        Self {
            min_usage: default_min_usage(),
            max_errors: default_max_errors(),
            min_validation_ratio: default_min_validation_ratio(),
            window: default_usage_window(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            latency_ceiling_ms: default_latency_ceiling_ms(),
        }
    }
}

impl PromotionConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_PROMOTION_CONFIG_PATH environment variable
    /// 2. ./aegis-promotion.yaml (working directory)
    /// 3. ~/.aegis/promotion.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_PROMOTION_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-promotion.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("promotion.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            tracing::info!("Loading promotion configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load promotion config at {:?}: {}", path, e)
            })?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading promotion configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::warn!("No promotion configuration file found. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_PATTERN_SIMILARITY_THRESHOLD") {
            match val.parse::<f64>() {
                Ok(threshold) => {
                    tracing::info!("Environment override: AEGIS_PATTERN_SIMILARITY_THRESHOLD={}", threshold);
                    self.store.similarity_threshold = threshold;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_PATTERN_SIMILARITY_THRESHOLD: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("AEGIS_PATTERN_MIN_QUALITY") {
            match val.parse::<f64>() {
                Ok(quality) => {
                    tracing::info!("Environment override: AEGIS_PATTERN_MIN_QUALITY={}", quality);
                    self.thresholds.min_quality_score = quality;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_PATTERN_MIN_QUALITY: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(url) = std::env::var("AEGIS_QDRANT_URL") {
            tracing::info!("Environment override: AEGIS_QDRANT_URL={}", url);
            self.store.qdrant_url = Some(url);
        }

        if let Ok(val) = std::env::var("AEGIS_PATTERN_EMBEDDING_DIM") {
            match val.parse::<usize>() {
                Ok(dim) => {
                    tracing::info!("Environment override: AEGIS_PATTERN_EMBEDDING_DIM={}", dim);
                    self.store.embedding_dimension = dim;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_PATTERN_EMBEDDING_DIM: '{}'. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let unit_fields = [
            ("thresholds.min_success_rate", self.thresholds.min_success_rate),
            ("thresholds.min_test_coverage", self.thresholds.min_test_coverage),
            ("thresholds.min_performance_score", self.thresholds.min_performance_score),
            ("thresholds.min_quality_score", self.thresholds.min_quality_score),
            ("store.similarity_threshold", self.store.similarity_threshold),
            ("store.vector_weight", self.store.vector_weight),
            ("store.metadata_weight", self.store.metadata_weight),
            ("store.code_weight", self.store.code_weight),
            ("store.hybrid_min_vector_score", self.store.hybrid_min_vector_score),
            ("adaptive.high_success_ratio", self.adaptive.high_success_ratio),
            ("adaptive.low_success_ratio", self.adaptive.low_success_ratio),
            ("adaptive.max_shift", self.adaptive.max_shift),
            ("usage_gate.min_validation_ratio", self.usage_gate.min_validation_ratio),
        ];

        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("Invalid {}: {} (must be within [0, 1])", name, value);
            }
        }

        if self.store.default_top_k == 0 {
            anyhow::bail!("Invalid store.default_top_k: must be greater than 0");
        }

        if self.store.embedding_dimension == 0 {
            anyhow::bail!("Invalid store.embedding_dimension: must be greater than 0");
        }

        if self.adaptive.low_success_ratio >= self.adaptive.high_success_ratio {
            anyhow::bail!(
                "Invalid adaptive ratios: low ({}) must be below high ({})",
                self.adaptive.low_success_ratio,
                self.adaptive.high_success_ratio
            );
        }

        if self.quality.latency_ceiling_ms <= 0.0 {
            anyhow::bail!("Invalid quality.latency_ceiling_ms: must be positive");
        }

        Ok(())
    }
}
