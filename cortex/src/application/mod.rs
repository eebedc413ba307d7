// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application services: scoring, validation, storage and the promotion pipeline

pub mod quality_evaluator;
pub mod pattern_analyzer;
pub mod promotion_validator;
pub mod threshold_manager;
pub mod lineage_tracker;
pub mod pattern_store;
pub mod promotion_pipeline;

pub use quality_evaluator::{QualityEvaluator, QualityMetrics, QualityWeights};
pub use pattern_analyzer::{CodeFeatures, PatternAnalyzer, PromotionScore, SecurityAssessment, SecurityLevel};
pub use promotion_validator::{
    check_compliance, ComplianceLevel, ComplianceReport, PromotionValidator,
    StandardPromotionValidator, UsageStats, ValidationResult,
};
pub use threshold_manager::{AdaptiveThresholdManager, DomainThreshold};
pub use lineage_tracker::{ImprovementRecord, PatternLineageTracker};
pub use pattern_store::{KeywordOverlapScorer, MetadataScorer, PatternStore, PatternStoreError};
pub use promotion_pipeline::{PipelineError, PromotionOutcome, PromotionPipeline};
