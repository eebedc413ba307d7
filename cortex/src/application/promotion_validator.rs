// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Promotion Validator
//!
//! Two independent gates decide whether a pattern belongs in the reusable store.
//!
//! ## Quality gate (`validate`)
//!
//! Runs on a brand-new candidate. All six criteria must hold at once:
//!
//! | Criterion | Bar |
//! |-----------|-----|
//! | success rate | ≥ `min_success_rate` (0.95) |
//! | test coverage | ≥ `min_test_coverage` (0.80) |
//! | security level | no worse than `MEDIUM` |
//! | compliance level | `PARTIAL` or `FULL` |
//! | performance score | ≥ `min_performance_score` (0.70) |
//! | overall quality | ≥ the caller's (adaptive) quality threshold |
//!
//! ```text
//! quality = 0.25*success + 0.25*coverage + 0.20*security
//!         + 0.15*performance + 0.15*compliance
//! ```
//!
//! ## Usage gate (`should_promote`)
//!
//! Applies to stored patterns that have accrued usage: at least `min_usage`
//! retrievals, at most `max_errors` failures, and a rolling validation success
//! ratio of at least `min_validation_ratio`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

use crate::application::pattern_analyzer::{CodeFeatures, PatternAnalyzer, SecurityLevel};
use crate::application::quality_evaluator::QualityMetrics;
use crate::config::{ThresholdConfig, UsageGateConfig};
use crate::domain::{PatternCandidate, PatternId, UsageReview};

/// Worst security level a promotable candidate may carry
pub const MIN_SECURITY_LEVEL: SecurityLevel = SecurityLevel::Medium;

/// Worst compliance level a promotable candidate may carry
pub const MIN_COMPLIANCE_LEVEL: ComplianceLevel = ComplianceLevel::Partial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceLevel {
    Full,
    Partial,
    Minimal,
    None,
}

impl ComplianceLevel {
    /// 0 is best
    pub fn rank(&self) -> u8 {
        match self {
            ComplianceLevel::Full => 0,
            ComplianceLevel::Partial => 1,
            ComplianceLevel::Minimal => 2,
            ComplianceLevel::None => 3,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            ComplianceLevel::Full => 1.0,
            ComplianceLevel::Partial => 0.75,
            ComplianceLevel::Minimal => 0.50,
            ComplianceLevel::None => 0.25,
        }
    }

    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.9 {
            ComplianceLevel::Full
        } else if ratio >= 0.7 {
            ComplianceLevel::Partial
        } else if ratio >= 0.4 {
            ComplianceLevel::Minimal
        } else {
            ComplianceLevel::None
        }
    }

    pub fn meets(&self, minimum: ComplianceLevel) -> bool {
        self.rank() <= minimum.rank()
    }
}

impl fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplianceLevel::Full => "FULL",
            ComplianceLevel::Partial => "PARTIAL",
            ComplianceLevel::Minimal => "MINIMAL",
            ComplianceLevel::None => "NONE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub level: ComplianceLevel,
    pub ratio: f64,
    /// Names of the checks that did not pass
    pub missing: Vec<String>,
}

/// Ratio of the six structural checks that pass
pub fn check_compliance(features: &CodeFeatures) -> ComplianceReport {
    let checks = [
        ("documentation", features.has_documentation),
        ("type annotations", features.has_type_annotations),
        ("error handling", features.has_error_handling),
        ("logging", features.has_logging),
        ("naming convention", features.follows_naming_convention),
        ("no TODO markers", features.todo_markers == 0),
    ];

    let passed = checks.iter().filter(|(_, ok)| *ok).count();
    let ratio = passed as f64 / checks.len() as f64;
    let missing = checks
        .iter()
        .filter(|(_, ok)| !*ok)
        .map(|(name, _)| name.to_string())
        .collect();

    ComplianceReport {
        level: ComplianceLevel::from_ratio(ratio),
        ratio,
        missing,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// No critical security finding and the syntax check (when reported) passed
    pub is_valid: bool,
    pub should_promote: bool,
    pub quality_score: f64,
    pub quality_threshold: f64,
    pub security_level: SecurityLevel,
    pub compliance_level: ComplianceLevel,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub reasoning: String,
}

/// Usage counters for one stored pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub usage_count: u64,
    pub error_count: u64,
    pub validations: VecDeque<bool>,
}

impl UsageStats {
    pub fn validation_ratio(&self) -> Option<f64> {
        if self.validations.is_empty() {
            return None;
        }
        let passed = self.validations.iter().filter(|v| **v).count();
        Some(passed as f64 / self.validations.len() as f64)
    }
}

pub trait PromotionValidator: Send + Sync {
    /// Quality gate for a new candidate. `min_quality` is the domain's
    /// current (possibly adjusted) quality threshold.
    fn validate(
        &self,
        candidate: &PatternCandidate,
        metrics: &QualityMetrics,
        code: &str,
        min_quality: f64,
    ) -> ValidationResult;

    fn record_usage(&self, pattern_id: PatternId);

    fn record_error(&self, pattern_id: PatternId);

    fn record_validation(&self, pattern_id: PatternId, passed: bool);

    /// Usage gate for a stored pattern
    fn should_promote(&self, pattern_id: PatternId) -> bool;

    fn review(&self, pattern_id: PatternId) -> UsageReview;

    fn usage_stats(&self, pattern_id: PatternId) -> Option<UsageStats>;
}

pub struct StandardPromotionValidator {
    thresholds: ThresholdConfig,
    usage_gate: UsageGateConfig,
    analyzer: PatternAnalyzer,
    usage: DashMap<PatternId, UsageStats>,
}

impl StandardPromotionValidator {
    pub fn new(thresholds: ThresholdConfig, usage_gate: UsageGateConfig) -> Self {
        Self {
            thresholds,
            usage_gate,
            analyzer: PatternAnalyzer::new(),
            usage: DashMap::new(),
        }
    }

    pub fn overall_quality_score(
        metrics: &QualityMetrics,
        security: SecurityLevel,
        compliance: ComplianceLevel,
    ) -> f64 {
        0.25 * metrics.success_rate
            + 0.25 * metrics.test_coverage
            + 0.20 * security.score()
            + 0.15 * metrics.performance_score
            + 0.15 * compliance.weight()
    }
}

impl Default for StandardPromotionValidator {
    fn default() -> Self {
        Self::new(ThresholdConfig::default(), UsageGateConfig::default())
    }
}

impl PromotionValidator for StandardPromotionValidator {
    fn validate(
        &self,
        candidate: &PatternCandidate,
        metrics: &QualityMetrics,
        code: &str,
        min_quality: f64,
    ) -> ValidationResult {
        let security = self.analyzer.analyze_security(code);
        let compliance = check_compliance(&self.analyzer.features(code));
        let quality_score =
            Self::overall_quality_score(metrics, security.level, compliance.level);

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if metrics.success_rate < self.thresholds.min_success_rate {
            issues.push(format!(
                "Success rate {:.2} below required {:.2}",
                metrics.success_rate, self.thresholds.min_success_rate
            ));
            recommendations.push("Fix failing tests before resubmitting".to_string());
        }

        if metrics.test_coverage < self.thresholds.min_test_coverage {
            issues.push(format!(
                "Test coverage {:.2} below required {:.2}",
                metrics.test_coverage, self.thresholds.min_test_coverage
            ));
            recommendations.push("Add tests covering the untested branches".to_string());
        }

        if !security.level.meets(MIN_SECURITY_LEVEL) {
            issues.push(format!(
                "Security level {} worse than required {}",
                security.level, MIN_SECURITY_LEVEL
            ));
            recommendations.push(
                "Remove dynamic code execution and hard-coded credentials; load secrets from configuration"
                    .to_string(),
            );
        }

        if !compliance.level.meets(MIN_COMPLIANCE_LEVEL) {
            issues.push(format!(
                "Compliance level {} below required {} (missing: {})",
                compliance.level,
                MIN_COMPLIANCE_LEVEL,
                compliance.missing.join(", ")
            ));
            recommendations.push(format!("Add {}", compliance.missing.join(", ")));
        }

        if metrics.performance_score < self.thresholds.min_performance_score {
            issues.push(format!(
                "Performance score {:.2} below required {:.2}",
                metrics.performance_score, self.thresholds.min_performance_score
            ));
            recommendations.push("Reduce execution latency".to_string());
        }

        if quality_score < min_quality {
            issues.push(format!(
                "Quality score {:.3} below threshold {:.3}",
                quality_score, min_quality
            ));
            recommendations.push(
                "Improve the weakest of success rate, coverage, security, performance and compliance"
                    .to_string(),
            );
        }

        let should_promote = issues.is_empty();
        let syntax_ok = candidate.validation.as_ref().map_or(true, |v| v.syntax_valid);
        let is_valid = security.level != SecurityLevel::Failed && syntax_ok;

        let reasoning = if should_promote {
            format!(
                "Promoted: success rate {:.2}, coverage {:.2}, security {}, compliance {}, performance {:.2}, quality {:.3} meets threshold {:.3}",
                metrics.success_rate,
                metrics.test_coverage,
                security.level,
                compliance.level,
                metrics.performance_score,
                quality_score,
                min_quality
            )
        } else {
            format!("Rejected: {}", issues.join("; "))
        };

        debug!(
            candidate_id = %candidate.candidate_id,
            should_promote,
            quality_score,
            security = %security.level,
            compliance = %compliance.level,
            "Validated candidate"
        );

        ValidationResult {
            is_valid,
            should_promote,
            quality_score,
            quality_threshold: min_quality,
            security_level: security.level,
            compliance_level: compliance.level,
            issues,
            recommendations,
            reasoning,
        }
    }

    fn record_usage(&self, pattern_id: PatternId) {
        self.usage.entry(pattern_id).or_default().usage_count += 1;
    }

    fn record_error(&self, pattern_id: PatternId) {
        self.usage.entry(pattern_id).or_default().error_count += 1;
    }

    fn record_validation(&self, pattern_id: PatternId, passed: bool) {
        let mut stats = self.usage.entry(pattern_id).or_default();
        stats.validations.push_back(passed);
        while stats.validations.len() > self.usage_gate.window {
            stats.validations.pop_front();
        }
    }

    fn should_promote(&self, pattern_id: PatternId) -> bool {
        let Some(stats) = self.usage.get(&pattern_id) else {
            return false;
        };

        stats.usage_count >= self.usage_gate.min_usage
            && stats.error_count <= self.usage_gate.max_errors
            && stats
                .validation_ratio()
                .is_some_and(|ratio| ratio >= self.usage_gate.min_validation_ratio)
    }

    fn review(&self, pattern_id: PatternId) -> UsageReview {
        let Some(stats) = self.usage_stats(pattern_id) else {
            return UsageReview::Pending;
        };

        if stats.error_count > self.usage_gate.max_errors {
            return UsageReview::Demote;
        }
        if stats.usage_count < self.usage_gate.min_usage || stats.validations.is_empty() {
            return UsageReview::Pending;
        }
        if self.should_promote(pattern_id) {
            UsageReview::Eligible
        } else {
            UsageReview::Demote
        }
    }

    fn usage_stats(&self, pattern_id: PatternId) -> Option<UsageStats> {
        self.usage.get(&pattern_id).map(|s| s.clone())
    }
}
