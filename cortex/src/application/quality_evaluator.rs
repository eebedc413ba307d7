// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Quality Evaluator
//!
//! Turns raw execution and validation reports into normalized `[0, 1]`
//! quality metrics. Missing reports degrade to zeros so an unmeasured
//! candidate is rejected rather than crashing the pipeline.

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::domain::{ExecutionReport, ValidationReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub success_rate: f64,
    pub test_coverage: f64,
    pub validation_score: f64,
    pub performance_score: f64,
    pub overall_quality: f64,
}

/// Optional weighting for `overall_quality`; normalized by their sum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    pub success_rate: f64,
    pub test_coverage: f64,
    pub validation_score: f64,
    pub performance_score: f64,
}

impl QualityWeights {
    /// Weights mirroring the validator's success/coverage/performance split
    pub fn promotion() -> Self {
        Self {
            success_rate: 0.25,
            test_coverage: 0.25,
            validation_score: 0.20,
            performance_score: 0.15,
        }
    }

    fn total(&self) -> f64 {
        self.success_rate + self.test_coverage + self.validation_score + self.performance_score
    }
}

#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    latency_ceiling_ms: f64,
    weights: Option<QualityWeights>,
}

impl QualityEvaluator {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            latency_ceiling_ms: config.latency_ceiling_ms,
            weights: None,
        }
    }

    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn evaluate(
        &self,
        execution: Option<&ExecutionReport>,
        validation: Option<&ValidationReport>,
    ) -> QualityMetrics {
        let (success_rate, test_coverage, performance_score) = match execution {
            Some(report) => (
                ratio(report.tests_passed, report.tests_total),
                ratio(report.lines_covered, report.lines_total),
                self.performance_score(report.latency_ms),
            ),
            None => (0.0, 0.0, 0.0),
        };

        let validation_score = match validation {
            Some(report) if report.syntax_valid => {
                if report.rules_total == 0 {
                    1.0
                } else {
                    ratio(report.rules_passed, report.rules_total)
                }
            }
            _ => 0.0,
        };

        let overall_quality = match self.weights {
            Some(weights) if weights.total() > 0.0 => {
                (weights.success_rate * success_rate
                    + weights.test_coverage * test_coverage
                    + weights.validation_score * validation_score
                    + weights.performance_score * performance_score)
                    / weights.total()
            }
            _ => (success_rate + test_coverage + validation_score + performance_score) / 4.0,
        };

        QualityMetrics {
            success_rate,
            test_coverage,
            validation_score,
            performance_score,
            overall_quality,
        }
    }

    /// Linear inverse of latency against the ceiling: 0 ms scores 1.0, the
    /// ceiling and beyond score 0.0
    fn performance_score(&self, latency_ms: f64) -> f64 {
        if !latency_ms.is_finite() || latency_ms < 0.0 || self.latency_ceiling_ms <= 0.0 {
            return 0.0;
        }
        (1.0 - latency_ms / self.latency_ceiling_ms).clamp(0.0, 1.0)
    }
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        (numerator as f64 / denominator as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(passed: u32, total: u32, covered: u32, lines: u32, latency_ms: f64) -> ExecutionReport {
        ExecutionReport {
            tests_passed: passed,
            tests_total: total,
            lines_covered: covered,
            lines_total: lines,
            latency_ms,
            memory_mb: 12.0,
        }
    }

    #[test]
    fn test_basic_ratios() {
        let evaluator = QualityEvaluator::default();
        let validation = ValidationReport { syntax_valid: true, rules_passed: 9, rules_total: 10 };
        let metrics = evaluator.evaluate(Some(&report(19, 20, 90, 100, 200.0)), Some(&validation));

        assert_eq!(metrics.success_rate, 0.95);
        assert_eq!(metrics.test_coverage, 0.9);
        assert_eq!(metrics.validation_score, 0.9);
        assert!((metrics.performance_score - 0.8).abs() < 1e-9);
        assert!((metrics.overall_quality - (0.95 + 0.9 + 0.9 + 0.8) / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_totals_score_zero() {
        let evaluator = QualityEvaluator::default();
        let metrics = evaluator.evaluate(Some(&report(0, 0, 0, 0, 0.0)), None);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.test_coverage, 0.0);
        assert_eq!(metrics.validation_score, 0.0);
        assert_eq!(metrics.performance_score, 1.0);
    }

    #[test]
    fn test_missing_reports_degrade_to_zero() {
        let metrics = QualityEvaluator::default().evaluate(None, None);
        assert_eq!(metrics, QualityMetrics::default());
    }

    #[test]
    fn test_performance_clamped() {
        let evaluator = QualityEvaluator::default();
        let slow = evaluator.evaluate(Some(&report(1, 1, 1, 1, 5_000.0)), None);
        assert_eq!(slow.performance_score, 0.0);

        let fast = evaluator.evaluate(Some(&report(1, 1, 1, 1, 100.0)), None);
        let faster = evaluator.evaluate(Some(&report(1, 1, 1, 1, 10.0)), None);
        assert!(faster.performance_score > fast.performance_score);
    }

    #[test]
    fn test_invalid_syntax_zeroes_validation() {
        let evaluator = QualityEvaluator::default();
        let validation = ValidationReport { syntax_valid: false, rules_passed: 10, rules_total: 10 };
        let metrics = evaluator.evaluate(None, Some(&validation));
        assert_eq!(metrics.validation_score, 0.0);
    }

    #[test]
    fn test_explicit_weights() {
        let evaluator = QualityEvaluator::default().with_weights(QualityWeights {
            success_rate: 1.0,
            test_coverage: 0.0,
            validation_score: 0.0,
            performance_score: 0.0,
        });
        let metrics = evaluator.evaluate(Some(&report(3, 4, 0, 10, 900.0)), None);
        assert_eq!(metrics.overall_quality, 0.75);
    }
}
