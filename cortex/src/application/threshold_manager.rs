// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptive per-domain promotion thresholds.
//!
//! Each domain keeps a bounded rolling history of promotion outcomes. Once
//! `min_samples` outcomes exist, the success ratio moves the base threshold:
//!
//! ```text
//! ratio >= high:  base - max_shift * (ratio - high) / (1 - high)
//! ratio <= low:   base + max_shift * (low - ratio) / low
//! otherwise:      base
//! ```
//!
//! The result is monotonically non-increasing in the ratio and clamped to
//! `[0, 1]`. Histories are keyed in a `DashMap` so appends to one domain never
//! contend with another.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::AdaptiveConfig;

/// Snapshot of one domain's promotion bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainThreshold {
    pub domain: String,
    pub base: f64,
    pub adjusted: f64,
    pub samples: usize,
    /// `None` until at least one outcome is recorded
    pub success_ratio: Option<f64>,
}

pub struct AdaptiveThresholdManager {
    config: AdaptiveConfig,
    history: DashMap<String, VecDeque<bool>>,
}

impl AdaptiveThresholdManager {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    pub fn track_outcome(&self, domain: &str, success: bool) {
        let mut outcomes = self.history.entry(domain.to_string()).or_default();
        outcomes.push_back(success);
        while outcomes.len() > self.config.window {
            outcomes.pop_front();
        }
    }

    pub fn adjusted_threshold(&self, domain: &str, base: f64) -> f64 {
        self.snapshot(domain, base).adjusted
    }

    pub fn snapshot(&self, domain: &str, base: f64) -> DomainThreshold {
        let (samples, successes) = match self.history.get(domain) {
            Some(outcomes) => (outcomes.len(), outcomes.iter().filter(|o| **o).count()),
            None => (0, 0),
        };

        let success_ratio = (samples > 0).then(|| successes as f64 / samples as f64);

        let adjusted = match success_ratio {
            Some(ratio) if samples >= self.config.min_samples => self.shift(base, ratio),
            _ => base,
        };

        if adjusted != base {
            debug!(domain, base, adjusted, samples, "Adjusted domain threshold");
        }

        DomainThreshold {
            domain: domain.to_string(),
            base,
            adjusted,
            samples,
            success_ratio,
        }
    }

    fn shift(&self, base: f64, ratio: f64) -> f64 {
        let AdaptiveConfig {
            high_success_ratio: high,
            low_success_ratio: low,
            max_shift,
            ..
        } = self.config;

        let adjusted = if ratio >= high {
            let span = 1.0 - high;
            let strength = if span > 0.0 { (ratio - high) / span } else { 1.0 };
            base - max_shift * strength
        } else if ratio <= low {
            let strength = if low > 0.0 { (low - ratio) / low } else { 1.0 };
            base + max_shift * strength
        } else {
            base
        };

        adjusted.clamp(0.0, 1.0)
    }
}

impl Default for AdaptiveThresholdManager {
    fn default() -> Self {
        Self::new(AdaptiveConfig::default())
    }
}
