// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for pattern promotion
//! Published to the EventBus for observability and downstream integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::CandidateId;
use super::pattern::PatternId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageReview {
    /// Usage history satisfies the promotion gate
    Eligible,
    /// Not enough usage recorded yet to decide
    Pending,
    /// Usage history fails the gate; the pattern should be re-validated or retired
    Demote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionEvent {
    CandidateRegistered {
        candidate_id: CandidateId,
        task_id: String,
        domain: String,
        timestamp: DateTime<Utc>,
    },

    /// Quality evaluation and static analysis finished
    CandidateAnalyzed {
        candidate_id: CandidateId,
        promotion_score: f64,
        quality_score: f64,
        timestamp: DateTime<Utc>,
    },

    CandidatePromoted {
        candidate_id: CandidateId,
        pattern_id: PatternId,
        domain: String,
        quality_score: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    },

    CandidateRejected {
        candidate_id: CandidateId,
        domain: String,
        issues: Vec<String>,
        reasoning: String,
        timestamp: DateTime<Utc>,
    },

    PatternStored {
        pattern_id: PatternId,
        domain: String,
        success_rate: f64,
        timestamp: DateTime<Utc>,
    },

    PatternSuccessUpdated {
        pattern_id: PatternId,
        old_rate: f64,
        new_rate: f64,
        timestamp: DateTime<Utc>,
    },

    LineageRecorded {
        pattern_id: PatternId,
        ancestor_id: PatternId,
        delta: f64,
        timestamp: DateTime<Utc>,
    },

    UsageReviewCompleted {
        pattern_id: PatternId,
        review: UsageReview,
        timestamp: DateTime<Utc>,
    },
}

impl PromotionEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PromotionEvent::CandidateRegistered { timestamp, .. } => *timestamp,
            PromotionEvent::CandidateAnalyzed { timestamp, .. } => *timestamp,
            PromotionEvent::CandidatePromoted { timestamp, .. } => *timestamp,
            PromotionEvent::CandidateRejected { timestamp, .. } => *timestamp,
            PromotionEvent::PatternStored { timestamp, .. } => *timestamp,
            PromotionEvent::PatternSuccessUpdated { timestamp, .. } => *timestamp,
            PromotionEvent::LineageRecorded { timestamp, .. } => *timestamp,
            PromotionEvent::UsageReviewCompleted { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PromotionEvent::CandidateRegistered { .. } => "candidate_registered",
            PromotionEvent::CandidateAnalyzed { .. } => "candidate_analyzed",
            PromotionEvent::CandidatePromoted { .. } => "candidate_promoted",
            PromotionEvent::CandidateRejected { .. } => "candidate_rejected",
            PromotionEvent::PatternStored { .. } => "pattern_stored",
            PromotionEvent::PatternSuccessUpdated { .. } => "pattern_success_updated",
            PromotionEvent::LineageRecorded { .. } => "lineage_recorded",
            PromotionEvent::UsageReviewCompleted { .. } => "usage_review_completed",
        }
    }
}
