// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Candidates
//!
//! A candidate is freshly generated code awaiting a promotion decision. It
//! moves through a small state machine:
//!
//! ```text
//! Pending -> Analyzing -> Approved -> Promoted
//!                     \-> Rejected
//! ```
//!
//! `Rejected` and `Promoted` are terminal. `Approved` only exists between the
//! validator's decision and the store/lineage side effects completing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::pattern::PatternId;
use super::signature::SemanticTaskSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub Uuid);

impl CandidateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    Pending,
    Analyzing,
    Approved,
    Rejected,
    Promoted,
}

impl CandidateStatus {
    pub fn can_transition_to(&self, next: CandidateStatus) -> bool {
        matches!(
            (self, next),
            (CandidateStatus::Pending, CandidateStatus::Analyzing)
                | (CandidateStatus::Analyzing, CandidateStatus::Approved)
                | (CandidateStatus::Analyzing, CandidateStatus::Rejected)
                | (CandidateStatus::Approved, CandidateStatus::Promoted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CandidateStatus::Rejected | CandidateStatus::Promoted)
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateStatus::Pending => "PENDING",
            CandidateStatus::Analyzing => "ANALYZING",
            CandidateStatus::Approved => "APPROVED",
            CandidateStatus::Rejected => "REJECTED",
            CandidateStatus::Promoted => "PROMOTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Invalid candidate transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: CandidateStatus,
    pub to: CandidateStatus,
}

/// Raw execution results reported by the test harness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub tests_passed: u32,
    pub tests_total: u32,
    pub lines_covered: u32,
    pub lines_total: u32,
    pub latency_ms: f64,
    pub memory_mb: f64,
}

/// Raw static validation results (syntax check + rule engine)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub syntax_valid: bool,
    pub rules_passed: u32,
    pub rules_total: u32,
}

/// Scores filled in as each analysis stage completes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateScores {
    pub reusability: Option<f64>,
    pub security: Option<f64>,
    pub code_quality: Option<f64>,
    pub promotion_score: Option<f64>,
}

/// Caller-supplied extras on registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateMetadata {
    #[serde(default)]
    pub execution: Option<ExecutionReport>,
    #[serde(default)]
    pub validation: Option<ValidationReport>,
    /// Stored pattern this candidate was derived from
    #[serde(default)]
    pub ancestor_id: Option<PatternId>,
    /// Free-text description of the improvement over the ancestor
    #[serde(default)]
    pub improvement: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCandidate {
    pub candidate_id: CandidateId,
    pub code: String,
    pub signature: SemanticTaskSignature,
    pub task_id: String,
    pub execution: Option<ExecutionReport>,
    pub validation: Option<ValidationReport>,
    pub scores: CandidateScores,
    pub ancestor_id: Option<PatternId>,
    pub improvement: Option<String>,
    pub extra: HashMap<String, Value>,
    status: CandidateStatus,
    /// Set once the candidate has been written to the pattern store
    pub pattern_id: Option<PatternId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatternCandidate {
    pub fn new(
        code: String,
        signature: SemanticTaskSignature,
        task_id: String,
        metadata: CandidateMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            candidate_id: CandidateId::new(),
            code,
            signature,
            task_id,
            execution: metadata.execution,
            validation: metadata.validation,
            scores: CandidateScores::default(),
            ancestor_id: metadata.ancestor_id,
            improvement: metadata.improvement,
            extra: metadata.extra,
            status: CandidateStatus::Pending,
            pattern_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> CandidateStatus {
        self.status
    }

    pub fn transition(&mut self, next: CandidateStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
