// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Promotion Pipeline
//!
//! Orchestrates a candidate from registration to a promote/reject decision:
//!
//! ```text
//! register ─► process ─┬─► evaluate quality ─┐
//!                      └─► analyze code ─────┴─► validate (adaptive threshold)
//!                                                   │
//!                         ┌─────────────────────────┴───────────────┐
//!                         ▼                                         ▼
//!                     REJECTED                         APPROVED ─► store ─► lineage ─► PROMOTED
//! ```
//!
//! Each domain's outcome feeds back into the [`AdaptiveThresholdManager`].
//! A failed `store` leaves the candidate `APPROVED`; calling
//! [`process`](PromotionPipeline::process) again retries the store with the
//! saved decision.
//!
//! Decisions for independent candidates read the *current* domain threshold,
//! which may trail concurrent outcomes slightly.
//!
//! Retrieval through the pipeline's [`search`](PromotionPipeline::search)
//! feeds the validator's usage gate. Finished candidates stay queryable until
//! [`take_outcome`](PromotionPipeline::take_outcome) or
//! [`prune_finished`](PromotionPipeline::prune_finished) drops them.

use chrono::{Duration, Utc};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::lineage_tracker::PatternLineageTracker;
use crate::application::pattern_analyzer::{PatternAnalyzer, PromotionScore};
use crate::application::pattern_store::{PatternStore, PatternStoreError};
use crate::application::promotion_validator::{
    PromotionValidator, StandardPromotionValidator, ValidationResult,
};
use crate::application::quality_evaluator::{QualityEvaluator, QualityMetrics};
use crate::application::threshold_manager::{AdaptiveThresholdManager, DomainThreshold};
use crate::config::PromotionConfig;
use crate::domain::{
    CandidateId, CandidateMetadata, CandidateScores, CandidateStatus, ExecutionReport,
    HybridMatch, InvalidTransition, PatternCandidate, PatternId, PatternMatch, PromotionEvent,
    SemanticTaskSignature, UsageReview, ValidationReport,
};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown candidate: {0}")]
    UnknownCandidate(CandidateId),

    #[error("Candidate {0} has already been processed")]
    AlreadyProcessed(CandidateId),

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    #[error(transparent)]
    Store(#[from] PatternStoreError),
}

/// Everything decided about one candidate
#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
    pub candidate_id: CandidateId,
    pub status: CandidateStatus,
    pub pattern_id: Option<PatternId>,
    pub quality: QualityMetrics,
    pub promotion: PromotionScore,
    pub validation: ValidationResult,
}

pub struct PromotionPipeline {
    config: PromotionConfig,
    evaluator: QualityEvaluator,
    analyzer: PatternAnalyzer,
    validator: Arc<dyn PromotionValidator>,
    thresholds: Arc<AdaptiveThresholdManager>,
    lineage: Arc<PatternLineageTracker>,
    store: Arc<PatternStore>,
    event_bus: Arc<dyn EventBus>,
    candidates: DashMap<CandidateId, PatternCandidate>,
    decisions: DashMap<CandidateId, PromotionOutcome>,
    in_flight: DashSet<CandidateId>,
}

/// Exclusive claim on a candidate for the duration of one `process` call
struct InFlightClaim<'a> {
    in_flight: &'a DashSet<CandidateId>,
    candidate_id: CandidateId,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(in_flight: &'a DashSet<CandidateId>, candidate_id: CandidateId) -> Option<Self> {
        in_flight.insert(candidate_id).then(|| Self {
            in_flight,
            candidate_id,
        })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.candidate_id);
    }
}

impl PromotionPipeline {
    pub fn new(config: PromotionConfig, store: Arc<PatternStore>, event_bus: Arc<dyn EventBus>) -> Self {
        let validator = StandardPromotionValidator::new(
            config.thresholds.clone(),
            config.usage_gate.clone(),
        );

        Self {
            evaluator: QualityEvaluator::new(&config.quality),
            analyzer: PatternAnalyzer::new(),
            validator: Arc::new(validator),
            thresholds: Arc::new(AdaptiveThresholdManager::new(config.adaptive.clone())),
            lineage: Arc::new(PatternLineageTracker::new()),
            store,
            event_bus,
            candidates: DashMap::new(),
            decisions: DashMap::new(),
            in_flight: DashSet::new(),
            config,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn PromotionValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    pub fn lineage(&self) -> &Arc<PatternLineageTracker> {
        &self.lineage
    }

    pub fn thresholds(&self) -> &Arc<AdaptiveThresholdManager> {
        &self.thresholds
    }

    pub fn validator(&self) -> &Arc<dyn PromotionValidator> {
        &self.validator
    }

    pub fn candidate(&self, candidate_id: CandidateId) -> Option<PatternCandidate> {
        self.candidates.get(&candidate_id).map(|c| c.clone())
    }

    /// Last decision recorded for a candidate, if it has been processed
    pub fn outcome(&self, candidate_id: CandidateId) -> Option<PromotionOutcome> {
        self.decisions.get(&candidate_id).map(|o| o.clone())
    }

    pub async fn register(
        &self,
        code: String,
        signature: SemanticTaskSignature,
        task_id: String,
        metadata: CandidateMetadata,
    ) -> CandidateId {
        let candidate = PatternCandidate::new(code, signature, task_id, metadata);
        let candidate_id = candidate.candidate_id;
        let domain = candidate.signature.domain().to_string();
        let task_id = candidate.task_id.clone();

        self.candidates.insert(candidate_id, candidate);
        info!(candidate_id = %candidate_id, task_id = %task_id, domain = %domain, "Registered candidate");

        self.publish(PromotionEvent::CandidateRegistered {
            candidate_id,
            task_id,
            domain,
            timestamp: Utc::now(),
        })
        .await;

        candidate_id
    }

    /// Attach metrics reported after registration; only while `PENDING`
    pub fn record_metrics(
        &self,
        candidate_id: CandidateId,
        execution: Option<ExecutionReport>,
        validation: Option<ValidationReport>,
    ) -> Result<(), PipelineError> {
        let mut candidate = self
            .candidates
            .get_mut(&candidate_id)
            .ok_or(PipelineError::UnknownCandidate(candidate_id))?;

        if candidate.status() != CandidateStatus::Pending {
            return Err(PipelineError::AlreadyProcessed(candidate_id));
        }
        if execution.is_some() {
            candidate.execution = execution;
        }
        if validation.is_some() {
            candidate.validation = validation;
        }
        candidate.updated_at = Utc::now();
        Ok(())
    }

    /// Run a candidate to a decision. Concurrent calls for the same
    /// candidate fail with `AlreadyProcessed` while one is in progress.
    ///
    /// Every state change is committed before the first `.await`, so a caller
    /// that drops the future leaves the candidate untouched, `REJECTED` with
    /// its outcome tracked, or `APPROVED` with its decision saved.
    pub async fn process(&self, candidate_id: CandidateId) -> Result<PromotionOutcome, PipelineError> {
        if !self.candidates.contains_key(&candidate_id) {
            return Err(PipelineError::UnknownCandidate(candidate_id));
        }
        let _claim = InFlightClaim::acquire(&self.in_flight, candidate_id)
            .ok_or(PipelineError::AlreadyProcessed(candidate_id))?;

        let (candidate, resume) = {
            let mut entry = self
                .candidates
                .get_mut(&candidate_id)
                .ok_or(PipelineError::UnknownCandidate(candidate_id))?;
            match entry.status() {
                CandidateStatus::Approved => (entry.clone(), true),
                CandidateStatus::Pending => {
                    entry.transition(CandidateStatus::Analyzing)?;
                    (entry.clone(), false)
                }
                _ => return Err(PipelineError::AlreadyProcessed(candidate_id)),
            }
        };

        let outcome = if resume {
            match self.outcome(candidate_id) {
                Some(outcome) => outcome,
                None => self.restore_decision(&candidate),
            }
        } else {
            let outcome = self.analyze(&candidate)?;
            self.publish(PromotionEvent::CandidateAnalyzed {
                candidate_id,
                promotion_score: outcome.promotion.score,
                quality_score: outcome.validation.quality_score,
                timestamp: Utc::now(),
            })
            .await;

            if outcome.status == CandidateStatus::Rejected {
                return Ok(self.announce_rejection(&candidate, outcome).await);
            }
            outcome
        };

        self.promote(&candidate, outcome).await
    }

    /// Process several candidates concurrently; results keep input order
    pub async fn process_batch(
        &self,
        candidate_ids: &[CandidateId],
    ) -> Vec<Result<PromotionOutcome, PipelineError>> {
        join_all(candidate_ids.iter().map(|id| self.process(*id))).await
    }

    /// Score and validate a candidate without touching any state
    fn decide(&self, candidate: &PatternCandidate) -> (PromotionOutcome, CandidateScores) {
        let quality = self
            .evaluator
            .evaluate(candidate.execution.as_ref(), candidate.validation.as_ref());

        let reusability = self.analyzer.score_reusability(&candidate.code);
        let security = self.analyzer.analyze_security(&candidate.code);
        let code_quality = self.analyzer.analyze_code_quality(&candidate.code);
        let promotion =
            self.analyzer
                .promotion_score(candidate, &quality, reusability, security.score, code_quality);

        let threshold = self.thresholds.adjusted_threshold(
            candidate.signature.domain(),
            self.config.thresholds.min_quality_score,
        );
        let validation = self
            .validator
            .validate(candidate, &quality, &candidate.code, threshold);

        let status = if validation.should_promote {
            CandidateStatus::Approved
        } else {
            CandidateStatus::Rejected
        };
        let scores = CandidateScores {
            reusability: Some(reusability),
            security: Some(security.score),
            code_quality: Some(code_quality),
            promotion_score: Some(promotion.score),
        };

        let outcome = PromotionOutcome {
            candidate_id: candidate.candidate_id,
            status,
            pattern_id: None,
            quality,
            promotion,
            validation,
        };
        (outcome, scores)
    }

    /// Decide and commit: scores, status, saved decision and, for a
    /// rejection, the domain outcome. Never awaits.
    fn analyze(&self, candidate: &PatternCandidate) -> Result<PromotionOutcome, PipelineError> {
        let (outcome, scores) = self.decide(candidate);

        {
            let mut entry = self
                .candidates
                .get_mut(&candidate.candidate_id)
                .ok_or(PipelineError::UnknownCandidate(candidate.candidate_id))?;
            entry.scores = scores;
            entry.transition(outcome.status)?;
            self.decisions.insert(candidate.candidate_id, outcome.clone());
        }

        if outcome.status == CandidateStatus::Rejected {
            let domain = candidate.signature.domain().to_string();
            self.thresholds.track_outcome(&domain, false);
            counter!("aegis_candidates_rejected_total", "domain" => domain).increment(1);
        }

        debug!(
            candidate_id = %candidate.candidate_id,
            status = %outcome.status,
            promotion_score = outcome.promotion.score,
            quality_score = outcome.validation.quality_score,
            threshold = outcome.validation.quality_threshold,
            "Analyzed candidate"
        );
        Ok(outcome)
    }

    /// An `APPROVED` candidate without a saved decision; the approval stands
    /// and the scores are recomputed for the record
    fn restore_decision(&self, candidate: &PatternCandidate) -> PromotionOutcome {
        warn!(candidate_id = %candidate.candidate_id, "Approved candidate has no saved decision; recomputing it");
        let (mut outcome, _) = self.decide(candidate);
        outcome.status = CandidateStatus::Approved;
        self.decisions.insert(candidate.candidate_id, outcome.clone());
        outcome
    }

    async fn announce_rejection(
        &self,
        candidate: &PatternCandidate,
        outcome: PromotionOutcome,
    ) -> PromotionOutcome {
        let domain = candidate.signature.domain().to_string();
        info!(
            candidate_id = %candidate.candidate_id,
            domain = %domain,
            reasoning = %outcome.validation.reasoning,
            "Rejected candidate"
        );

        self.publish(PromotionEvent::CandidateRejected {
            candidate_id: candidate.candidate_id,
            domain,
            issues: outcome.validation.issues.clone(),
            reasoning: outcome.validation.reasoning.clone(),
            timestamp: Utc::now(),
        })
        .await;

        outcome
    }

    async fn promote(
        &self,
        candidate: &PatternCandidate,
        mut outcome: PromotionOutcome,
    ) -> Result<PromotionOutcome, PipelineError> {
        let domain = candidate.signature.domain().to_string();
        let success_rate = outcome.quality.success_rate;

        let pattern_id = match self
            .store
            .store(candidate.signature.clone(), candidate.code.clone(), success_rate)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    candidate_id = %candidate.candidate_id,
                    error = %e,
                    "Approved candidate could not be stored; it stays APPROVED"
                );
                return Err(e.into());
            }
        };

        let lineage = candidate
            .ancestor_id
            .map(|ancestor_id| self.record_lineage(candidate, pattern_id, ancestor_id, success_rate));

        {
            let mut entry = self
                .candidates
                .get_mut(&candidate.candidate_id)
                .ok_or(PipelineError::UnknownCandidate(candidate.candidate_id))?;
            entry.pattern_id = Some(pattern_id);
            entry.transition(CandidateStatus::Promoted)?;

            outcome.status = CandidateStatus::Promoted;
            outcome.pattern_id = Some(pattern_id);
            self.decisions.insert(candidate.candidate_id, outcome.clone());
        }

        self.thresholds.track_outcome(&domain, true);
        counter!("aegis_candidates_promoted_total", "domain" => domain.clone()).increment(1);

        info!(
            candidate_id = %candidate.candidate_id,
            pattern_id = %pattern_id,
            domain = %domain,
            quality_score = outcome.validation.quality_score,
            "Promoted candidate"
        );

        self.publish(PromotionEvent::PatternStored {
            pattern_id,
            domain: domain.clone(),
            success_rate,
            timestamp: Utc::now(),
        })
        .await;

        if let Some((ancestor_id, delta)) = lineage {
            self.publish(PromotionEvent::LineageRecorded {
                pattern_id,
                ancestor_id,
                delta,
                timestamp: Utc::now(),
            })
            .await;
        }

        self.publish(PromotionEvent::CandidatePromoted {
            candidate_id: candidate.candidate_id,
            pattern_id,
            domain,
            quality_score: outcome.validation.quality_score,
            threshold: outcome.validation.quality_threshold,
            timestamp: Utc::now(),
        })
        .await;

        Ok(outcome)
    }

    /// Record the `ancestor -> new` edge; returns the ancestor and the delta
    fn record_lineage(
        &self,
        candidate: &PatternCandidate,
        pattern_id: PatternId,
        ancestor_id: PatternId,
        success_rate: f64,
    ) -> (PatternId, f64) {
        let delta = match self.store.get(ancestor_id) {
            Some(ancestor) => success_rate - ancestor.success_rate,
            None => {
                warn!(ancestor_id = %ancestor_id, "Ancestor pattern not in store; recording lineage with zero delta");
                0.0
            }
        };
        let description = candidate
            .improvement
            .clone()
            .unwrap_or_else(|| format!("Derived from pattern {}", ancestor_id));

        self.lineage
            .track_improvement(pattern_id, ancestor_id, delta, description);
        (ancestor_id, delta)
    }

    /// Drop a finished candidate and hand back its decision.
    ///
    /// Candidates that are not `PROMOTED` or `REJECTED` are left in place and
    /// `None` is returned.
    pub fn take_outcome(&self, candidate_id: CandidateId) -> Option<PromotionOutcome> {
        self.candidates
            .remove_if(&candidate_id, |_, candidate| candidate.status().is_terminal())?;
        self.decisions.remove(&candidate_id).map(|(_, outcome)| outcome)
    }

    /// Drop every finished candidate whose last transition is older than
    /// `retention`; returns how many were dropped
    pub fn prune_finished(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let expired: Vec<CandidateId> = self
            .candidates
            .iter()
            .filter(|c| c.status().is_terminal() && c.updated_at <= cutoff)
            .map(|c| c.candidate_id)
            .collect();

        let pruned = expired
            .into_iter()
            .filter(|id| self.take_outcome(*id).is_some())
            .count();
        if pruned > 0 {
            debug!(pruned, "Pruned finished candidates");
        }
        pruned
    }

    /// Search the store; every returned pattern counts toward its usage gate
    pub async fn search(
        &self,
        query: &SemanticTaskSignature,
        top_k: Option<usize>,
        similarity_threshold: Option<f64>,
    ) -> Result<Vec<PatternMatch>, PipelineError> {
        let matches = self.store.search(query, top_k, similarity_threshold).await?;
        for hit in &matches {
            self.validator.record_usage(hit.pattern.id);
        }
        Ok(matches)
    }

    /// Hybrid search; every returned pattern counts toward its usage gate
    pub async fn hybrid_search(
        &self,
        query: &SemanticTaskSignature,
        domain: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<HybridMatch>, PipelineError> {
        let matches = self.store.hybrid_search(query, domain, top_k).await?;
        for hit in &matches {
            self.validator.record_usage(hit.pattern.id);
        }
        Ok(matches)
    }

    /// Usage obtained without going through [`search`](Self::search), e.g.
    /// a pattern id cached by the caller
    pub fn record_pattern_usage(&self, pattern_id: PatternId) {
        self.validator.record_usage(pattern_id);
    }

    /// A retrieved pattern failed when executed
    pub fn record_pattern_error(&self, pattern_id: PatternId) {
        self.validator.record_error(pattern_id);
    }

    pub fn record_pattern_validation(&self, pattern_id: PatternId, passed: bool) {
        self.validator.record_validation(pattern_id, passed);
    }

    /// Apply the usage gate to a stored pattern
    pub async fn review_pattern(&self, pattern_id: PatternId) -> UsageReview {
        let review = self.validator.review(pattern_id);
        debug!(pattern_id = %pattern_id, review = ?review, "Reviewed pattern usage");

        self.publish(PromotionEvent::UsageReviewCompleted {
            pattern_id,
            review,
            timestamp: Utc::now(),
        })
        .await;

        review
    }

    pub async fn update_pattern_success(
        &self,
        pattern_id: PatternId,
        new_rate: f64,
    ) -> Result<(), PipelineError> {
        let old_rate = self.store.update_success(pattern_id, new_rate)?;

        self.publish(PromotionEvent::PatternSuccessUpdated {
            pattern_id,
            old_rate,
            new_rate,
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    pub fn domain_threshold(&self, domain: &str) -> DomainThreshold {
        self.thresholds
            .snapshot(domain, self.config.thresholds.min_quality_score)
    }

    async fn publish(&self, event: PromotionEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.event_bus.publish(event).await {
            warn!(event_type, error = %e, "Failed to publish promotion event");
        }
    }
}
