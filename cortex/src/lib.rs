// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern Cortex
//!
//! Semantic pattern matching and promotion: stores reusable code patterns
//! keyed by a [`SemanticTaskSignature`], retrieves them by similarity, and
//! decides through a multi-factor quality gate whether a newly generated
//! candidate is trustworthy enough to join the store.
//!
//! # Architecture
//!
//! - **Domain:** signatures and their codec, candidates, stored patterns, events
//! - **Application:** quality evaluation, static analysis, validation,
//!   adaptive thresholds, lineage, the pattern store and the promotion pipeline
//! - **Infrastructure:** vector index backends, embedding provider, event bus

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod config;
pub mod telemetry;

pub use domain::*;
pub use application::*;
pub use infrastructure::*;
pub use config::PromotionConfig;
