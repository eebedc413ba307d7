// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Analyzer
//!
//! Static, regex/keyword heuristics over candidate source text. Nothing here
//! parses the code; scores are indicative, not exact.
//!
//! | Analysis | Output | Rewards | Penalizes |
//! |----------|--------|---------|-----------|
//! | reusability | `[0,1]` | parameterized functions | hard-coded literals |
//! | security | [`SecurityAssessment`] | — | dynamic exec, secrets, shell-outs |
//! | code quality | `[0,1]` | docs, types, error handling, logging | deep nesting, 1-letter names |
//!
//! ## Security tiers
//!
//! - **Critical** (dynamic code execution): any match → [`SecurityLevel::Failed`]
//! - **High-risk** (hard-coded credentials): >1 → `Low`, 1 → `Medium`
//! - **Medium-risk** (shelling out, string-built SQL): >2 → `Medium`, ≥1 → `High`
//! - nothing found → [`SecurityLevel::Clean`]

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::application::quality_evaluator::QualityMetrics;
use crate::domain::PatternCandidate;

const QUALITY_WEIGHT: f64 = 0.50;
const REUSABILITY_WEIGHT: f64 = 0.20;
const SECURITY_WEIGHT: f64 = 0.15;
const CODE_QUALITY_WEIGHT: f64 = 0.15;

/// Nesting levels tolerated before the code-quality score is penalized
const MAX_COMFORTABLE_NESTING: usize = 4;

static CRITICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\beval\s*\(",
        r"\bexec\s*\(",
        r"__import__\s*\(",
        r"\bnew\s+Function\s*\(",
    ])
});

static HIGH_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?i)\b\w*(password|passwd|secret|api_?key|access_?token|auth_?token|private_?key)\w*\s*[:=]\s*["'][^"'\s]{4,}["']"#,
        r"\bAKIA[0-9A-Z]{16}\b",
    ])
});

static MEDIUM_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bos\.system\s*\(",
        r"\bos\.popen\s*\(",
        r"\bsubprocess\.\w+\s*\(",
        r"\bshell\s*=\s*True\b",
        r"\bCommand::new\s*\(",
        r"\bchild_process\b",
        r#"(?i)\b(select|insert|update|delete)\b[^\n]*(["']\s*%\s*[\w(]|\{\w+\}|["']\s*\+|["']\s*\.format\()"#,
    ])
});

static DOCSTRING: Lazy<Regex> = Lazy::new(|| regex(r#"(?s)""".*?"""|'''.*?'''"#));
static COMMENT_LINE: Lazy<Regex> = Lazy::new(|| regex(r"(?m)^\s*(#|//).*$"));
static DOC_MARKER: Lazy<Regex> = Lazy::new(|| regex(r#"(?m)"""|'''|^\s*///|^\s*//!|/\*\*"#));
static TYPE_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| regex(r"->\s*[\w\[&(]|\(\s*(?:self\s*,\s*)?&?\w+\s*:\s*[\w&\[]"));
static ERROR_HANDLING: Lazy<Regex> = Lazy::new(|| {
    regex(r"\btry\s*:|\bexcept\b|\bcatch\s*\(|\bResult<|\?;|\braise\b|\bthrow\b|\.map_err\(")
});
static LOGGING: Lazy<Regex> = Lazy::new(|| {
    regex(r"\blogging\.\w+|\blogger\.\w+|\blog\.\w+\(|\b(tracing|log)::|\b(info|debug|warn|error|trace)!\(|\bconsole\.(log|warn|error)\b")
});
static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| regex(r"\b(?:def|fn)\s+(\w+)"));
static PARAMETERIZED_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    regex(r"\b(?:def|fn|function)\s+\w+\s*(?:<[^>]*>)?\s*\(\s*[^)\s][^)]*\)")
});
static ANY_FUNCTION: Lazy<Regex> = Lazy::new(|| regex(r"\b(?:def|fn|function)\s+\w+"));
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| regex(r#""[^"\n]{3,}"|'[^'\n]{3,}'"#));
static NUMERIC_LITERAL: Lazy<Regex> = Lazy::new(|| regex(r"\b\d+(?:\.\d+)?\b"));
static TODO_MARKER: Lazy<Regex> = Lazy::new(|| regex(r"\b(TODO|FIXME|XXX|HACK)\b"));
static SINGLE_LETTER_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| regex(r"(?:^|[^\w.])([a-zA-Z])\s*=[^=>]"));

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static analyzer regex must compile")
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| regex(p)).collect()
}

fn count_matches(patterns: &[Regex], code: &str) -> usize {
    patterns.iter().map(|re| re.find_iter(code).count()).sum()
}

/// Outcome of the security analysis.
///
/// Ordered from best to worst through an explicit rank table, never through
/// declaration order. `Clean` means no findings at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Clean,
    High,
    Medium,
    Low,
    Failed,
}

impl SecurityLevel {
    /// 0 is best. Promotion requires a rank no worse than `Medium`.
    pub fn rank(&self) -> u8 {
        match self {
            SecurityLevel::Clean => 0,
            SecurityLevel::High => 1,
            SecurityLevel::Medium => 2,
            SecurityLevel::Low => 3,
            SecurityLevel::Failed => 4,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            SecurityLevel::Clean => 1.0,
            SecurityLevel::High => 0.85,
            SecurityLevel::Medium => 0.70,
            SecurityLevel::Low => 0.40,
            SecurityLevel::Failed => 0.0,
        }
    }

    /// True when `self` is at least as good as `minimum`
    pub fn meets(&self, minimum: SecurityLevel) -> bool {
        self.rank() <= minimum.rank()
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Clean => "CLEAN",
            SecurityLevel::High => "HIGH",
            SecurityLevel::Medium => "MEDIUM",
            SecurityLevel::Low => "LOW",
            SecurityLevel::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub level: SecurityLevel,
    pub score: f64,
    pub critical_findings: usize,
    pub high_risk_findings: usize,
    pub medium_risk_findings: usize,
}

/// Boolean/structural facts about a piece of source text, shared by the
/// code-quality score and the validator's compliance check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeFeatures {
    pub has_documentation: bool,
    pub has_type_annotations: bool,
    pub has_error_handling: bool,
    pub has_logging: bool,
    pub follows_naming_convention: bool,
    pub todo_markers: usize,
    pub max_nesting_depth: usize,
    pub single_letter_identifiers: usize,
}

/// Weighted promotion score with its per-component contributions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionScore {
    pub score: f64,
    pub breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PatternAnalyzer;

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Rewards parameterized functions, penalizes hard-coded literals
    pub fn score_reusability(&self, code: &str) -> f64 {
        let body = strip_docs_and_comments(code);

        let parameterized = PARAMETERIZED_FUNCTION.find_iter(&body).count();
        let functions = ANY_FUNCTION.find_iter(&body).count();
        let literals = STRING_LITERAL.find_iter(&body).count()
            + NUMERIC_LITERAL
                .find_iter(&body)
                .filter(|m| !matches!(m.as_str(), "0" | "1"))
                .count();

        let mut score = 0.5;
        score += (0.1 * parameterized as f64).min(0.3);
        if functions == 0 {
            score -= 0.2;
        }
        if literals == 0 {
            score += 0.2;
        } else {
            score -= (0.05 * literals as f64).min(0.4);
        }
        score.clamp(0.0, 1.0)
    }

    pub fn analyze_security(&self, code: &str) -> SecurityAssessment {
        let critical = count_matches(&CRITICAL_PATTERNS, code);
        let high = count_matches(&HIGH_RISK_PATTERNS, code);
        let medium = count_matches(&MEDIUM_RISK_PATTERNS, code);

        let level = if critical > 0 {
            SecurityLevel::Failed
        } else if high > 1 {
            SecurityLevel::Low
        } else if high == 1 {
            SecurityLevel::Medium
        } else if medium > 2 {
            SecurityLevel::Medium
        } else if medium > 0 {
            SecurityLevel::High
        } else {
            SecurityLevel::Clean
        };

        SecurityAssessment {
            level,
            score: level.score(),
            critical_findings: critical,
            high_risk_findings: high,
            medium_risk_findings: medium,
        }
    }

    pub fn features(&self, code: &str) -> CodeFeatures {
        let follows_naming_convention = FUNCTION_NAME
            .captures_iter(code)
            .filter_map(|c| c.get(1))
            .all(|name| is_snake_case(name.as_str()));

        let body = strip_docs_and_comments(code);
        let single_letter_identifiers = SINGLE_LETTER_ASSIGNMENT
            .captures_iter(&body)
            .filter_map(|c| c.get(1))
            .filter(|name| !matches!(name.as_str(), "i" | "j" | "k"))
            .count();

        CodeFeatures {
            has_documentation: DOC_MARKER.is_match(code),
            has_type_annotations: TYPE_ANNOTATION.is_match(code),
            has_error_handling: ERROR_HANDLING.is_match(code),
            has_logging: LOGGING.is_match(code),
            follows_naming_convention,
            todo_markers: TODO_MARKER.find_iter(code).count(),
            max_nesting_depth: nesting_depth(code),
            single_letter_identifiers,
        }
    }

    pub fn analyze_code_quality(&self, code: &str) -> f64 {
        let features = self.features(code);

        let mut score = 0.2;
        for present in [
            features.has_documentation,
            features.has_type_annotations,
            features.has_error_handling,
            features.has_logging,
        ] {
            if present {
                score += 0.2;
            }
        }

        if features.max_nesting_depth > MAX_COMFORTABLE_NESTING {
            score -= (0.1 * (features.max_nesting_depth - MAX_COMFORTABLE_NESTING) as f64).min(0.3);
        }
        score -= (0.05 * features.single_letter_identifiers as f64).min(0.2);

        score.clamp(0.0, 1.0)
    }

    /// Combine analysis outputs into a single promotion score.
    ///
    /// `quality.overall_quality` already folds in success rate and coverage,
    /// so it carries half of the weight.
    pub fn promotion_score(
        &self,
        candidate: &PatternCandidate,
        quality: &QualityMetrics,
        reusability: f64,
        security: f64,
        code_quality: f64,
    ) -> PromotionScore {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("quality".to_string(), QUALITY_WEIGHT * quality.overall_quality);
        breakdown.insert("reusability".to_string(), REUSABILITY_WEIGHT * reusability);
        breakdown.insert("security".to_string(), SECURITY_WEIGHT * security);
        breakdown.insert("code_quality".to_string(), CODE_QUALITY_WEIGHT * code_quality);

        let score = breakdown.values().sum::<f64>().clamp(0.0, 1.0);

        debug!(
            candidate_id = %candidate.candidate_id,
            score,
            "Computed promotion score"
        );

        PromotionScore { score, breakdown }
    }
}

fn strip_docs_and_comments(code: &str) -> String {
    let without_docs = DOCSTRING.replace_all(code, "");
    COMMENT_LINE.replace_all(&without_docs, "").into_owned()
}

fn is_snake_case(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Deepest nesting by either brace depth or 4-space indentation levels
fn nesting_depth(code: &str) -> usize {
    let mut brace_depth: usize = 0;
    let mut max_brace: usize = 0;
    for c in code.chars() {
        match c {
            '{' => {
                brace_depth += 1;
                max_brace = max_brace.max(brace_depth);
            }
            '}' => brace_depth = brace_depth.saturating_sub(1),
            _ => {}
        }
    }

    let max_indent = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut width = 0;
            for c in line.chars() {
                match c {
                    ' ' => width += 1,
                    '\t' => width += 4,
                    _ => break,
                }
            }
            width / 4
        })
        .max()
        .unwrap_or(0);

    max_brace.max(max_indent)
}
