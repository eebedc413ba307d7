// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern lineage: directed `ancestor -> descendant` improvement edges between
//! pattern versions.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use crate::domain::PatternId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRecord {
    pub ancestor_id: PatternId,
    pub delta: f64,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
struct LineageGraph {
    /// ancestor -> descendants, in insertion order
    children: HashMap<PatternId, Vec<PatternId>>,
    /// descendant -> its (single) recorded ancestor
    parent: HashMap<PatternId, ImprovementRecord>,
}

#[derive(Default)]
pub struct PatternLineageTracker {
    graph: RwLock<LineageGraph>,
}

impl PatternLineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ancestor_id -> new_id`. A pattern has at most one ancestor;
    /// recording again replaces the previous edge.
    pub fn track_improvement(
        &self,
        new_id: PatternId,
        ancestor_id: PatternId,
        delta: f64,
        description: impl Into<String>,
    ) {
        if new_id == ancestor_id {
            warn!(pattern_id = %new_id, "Ignoring self-referential lineage edge");
            return;
        }

        let mut graph = self.graph.write();

        if let Some(previous) = graph.parent.get(&new_id).map(|r| r.ancestor_id) {
            if let Some(siblings) = graph.children.get_mut(&previous) {
                siblings.retain(|id| *id != new_id);
            }
        }

        graph.children.entry(ancestor_id).or_default().push(new_id);
        graph.parent.insert(
            new_id,
            ImprovementRecord {
                ancestor_id,
                delta,
                description: description.into(),
                recorded_at: Utc::now(),
            },
        );

        debug!(pattern_id = %new_id, ancestor_id = %ancestor_id, delta, "Recorded lineage edge");
    }

    /// All transitive descendants, breadth-first
    pub fn lineage(&self, pattern_id: PatternId) -> Vec<PatternId> {
        let graph = self.graph.read();
        let mut seen = HashSet::from([pattern_id]);
        let mut queue = VecDeque::from([pattern_id]);
        let mut descendants = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in graph.children.get(&current).into_iter().flatten() {
                if seen.insert(*child) {
                    descendants.push(*child);
                    queue.push_back(*child);
                }
            }
        }

        descendants
    }

    pub fn improvement_history(&self, pattern_id: PatternId) -> Option<ImprovementRecord> {
        self.graph.read().parent.get(&pattern_id).cloned()
    }

    /// Chain of ancestors from the direct parent up to the root
    pub fn ancestry(&self, pattern_id: PatternId) -> Vec<PatternId> {
        let graph = self.graph.read();
        let mut seen = HashSet::from([pattern_id]);
        let mut chain = Vec::new();
        let mut current = pattern_id;

        while let Some(record) = graph.parent.get(&current) {
            if !seen.insert(record.ancestor_id) {
                break;
            }
            chain.push(record.ancestor_id);
            current = record.ancestor_id;
        }

        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_history_for_root() {
        let tracker = PatternLineageTracker::new();
        let root = PatternId::new();
        assert!(tracker.improvement_history(root).is_none());
        assert!(tracker.lineage(root).is_empty());
        assert!(tracker.ancestry(root).is_empty());
    }

    #[test]
    fn test_single_edge() {
        let tracker = PatternLineageTracker::new();
        let (v1, v2) = (PatternId::new(), PatternId::new());
        tracker.track_improvement(v2, v1, 0.02, "Handle unicode addresses");

        let record = tracker.improvement_history(v2).unwrap();
        assert_eq!(record.ancestor_id, v1);
        assert_eq!(record.delta, 0.02);
        assert_eq!(record.description, "Handle unicode addresses");
        assert_eq!(tracker.lineage(v1), vec![v2]);
    }

    #[test]
    fn test_transitive_lineage_is_breadth_first() {
        let tracker = PatternLineageTracker::new();
        let (root, a, b, a1) = (PatternId::new(), PatternId::new(), PatternId::new(), PatternId::new());
        tracker.track_improvement(a, root, 0.01, "a");
        tracker.track_improvement(a1, a, 0.01, "a1");
        tracker.track_improvement(b, root, 0.01, "b");

        assert_eq!(tracker.lineage(root), vec![a, b, a1]);
        assert_eq!(tracker.ancestry(a1), vec![a, root]);
    }

    #[test]
    fn test_reparenting_moves_edge() {
        let tracker = PatternLineageTracker::new();
        let (first, second, child) = (PatternId::new(), PatternId::new(), PatternId::new());
        tracker.track_improvement(child, first, 0.01, "initial");
        tracker.track_improvement(child, second, 0.03, "corrected");

        assert!(tracker.lineage(first).is_empty());
        assert_eq!(tracker.lineage(second), vec![child]);
        assert_eq!(tracker.improvement_history(child).unwrap().ancestor_id, second);
    }

    #[test]
    fn test_cycles_terminate() {
        let tracker = PatternLineageTracker::new();
        let (a, b) = (PatternId::new(), PatternId::new());
        tracker.track_improvement(b, a, 0.01, "forward");
        tracker.track_improvement(a, b, 0.01, "back");

        assert_eq!(tracker.lineage(a), vec![b]);
        assert_eq!(tracker.ancestry(a), vec![b]);
    }

    #[test]
    fn test_self_edge_ignored() {
        let tracker = PatternLineageTracker::new();
        let a = PatternId::new();
        tracker.track_improvement(a, a, 0.0, "noop");
        assert!(tracker.improvement_history(a).is_none());
    }
}
