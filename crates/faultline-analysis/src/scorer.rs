//! Stage B: post-order roll-up scoring over the shared alarm tree.
//!
//! Children are evaluated before their parents. At every node the scorer
//! compares impacted-children coverage against the layer's threshold and,
//! on promotion, emits a candidate plus the alarm path covering the full
//! affected subtree. A promoted node's events are withdrawn from its
//! ancestors, so a parent is scored only on what its other children and
//! its own direct alarms contribute; impact buckets are left intact, so
//! the parent's coverage still sees which children were hit.

use std::collections::{BTreeMap, BTreeSet};

use faultline_core::config::AnalyzerConfig;
use faultline_core::model::{
    clamp01, AlarmPath, Candidate, NodeType, PathImpact, ScoreDetail,
};

use crate::tree::{AlarmTree, TreeNode};

/// Promotion reason tag for tree roll-up candidates
pub const REASON_TREE_POSTORDER: &str = "TREE_POSTORDER";

/// Evaluate every root bottom-up. Returns candidates sorted by confidence
/// descending (ties broken by node key) and paths sorted by candidate key.
pub fn evaluate(tree: &mut AlarmTree, config: &AnalyzerConfig) -> (Vec<Candidate>, Vec<AlarmPath>) {
    let hierarchy: BTreeSet<NodeType> = config.hierarchy.iter().copied().collect();
    let total_events = tree.total_events();

    let mut candidates = Vec::new();
    let mut paths = Vec::new();

    for root in tree.roots() {
        post_order(
            tree,
            &root,
            config,
            &hierarchy,
            total_events,
            &mut candidates,
            &mut paths,
        );
    }

    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.node.key.cmp(&b.node.key))
    });
    paths.sort_by(|a, b| a.candidate.key.cmp(&b.candidate.key));

    (candidates, paths)
}

fn post_order(
    tree: &mut AlarmTree,
    key: &str,
    config: &AnalyzerConfig,
    hierarchy: &BTreeSet<NodeType>,
    total_events: usize,
    candidates: &mut Vec<Candidate>,
    paths: &mut Vec<AlarmPath>,
) {
    let children: Vec<String> = match tree.node(key) {
        Some(node) => node.children.iter().cloned().collect(),
        None => return,
    };
    for child in children {
        post_order(tree, &child, config, hierarchy, total_events, candidates, paths);
    }

    let Some(node) = tree.node(key) else { return };
    let node_type = node.node.node_type();
    if !hierarchy.contains(&node_type) {
        return;
    }

    let (coverage, impacted) = node_coverage(node);
    let layer = config.layer(node_type);
    if impacted < layer.min_children {
        return;
    }
    if coverage < layer.coverage_threshold {
        return;
    }

    let impact = if total_events > 0 {
        node.events.len() as f64 / total_events as f64
    } else {
        0.0
    };
    let raw = clamp01(
        layer.weights.base + layer.weights.coverage * coverage + layer.weights.impact * impact,
    );
    let metrics = ScoreDetail {
        coverage,
        impact,
        base: layer.weights.base,
        raw_score: raw,
        normalized: raw,
    };

    candidates.push(Candidate {
        node: node.node.reference.clone(),
        confidence: raw,
        coverage,
        reason: REASON_TREE_POSTORDER.to_string(),
        metrics,
        explained: node.events.keys().cloned().collect(),
    });
    paths.push(build_path(tree, key));

    consume_events(tree, key);
}

/// Coverage of a node per the roll-up rules:
/// `min(1, impacted / max(1, baseline for the dominant child type))`,
/// falling back to the impacted count when no baseline is known. A leaf
/// VirtualMachine with no fan-out information and at least one direct
/// alarm reads as fully covered.
fn node_coverage(node: &TreeNode) -> (f64, usize) {
    let impacted = node.impacts.len();
    if impacted == 0 {
        if node.node.node_type() == NodeType::VirtualMachine
            && node.node.child_counts.is_empty()
            && !node.events.is_empty()
        {
            return (1.0, 0);
        }
        return (0.0, 0);
    }

    let dominant = dominant_child_type(node);
    let baseline = dominant
        .and_then(|t| node.node.child_counts.get(&t))
        .copied()
        .unwrap_or(0) as usize;
    let total = if baseline > 0 { baseline } else { impacted };
    let coverage = (impacted as f64 / total.max(1) as f64).min(1.0);
    (coverage, impacted)
}

/// Child type with the most impact buckets; ties resolve to the lower
/// layer so the answer never depends on map iteration order.
fn dominant_child_type(node: &TreeNode) -> Option<NodeType> {
    let mut tally: BTreeMap<NodeType, usize> = BTreeMap::new();
    for impact in node.impacts.values() {
        *tally.entry(impact.node.node_type).or_insert(0) += 1;
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(node_type, _)| node_type)
}

/// Build the alarm path rooted at a candidate: one impact per affected
/// child in key order, each carrying its events sorted by
/// (occurred_at, id) and, recursively, the child's own affected subtree.
fn build_path(tree: &AlarmTree, key: &str) -> AlarmPath {
    let node = tree.node(key).expect("candidate node exists");
    let mut visited = BTreeSet::new();
    visited.insert(key.to_string());
    AlarmPath {
        candidate: node.node.reference.clone(),
        impacts: build_impacts(tree, key, &mut visited),
    }
}

fn build_impacts(tree: &AlarmTree, key: &str, visited: &mut BTreeSet<String>) -> Vec<PathImpact> {
    let Some(node) = tree.node(key) else {
        return Vec::new();
    };
    let mut impacts = Vec::with_capacity(node.impacts.len());
    for (child_key, impact) in &node.impacts {
        if !visited.insert(child_key.clone()) {
            continue;
        }
        let mut events: Vec<_> = impact.events.values().cloned().collect();
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        impacts.push(PathImpact {
            node: impact.node.clone(),
            events,
            impacts: build_impacts(tree, child_key, visited),
        });
    }
    impacts
}

/// Withdraw a promoted node's events from every ancestor so they do not
/// ascend past the candidate that owns them.
fn consume_events(tree: &mut AlarmTree, key: &str) {
    let Some(node) = tree.node(key) else { return };
    let ids: Vec<String> = node.events.keys().cloned().collect();
    let mut cursor = node.parent.clone();
    while let Some(parent_key) = cursor {
        let Some(parent) = tree.node_mut(&parent_key) else {
            break;
        };
        for id in &ids {
            parent.events.remove(id);
        }
        cursor = parent.parent.clone();
    }
}
