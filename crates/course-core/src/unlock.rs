//! Unlock evaluation for course tree nodes.

use crate::mastery::{Tier, TierMap};
use crate::tree::{CourseTree, TreeNode};
use crate::ConceptId;
use std::collections::HashMap;
use tracing::warn;

/// A named predicate a node can opt into through `custom_rule_id`.
pub type CustomRule = Box<dyn Fn(&TreeNode, &TierMap) -> bool + Send + Sync>;

/// What a learner sees on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node has no concept yet (editor only).
    Unbound,
    Locked,
    /// Unlocked, nothing earned yet.
    Available,
    /// Unlocked with at least Bronze on the node's own concept.
    Mastered(Tier),
}

impl NodeStatus {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Available | Self::Mastered(_))
    }
}

/// Prerequisite check with all-of semantics: every required concept must be
/// at or above `min_badge`.
pub fn requirements_met(node: &TreeNode, tiers: &TierMap) -> bool {
    missing_requirements(node, tiers).is_empty()
}

/// Required concepts the learner has not yet brought up to `min_badge`.
pub fn missing_requirements(node: &TreeNode, tiers: &TierMap) -> Vec<ConceptId> {
    let conditions = &node.unlock_conditions;
    if conditions.min_badge == Tier::Unrated {
        return Vec::new();
    }
    let needed = conditions.min_badge.rank();
    conditions
        .required_concept_ids
        .iter()
        .filter(|id| tiers.get(id).rank() < needed)
        .cloned()
        .collect()
}

/// Registry of custom unlock rules.
#[derive(Default)]
pub struct UnlockRules {
    rules: HashMap<String, CustomRule>,
}

impl UnlockRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        rule: impl Fn(&TreeNode, &TierMap) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.rules.insert(id.into(), Box::new(rule));
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    /// Requirements plus the node's custom rule, if one is registered.
    /// Unknown rule ids are ignored.
    pub fn is_unlocked(&self, node: &TreeNode, tiers: &TierMap) -> bool {
        if !requirements_met(node, tiers) {
            return false;
        }
        match node.unlock_conditions.custom_rule_id.as_deref() {
            None => true,
            Some(id) => match self.rules.get(id) {
                Some(rule) => rule(node, tiers),
                None => {
                    warn!(rule = id, node = ?node.concept_id, "unknown custom unlock rule ignored");
                    true
                }
            },
        }
    }

    pub fn node_status(&self, node: &TreeNode, tiers: &TierMap) -> NodeStatus {
        let Some(concept) = node.concept() else {
            return NodeStatus::Unbound;
        };
        if !self.is_unlocked(node, tiers) {
            return NodeStatus::Locked;
        }
        match tiers.get(concept) {
            Tier::Unrated => NodeStatus::Available,
            tier => NodeStatus::Mastered(tier),
        }
    }

    /// Status of every node, aligned with `tree.nodes`.
    pub fn tree_status(&self, tree: &CourseTree, tiers: &TierMap) -> Vec<NodeStatus> {
        tree.nodes.iter().map(|n| self.node_status(n, tiers)).collect()
    }
}

impl std::fmt::Debug for UnlockRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.rules.keys().collect();
        ids.sort();
        f.debug_struct("UnlockRules").field("rules", &ids).finish()
    }
}
