//! Creator-authored course trees.
//!
//! A tree binds nodes to concepts and links them with `next_ids`. Nodes are
//! addressed by their concept id; a concept appears at most once per tree.
//! Nodes may be unbound while a creator is still authoring; those are kept
//! for the editor and skipped by every learner-facing computation.

mod publish;
mod validate;

pub use publish::{prepare_entry, publish, unpublish, CatalogEntry, CatalogStore, MemoryCatalogStore};
pub use validate::{CyclePolicy, ValidationOptions, ValidationReport};

use crate::error::TreeError;
use crate::layout::Point;
use crate::mastery::Tier;
use crate::{ConceptId, LessonId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Axis along which auto-layout places levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    #[default]
    TopDown,
    LeftRight,
}

impl LayoutMode {
    pub fn toggle(self) -> Self {
        match self {
            Self::TopDown => Self::LeftRight,
            Self::LeftRight => Self::TopDown,
        }
    }
}

/// Tree-level display settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeUi {
    #[serde(default)]
    pub layout_mode: LayoutMode,
}

/// Prerequisites for entering a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConditions {
    #[serde(default)]
    pub required_concept_ids: Vec<ConceptId>,
    #[serde(default)]
    pub min_badge: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_rule_id: Option<String>,
}

impl UnlockConditions {
    pub fn requiring(concepts: &[&str], min_badge: Tier) -> Self {
        Self {
            required_concept_ids: concepts.iter().map(|c| c.to_string()).collect(),
            min_badge,
            custom_rule_id: None,
        }
    }
}

/// A node in a course tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// `None` while the node is unbound in the editor.
    pub concept_id: Option<ConceptId>,
    #[serde(default)]
    pub next_ids: Vec<ConceptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree_lesson_ids: Option<Vec<LessonId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree_lesson_steps: Option<BTreeMap<LessonId, u32>>,
    /// Stored canvas position; overrides auto-layout for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Point>,
    #[serde(default)]
    pub unlock_conditions: UnlockConditions,
}

impl TreeNode {
    pub fn bound(concept_id: impl Into<String>) -> Self {
        Self {
            concept_id: Some(concept_id.into()),
            ..Default::default()
        }
    }

    pub fn is_bound(&self) -> bool {
        self.concept_id.is_some()
    }

    pub fn concept(&self) -> Option<&str> {
        self.concept_id.as_deref()
    }

    fn is(&self, concept_id: &str) -> bool {
        self.concept_id.as_deref() == Some(concept_id)
    }

    /// Lessons grouped into steps, in step order then listed order.
    pub fn lesson_steps(&self) -> Vec<(u32, &LessonId)> {
        let Some(ids) = &self.subtree_lesson_ids else {
            return Vec::new();
        };
        let steps = self.subtree_lesson_steps.as_ref();
        let mut out: Vec<(u32, &LessonId)> = ids
            .iter()
            .map(|id| (steps.and_then(|s| s.get(id)).copied().unwrap_or(1), id))
            .collect();
        out.sort_by_key(|(step, _)| *step);
        out
    }
}

/// Metadata supplied when creating a tree.
#[derive(Debug, Clone, Default)]
pub struct TreeMeta {
    pub title: String,
    pub description: String,
    pub primary_domain: String,
    pub tags: Vec<String>,
    pub root_concept_id: Option<ConceptId>,
    pub intro_video_url: Option<String>,
    pub layout_mode: LayoutMode,
}

impl TreeMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A creator-authored course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseTree {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: UserId,
    #[serde(default)]
    pub primary_domain: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub root_concept_id: Option<ConceptId>,
    #[serde(default)]
    pub intro_video_url: Option<String>,
    #[serde(default)]
    pub ui: TreeUi,
    #[serde(default)]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: Vec<TreeNode>,
}

impl CourseTree {
    /// Create an empty tree owned by `owner_id`.
    pub fn create(owner_id: impl Into<String>, meta: TreeMeta) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: meta.title,
            description: meta.description,
            creator_id: owner_id.into(),
            primary_domain: meta.primary_domain,
            tags: meta.tags,
            root_concept_id: meta.root_concept_id,
            intro_video_url: meta.intro_video_url,
            ui: TreeUi {
                layout_mode: meta.layout_mode,
            },
            version: 0,
            created_at: now,
            updated_at: now,
            nodes: Vec::new(),
        }
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.ui.layout_mode
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn position_of(&self, concept_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.is(concept_id))
    }

    pub fn node(&self, concept_id: &str) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.is(concept_id))
    }

    pub fn node_mut(&mut self, concept_id: &str) -> Option<&mut TreeNode> {
        self.nodes.iter_mut().find(|n| n.is(concept_id))
    }

    fn require_mut(&mut self, concept_id: &str) -> Result<&mut TreeNode, TreeError> {
        self.node_mut(concept_id)
            .ok_or_else(|| TreeError::UnknownNode(concept_id.to_string()))
    }

    /// Add a node for `concept_id`. Returns false when the concept already
    /// has a node in this tree.
    pub fn add_node(&mut self, concept_id: impl Into<String>) -> bool {
        let concept_id = concept_id.into();
        if self.position_of(&concept_id).is_some() {
            return false;
        }
        self.nodes.push(TreeNode::bound(concept_id));
        true
    }

    /// Add a placeholder node and return its position.
    pub fn add_unbound_node(&mut self) -> usize {
        self.nodes.push(TreeNode::default());
        self.nodes.len() - 1
    }

    /// Bind the node at `position` to a concept.
    pub fn bind_node(&mut self, position: usize, concept_id: impl Into<String>) -> Result<(), TreeError> {
        let concept_id = concept_id.into();
        if position >= self.nodes.len() {
            return Err(TreeError::PositionOutOfRange(position));
        }
        match self.position_of(&concept_id) {
            Some(existing) if existing != position => {
                return Err(TreeError::DuplicateConcept(concept_id));
            }
            _ => {}
        }
        self.nodes[position].concept_id = Some(concept_id);
        Ok(())
    }

    /// Remove a node and every link that points at it.
    pub fn remove_node(&mut self, concept_id: &str) -> Option<TreeNode> {
        let pos = self.position_of(concept_id)?;
        let removed = self.nodes.remove(pos);
        for node in &mut self.nodes {
            node.next_ids.retain(|id| id != concept_id);
        }
        if self.root_concept_id.as_deref() == Some(concept_id) {
            self.root_concept_id = None;
        }
        Some(removed)
    }

    /// Link `from` to `to`. Returns false if the link already existed.
    pub fn connect_nodes(&mut self, from: &str, to: &str) -> Result<bool, TreeError> {
        if from == to {
            return Err(TreeError::SelfLoop(from.to_string()));
        }
        let node = self.require_mut(from)?;
        if node.next_ids.iter().any(|id| id == to) {
            return Ok(false);
        }
        node.next_ids.push(to.to_string());
        Ok(true)
    }

    /// Replace the outgoing links of a node wholesale. Duplicates collapse to
    /// their first occurrence.
    pub fn set_node_next_ids(&mut self, concept_id: &str, ids: Vec<ConceptId>) -> Result<(), TreeError> {
        if ids.iter().any(|id| id == concept_id) {
            return Err(TreeError::SelfLoop(concept_id.to_string()));
        }
        let mut seen = HashSet::new();
        let deduped: Vec<ConceptId> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        self.require_mut(concept_id)?.next_ids = deduped;
        Ok(())
    }

    pub fn disconnect_nodes(&mut self, from: &str, to: &str) -> Result<bool, TreeError> {
        let node = self.require_mut(from)?;
        let before = node.next_ids.len();
        node.next_ids.retain(|id| id != to);
        Ok(node.next_ids.len() != before)
    }

    pub fn set_node_position(&mut self, concept_id: &str, at: Point) -> Result<(), TreeError> {
        self.require_mut(concept_id)?.ui = Some(at);
        Ok(())
    }

    pub fn clear_node_position(&mut self, concept_id: &str) -> Result<(), TreeError> {
        self.require_mut(concept_id)?.ui = None;
        Ok(())
    }

    pub fn set_unlock_conditions(
        &mut self,
        concept_id: &str,
        conditions: UnlockConditions,
    ) -> Result<(), TreeError> {
        self.require_mut(concept_id)?.unlock_conditions = conditions;
        Ok(())
    }

    /// Attach lessons to a node. Step entries for lessons not in `ids` are
    /// dropped.
    pub fn set_subtree_lessons(
        &mut self,
        concept_id: &str,
        ids: Vec<LessonId>,
        mut steps: BTreeMap<LessonId, u32>,
    ) -> Result<(), TreeError> {
        steps.retain(|lesson, _| ids.contains(lesson));
        let node = self.require_mut(concept_id)?;
        node.subtree_lesson_ids = Some(ids);
        node.subtree_lesson_steps = if steps.is_empty() { None } else { Some(steps) };
        Ok(())
    }

    /// Bound nodes only.
    pub fn learner_nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(|n| n.is_bound())
    }

    /// Concepts with a link into `concept_id`, in node order.
    pub fn incoming(&self, concept_id: &str) -> Vec<&str> {
        self.learner_nodes()
            .filter(|n| n.next_ids.iter().any(|id| id == concept_id))
            .filter_map(|n| n.concept())
            .collect()
    }

    /// The explicit root if it is bound in this tree, otherwise every bound
    /// node without an incoming link.
    pub fn roots(&self) -> Vec<&str> {
        if let Some(root) = self.root_concept_id.as_deref() {
            if let Some(node) = self.node(root) {
                return node.concept().into_iter().collect();
            }
        }
        let targets: HashSet<&str> = self
            .learner_nodes()
            .flat_map(|n| n.next_ids.iter().map(String::as_str))
            .collect();
        self.learner_nodes()
            .filter_map(|n| n.concept())
            .filter(|id| !targets.contains(id))
            .collect()
    }
}
