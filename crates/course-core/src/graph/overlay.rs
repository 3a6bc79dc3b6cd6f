//! Read-time merge of user-authored concepts over the canonical graph.

use super::{ConceptIndex, ConceptNode, GraphSnapshot};
use std::collections::HashMap;
use std::sync::Arc;

/// Custom concepts layered over a [`GraphSnapshot`].
///
/// A custom concept with the same id as a canonical one shadows it for
/// lookups made through the overlay. The snapshot itself is never touched.
#[derive(Debug, Clone)]
pub struct ConceptOverlay {
    base: Arc<GraphSnapshot>,
    custom: HashMap<String, ConceptNode>,
    order: Vec<String>,
}

impl ConceptOverlay {
    pub fn new(base: Arc<GraphSnapshot>) -> Self {
        Self {
            base,
            custom: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Add or replace a custom concept.
    pub fn upsert(&mut self, concept: ConceptNode) {
        if !self.custom.contains_key(&concept.id) {
            self.order.push(concept.id.clone());
        }
        self.custom.insert(concept.id.clone(), concept);
    }

    /// Remove a custom concept. Canonical concepts cannot be removed.
    pub fn remove(&mut self, id: &str) -> Option<ConceptNode> {
        let removed = self.custom.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);
        }
        removed
    }

    pub fn is_custom(&self, id: &str) -> bool {
        self.custom.contains_key(id)
    }

    pub fn base(&self) -> &GraphSnapshot {
        &self.base
    }

    /// Canonical concepts (shadowed where overridden) followed by custom-only
    /// ones in insertion order.
    pub fn all_nodes(&self) -> Vec<ConceptNode> {
        let mut out: Vec<ConceptNode> = self
            .base
            .nodes()
            .iter()
            .map(|n| self.custom.get(&n.id).unwrap_or(n).clone())
            .collect();
        out.extend(
            self.order
                .iter()
                .filter(|id| self.base.get(id).is_none())
                .filter_map(|id| self.custom.get(id).cloned()),
        );
        out
    }
}

impl ConceptIndex for ConceptOverlay {
    fn concept(&self, id: &str) -> Option<&ConceptNode> {
        self.custom.get(id).or_else(|| self.base.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Arc<GraphSnapshot> {
        Arc::new(GraphSnapshot::from_nodes(vec![
            ConceptNode::new("a", "Alpha"),
            ConceptNode::new("b", "Beta"),
        ]))
    }

    #[test]
    fn test_custom_concepts_merge_at_read_time() {
        let base = base();
        let mut overlay = ConceptOverlay::new(Arc::clone(&base));
        overlay.upsert(ConceptNode::new("c", "Gamma"));
        overlay.upsert(ConceptNode::new("a", "Alpha (edited)"));

        assert_eq!(overlay.title("a"), Some("Alpha (edited)"));
        assert_eq!(overlay.title("c"), Some("Gamma"));
        assert_eq!(base.title("a"), Some("Alpha"));
        assert!(base.get("c").is_none());

        let ids: Vec<_> = overlay.all_nodes().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_restores_canonical() {
        let mut overlay = ConceptOverlay::new(base());
        overlay.upsert(ConceptNode::new("a", "Shadow"));
        assert!(overlay.remove("a").is_some());
        assert_eq!(overlay.title("a"), Some("Alpha"));
        assert!(overlay.remove("b").is_none());
    }
}
