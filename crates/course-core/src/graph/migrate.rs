//! One-time migration from the legacy flat concept format.
//!
//! Legacy data is a list of concept records plus a list of typed edges.
//! Relationships live on the edges; migration folds them into each node's
//! [`Relationships`].

use super::{ConceptMetrics, ConceptNode, Relationships};
use crate::ConceptId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// A concept record in the legacy flat format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyConcept {
    pub id: ConceptId,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub primary_domain: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metrics: ConceptMetrics,
}

/// A typed edge in the legacy format. The type is kept as a raw string so
/// unrecognized kinds can be skipped instead of failing the whole load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdge {
    pub from: ConceptId,
    pub to: ConceptId,
    #[serde(rename = "type")]
    pub kind: String,
}

impl RawEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
        }
    }
}

/// Everything a graph source hands over at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub concepts: Vec<LegacyConcept>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

/// Recognized edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    PartOf,
    RelatedTo,
    BuildsOn,
}

impl EdgeKind {
    /// Parse a legacy edge type. Unknown kinds yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PART_OF" => Some(Self::PartOf),
            "RELATED_TO" => Some(Self::RelatedTo),
            "BUILDS_ON" => Some(Self::BuildsOn),
            _ => None,
        }
    }
}

/// Counters describing what migration discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    /// Edges whose endpoint is not a known concept, or that point at themselves.
    pub dropped_edges: usize,
    /// Edges with an unrecognized type.
    pub ignored_edges: usize,
    /// Concept records skipped because their id was already seen.
    pub duplicate_concepts: usize,
}

/// Fold legacy concepts and edges into graph nodes, preserving record order.
pub fn migrate(raw: RawGraph) -> (Vec<ConceptNode>, MigrationStats) {
    let mut stats = MigrationStats::default();
    let mut nodes: Vec<ConceptNode> = Vec::with_capacity(raw.concepts.len());
    let mut index: HashMap<ConceptId, usize> = HashMap::with_capacity(raw.concepts.len());

    for concept in raw.concepts {
        if index.contains_key(&concept.id) {
            warn!(concept = %concept.id, "duplicate concept record skipped");
            stats.duplicate_concepts += 1;
            continue;
        }
        index.insert(concept.id.clone(), nodes.len());
        nodes.push(ConceptNode {
            id: concept.id,
            title: concept.title,
            summary: concept.summary,
            primary_domain: concept.primary_domain,
            tags: concept.tags.into_iter().collect::<BTreeSet<_>>(),
            relationships: Relationships::default(),
            metrics: concept.metrics,
        });
    }

    for edge in raw.edges {
        let Some(kind) = EdgeKind::parse(&edge.kind) else {
            debug!(kind = %edge.kind, from = %edge.from, to = %edge.to, "ignoring edge of unknown type");
            stats.ignored_edges += 1;
            continue;
        };
        let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
            stats.dropped_edges += 1;
            continue;
        };
        if from == to {
            stats.dropped_edges += 1;
            continue;
        }

        match kind {
            EdgeKind::PartOf => {
                let rel = &mut nodes[from].relationships;
                if rel.part_of.is_none() {
                    rel.part_of = Some(edge.to);
                }
            }
            EdgeKind::RelatedTo => {
                push_unique(&mut nodes[from].relationships.related_to, &edge.to);
                push_unique(&mut nodes[to].relationships.related_to, &edge.from);
            }
            EdgeKind::BuildsOn => {
                push_unique(&mut nodes[from].relationships.builds_on, &edge.to);
            }
        }
    }

    if stats.dropped_edges > 0 {
        warn!(count = stats.dropped_edges, "dropped edges referencing unknown concepts");
    }

    (nodes, stats)
}

fn push_unique(list: &mut Vec<ConceptId>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn concept(id: &str) -> LegacyConcept {
        LegacyConcept {
            id: id.to_string(),
            title: id.to_uppercase(),
            summary: String::new(),
            primary_domain: "math".to_string(),
            tags: vec![],
            metrics: ConceptMetrics::default(),
        }
    }

    fn raw(ids: &[&str], edges: Vec<RawEdge>) -> RawGraph {
        RawGraph {
            concepts: ids.iter().map(|id| concept(id)).collect(),
            edges,
        }
    }

    #[test]
    fn test_edge_kind_parse() {
        assert_eq!(EdgeKind::parse("PART_OF"), Some(EdgeKind::PartOf));
        assert_eq!(EdgeKind::parse("related_to"), Some(EdgeKind::RelatedTo));
        assert_eq!(EdgeKind::parse(" BUILDS_ON "), Some(EdgeKind::BuildsOn));
        assert_eq!(EdgeKind::parse("MENTIONS"), None);
    }

    #[test]
    fn test_part_of_first_write_wins() {
        let (nodes, _) = migrate(raw(
            &["a", "b", "c"],
            vec![RawEdge::new("a", "b", "PART_OF"), RawEdge::new("a", "c", "PART_OF")],
        ));
        assert_eq!(nodes[0].relationships.part_of.as_deref(), Some("b"));
    }

    #[test]
    fn test_related_to_is_mirrored_without_duplicates() {
        let (nodes, _) = migrate(raw(
            &["a", "b"],
            vec![
                RawEdge::new("a", "b", "RELATED_TO"),
                RawEdge::new("b", "a", "RELATED_TO"),
                RawEdge::new("a", "b", "RELATED_TO"),
            ],
        ));
        assert_eq!(nodes[0].relationships.related_to, vec!["b".to_string()]);
        assert_eq!(nodes[1].relationships.related_to, vec!["a".to_string()]);
    }

    #[test]
    fn test_builds_on_is_directed_and_deduped() {
        let (nodes, _) = migrate(raw(
            &["a", "b"],
            vec![RawEdge::new("b", "a", "BUILDS_ON"), RawEdge::new("b", "a", "BUILDS_ON")],
        ));
        assert!(nodes[0].relationships.builds_on.is_empty());
        assert_eq!(nodes[1].relationships.builds_on, vec!["a".to_string()]);
    }

    #[test]
    fn test_unknown_endpoints_and_types() {
        let (nodes, stats) = migrate(raw(
            &["a", "b"],
            vec![
                RawEdge::new("a", "zzz", "BUILDS_ON"),
                RawEdge::new("a", "b", "MENTIONS"),
                RawEdge::new("a", "a", "PART_OF"),
            ],
        ));
        assert_eq!(stats.dropped_edges, 2);
        assert_eq!(stats.ignored_edges, 1);
        assert!(nodes[0].relationships.builds_on.is_empty());
        assert!(nodes[0].relationships.part_of.is_none());
    }

    #[test]
    fn test_duplicate_concepts_skipped() {
        let (nodes, stats) = migrate(raw(&["a", "a", "b"], vec![]));
        assert_eq!(nodes.len(), 2);
        assert_eq!(stats.duplicate_concepts, 1);
    }

    proptest! {
        #[test]
        fn test_related_to_symmetry(pairs in prop::collection::vec((0usize..6, 0usize..6), 0..30)) {
            let ids = ["a", "b", "c", "d", "e", "f"];
            let edges = pairs
                .iter()
                .map(|(x, y)| RawEdge::new(ids[*x], ids[*y], "RELATED_TO"))
                .collect();
            let (nodes, _) = migrate(raw(&ids, edges));
            for node in &nodes {
                for other in &node.relationships.related_to {
                    let peer = nodes.iter().find(|n| &n.id == other).unwrap();
                    prop_assert!(peer.relationships.related_to.contains(&node.id));
                }
            }
        }
    }
}
