//! Canonical concept graph.
//!
//! The graph is loaded once from a [`GraphSource`], migrated from the legacy
//! flat format, and then treated as read-only. User-authored concepts are
//! layered on top through [`ConceptOverlay`] instead of being written back.

mod migrate;
mod overlay;
mod source;

pub use migrate::{migrate, EdgeKind, LegacyConcept, MigrationStats, RawEdge, RawGraph};
pub use overlay::ConceptOverlay;
pub use source::{GraphSource, JsonGraphSource, StaticGraphSource};

use crate::error::StorageResult;
use crate::ConceptId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Undirected-in-practice adjacency keyed by concept id.
pub type Adjacency = BTreeMap<ConceptId, BTreeSet<ConceptId>>;

/// Typed links from one concept to others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationships {
    /// Prerequisite-like directed edges.
    #[serde(default)]
    pub builds_on: Vec<ConceptId>,
    /// Symmetric edges; mirrored on both endpoints.
    #[serde(default)]
    pub related_to: Vec<ConceptId>,
    /// Single parent. Children are found by reverse scan.
    #[serde(default)]
    pub part_of: Option<ConceptId>,
}

/// Usage counters carried with each concept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMetrics {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub starts: u64,
    #[serde(default)]
    pub completions: u64,
    #[serde(default)]
    pub estimated_difficulty: f64,
}

/// A taxonomy unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptNode {
    pub id: ConceptId,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub primary_domain: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub relationships: Relationships,
    #[serde(default)]
    pub metrics: ConceptMetrics,
}

impl ConceptNode {
    /// Create a bare concept with no relationships.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            primary_domain: String::new(),
            tags: BTreeSet::new(),
            relationships: Relationships::default(),
            metrics: ConceptMetrics::default(),
        }
    }
}

/// Read-only lookup of concepts by id, used for validation and titles.
pub trait ConceptIndex {
    /// Look up a concept.
    fn concept(&self, id: &str) -> Option<&ConceptNode>;

    /// Whether the id resolves.
    fn contains(&self, id: &str) -> bool {
        self.concept(id).is_some()
    }

    /// Title of a concept, if it resolves.
    fn title(&self, id: &str) -> Option<&str> {
        self.concept(id).map(|c| c.title.as_str())
    }
}

/// An immutable, indexed view of the loaded graph.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    nodes: Vec<ConceptNode>,
    index: HashMap<ConceptId, usize>,
}

impl GraphSnapshot {
    /// Build a snapshot from already-migrated nodes. Later duplicates of an
    /// id are ignored.
    pub fn from_nodes(nodes: Vec<ConceptNode>) -> Self {
        let mut kept = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if index.contains_key(&node.id) {
                continue;
            }
            index.insert(node.id.clone(), kept.len());
            kept.push(node);
        }
        Self { nodes: kept, index }
    }

    /// Migrate a raw legacy graph into a snapshot.
    pub fn from_raw(raw: RawGraph) -> Self {
        let (nodes, _) = migrate(raw);
        Self::from_nodes(nodes)
    }

    pub fn get(&self, id: &str) -> Option<&ConceptNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in load order.
    pub fn nodes(&self) -> &[ConceptNode] {
        &self.nodes
    }

    /// Owned copy of every node.
    pub fn all_nodes(&self) -> Vec<ConceptNode> {
        self.nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Concepts whose `partOf` is `id`, in load order.
    pub fn children(&self, id: &str) -> Vec<&ConceptNode> {
        self.nodes
            .iter()
            .filter(|n| n.relationships.part_of.as_deref() == Some(id))
            .collect()
    }

    /// Union of `buildsOn`, `relatedTo`, the `partOf` parent and the reverse
    /// children, deduplicated in that order.
    pub fn neighbors(&self, id: &str) -> Vec<&ConceptNode> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        let rel = &node.relationships;

        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let forward = rel
            .builds_on
            .iter()
            .chain(rel.related_to.iter())
            .chain(rel.part_of.iter());
        for target in forward {
            if let Some(n) = self.get(target) {
                if seen.insert(n.id.as_str()) {
                    out.push(n);
                }
            }
        }
        for child in self.children(id) {
            if seen.insert(child.id.as_str()) {
                out.push(child);
            }
        }
        out
    }

    /// Adjacency for path finding: `relatedTo` both ways, `buildsOn` from the
    /// dependent concept, `partOf` both ways. Direction is not preserved.
    pub fn build_adjacency(&self) -> Adjacency {
        let mut adj: Adjacency = self
            .nodes
            .iter()
            .map(|n| (n.id.clone(), BTreeSet::new()))
            .collect();

        let link = |adj: &mut Adjacency, from: &str, to: &str| {
            if let Some(set) = adj.get_mut(from) {
                set.insert(to.to_string());
            }
        };

        for node in &self.nodes {
            let id = node.id.as_str();
            let rel = &node.relationships;
            for target in rel.builds_on.iter().filter(|t| self.index.contains_key(*t)) {
                link(&mut adj, id, target);
            }
            for peer in rel.related_to.iter().filter(|t| self.index.contains_key(*t)) {
                link(&mut adj, id, peer);
                link(&mut adj, peer, id);
            }
            if let Some(parent) = rel.part_of.as_ref().filter(|p| self.index.contains_key(*p)) {
                link(&mut adj, id, parent);
                link(&mut adj, parent, id);
            }
        }
        adj
    }

    /// The `partOf` chain above `id`, nearest first. Stops at the first
    /// repeated concept, so cyclic chains terminate.
    pub fn ancestors(&self, id: &str) -> Vec<ConceptId> {
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([id]);
        let mut current = self.get(id);
        while let Some(parent) = current.and_then(|n| n.relationships.part_of.as_deref()) {
            if !visited.insert(parent) {
                break;
            }
            out.push(parent.to_string());
            current = self.get(parent);
        }
        out
    }

    /// Every distinct cycle in the `partOf` relation, each rotated so its
    /// smallest id comes first.
    pub fn part_of_cycles(&self) -> Vec<Vec<ConceptId>> {
        let mut cycles: BTreeSet<Vec<ConceptId>> = BTreeSet::new();
        for start in &self.nodes {
            let mut chain: Vec<&str> = vec![start.id.as_str()];
            let mut current = start;
            while let Some(parent) = current.relationships.part_of.as_deref() {
                if let Some(pos) = chain.iter().position(|c| *c == parent) {
                    let mut cycle: Vec<ConceptId> =
                        chain[pos..].iter().map(|s| s.to_string()).collect();
                    if let Some(min) = cycle
                        .iter()
                        .enumerate()
                        .min_by(|a, b| a.1.cmp(b.1))
                        .map(|(i, _)| i)
                    {
                        cycle.rotate_left(min);
                    }
                    cycles.insert(cycle);
                    break;
                }
                match self.get(parent) {
                    Some(next) => {
                        chain.push(parent);
                        current = next;
                    }
                    None => break,
                }
            }
        }
        cycles.into_iter().collect()
    }
}

impl ConceptIndex for GraphSnapshot {
    fn concept(&self, id: &str) -> Option<&ConceptNode> {
        self.get(id)
    }
}

/// Owns the graph source and the cached snapshot.
///
/// `load` is idempotent: the first call fetches and migrates, later calls
/// hand back the cached [`Arc`]. `reset` forgets the cache.
pub struct GraphStore {
    source: Box<dyn GraphSource>,
    snapshot: Option<Arc<GraphSnapshot>>,
}

impl GraphStore {
    pub fn new(source: impl GraphSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            snapshot: None,
        }
    }

    /// Fetch and migrate the graph, or return the cached snapshot.
    pub fn load(&mut self) -> StorageResult<Arc<GraphSnapshot>> {
        if let Some(snapshot) = &self.snapshot {
            debug!("graph already loaded; returning cached snapshot");
            return Ok(Arc::clone(snapshot));
        }

        let raw = self.source.fetch()?;
        let (nodes, stats) = migrate(raw);
        let snapshot = GraphSnapshot::from_nodes(nodes);

        for cycle in snapshot.part_of_cycles() {
            warn!(cycle = ?cycle, "partOf cycle in concept graph");
        }
        info!(
            source = %self.source.describe(),
            concepts = snapshot.len(),
            dropped_edges = stats.dropped_edges,
            ignored_edges = stats.ignored_edges,
            "concept graph loaded"
        );

        let snapshot = Arc::new(snapshot);
        self.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the cached snapshot; the next `load` refetches.
    pub fn reset(&mut self) {
        self.snapshot = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The cached snapshot, if loaded.
    pub fn snapshot(&self) -> Option<Arc<GraphSnapshot>> {
        self.snapshot.clone()
    }

    pub fn get_node(&self, id: &str) -> Option<ConceptNode> {
        self.snapshot.as_ref().and_then(|s| s.get(id).cloned())
    }

    pub fn get_all_nodes(&self) -> Vec<ConceptNode> {
        self.snapshot
            .as_ref()
            .map(|s| s.all_nodes())
            .unwrap_or_default()
    }

    pub fn get_neighbors(&self, id: &str) -> Vec<ConceptNode> {
        self.snapshot
            .as_ref()
            .map(|s| s.neighbors(id).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn build_adjacency(&self) -> Adjacency {
        self.snapshot
            .as_ref()
            .map(|s| s.build_adjacency())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("source", &self.source.describe())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
