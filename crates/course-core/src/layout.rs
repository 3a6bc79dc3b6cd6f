//! Auto-layout for course trees.
//!
//! Everything here works in world units on model data only. Node positions
//! are node centers; a renderer maps them to the screen through a
//! [`Transform`](crate::surface::Transform).

use crate::tree::{CourseTree, LayoutMode};
use crate::ConceptId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Round both coordinates to the nearest multiple of `grid`.
    pub fn snapped(self, grid: f64) -> Self {
        if grid <= 0.0 {
            return self;
        }
        Self::new((self.x / grid).round() * grid, (self.y / grid).round() * grid)
    }
}

/// Rendered size of one node box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSize {
    pub width: f64,
    pub height: f64,
}

impl Default for NodeSize {
    fn default() -> Self {
        Self {
            width: 180.0,
            height: 56.0,
        }
    }
}

/// Axis-aligned rectangle in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Rectangle of a node centered on `center`.
    pub fn around(center: Point, size: NodeSize) -> Self {
        let (hw, hh) = (size.width / 2.0, size.height / 2.0);
        Self {
            min: center.offset(-hw, -hh),
            max: center.offset(hw, hh),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn union(self, other: Bounds) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

/// Spacing constants for auto-layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Distance between consecutive levels.
    pub level_spacing: f64,
    /// Distance between nodes sharing a level.
    pub sibling_spacing: f64,
    pub node_size: NodeSize,
    pub grid: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            level_spacing: 140.0,
            sibling_spacing: 220.0,
            node_size: NodeSize::default(),
            grid: 20.0,
        }
    }
}

/// One placed node, aligned by index with `CourseTree::nodes`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub concept_id: Option<ConceptId>,
    pub position: Point,
    /// BFS depth from the roots; `None` when unreachable or unbound.
    pub level: Option<usize>,
    /// Position came from the node's stored `ui` coordinates.
    pub pinned: bool,
}

/// Result of [`auto_layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub mode: LayoutMode,
    pub node_size: NodeSize,
    pub nodes: Vec<PlacedNode>,
    /// `next_ids` links resolved to node indices; dangling and self links are left out.
    pub links: Vec<(usize, usize)>,
}

impl Layout {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, concept_id: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.concept_id.as_deref() == Some(concept_id))
    }

    pub fn position(&self, concept_id: &str) -> Option<Point> {
        self.find(concept_id).map(|i| self.nodes[i].position)
    }

    pub fn node_bounds(&self, index: usize) -> Option<Bounds> {
        self.nodes
            .get(index)
            .map(|n| Bounds::around(n.position, self.node_size))
    }

    /// Move a node and pin it there.
    pub fn move_node(&mut self, index: usize, to: Point) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.position = to;
            node.pinned = true;
        }
    }

    /// Smallest rectangle holding every node box, `None` for an empty layout.
    pub fn bounds(&self) -> Option<Bounds> {
        (0..self.nodes.len())
            .filter_map(|i| self.node_bounds(i))
            .reduce(Bounds::union)
    }
}

/// Place every node of `tree`.
///
/// Levels come from a BFS over `next_ids` starting at [`CourseTree::roots`].
/// Each level is a row (top-down) or column (left-right) with its nodes
/// centered on the level's axis. Nodes the BFS never reaches sit at the
/// origin. A stored `ui` position wins for that node only.
pub fn auto_layout(tree: &CourseTree, config: &LayoutConfig) -> Layout {
    let index: HashMap<&str, usize> = tree
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| n.concept().map(|id| (id, i)))
        .collect();

    let links: Vec<(usize, usize)> = tree
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_bound())
        .flat_map(|(from, n)| {
            n.next_ids
                .iter()
                .filter_map(|id| index.get(id.as_str()).copied())
                .filter(move |to| *to != from)
                .map(move |to| (from, to))
        })
        .collect();

    let mut levels: Vec<Option<usize>> = vec![None; tree.nodes.len()];
    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut queue = VecDeque::new();
    for root in tree.roots() {
        if let Some(&i) = index.get(root) {
            if levels[i].is_none() {
                levels[i] = Some(0);
                queue.push_back(i);
            }
        }
    }
    while let Some(i) = queue.pop_front() {
        let level = levels[i].unwrap_or(0);
        if rows.len() <= level {
            rows.resize_with(level + 1, Vec::new);
        }
        rows[level].push(i);
        for &(from, to) in &links {
            if from == i && levels[to].is_none() {
                levels[to] = Some(level + 1);
                queue.push_back(to);
            }
        }
    }

    let mut positions = vec![Point::ORIGIN; tree.nodes.len()];
    for (level, row) in rows.iter().enumerate() {
        let mid = (row.len() as f64 - 1.0) / 2.0;
        for (slot, &i) in row.iter().enumerate() {
            let along = slot as f64 - mid;
            positions[i] = match tree.layout_mode() {
                LayoutMode::TopDown => Point::new(
                    along * config.sibling_spacing,
                    level as f64 * config.level_spacing,
                ),
                // spacings trade axes with the coordinates so wide boxes do not overlap
                LayoutMode::LeftRight => Point::new(
                    level as f64 * config.sibling_spacing,
                    along * config.level_spacing,
                ),
            };
        }
    }

    let nodes = tree
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| PlacedNode {
            concept_id: n.concept_id.clone(),
            position: n.ui.unwrap_or(positions[i]),
            level: levels[i],
            pinned: n.ui.is_some(),
        })
        .collect();

    Layout {
        mode: tree.layout_mode(),
        node_size: config.node_size,
        nodes,
        links,
    }
}

/// Endpoints of one drawn link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeAnchor {
    pub from: usize,
    pub to: usize,
    /// Bottom-center of the source box.
    pub start: Point,
    /// Top-center of the target box.
    pub end: Point,
}

/// Edge endpoints from model positions and the layout's node size.
pub fn edge_anchors(layout: &Layout) -> Vec<EdgeAnchor> {
    let half = layout.node_size.height / 2.0;
    layout
        .links
        .iter()
        .map(|&(from, to)| EdgeAnchor {
            from,
            to,
            start: layout.nodes[from].position.offset(0.0, half),
            end: layout.nodes[to].position.offset(0.0, -half),
        })
        .collect()
}
