//! Pan/zoom surface over a laid-out course tree.
//!
//! Screen coordinates are abstract units with the origin at the top-left of
//! the viewport. A renderer converts its own units (pixels, terminal cells)
//! into these before calling the pointer methods.

use crate::layout::{auto_layout, edge_anchors, Bounds, EdgeAnchor, Layout, LayoutConfig, Point};
use crate::tree::CourseTree;
use crate::ConceptId;
use std::collections::BTreeMap;
use tracing::debug;

pub const MIN_SCALE: f64 = 0.35;
pub const MAX_SCALE: f64 = 2.5;
/// Scale factor applied per wheel notch.
pub const ZOOM_STEP: f64 = 1.1;
/// Pointer travel (screen units) before a press turns into a drag.
pub const DRAG_THRESHOLD: f64 = 3.0;

pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// `screen = world * scale + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn world_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.x, p.y * self.scale + self.y)
    }

    pub fn screen_to_world(&self, p: Point) -> Point {
        Point::new((p.x - self.x) / self.scale, (p.y - self.y) / self.scale)
    }
}

/// Visible area plus the transform mapping world into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub transform: Transform,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            transform: Transform::default(),
        }
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.transform.x += dx;
        self.transform.y += dy;
    }

    /// Multiply the scale by `factor`, keeping the world point under
    /// `cursor` fixed on screen.
    pub fn zoom_at(&mut self, cursor: Point, factor: f64) {
        let anchor = self.transform.screen_to_world(cursor);
        let scale = clamp_scale(self.transform.scale * factor);
        self.transform = Transform {
            x: cursor.x - anchor.x * scale,
            y: cursor.y - anchor.y * scale,
            scale,
        };
    }

    /// Scale and center `bounds` inside the viewport, leaving `padding`
    /// screen units on each side.
    pub fn fit_to(&mut self, bounds: Option<Bounds>, padding: f64) {
        let Some(bounds) = bounds else {
            self.transform = Transform {
                x: self.width / 2.0,
                y: self.height / 2.0,
                scale: 1.0,
            };
            return;
        };
        let avail_w = (self.width - 2.0 * padding).max(1.0);
        let avail_h = (self.height - 2.0 * padding).max(1.0);
        let scale_w = if bounds.width() > 0.0 { avail_w / bounds.width() } else { MAX_SCALE };
        let scale_h = if bounds.height() > 0.0 { avail_h / bounds.height() } else { MAX_SCALE };
        let scale = clamp_scale(scale_w.min(scale_h));
        let center = bounds.center();
        self.transform = Transform {
            x: self.width / 2.0 - center.x * scale,
            y: self.height / 2.0 - center.y * scale,
            scale,
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceMode {
    /// Learner view: click nodes, pan and zoom.
    #[default]
    View,
    /// Creator view: additionally drag nodes around.
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// What a pointer gesture did, for the caller to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    NodeClicked {
        index: usize,
        concept_id: Option<ConceptId>,
    },
    /// A node was dropped at `to` (world units, snapped when enabled).
    NodeMoved {
        index: usize,
        concept_id: Option<ConceptId>,
        to: Point,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Pan {
        last: Point,
    },
    Press {
        index: usize,
        origin: Point,
    },
    DragNode {
        index: usize,
        /// Node center minus the world point grabbed.
        grab: Point,
        origin: Point,
        moved: bool,
    },
}

/// Layout, viewport and pointer state for one rendered tree.
#[derive(Debug, Clone)]
pub struct GraphSurface {
    layout: Layout,
    config: LayoutConfig,
    viewport: Viewport,
    mode: SurfaceMode,
    snap: bool,
    padding: f64,
    gesture: Gesture,
}

impl GraphSurface {
    pub fn new(tree: &CourseTree, config: LayoutConfig, width: f64, height: f64) -> Self {
        let mut surface = Self {
            layout: auto_layout(tree, &config),
            config,
            viewport: Viewport::new(width, height),
            mode: SurfaceMode::View,
            snap: true,
            padding: 24.0,
            gesture: Gesture::Idle,
        };
        surface.fit_to_viewport();
        surface
    }

    pub fn with_mode(mut self, mode: SurfaceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> SurfaceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SurfaceMode) {
        self.mode = mode;
        self.gesture = Gesture::Idle;
    }

    /// Recompute the layout after the tree changed. The transform is kept.
    pub fn relayout(&mut self, tree: &CourseTree) {
        self.layout = auto_layout(tree, &self.config);
        self.gesture = Gesture::Idle;
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    pub fn fit_to_viewport(&mut self) {
        self.viewport.fit_to(self.layout.bounds(), self.padding);
    }

    /// Replace the transform; the scale is clamped.
    pub fn set_transform(&mut self, transform: Transform) {
        self.viewport.transform = Transform {
            scale: clamp_scale(transform.scale),
            ..transform
        };
    }

    pub fn transform(&self) -> Transform {
        self.viewport.transform
    }

    /// World positions of bound nodes.
    pub fn node_positions(&self) -> BTreeMap<ConceptId, Point> {
        self.layout
            .nodes
            .iter()
            .filter_map(|n| n.concept_id.clone().map(|id| (id, n.position)))
            .collect()
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.snap = enabled;
    }

    pub fn snap_enabled(&self) -> bool {
        self.snap
    }

    pub fn edges(&self) -> Vec<EdgeAnchor> {
        edge_anchors(&self.layout)
    }

    /// Topmost node under a screen point. Later nodes draw over earlier ones.
    pub fn hit_test(&self, screen: Point) -> Option<usize> {
        let world = self.viewport.transform.screen_to_world(screen);
        (0..self.layout.len())
            .rev()
            .find(|&i| self.layout.node_bounds(i).is_some_and(|b| b.contains(world)))
    }

    pub fn is_dragging(&self) -> bool {
        !matches!(self.gesture, Gesture::Idle)
    }

    pub fn pointer_down(&mut self, at: Point, button: PointerButton) {
        if button != PointerButton::Primary {
            return;
        }
        self.gesture = match (self.hit_test(at), self.mode) {
            (None, _) => Gesture::Pan { last: at },
            (Some(index), SurfaceMode::View) => Gesture::Press { index, origin: at },
            (Some(index), SurfaceMode::Edit) => {
                let world = self.viewport.transform.screen_to_world(at);
                let center = self.layout.nodes[index].position;
                Gesture::DragNode {
                    index,
                    grab: Point::new(center.x - world.x, center.y - world.y),
                    origin: at,
                    moved: false,
                }
            }
        };
    }

    pub fn pointer_move(&mut self, at: Point) {
        match &mut self.gesture {
            Gesture::Idle | Gesture::Press { .. } => {}
            Gesture::Pan { last } => {
                let (dx, dy) = (at.x - last.x, at.y - last.y);
                *last = at;
                self.viewport.pan_by(dx, dy);
            }
            Gesture::DragNode {
                index,
                grab,
                origin,
                moved,
            } => {
                if !*moved && at.distance(*origin) < DRAG_THRESHOLD {
                    return;
                }
                *moved = true;
                let world = self.viewport.transform.screen_to_world(at);
                let (index, to) = (*index, world.offset(grab.x, grab.y));
                // snapping waits for release
                if let Some(node) = self.layout.nodes.get_mut(index) {
                    node.position = to;
                }
            }
        }
    }

    pub fn pointer_up(&mut self, at: Point) -> Option<SurfaceEvent> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        match gesture {
            Gesture::Idle => None,
            Gesture::Pan { last } => {
                self.viewport.pan_by(at.x - last.x, at.y - last.y);
                None
            }
            Gesture::Press { index, origin } => {
                (at.distance(origin) < DRAG_THRESHOLD).then(|| self.clicked(index))
            }
            Gesture::DragNode { index, moved, .. } if !moved => Some(self.clicked(index)),
            Gesture::DragNode { index, .. } => {
                let mut to = self.layout.nodes.get(index)?.position;
                if self.snap {
                    to = to.snapped(self.config.grid);
                }
                self.layout.move_node(index, to);
                let concept_id = self.layout.nodes[index].concept_id.clone();
                debug!(index, ?concept_id, x = to.x, y = to.y, "node dropped");
                Some(SurfaceEvent::NodeMoved {
                    index,
                    concept_id,
                    to,
                })
            }
        }
    }

    /// Zoom by `notches` wheel steps around `at`. Positive zooms in.
    pub fn wheel(&mut self, at: Point, notches: i32) {
        self.viewport.zoom_at(at, ZOOM_STEP.powi(notches));
    }

    fn clicked(&self, index: usize) -> SurfaceEvent {
        SurfaceEvent::NodeClicked {
            index,
            concept_id: self.layout.nodes.get(index).and_then(|n| n.concept_id.clone()),
        }
    }
}
