//! # course-core
//!
//! Concept graph and course progression engine shared by the course explorer.
//!
//! ## Components
//!
//! - [`GraphStore`] - canonical concept graph, loaded once and cached
//! - [`CourseTree`] - creator-authored course DAG with unlock conditions
//! - [`MasteryTracker`] - session recording and mastery tiers per concept
//! - [`PathGenerator`] - goal-directed lesson routes over the concept graph
//! - [`GraphSurface`] - auto-layout plus pan/zoom state for rendering a tree
//!
//! ## Architecture
//!
//! Nothing here is a global. The graph, lesson catalog and stores are plain
//! values injected into the components that read them, so two courses (or
//! two tests) never share hidden state. Persistence sits behind the
//! [`ProgressStore`], [`CatalogStore`] and [`GraphSource`] traits.

pub mod error;
pub mod graph;
pub mod layout;
pub mod lesson;
pub mod mastery;
pub mod path;
pub mod surface;
pub mod tick;
pub mod tree;
pub mod unlock;

pub use error::{PublishError, StorageError, StorageResult, TreeError};
pub use graph::{
    ConceptIndex, ConceptMetrics, ConceptNode, ConceptOverlay, EdgeKind, GraphSnapshot,
    GraphSource, GraphStore, JsonGraphSource, LegacyConcept, RawEdge, RawGraph,
    Relationships, StaticGraphSource,
};
pub use layout::{
    auto_layout, edge_anchors, Bounds, EdgeAnchor, Layout, LayoutConfig, NodeSize, PlacedNode, Point,
};
pub use lesson::{Lesson, LessonBucket, LessonCatalog, LessonContent, LessonKind};
pub use mastery::{
    compute_mastery_tier, MasteryTracker, MemoryProgressStore, ProgressStore, Session, Tier,
    TierMap, UserConceptProgress, UserProgress,
};
pub use path::{
    behavior_edges_from_sequences, BehaviorEdge, LearningPath, PathGenerator, PathOptions,
    PathStep,
};
pub use surface::{GraphSurface, PointerButton, SurfaceEvent, SurfaceMode, Transform, Viewport};
pub use tick::{RenderTick, Tick};
pub use tree::{
    CatalogEntry, CatalogStore, CourseTree, CyclePolicy, LayoutMode, MemoryCatalogStore,
    TreeMeta, TreeNode, UnlockConditions, ValidationOptions, ValidationReport,
};
pub use unlock::{missing_requirements, requirements_met, NodeStatus, UnlockRules};

/// Stable concept identifier.
pub type ConceptId = String;

/// Opaque lesson identifier (foreign key into the lesson catalog).
pub type LessonId = String;

/// User identifier.
pub type UserId = String;
