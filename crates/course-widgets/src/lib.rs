//! # course-widgets
//!
//! Terminal rendering for course trees.
//!
//! ## Components
//!
//! - [`GraphView`] - node boxes and links of a laid-out tree, with pan, zoom
//!   and node dragging driven by crossterm mouse and key events
//!
//! ## Architecture
//!
//! The widget owns no layout logic. It draws whatever a
//! [`course_core::GraphSurface`] holds and feeds pointer input back into it,
//! converting terminal cells to surface units with a [`CellSize`].

mod graph;

pub use graph::{status_marker, status_style, CellSize, GraphView, GraphViewState};
