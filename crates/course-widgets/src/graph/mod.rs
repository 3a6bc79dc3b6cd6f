//! GraphView widget - boxes and links of a course tree on a pan/zoom canvas.
//!
//! # Example
//!
//! ```ignore
//! use course_core::{GraphSurface, LayoutConfig};
//! use course_widgets::{GraphView, GraphViewState};
//!
//! let surface = GraphSurface::new(&tree, LayoutConfig::default(), 0.0, 0.0);
//! let mut state = GraphViewState::new(surface);
//!
//! // labels and statuses are aligned with `tree.nodes`
//! let view = GraphView::new(&labels).statuses(&statuses);
//! frame.render_stateful_widget(view, area, &mut state);
//! ```

mod state;

pub use state::{CellSize, GraphViewState};

use course_core::{NodeStatus, Point, Tier};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, StatefulWidget, Widget};
use std::ops::RangeInclusive;
use unicode_width::UnicodeWidthChar;

/// One-glyph status marker shown before a node's label.
pub fn status_marker(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Unbound => "?",
        NodeStatus::Locked => "×",
        NodeStatus::Available => "○",
        NodeStatus::Mastered(_) => "●",
    }
}

pub fn status_style(status: NodeStatus) -> Style {
    match status {
        NodeStatus::Unbound => Style::default().fg(Color::Magenta).add_modifier(Modifier::DIM),
        NodeStatus::Locked => Style::default().fg(Color::DarkGray),
        NodeStatus::Available => Style::default().fg(Color::White),
        NodeStatus::Mastered(Tier::Gold) => Style::default().fg(Color::Yellow),
        NodeStatus::Mastered(Tier::Silver) => Style::default().fg(Color::Rgb(192, 192, 192)),
        NodeStatus::Mastered(_) => Style::default().fg(Color::Rgb(205, 127, 50)),
    }
}

/// Course tree canvas.
pub struct GraphView<'a> {
    /// Display labels, aligned with the layout's nodes
    labels: &'a [String],
    /// Statuses, aligned with the layout's nodes
    statuses: &'a [NodeStatus],
    block: Option<Block<'a>>,
    edge_style: Style,
}

impl<'a> GraphView<'a> {
    pub fn new(labels: &'a [String]) -> Self {
        Self {
            labels,
            statuses: &[],
            block: None,
            edge_style: Style::default().fg(Color::Gray),
        }
    }

    pub fn statuses(mut self, statuses: &'a [NodeStatus]) -> Self {
        self.statuses = statuses;
        self
    }

    /// Set the block wrapper.
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    pub fn edge_style(mut self, style: Style) -> Self {
        self.edge_style = style;
        self
    }

    fn status(&self, index: usize) -> NodeStatus {
        self.statuses.get(index).copied().unwrap_or(NodeStatus::Available)
    }
}

/// Writes into a buffer, clipped to an area. Coordinates may be negative.
struct Canvas<'b> {
    buf: &'b mut Buffer,
    area: Rect,
}

impl Canvas<'_> {
    fn contains(&self, col: i64, row: i64) -> bool {
        col >= i64::from(self.area.x)
            && col < i64::from(self.area.x + self.area.width)
            && row >= i64::from(self.area.y)
            && row < i64::from(self.area.y + self.area.height)
    }

    fn put(&mut self, col: i64, row: i64, symbol: &str, style: Style) {
        if self.contains(col, row) {
            self.buf[(col as u16, row as u16)].set_symbol(symbol).set_style(style);
        }
    }

    /// Write `text` from `col`, stopping before `max_width` columns.
    fn text(&mut self, col: i64, row: i64, text: &str, max_width: usize, style: Style) {
        let mut used = 0usize;
        let mut glyph = [0u8; 4];
        for ch in text.chars() {
            let width = ch.width().unwrap_or(0);
            if width == 0 {
                continue;
            }
            if used + width > max_width {
                break;
            }
            self.put(col + used as i64, row, ch.encode_utf8(&mut glyph), style);
            used += width;
        }
    }

    /// Columns of `from..=to` that fall inside the area.
    fn cols(&self, from: i64, to: i64) -> RangeInclusive<i64> {
        let left = i64::from(self.area.x);
        let right = left + i64::from(self.area.width) - 1;
        from.min(to).max(left)..=from.max(to).min(right)
    }

    /// Rows of `from..=to` that fall inside the area.
    fn rows(&self, from: i64, to: i64) -> RangeInclusive<i64> {
        let top = i64::from(self.area.y);
        let bottom = top + i64::from(self.area.height) - 1;
        from.min(to).max(top)..=from.max(to).min(bottom)
    }

    fn hline(&mut self, row: i64, from: i64, to: i64, style: Style) {
        for col in self.cols(from, to) {
            self.put(col, row, "─", style);
        }
    }

    fn vline(&mut self, col: i64, from: i64, to: i64, style: Style) {
        for row in self.rows(from, to) {
            self.put(col, row, "│", style);
        }
    }

    fn fill(&mut self, c0: i64, r0: i64, c1: i64, r1: i64) {
        for row in self.rows(r0, r1) {
            for col in self.cols(c0, c1) {
                self.put(col, row, " ", Style::default());
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Up,
    Down,
    Left,
    Right,
}

fn corner(a: Side, b: Side) -> &'static str {
    match (a, b) {
        (Side::Up, Side::Right) | (Side::Right, Side::Up) => "└",
        (Side::Up, Side::Left) | (Side::Left, Side::Up) => "┘",
        (Side::Down, Side::Right) | (Side::Right, Side::Down) => "┌",
        (Side::Down, Side::Left) | (Side::Left, Side::Down) => "┐",
        _ => "┼",
    }
}

impl StatefulWidget for GraphView<'_> {
    type State = GraphViewState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        // Render block if present
        let inner = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };

        if inner.width < 3 || inner.height < 1 {
            return;
        }

        state.area = inner;
        let cell = state.cell_size();
        state.surface_mut().resize(
            f64::from(inner.width) * cell.width,
            f64::from(inner.height) * cell.height,
        );
        if state.needs_fit {
            state.surface_mut().fit_to_viewport();
            state.needs_fit = false;
        }

        let surface = state.surface();
        if surface.layout().is_empty() {
            let msg = "No nodes";
            let x = inner.x + (inner.width.saturating_sub(msg.len() as u16)) / 2;
            let y = inner.y + inner.height / 2;
            buf.set_string(x, y, msg, Style::default().fg(Color::DarkGray));
            return;
        }

        let transform = surface.transform();
        let to_cell = |p: Point| state.screen_to_cell(transform.world_to_screen(p));
        let mut canvas = Canvas { buf, area: inner };

        // Links first so node boxes cover their ends
        for edge in surface.edges() {
            let (sc, sr) = to_cell(edge.start);
            let (ec, er) = to_cell(edge.end);
            let style = self.edge_style;
            if sc == ec {
                canvas.vline(sc, sr, er, style);
            } else {
                let mid = (sr + er) / 2;
                canvas.vline(sc, sr, mid, style);
                canvas.hline(mid, sc, ec, style);
                canvas.vline(ec, mid, er, style);
                let (toward_end, toward_start) = if ec > sc {
                    (Side::Right, Side::Left)
                } else {
                    (Side::Left, Side::Right)
                };
                let source_side = if sr <= mid { Side::Up } else { Side::Down };
                let target_side = if er >= mid { Side::Down } else { Side::Up };
                canvas.put(sc, mid, corner(source_side, toward_end), style);
                canvas.put(ec, mid, corner(toward_start, target_side), style);
            }
            let arrow = if er >= sr { "▼" } else { "▲" };
            canvas.put(ec, er - 1, arrow, style);
        }

        let layout = surface.layout();
        for (i, node) in layout.nodes.iter().enumerate() {
            let Some(bounds) = layout.node_bounds(i) else { continue };
            let status = self.status(i);
            let selected = state.selected == Some(i);
            let mut style = status_style(status);
            if selected {
                style = style.add_modifier(Modifier::BOLD);
            }

            let (c0, r0) = to_cell(bounds.min);
            let (c1, r1) = to_cell(bounds.max);
            let (c1, r1) = (c1.max(c0), r1.max(r0));

            canvas.fill(c0, r0, c1, r1);

            let label = self
                .labels
                .get(i)
                .map(String::as_str)
                .or(node.concept_id.as_deref())
                .unwrap_or("(unbound)");
            let text = format!("{} {}", status_marker(status), label);
            let label_style = if selected {
                style.add_modifier(Modifier::REVERSED)
            } else {
                style
            };

            if r1 - r0 >= 2 && c1 - c0 >= 2 {
                let border = if selected {
                    style.fg(Color::Cyan)
                } else {
                    style
                };
                canvas.hline(r0, c0, c1, border);
                canvas.hline(r1, c0, c1, border);
                canvas.vline(c0, r0, r1, border);
                canvas.vline(c1, r0, r1, border);
                canvas.put(c0, r0, "┌", border);
                canvas.put(c1, r0, "┐", border);
                canvas.put(c0, r1, "└", border);
                canvas.put(c1, r1, "┘", border);
                let width = (c1 - c0 - 1) as usize;
                canvas.text(c0 + 1, r0 + (r1 - r0) / 2, &text, width, label_style);
            } else {
                let width = (c1 - c0 + 1) as usize;
                canvas.text(c0, r0 + (r1 - r0) / 2, &text, width, label_style);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::{CourseTree, GraphSurface, LayoutConfig, SurfaceEvent, SurfaceMode, TreeMeta};
    use course_core::UnlockRules;
    use course_testing::generators;
    use course_testing::{Fixtures, InputSequence, TestTerminal};
    use proptest::prelude::*;

    fn tree() -> CourseTree {
        let mut t = CourseTree::create("c", TreeMeta::titled("T"));
        t.add_node("count");
        t.add_node("add");
        t.connect_nodes("count", "add").unwrap();
        t
    }

    fn labels() -> Vec<String> {
        vec!["Counting".to_string(), "Addition".to_string()]
    }

    fn render(terminal: &mut TestTerminal, state: &mut GraphViewState, statuses: &[NodeStatus]) {
        let labels = labels();
        terminal.draw(|frame| {
            let view = GraphView::new(&labels).statuses(statuses);
            frame.render_stateful_widget(view, frame.area(), state);
        });
    }

    fn feed(state: &mut GraphViewState, input: &InputSequence) -> Vec<SurfaceEvent> {
        input
            .mouse_events()
            .into_iter()
            .filter_map(|mouse| state.handle_mouse(mouse))
            .collect()
    }

    #[test]
    fn test_renders_labels_markers_and_links() {
        let mut terminal = TestTerminal::new(60, 20);
        let mut state = GraphViewState::new(GraphSurface::new(&tree(), LayoutConfig::default(), 0.0, 0.0));
        render(
            &mut terminal,
            &mut state,
            &[NodeStatus::Mastered(Tier::Gold), NodeStatus::Locked],
        );

        terminal.assert_contains("● Counting");
        terminal.assert_contains("× Addition");
        terminal.assert_contains("┌");
        terminal.assert_contains("▼");

        let (_, parent_row) = terminal.find("Counting").unwrap();
        let (_, child_row) = terminal.find("Addition").unwrap();
        assert!(parent_row < child_row);
    }

    #[test]
    fn test_empty_tree() {
        let mut terminal = TestTerminal::new(30, 5);
        let empty = CourseTree::create("c", TreeMeta::titled("Empty"));
        let mut state = GraphViewState::new(GraphSurface::new(&empty, LayoutConfig::default(), 0.0, 0.0));
        render(&mut terminal, &mut state, &[]);
        terminal.assert_contains("No nodes");
    }

    #[test]
    fn test_click_selects_node() {
        let mut terminal = TestTerminal::new(60, 20);
        let mut state = GraphViewState::new(GraphSurface::new(&tree(), LayoutConfig::default(), 0.0, 0.0));
        render(&mut terminal, &mut state, &[]);

        let (col, row) = state.node_cell(1).unwrap();
        let mut input = InputSequence::new();
        input.click(col, row).release(col, row);
        let events = feed(&mut state, &input);

        assert_eq!(
            events,
            vec![SurfaceEvent::NodeClicked {
                index: 1,
                concept_id: Some("add".into())
            }]
        );
        assert_eq!(state.selected_concept(), Some("add"));
    }

    #[test]
    fn test_scroll_zooms_and_background_drag_pans() {
        let mut terminal = TestTerminal::new(60, 20);
        let mut state = GraphViewState::new(GraphSurface::new(&tree(), LayoutConfig::default(), 0.0, 0.0));
        render(&mut terminal, &mut state, &[]);

        let scale = state.surface().transform().scale;
        let mut input = InputSequence::new();
        input.scroll(1, 1, 2);
        feed(&mut state, &input);
        assert!(state.surface().transform().scale > scale);

        let before = state.surface().transform();
        let mut input = InputSequence::new();
        input.drag((1, 1), (4, 1));
        assert!(feed(&mut state, &input).is_empty());
        assert_eq!(state.surface().transform().x, before.x + 24.0);
        assert_eq!(state.surface().transform().y, before.y);
    }

    #[test]
    fn test_edit_mode_drag_moves_node() {
        let mut terminal = TestTerminal::new(60, 20);
        let surface = GraphSurface::new(&tree(), LayoutConfig::default(), 0.0, 0.0).with_mode(SurfaceMode::Edit);
        let mut state = GraphViewState::new(surface);
        render(&mut terminal, &mut state, &[]);

        let (col, row) = state.node_cell(0).unwrap();
        let mut input = InputSequence::new();
        input.drag((col, row), (col + 5, row));
        let events = feed(&mut state, &input);

        assert!(matches!(
            events.as_slice(),
            [SurfaceEvent::NodeMoved { index: 0, .. }]
        ));
        assert_eq!(state.selected, Some(0));
    }

    #[test]
    fn test_statuses_from_progress() {
        let tree = Fixtures::course_tree();
        let tiers = Fixtures::progress_with(&[("counting", Tier::Gold)]).tiers();
        let statuses = UnlockRules::new().tree_status(&tree, &tiers);
        let labels: Vec<String> = tree.nodes.iter().filter_map(|n| n.concept()).map(String::from).collect();

        let mut terminal = TestTerminal::new(160, 48);
        let mut state = GraphViewState::new(GraphSurface::new(&tree, LayoutConfig::default(), 0.0, 0.0));
        terminal.draw(|frame| {
            let view = GraphView::new(&labels).statuses(&statuses);
            frame.render_stateful_widget(view, frame.area(), &mut state);
        });

        terminal.assert_contains("● counting");
        terminal.assert_contains("○ addition");
        terminal.assert_contains("○ subtraction");
        terminal.assert_contains("× division");
    }

    #[test]
    fn test_far_stored_position_renders_quickly() {
        let mut t = tree();
        t.set_node_position("add", Point::new(1e12, 1e12)).unwrap();
        let mut terminal = TestTerminal::new(60, 20);
        let mut state = GraphViewState::new(GraphSurface::new(&t, LayoutConfig::default(), 0.0, 0.0));

        let started = std::time::Instant::now();
        render(&mut terminal, &mut state, &[NodeStatus::Available, NodeStatus::Locked]);
        state.surface_mut().wheel(Point::new(0.0, 0.0), 10);
        render(&mut terminal, &mut state, &[NodeStatus::Available, NodeStatus::Locked]);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    proptest! {
        #[test]
        fn test_arbitrary_mouse_input_keeps_selection_valid(
            tree in generators::course_tree(6),
            events in prop::collection::vec(generators::mouse_event(60, 20), 0..40),
        ) {
            let mut terminal = TestTerminal::new(60, 20);
            let mut state = GraphViewState::new(GraphSurface::new(&tree, LayoutConfig::default(), 0.0, 0.0));
            let labels: Vec<String> = tree.nodes.iter().map(|n| n.concept().unwrap_or("?").to_string()).collect();
            let draw = |terminal: &mut TestTerminal, state: &mut GraphViewState| {
                terminal.draw(|frame| frame.render_stateful_widget(GraphView::new(&labels), frame.area(), state));
            };

            draw(&mut terminal, &mut state);
            for mouse in events {
                state.handle_mouse(mouse);
                draw(&mut terminal, &mut state);
                if let Some(index) = state.selected {
                    prop_assert!(index < tree.nodes.len());
                }
            }
        }
    }
}
