//! State management for GraphView.

use course_core::surface::{GraphSurface, PointerButton, SurfaceEvent};
use course_core::Point;
use crossterm::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

/// Surface units covered by one terminal cell. Cells are about twice as
/// tall as they are wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f64,
    pub height: f64,
}

impl Default for CellSize {
    fn default() -> Self {
        Self {
            width: 8.0,
            height: 16.0,
        }
    }
}

/// Cells moved per arrow-key pan.
const PAN_CELLS: f64 = 4.0;

/// State for GraphView widget.
#[derive(Debug, Clone)]
pub struct GraphViewState {
    surface: GraphSurface,
    /// Selected node index into the layout
    pub selected: Option<usize>,
    cell: CellSize,
    /// Inner area of the last render
    pub(crate) area: Rect,
    pub(crate) needs_fit: bool,
}

impl GraphViewState {
    /// Wrap a surface. The first render fits the layout to the widget area.
    pub fn new(surface: GraphSurface) -> Self {
        Self {
            surface,
            selected: None,
            cell: CellSize::default(),
            area: Rect::default(),
            needs_fit: true,
        }
    }

    pub fn with_cell_size(mut self, cell: CellSize) -> Self {
        self.cell = cell;
        self
    }

    pub fn cell_size(&self) -> CellSize {
        self.cell
    }

    pub fn surface(&self) -> &GraphSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut GraphSurface {
        &mut self.surface
    }

    /// Fit the layout to the area on the next render.
    pub fn request_fit(&mut self) {
        self.needs_fit = true;
    }

    /// Area the widget last drew into.
    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn select(&mut self, index: usize) {
        if index < self.surface.layout().len() {
            self.selected = Some(index);
        }
    }

    pub fn select_concept(&mut self, concept_id: &str) {
        self.selected = self.surface.layout().find(concept_id);
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    pub fn selected_concept(&self) -> Option<&str> {
        let index = self.selected?;
        self.surface.layout().nodes.get(index)?.concept_id.as_deref()
    }

    /// Move selection by delta through layout order, wrapping at the ends.
    pub fn move_selection(&mut self, delta: isize) {
        let len = self.surface.layout().len() as isize;
        if len == 0 {
            return;
        }
        let current = match self.selected {
            Some(i) => i as isize,
            None if delta > 0 => -1,
            None => 0,
        };
        self.selected = Some((current + delta).rem_euclid(len) as usize);
    }

    /// Center of a terminal cell in surface units, if the cell is inside the
    /// last rendered area.
    pub fn cell_to_screen(&self, column: u16, row: u16) -> Option<Point> {
        let inside = column >= self.area.x
            && column < self.area.x + self.area.width
            && row >= self.area.y
            && row < self.area.y + self.area.height;
        inside.then(|| self.cell_to_screen_unchecked(column, row))
    }

    fn cell_to_screen_unchecked(&self, column: u16, row: u16) -> Point {
        Point::new(
            (f64::from(column) - f64::from(self.area.x) + 0.5) * self.cell.width,
            (f64::from(row) - f64::from(self.area.y) + 0.5) * self.cell.height,
        )
    }

    /// Terminal cell holding a surface point. May lie outside the area.
    pub fn screen_to_cell(&self, p: Point) -> (i64, i64) {
        // far off-screen points stay far off-screen without overflowing later math
        let cells = |v: f64| v.floor().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i64;
        (
            i64::from(self.area.x) + cells(p.x / self.cell.width),
            i64::from(self.area.y) + cells(p.y / self.cell.height),
        )
    }

    /// Cell under the center of a node.
    pub fn node_cell(&self, index: usize) -> Option<(u16, u16)> {
        let node = self.surface.layout().nodes.get(index)?;
        let screen = self.surface.transform().world_to_screen(node.position);
        let (col, row) = self.screen_to_cell(screen);
        let col = u16::try_from(col).ok()?;
        let row = u16::try_from(row).ok()?;
        self.cell_to_screen(col, row).map(|_| (col, row))
    }

    /// Feed a mouse event into the surface.
    pub fn handle_mouse(&mut self, event: MouseEvent) -> Option<SurfaceEvent> {
        match event.kind {
            MouseEventKind::Down(button) => {
                let at = self.cell_to_screen(event.column, event.row)?;
                let button = match button {
                    MouseButton::Left => PointerButton::Primary,
                    _ => PointerButton::Secondary,
                };
                self.surface.pointer_down(at, button);
                None
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let at = self.cell_to_screen_unchecked(event.column, event.row);
                self.surface.pointer_move(at);
                None
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let at = self.cell_to_screen_unchecked(event.column, event.row);
                let outcome = self.surface.pointer_up(at);
                if let Some(SurfaceEvent::NodeClicked { index, .. } | SurfaceEvent::NodeMoved { index, .. }) =
                    &outcome
                {
                    self.selected = Some(*index);
                }
                outcome
            }
            MouseEventKind::ScrollUp => {
                let at = self.cell_to_screen(event.column, event.row)?;
                self.surface.wheel(at, 1);
                None
            }
            MouseEventKind::ScrollDown => {
                let at = self.cell_to_screen(event.column, event.row)?;
                self.surface.wheel(at, -1);
                None
            }
            _ => None,
        }
    }

    /// Handle a key event. Returns true if the key was consumed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let (dx, dy) = (PAN_CELLS * self.cell.width, PAN_CELLS * self.cell.height / 2.0);
        let center = Point::new(
            f64::from(self.area.width) * self.cell.width / 2.0,
            f64::from(self.area.height) * self.cell.height / 2.0,
        );
        let mut transform = self.surface.transform();
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => transform.x += dx,
            KeyCode::Right | KeyCode::Char('l') => transform.x -= dx,
            KeyCode::Up | KeyCode::Char('k') => transform.y += dy,
            KeyCode::Down | KeyCode::Char('j') => transform.y -= dy,
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.surface.wheel(center, 1);
                return true;
            }
            KeyCode::Char('-') => {
                self.surface.wheel(center, -1);
                return true;
            }
            KeyCode::Char('0') => {
                self.surface.fit_to_viewport();
                return true;
            }
            KeyCode::Tab | KeyCode::Char('n') => {
                self.move_selection(1);
                return true;
            }
            KeyCode::BackTab | KeyCode::Char('p') => {
                self.move_selection(-1);
                return true;
            }
            KeyCode::Esc => {
                self.deselect();
                return true;
            }
            _ => return false,
        }
        self.surface.set_transform(transform);
        true
    }
}
