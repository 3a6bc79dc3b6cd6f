//! Input simulation for testing.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

/// A sequence of input events for testing.
#[derive(Debug, Clone, Default)]
pub struct InputSequence {
    events: Vec<Event>,
}

impl InputSequence {
    /// Create a new empty input sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key event.
    pub fn key(&mut self, key: KeyCode) -> &mut Self {
        self.key_mod(key, KeyModifiers::NONE)
    }

    /// Add a key event with modifiers.
    pub fn key_mod(&mut self, key: KeyCode, modifiers: KeyModifiers) -> &mut Self {
        self.events.push(Event::Key(KeyEvent::new(key, modifiers)));
        self
    }

    /// Add a character key event.
    pub fn char(&mut self, c: char) -> &mut Self {
        self.key(KeyCode::Char(c))
    }

    /// Add a text string as character events.
    pub fn text(&mut self, s: &str) -> &mut Self {
        for c in s.chars() {
            self.char(c);
        }
        self
    }

    /// Add an Enter key event.
    pub fn enter(&mut self) -> &mut Self {
        self.key(KeyCode::Enter)
    }

    /// Add a Tab key event.
    pub fn tab(&mut self) -> &mut Self {
        self.key(KeyCode::Tab)
    }

    /// Press the left button at a cell.
    pub fn click(&mut self, x: u16, y: u16) -> &mut Self {
        self.mouse_event(MouseEventKind::Down(MouseButton::Left), x, y)
    }

    /// Release the left button at a cell.
    pub fn release(&mut self, x: u16, y: u16) -> &mut Self {
        self.mouse_event(MouseEventKind::Up(MouseButton::Left), x, y)
    }

    /// Press and release the left button at a cell.
    pub fn tap(&mut self, x: u16, y: u16) -> &mut Self {
        self.click(x, y).release(x, y)
    }

    /// Add a mouse drag (press, one move per cell, release).
    pub fn drag(&mut self, from: (u16, u16), to: (u16, u16)) -> &mut Self {
        self.click(from.0, from.1);

        let dx = (i32::from(to.0) - i32::from(from.0)).signum();
        let dy = (i32::from(to.1) - i32::from(from.1)).signum();
        let (mut x, mut y) = (i32::from(from.0), i32::from(from.1));
        while x != i32::from(to.0) || y != i32::from(to.1) {
            if x != i32::from(to.0) {
                x += dx;
            }
            if y != i32::from(to.1) {
                y += dy;
            }
            self.mouse_event(MouseEventKind::Drag(MouseButton::Left), x as u16, y as u16);
        }

        self.release(to.0, to.1)
    }

    /// Scroll `delta` notches at a cell; positive scrolls up.
    pub fn scroll(&mut self, x: u16, y: u16, delta: i16) -> &mut Self {
        let kind = if delta > 0 {
            MouseEventKind::ScrollUp
        } else {
            MouseEventKind::ScrollDown
        };
        for _ in 0..delta.unsigned_abs() {
            self.mouse_event(kind, x, y);
        }
        self
    }

    fn mouse_event(&mut self, kind: MouseEventKind, x: u16, y: u16) -> &mut Self {
        self.events.push(Event::Mouse(MouseEvent {
            kind,
            column: x,
            row: y,
            modifiers: KeyModifiers::NONE,
        }));
        self
    }

    /// Get only the key events.
    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Key(k) => Some(*k),
                _ => None,
            })
            .collect()
    }

    /// Get only the mouse events.
    pub fn mouse_events(&self) -> Vec<MouseEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Mouse(m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        let mut seq = InputSequence::new();
        seq.text("ab").key_mod(KeyCode::Char('s'), KeyModifiers::CONTROL).enter();

        let keys = seq.key_events();
        assert_eq!(keys.len(), 4);
        assert!(keys[2].modifiers.contains(KeyModifiers::CONTROL));
    }

    #[test]
    fn test_drag_moves_one_cell_at_a_time() {
        let mut seq = InputSequence::new();
        seq.drag((2, 2), (5, 3));

        let mouse = seq.mouse_events();
        assert!(matches!(mouse[0].kind, MouseEventKind::Down(MouseButton::Left)));
        assert_eq!((mouse[1].column, mouse[1].row), (3, 3));
        assert_eq!((mouse[3].column, mouse[3].row), (5, 3));
        assert!(matches!(mouse.last().map(|m| m.kind), Some(MouseEventKind::Up(MouseButton::Left))));
        assert_eq!(mouse.len(), 5);
    }

    #[test]
    fn test_scroll() {
        let mut seq = InputSequence::new();
        seq.scroll(1, 1, -3);
        assert_eq!(seq.len(), 3);
        assert!(seq
            .mouse_events()
            .iter()
            .all(|m| m.kind == MouseEventKind::ScrollDown));
    }
}
