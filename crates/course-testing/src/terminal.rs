//! Virtual terminal for headless rendering.

use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use ratatui::Terminal;

/// A virtual terminal for widget and app tests.
pub struct TestTerminal {
    terminal: Terminal<TestBackend>,
}

impl TestTerminal {
    /// Create a new test terminal with the given dimensions.
    pub fn new(width: u16, height: u16) -> Self {
        let backend = TestBackend::new(width, height);
        let terminal = Terminal::new(backend).expect("Failed to create terminal");
        Self { terminal }
    }

    /// Draw to the terminal.
    pub fn draw<F>(&mut self, f: F)
    where
        F: FnOnce(&mut ratatui::Frame),
    {
        self.terminal.draw(f).expect("Failed to draw to terminal");
    }

    pub fn buffer(&self) -> &Buffer {
        self.terminal.backend().buffer()
    }

    /// Get the buffer content as a string, one line per row.
    pub fn text(&self) -> String {
        let area = self.buffer().area;
        (area.y..area.y + area.height)
            .map(|row| self.row_text(row))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn row_text(&self, row: u16) -> String {
        let buffer = self.buffer();
        let area = buffer.area;
        let mut line = String::new();
        for x in area.x..area.x + area.width {
            if let Some(cell) = buffer.cell((x, row)) {
                line.push_str(cell.symbol());
            }
        }
        line
    }

    /// Get the content of a specific line, trailing blanks trimmed.
    pub fn line(&self, line_num: u16) -> String {
        let area = self.buffer().area;
        if line_num >= area.height {
            return String::new();
        }
        self.row_text(area.y + line_num).trim_end().to_string()
    }

    /// Position of the first cell where `needle` starts. Needles must be
    /// single-width text.
    pub fn find(&self, needle: &str) -> Option<(u16, u16)> {
        let area = self.buffer().area;
        (0..area.height).find_map(|row| {
            let cells: Vec<&str> = (area.x..area.x + area.width)
                .filter_map(|x| self.buffer().cell((x, area.y + row)))
                .map(|c| c.symbol())
                .collect();
            let wanted: Vec<String> = needle.chars().map(String::from).collect();
            cells
                .windows(wanted.len().max(1))
                .position(|w| w.iter().zip(&wanted).all(|(a, b)| *a == b.as_str()))
                .map(|col| (area.x + col as u16, area.y + row))
        })
    }

    /// Assert that the buffer contains the given substring.
    pub fn assert_contains(&self, needle: &str) {
        let content = self.text();
        if !content.contains(needle) {
            panic!("Buffer does not contain \"{}\":\n{}", needle, content);
        }
    }

    /// Assert that the buffer does not contain the given substring.
    pub fn assert_not_contains(&self, needle: &str) {
        let content = self.text();
        if content.contains(needle) {
            panic!("Buffer unexpectedly contains \"{}\":\n{}", needle, content);
        }
    }
}
