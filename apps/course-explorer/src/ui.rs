//! UI rendering for course explorer.

use crate::app::{App, ConfirmDialog, InputMode, MessageType, View};
use course_core::{NodeStatus, SurfaceMode, Tier};
use course_widgets::{status_marker, status_style, GraphView};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

/// Draw the application.
pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Footer/status
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_content(f, app, chunks[1]);
    draw_footer(f, app, chunks[2]);

    if app.show_help {
        draw_help_popup(f);
    }

    if let Some(dialog) = &app.confirm_dialog {
        draw_confirm_dialog(f, dialog);
    }

    if app.is_editing() {
        draw_score_dialog(f, app);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let tree = app.tree();
    let title = format!(" {} (v{}) ", tree.title, tree.version);

    let mut tabs: Vec<Span> = Vec::new();
    for (i, view) in View::ALL.iter().enumerate() {
        if i > 0 {
            tabs.push(Span::raw(" "));
        }
        tabs.push(styled_tab(&format!("{}:{}", i + 1, view.title()), app.view == *view));
    }

    let header = Paragraph::new(Line::from(tabs))
        .block(Block::default().borders(Borders::ALL).title(title))
        .alignment(Alignment::Center);

    f.render_widget(header, area);
}

fn styled_tab(label: &str, active: bool) -> Span<'static> {
    if active {
        Span::styled(
            format!("[{}]", label),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(format!(" {} ", label), Style::default().fg(Color::Gray))
    }
}

fn draw_content(f: &mut Frame, app: &mut App, area: Rect) {
    match app.view {
        View::Tree => draw_tree_view(f, app, area),
        View::Progress => draw_progress_view(f, app, area),
        View::Path => draw_path_view(f, app, area),
        View::Catalog => draw_catalog_view(f, app, area),
    }
}

fn draw_tree_view(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
        .split(area);

    let surface = app.graph_state.surface();
    let mut title = match surface.mode() {
        SurfaceMode::View => " Course ".to_string(),
        SurfaceMode::Edit => " Course [edit] ".to_string(),
    };
    if surface.mode() == SurfaceMode::Edit && surface.snap_enabled() {
        title = title.replace("[edit]", "[edit, snap]");
    }
    let zoom = format!(" {:.0}% ", surface.transform().scale * 100.0);

    let border = if surface.mode() == SurfaceMode::Edit {
        Color::Magenta
    } else {
        Color::Cyan
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title)
        .title_bottom(Line::from(zoom).right_aligned());

    let view = GraphView::new(&app.labels).statuses(&app.statuses).block(block);
    f.render_stateful_widget(view, chunks[0], &mut app.graph_state);

    draw_node_detail(f, app, chunks[1]);
}

fn draw_node_detail(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Node ");

    let Some(detail) = app.selected_detail() else {
        let hint = Paragraph::new("Click a node or press n/p to select.\n\nEnter: study  g: goal  e: edit")
            .block(block)
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        f.render_widget(hint, area);
        return;
    };

    let mut lines = vec![
        Line::from(Span::styled(
            detail.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("{} {}", status_marker(detail.status), status_label(detail.status)),
            status_style(detail.status),
        )),
    ];
    if !detail.summary.is_empty() {
        lines.push(Line::from(Span::styled(
            detail.summary.clone(),
            Style::default().fg(Color::Gray),
        )));
    }
    if detail.is_goal {
        lines.push(Line::from(Span::styled("Goal", Style::default().fg(Color::Cyan))));
    }
    if app.link_source.as_deref() == Some(detail.concept_id.as_str()) {
        lines.push(Line::from(Span::styled("Link source", Style::default().fg(Color::Magenta))));
    }

    lines.push(Line::from(""));
    if detail.min_badge != Tier::Unrated {
        lines.push(Line::from(format!("Requires {}", detail.min_badge)));
        for name in &detail.missing {
            lines.push(Line::from(Span::styled(
                format!("  missing: {}", name),
                Style::default().fg(Color::Red),
            )));
        }
    }

    let entry = &detail.entry;
    lines.push(Line::from(format!(
        "Studied {}x, {} min, streak {}",
        entry.times_studied, entry.minutes, entry.streak
    )));
    lines.push(Line::from(format!(
        "Lessons {}  Avg {}",
        entry.lessons_completed,
        entry
            .moving_average_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    )));

    lines.push(Line::from(""));
    if detail.lessons.is_empty() {
        lines.push(Line::from(Span::styled("No lessons", Style::default().fg(Color::DarkGray))));
    }
    let mut last_step = 0;
    for lesson in &detail.lessons {
        if lesson.step != last_step {
            lines.push(Line::from(Span::styled(
                format!("Step {}", lesson.step),
                Style::default().fg(Color::Yellow),
            )));
            last_step = lesson.step;
        }
        let style = if lesson.done {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!(
                " {} {} {} ({}m)",
                if lesson.done { "✓" } else { " " },
                lesson.icon,
                lesson.title,
                lesson.minutes
            ),
            style,
        )));
    }

    let panel = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn status_label(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Unbound => "Unbound",
        NodeStatus::Locked => "Locked",
        NodeStatus::Available => "Available",
        NodeStatus::Mastered(tier) => tier.label(),
    }
}

fn tier_style(tier: Tier) -> Style {
    match tier {
        Tier::Gold => Style::default().fg(Color::Yellow),
        Tier::Silver => Style::default().fg(Color::Rgb(192, 192, 192)),
        Tier::Bronze => Style::default().fg(Color::Rgb(205, 127, 50)),
        Tier::Unrated => Style::default().fg(Color::DarkGray),
    }
}

fn draw_progress_view(f: &mut Frame, app: &App, area: Rect) {
    let rows_data = app.progress_rows();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Progress: {} ", app.user_id()));

    if rows_data.is_empty() {
        let msg = Paragraph::new("This course has no concepts yet.")
            .block(block)
            .alignment(Alignment::Center);
        f.render_widget(msg, area);
        return;
    }

    let rows: Vec<Row> = rows_data
        .iter()
        .map(|row| {
            let avg = row
                .entry
                .moving_average_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(format!("{} {}", status_marker(row.status), row.title)).style(status_style(row.status)),
                Cell::from(row.tier.label()).style(tier_style(row.tier)),
                Cell::from(row.entry.lessons_completed.to_string()),
                Cell::from(avg),
                Cell::from(row.entry.streak.to_string()),
                Cell::from(row.entry.minutes.to_string()),
            ])
        })
        .collect();

    let header = Row::new(vec!["Concept", "Tier", "Lessons", "Avg", "Streak", "Minutes"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1);

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(7),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = TableState::default().with_selected(Some(app.progress_index));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_path_view(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let goals = if app.goals.is_empty() {
        "none".to_string()
    } else {
        app.goals
            .iter()
            .map(|g| app.content.title(g))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let goal_line = Paragraph::new(format!("Goals: {}", goals)).block(Block::default().borders(Borders::ALL));
    f.render_widget(goal_line, chunks[0]);

    let block = Block::default().borders(Borders::ALL);
    let Some(path) = &app.path else {
        let text = if app.planning {
            "Planning..."
        } else {
            "No path yet. Select nodes in the Tree view and press 'g' to add goals."
        };
        let msg = Paragraph::new(text)
            .block(block.title(" Path "))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(msg, chunks[1]);
        return;
    };

    let title = format!(
        " Path: {} steps, {} min{} ",
        path.route.len(),
        path.total_minutes,
        if app.planning { " (updating)" } else { "" }
    );

    let items: Vec<ListItem> = path
        .route
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let tier = app.progress.tier(&step.concept_id);
            let unreached = path.unreached_goals.contains(&step.concept_id);
            let mut spans = vec![
                Span::styled(format!("{:>2}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(step.concept_title.clone(), tier_style(tier).add_modifier(Modifier::BOLD)),
                Span::raw("  "),
                Span::raw(step.lesson_title.clone()),
                Span::styled(format!(" ({}m)", step.minutes), Style::default().fg(Color::Cyan)),
            ];
            if unreached {
                spans.push(Span::styled(" no route", Style::default().fg(Color::Red)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(block.title(title))
        .highlight_style(Style::default().bg(Color::DarkGray));
    let mut state = ListState::default().with_selected(Some(app.path_index));
    f.render_stateful_widget(list, chunks[1], &mut state);
}

fn draw_catalog_view(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Catalog ");

    if app.catalog.is_empty() {
        let msg = Paragraph::new("Nothing published. Press 'P' in the Tree view to publish.")
            .block(block)
            .alignment(Alignment::Center);
        f.render_widget(msg, area);
        return;
    }

    let rows: Vec<Row> = app
        .catalog
        .iter()
        .map(|entry| {
            Row::new(vec![
                entry.tree.title.clone(),
                format!("v{}", entry.version()),
                entry.tree.learner_nodes().count().to_string(),
                entry.tree.tags.join(", "),
                entry.published_at.format("%Y-%m-%d %H:%M").to_string(),
            ])
        })
        .collect();

    let header = Row::new(vec!["Title", "Version", "Nodes", "Tags", "Published"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1);

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(17),
        ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = TableState::default().with_selected(Some(app.catalog_index));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let (msg, style) = if let Some((ref message, msg_type)) = app.message {
        let color = match msg_type {
            MessageType::Info => Color::Blue,
            MessageType::Success => Color::Green,
            MessageType::Warning => Color::Yellow,
            MessageType::Error => Color::Red,
        };
        (message.clone(), Style::default().fg(color))
    } else {
        let help = match app.view {
            View::Tree if app.is_edit_mode() => {
                "Drag:Move  m:Link from  c:Link to  x:Unlink  r:Reset pos  s:Snap  e:Done  ?:Help"
            }
            View::Tree => "Enter:Study  a:Practice  g:Goal  n/p:Select  hjkl:Pan  +/-:Zoom  0:Fit  e:Edit  P:Publish  ?:Help  q:Quit",
            View::Progress => "j/k:Navigate  X:Clear progress  Tab:Next view  ?:Help  q:Quit",
            View::Path => "j/k:Navigate  p:Replan  c:Clear goals  Tab:Next view  ?:Help  q:Quit",
            View::Catalog => "j/k:Navigate  u:Unpublish  R:Reload  Tab:Next view  ?:Help  q:Quit",
        };
        (help.to_string(), Style::default().fg(Color::DarkGray))
    };

    let footer = Paragraph::new(msg)
        .style(style)
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}

fn draw_help_popup(f: &mut Frame) {
    let area = centered_rect(60, 80, f.area());
    f.render_widget(Clear, area);

    let help_text = r#"
Course Explorer Keybindings

Views:
  Tab/Shift-Tab   Next/previous view
  1-4             Tree, Progress, Path, Catalog

Tree:
  n/p             Select next/previous node
  h/j/k/l, arrows Pan
  +/-, wheel      Zoom
  0               Fit course to view
  Enter, Space    Study selected node
  a               Practice without finishing a lesson
  g               Toggle goal
  L               Toggle top-down/left-right
  [ ]             Previous/next course
  P               Publish course

Edit mode (e):
  drag            Move node
  m, then c/x     Link/unlink to selected
  r               Reset node position
  s               Toggle grid snap

General:
  ?               Show this help
  q               Quit

Press any key to close
"#;

    let popup = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title(" Help "))
        .wrap(Wrap { trim: false });

    f.render_widget(popup, area);
}

fn draw_confirm_dialog(f: &mut Frame, dialog: &ConfirmDialog) {
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);

    let text = Paragraph::new(dialog.message.clone())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", dialog.title)),
        )
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    f.render_widget(text, area);
}

fn draw_score_dialog(f: &mut Frame, app: &App) {
    let Some(concept_id) = app.input_mode.concept() else {
        return;
    };
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);

    let kind = match app.input_mode {
        InputMode::Practice(_) => "Practice score",
        _ => "Score",
    };
    let title = format!(" {} for {} (0-100, empty for none) ", kind, app.content.title(concept_id));
    let input = Paragraph::new(app.input_buffer.as_str())
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(Style::default().fg(Color::Yellow));

    f.render_widget(input, area);

    f.set_cursor_position((area.x + 1 + app.input_buffer.len() as u16, area.y + 1));
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Content;
    use crate::config::Config;
    use crate::db::Database;
    use course_testing::{InputSequence, TestTerminal};

    fn app() -> App {
        App::with_parts(Config::default(), Database::in_memory().unwrap(), Content::demo()).unwrap()
    }

    #[test]
    fn test_tree_view_renders_nodes() {
        let mut app = app();
        let mut terminal = TestTerminal::new(160, 48);
        terminal.draw(|f| draw(f, &mut app));

        terminal.assert_contains("First Steps in Programming");
        let (_, row) = terminal.find("[1:Tree]").unwrap();
        assert!(terminal.line(row).contains("4:Catalog"));
        terminal.assert_contains("Variables");
        terminal.assert_contains("Click a node");
    }

    #[test]
    fn test_detail_panel_follows_selection() {
        let mut app = app();
        app.graph_state.select_concept("sorting");
        let mut terminal = TestTerminal::new(160, 48);
        terminal.draw(|f| draw(f, &mut app));

        terminal.assert_contains("Requires Silver");
        terminal.assert_contains("missing: Recursion");
        terminal.assert_contains("Locked");
    }

    #[test]
    fn test_click_selects_node_on_canvas() {
        let mut app = app();
        let mut terminal = TestTerminal::new(160, 48);
        terminal.draw(|f| draw(f, &mut app));

        let (col, row) = app.graph_state.node_cell(0).unwrap();
        let mut seq = InputSequence::new();
        seq.tap(col, row);
        for mouse in seq.mouse_events() {
            app.handle_mouse(mouse);
        }
        assert_eq!(app.selected_concept().as_deref(), Some("variables"));

        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("Studied 0x");
    }

    #[test]
    fn test_progress_view() {
        let mut app = app();
        app.record_study("variables", Some(90.0));
        app.view = View::Progress;
        let mut terminal = TestTerminal::new(100, 30);
        terminal.draw(|f| draw(f, &mut app));

        terminal.assert_contains("Progress: local");
        terminal.assert_contains("Gold");
        terminal.assert_contains("Conditionals");
    }

    #[test]
    fn test_path_view_empty_and_catalog_empty() {
        let mut app = app();
        app.view = View::Path;
        let mut terminal = TestTerminal::new(100, 30);
        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("Goals: none");
        terminal.assert_contains("No path yet");

        app.view = View::Catalog;
        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("Nothing published");
    }

    #[test]
    fn test_catalog_lists_published() {
        let mut app = app();
        app.publish_current();
        app.view = View::Catalog;
        let mut terminal = TestTerminal::new(120, 30);
        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("v1");
        terminal.assert_contains("Published version 1");
    }

    #[test]
    fn test_score_dialog_and_help() {
        let mut app = app();
        app.graph_state.select_concept("variables");
        let mut seq = InputSequence::new();
        seq.enter().text("7");
        for key in seq.key_events() {
            app.handle_key(key);
        }
        let mut terminal = TestTerminal::new(120, 40);
        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("Score for Variables");

        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Esc));
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('?')));
        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("Course Explorer Keybindings");
        terminal.assert_not_contains("Score for Variables");
    }

    #[test]
    fn test_practice_dialog_title() {
        let mut app = app();
        app.graph_state.select_concept("variables");
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('a')));
        let mut terminal = TestTerminal::new(120, 40);
        terminal.draw(|f| draw(f, &mut app));
        terminal.assert_contains("Practice score for Variables");
    }
}
