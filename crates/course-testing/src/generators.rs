//! Property-based testing generators.
//!
//! This module provides proptest strategies for course trees, study
//! sessions and terminal mouse input.

use chrono::{DateTime, Duration, TimeZone, Utc};
use course_core::{CourseTree, Point, Session, TreeMeta};
use crossterm::event::{KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use proptest::prelude::*;

fn concept_id(i: usize) -> String {
    format!("c{}", i)
}

/// Course trees with up to `max_nodes` bound nodes, random links (cycles
/// included), an occasional unbound node and some stored positions.
pub fn course_tree(max_nodes: usize) -> impl Strategy<Value = CourseTree> {
    (1..=max_nodes.max(1)).prop_flat_map(|n| {
        (
            prop::collection::vec((0..n, 0..n), 0..n * 2),
            prop::collection::vec(prop::option::weighted(0.2, (-400i32..400, -400i32..400)), n),
            any::<bool>(),
        )
            .prop_map(move |(links, positions, with_unbound)| {
                let mut tree = CourseTree::create("generated", TreeMeta::titled("Generated"));
                for i in 0..n {
                    tree.add_node(concept_id(i));
                }
                for (from, to) in links {
                    if from != to {
                        tree.connect_nodes(&concept_id(from), &concept_id(to)).expect("generated link");
                    }
                }
                for (i, pos) in positions.into_iter().enumerate() {
                    if let Some((x, y)) = pos {
                        tree.set_node_position(&concept_id(i), Point::new(f64::from(x), f64::from(y)))
                            .expect("generated node");
                    }
                }
                if with_unbound {
                    tree.add_unbound_node();
                }
                tree
            })
    })
}

fn base_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .expect("valid base date")
}

/// Sessions on or after 2024-01-01, up to `max_days` later. Scores are
/// drawn both as 0-1 fractions and as 0-100 values.
pub fn session(max_days: i64) -> impl Strategy<Value = Session> {
    let score = prop_oneof![
        Just(None),
        (0.0f64..=1.0).prop_map(Some),
        (0u32..=100).prop_map(|s| Some(f64::from(s))),
    ];
    (0..=max_days.max(0), 0.0f64..120.0, score, any::<bool>()).prop_map(|(day, minutes, score, completed)| Session {
        minutes,
        score,
        completed,
        lesson_id: None,
        when: base_day() + Duration::days(day),
    })
}

/// Sessions in chronological order.
pub fn session_history(len: usize, max_days: i64) -> impl Strategy<Value = Vec<Session>> {
    prop::collection::vec(session(max_days), 0..=len).prop_map(|mut sessions| {
        sessions.sort_by_key(|s| s.when);
        sessions
    })
}

/// Mouse events inside a `width` x `height` terminal.
pub fn mouse_event(width: u16, height: u16) -> impl Strategy<Value = MouseEvent> {
    let kind = prop_oneof![
        Just(MouseEventKind::Down(MouseButton::Left)),
        Just(MouseEventKind::Down(MouseButton::Right)),
        Just(MouseEventKind::Drag(MouseButton::Left)),
        Just(MouseEventKind::Up(MouseButton::Left)),
        Just(MouseEventKind::ScrollUp),
        Just(MouseEventKind::ScrollDown),
    ];
    (kind, 0..width.max(1), 0..height.max(1)).prop_map(|(kind, column, row)| MouseEvent {
        kind,
        column,
        row,
        modifiers: KeyModifiers::NONE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_course_tree_nodes_are_unique(tree in course_tree(6)) {
            let bound: Vec<_> = tree.learner_nodes().filter_map(|n| n.concept()).collect();
            let mut deduped = bound.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(bound.len(), deduped.len());
        }

        #[test]
        fn test_session_history_is_sorted(history in session_history(10, 30)) {
            prop_assert!(history.windows(2).all(|w| w[0].when <= w[1].when));
        }
    }
}
