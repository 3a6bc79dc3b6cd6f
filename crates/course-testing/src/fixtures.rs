//! Deterministic fixtures for course tests.

use chrono::{DateTime, TimeZone, Utc};
use course_core::{
    CourseTree, GraphSnapshot, LegacyConcept, RawEdge, RawGraph, Tier, TreeMeta, UnlockConditions,
    UserConceptProgress, UserProgress,
};

/// Collection of deterministic test fixtures.
pub struct Fixtures;

const ARITHMETIC: &[(&str, &str)] = &[
    ("numbers", "Numbers"),
    ("counting", "Counting"),
    ("place-value", "Place Value"),
    ("addition", "Addition"),
    ("subtraction", "Subtraction"),
    ("multiplication", "Multiplication"),
    ("division", "Division"),
    ("fractions", "Fractions"),
];

impl Fixtures {
    /// Eight arithmetic concepts in the legacy flat format, with every edge
    /// kind represented.
    pub fn raw_graph() -> RawGraph {
        let concepts = ARITHMETIC
            .iter()
            .map(|(id, title)| LegacyConcept {
                id: id.to_string(),
                title: title.to_string(),
                summary: String::new(),
                primary_domain: "math".to_string(),
                tags: vec!["arithmetic".to_string()],
                metrics: Default::default(),
            })
            .collect();

        let edges = vec![
            RawEdge::new("counting", "numbers", "PART_OF"),
            RawEdge::new("place-value", "numbers", "PART_OF"),
            RawEdge::new("place-value", "counting", "RELATED_TO"),
            RawEdge::new("addition", "counting", "BUILDS_ON"),
            RawEdge::new("subtraction", "addition", "BUILDS_ON"),
            RawEdge::new("subtraction", "addition", "RELATED_TO"),
            RawEdge::new("multiplication", "addition", "BUILDS_ON"),
            RawEdge::new("division", "multiplication", "BUILDS_ON"),
            RawEdge::new("division", "multiplication", "RELATED_TO"),
            RawEdge::new("fractions", "division", "BUILDS_ON"),
        ];

        RawGraph { concepts, edges }
    }

    /// [`Fixtures::raw_graph`] migrated into a snapshot.
    pub fn concept_graph() -> GraphSnapshot {
        GraphSnapshot::from_raw(Self::raw_graph())
    }

    /// A five-node course over the arithmetic graph:
    ///
    /// ```text
    /// counting -> addition -> subtraction
    ///                      -> multiplication -> division
    /// ```
    ///
    /// Addition needs Bronze on counting; division needs Silver on both
    /// addition and multiplication.
    pub fn course_tree() -> CourseTree {
        let mut tree = CourseTree::create(
            "creator-1",
            TreeMeta {
                title: "Arithmetic Basics".to_string(),
                description: "From counting to division".to_string(),
                primary_domain: "math".to_string(),
                tags: vec!["math".to_string(), "grade-3".to_string()],
                root_concept_id: Some("counting".to_string()),
                ..Default::default()
            },
        );
        for id in ["counting", "addition", "subtraction", "multiplication", "division"] {
            tree.add_node(id);
        }
        for (from, to) in [
            ("counting", "addition"),
            ("addition", "subtraction"),
            ("addition", "multiplication"),
            ("multiplication", "division"),
        ] {
            tree.connect_nodes(from, to).expect("fixture link");
        }
        tree.set_unlock_conditions("addition", UnlockConditions::requiring(&["counting"], Tier::Bronze))
            .expect("fixture node");
        tree.set_unlock_conditions(
            "division",
            UnlockConditions::requiring(&["addition", "multiplication"], Tier::Silver),
        )
        .expect("fixture node");
        tree
    }

    /// Progress that computes to exactly the given tiers.
    pub fn progress_with(tiers: &[(&str, Tier)]) -> UserProgress {
        let mut progress = UserProgress::default();
        for (id, tier) in tiers {
            let entry = match tier {
                Tier::Gold => UserConceptProgress {
                    lessons_completed: 3,
                    moving_average_score: Some(90),
                    ..Default::default()
                },
                Tier::Silver => UserConceptProgress {
                    lessons_completed: 2,
                    moving_average_score: Some(80),
                    ..Default::default()
                },
                Tier::Bronze => UserConceptProgress {
                    lessons_completed: 1,
                    moving_average_score: Some(40),
                    ..Default::default()
                },
                Tier::Unrated => UserConceptProgress {
                    times_studied: 1,
                    ..Default::default()
                },
            };
            progress.concepts.insert(id.to_string(), entry);
        }
        progress
    }

    /// Mid-afternoon UTC on the given day of March 2024.
    pub fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 15, 30, 0)
            .single()
            .expect("valid fixture date")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::ValidationOptions;

    #[test]
    fn test_concept_graph_migrates_cleanly() {
        let graph = Fixtures::concept_graph();
        assert_eq!(graph.len(), 8);
        let place_value = graph.get("place-value").unwrap();
        assert_eq!(place_value.relationships.part_of.as_deref(), Some("numbers"));
        let counting = graph.get("counting").unwrap();
        assert!(counting.relationships.related_to.contains(&"place-value".to_string()));
    }

    #[test]
    fn test_course_tree_is_valid() {
        let tree = Fixtures::course_tree();
        let report = tree.validate(&Fixtures::concept_graph(), &ValidationOptions::rejecting_cycles());
        assert!(report.ok, "{:?}", report.errors);
        assert_eq!(tree.roots(), vec!["counting"]);
    }

    #[test]
    fn test_progress_with_hits_requested_tiers() {
        let progress = Fixtures::progress_with(&[
            ("a", Tier::Gold),
            ("b", Tier::Silver),
            ("c", Tier::Bronze),
            ("d", Tier::Unrated),
        ]);
        let tiers = progress.tiers();
        assert_eq!(tiers.get("a"), Tier::Gold);
        assert_eq!(tiers.get("b"), Tier::Silver);
        assert_eq!(tiers.get("c"), Tier::Bronze);
        assert_eq!(tiers.get("d"), Tier::Unrated);
    }

}
