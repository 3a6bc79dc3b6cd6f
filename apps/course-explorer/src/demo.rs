//! Built-in demo content used when no data files are configured.

use course_core::{
    CourseTree, LayoutMode, LegacyConcept, Lesson, LessonCatalog, LessonContent, RawEdge, RawGraph, Tier,
    TreeError, TreeMeta, UnlockConditions,
};

const CONCEPTS: &[(&str, &str, &str)] = &[
    ("programming", "Programming", "Writing instructions for a computer"),
    ("typing", "Touch Typing", "Typing code without looking"),
    ("values", "Values & Types", "Numbers, text and booleans"),
    ("variables", "Variables", "Naming values"),
    ("conditionals", "Conditionals", "Choosing between branches"),
    ("loops", "Loops", "Repeating work"),
    ("functions", "Functions", "Reusable named steps"),
    ("lists", "Lists", "Ordered collections"),
    ("recursion", "Recursion", "Functions that call themselves"),
    ("sorting", "Sorting", "Putting lists in order"),
];

const EDGES: &[(&str, &str, &str)] = &[
    ("values", "programming", "PART_OF"),
    ("variables", "programming", "PART_OF"),
    ("typing", "programming", "RELATED_TO"),
    ("variables", "values", "BUILDS_ON"),
    ("conditionals", "variables", "BUILDS_ON"),
    ("loops", "conditionals", "BUILDS_ON"),
    ("functions", "variables", "BUILDS_ON"),
    ("lists", "loops", "BUILDS_ON"),
    ("lists", "values", "RELATED_TO"),
    ("recursion", "functions", "BUILDS_ON"),
    ("recursion", "loops", "RELATED_TO"),
    ("sorting", "lists", "BUILDS_ON"),
    ("sorting", "recursion", "RELATED_TO"),
];

pub fn graph() -> RawGraph {
    RawGraph {
        concepts: CONCEPTS
            .iter()
            .map(|(id, title, summary)| LegacyConcept {
                id: id.to_string(),
                title: title.to_string(),
                summary: summary.to_string(),
                primary_domain: "cs".to_string(),
                tags: vec!["beginner".to_string()],
                metrics: Default::default(),
            })
            .collect(),
        edges: EDGES
            .iter()
            .map(|(from, to, kind)| RawEdge::new(*from, *to, *kind))
            .collect(),
    }
}

pub fn lessons() -> LessonCatalog {
    let mut lessons = Vec::new();
    for (id, title, _) in CONCEPTS.iter().filter(|(id, ..)| *id != "programming") {
        let content = match *id {
            "typing" => LessonContent::KeyboardDrill {
                text: "fn main() { println!(\"hello\"); }".to_string(),
            },
            "sorting" => LessonContent::Game {
                url: "https://example.org/sort-race".to_string(),
            },
            _ => LessonContent::Video {
                url: format!("https://example.org/videos/{}", id),
            },
        };
        lessons.push(Lesson {
            id: format!("{}-intro", id),
            concept_id: id.to_string(),
            title: format!("Intro to {}", title),
            minutes: 12,
            content,
        });
        lessons.push(Lesson {
            id: format!("{}-check", id),
            concept_id: id.to_string(),
            title: format!("{} check", title),
            minutes: 6,
            content: LessonContent::Quiz { questions: 8 },
        });
    }
    lessons.push(Lesson {
        id: "recursion-reading".to_string(),
        concept_id: "recursion".to_string(),
        title: "Recursion, visually".to_string(),
        minutes: 15,
        content: LessonContent::ExternalLink {
            url: "https://example.org/recursion".to_string(),
        },
    });
    LessonCatalog::new(lessons)
}

/// A seven-node course from variables to sorting.
pub fn tree(owner: &str, mode: LayoutMode) -> Result<CourseTree, TreeError> {
    let mut tree = CourseTree::create(
        owner,
        TreeMeta {
            title: "First Steps in Programming".to_string(),
            description: "Variables through sorting, one concept at a time".to_string(),
            primary_domain: "cs".to_string(),
            tags: vec!["beginner".to_string()],
            root_concept_id: Some("variables".to_string()),
            layout_mode: mode,
            ..Default::default()
        },
    );
    for id in ["variables", "conditionals", "functions", "loops", "lists", "recursion", "sorting"] {
        tree.add_node(id);
    }

    const LINKS: &[(&str, &str)] = &[
        ("variables", "conditionals"),
        ("variables", "functions"),
        ("conditionals", "loops"),
        ("loops", "lists"),
        ("functions", "recursion"),
        ("lists", "sorting"),
        ("recursion", "sorting"),
    ];
    for (from, to) in LINKS {
        tree.connect_nodes(from, to)?;
    }

    const REQUIREMENTS: &[(&str, &[&str], Tier)] = &[
        ("conditionals", &["variables"], Tier::Bronze),
        ("functions", &["variables"], Tier::Bronze),
        ("loops", &["conditionals"], Tier::Bronze),
        ("lists", &["loops"], Tier::Silver),
        ("recursion", &["functions"], Tier::Silver),
        ("sorting", &["lists", "recursion"], Tier::Silver),
    ];
    for (id, required, tier) in REQUIREMENTS {
        tree.set_unlock_conditions(id, UnlockConditions::requiring(required, *tier))?;
    }

    tree.set_subtree_lessons(
        "recursion",
        vec!["recursion-intro".to_string(), "recursion-reading".to_string(), "recursion-check".to_string()],
        [("recursion-check".to_string(), 2)].into_iter().collect(),
    )?;
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::{GraphSnapshot, ValidationOptions};

    #[test]
    fn test_demo_tree_validates_against_demo_graph() {
        let graph = GraphSnapshot::from_raw(graph());
        let tree = tree("local", LayoutMode::TopDown).unwrap();
        let report = tree.validate(&graph, &ValidationOptions::rejecting_cycles());
        assert!(report.ok, "{:?}", report.errors);
        assert_eq!(tree.roots(), vec!["variables"]);
    }

    #[test]
    fn test_every_tree_concept_has_lessons() {
        let lessons = lessons();
        let tree = tree("local", LayoutMode::TopDown).unwrap();
        for node in tree.learner_nodes() {
            let id = node.concept().unwrap();
            assert!(!lessons.for_concept(id).is_empty(), "{} has no lessons", id);
        }
    }
}
