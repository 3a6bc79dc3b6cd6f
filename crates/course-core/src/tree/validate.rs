//! Structural checks for course trees.

use super::CourseTree;
use crate::graph::ConceptIndex;
use std::collections::{HashMap, HashSet};

/// What to do with multi-hop cycles in `next_ids`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Cycles are permitted (review loops).
    #[default]
    Allow,
    /// Every cycle is reported as an error.
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    pub cycles: CyclePolicy,
}

impl ValidationOptions {
    pub fn rejecting_cycles() -> Self {
        Self {
            cycles: CyclePolicy::Reject,
        }
    }
}

/// Outcome of [`CourseTree::validate`]. Errors are human-readable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}

impl CourseTree {
    /// Check links, concept bindings and (optionally) cycles.
    pub fn validate(&self, concepts: &dyn ConceptIndex, options: &ValidationOptions) -> ValidationReport {
        let mut errors = Vec::new();

        let mut bound: HashSet<&str> = HashSet::new();
        for node in self.learner_nodes() {
            if let Some(id) = node.concept() {
                if !bound.insert(id) {
                    errors.push(format!("Concept \"{}\" is bound to more than one node", id));
                }
            }
        }

        for node in self.learner_nodes() {
            let Some(id) = node.concept() else { continue };

            if !concepts.contains(id) {
                errors.push(format!("Node \"{}\" is bound to an unknown concept", id));
            }

            for target in &node.next_ids {
                if target == id {
                    errors.push(format!("Node \"{}\" links to itself", id));
                } else if !bound.contains(target.as_str()) {
                    errors.push(format!(
                        "Node \"{}\" links to \"{}\", which is not a node in this tree",
                        id, target
                    ));
                }
            }

            for required in &node.unlock_conditions.required_concept_ids {
                if !concepts.contains(required) {
                    errors.push(format!(
                        "Node \"{}\" requires unknown concept \"{}\"",
                        id, required
                    ));
                }
            }
        }

        if let Some(root) = self.root_concept_id.as_deref() {
            if !bound.contains(root) {
                errors.push(format!("Root concept \"{}\" is not a node in this tree", root));
            }
        }

        if options.cycles == CyclePolicy::Reject {
            for cycle in self.find_cycles() {
                errors.push(format!("Cycle: {}", cycle.join(" -> ")));
            }
        }

        ValidationReport::from_errors(errors)
    }

    /// Multi-hop cycles through `next_ids`, each closed back on its first
    /// concept. Self-links are left to the link checks.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let edges: HashMap<&str, Vec<&str>> = self
            .learner_nodes()
            .filter_map(|n| {
                let id = n.concept()?;
                let next = n
                    .next_ids
                    .iter()
                    .map(String::as_str)
                    .filter(|t| *t != id)
                    .collect();
                Some((id, next))
            })
            .collect();

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut cycles = Vec::new();

        for start in self.learner_nodes().filter_map(|n| n.concept()) {
            if marks.contains_key(start) {
                continue;
            }
            // iterative DFS: (node, next child index)
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::Visiting);

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let next = edges.get(node).and_then(|n| n.get(top.1)).copied();
                top.1 += 1;
                match next {
                    Some(target) if edges.contains_key(target) => match marks.get(target) {
                        None => {
                            marks.insert(target, Mark::Visiting);
                            stack.push((target, 0));
                        }
                        Some(Mark::Visiting) => {
                            let from = stack.iter().position(|(n, _)| *n == target).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                            cycle.push(target.to_string());
                            cycles.push(cycle);
                        }
                        Some(Mark::Done) => {}
                    },
                    Some(_) => {}
                    None => {
                        marks.insert(node, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }
        cycles
    }
}
