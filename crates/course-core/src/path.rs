//! Goal-directed learning paths.
//!
//! Paths are breadth-first routes over the concept adjacency, optionally
//! widened with edges learned from how users sequence playlists. Every
//! iteration order here is fixed (graph order, then sorted sets), so the
//! same inputs always produce the same route.

use crate::graph::{Adjacency, GraphSnapshot};
use crate::lesson::{Lesson, LessonCatalog};
use crate::mastery::{TierMap, UserProgress};
use crate::{ConceptId, LessonId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Placeholder title for a concept with no lessons.
pub const EXPLORE_TITLE: &str = "Explore concept";
/// Minutes charged for a concept with no lessons.
pub const EXPLORE_MINUTES: u32 = 10;

/// Directed edge observed in user playlists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEdge {
    #[serde(rename = "sourceConceptId")]
    pub source: ConceptId,
    #[serde(rename = "targetConceptId")]
    pub target: ConceptId,
    pub count: u32,
}

/// Count consecutive concept pairs across playlists. Repeats of the same
/// concept are not edges.
pub fn behavior_edges_from_sequences(sequences: &[Vec<ConceptId>]) -> Vec<BehaviorEdge> {
    let mut counts: BTreeMap<(&str, &str), u32> = BTreeMap::new();
    for seq in sequences {
        for pair in seq.windows(2) {
            if pair[0] != pair[1] {
                *counts.entry((pair[0].as_str(), pair[1].as_str())).or_insert(0) += 1;
            }
        }
    }
    counts
        .into_iter()
        .map(|((source, target), count)| BehaviorEdge {
            source: source.to_string(),
            target: target.to_string(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    /// Route around concepts already at Gold (goals are always kept).
    pub skip_gold: bool,
    /// Behavior edges seen fewer times than this are ignored.
    pub min_behavior_count: u32,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            skip_gold: true,
            min_behavior_count: 1,
        }
    }
}

/// One concept on a route with its chosen lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    pub concept_id: ConceptId,
    pub concept_title: String,
    pub lesson_id: Option<LessonId>,
    pub lesson_title: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub route: Vec<PathStep>,
    pub total_minutes: u32,
    /// Goals no search reached. They are still on the route, at the end.
    pub unreached_goals: Vec<ConceptId>,
}

impl LearningPath {
    pub fn concept_ids(&self) -> Vec<&str> {
        self.route.iter().map(|s| s.concept_id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
    }
}

/// Plans routes over one graph snapshot and lesson catalog.
#[derive(Debug, Clone)]
pub struct PathGenerator<'a> {
    graph: &'a GraphSnapshot,
    lessons: &'a LessonCatalog,
    behavior: &'a [BehaviorEdge],
}

impl<'a> PathGenerator<'a> {
    pub fn new(graph: &'a GraphSnapshot, lessons: &'a LessonCatalog) -> Self {
        Self {
            graph,
            lessons,
            behavior: &[],
        }
    }

    pub fn with_behavior(mut self, edges: &'a [BehaviorEdge]) -> Self {
        self.behavior = edges;
        self
    }

    /// Graph adjacency plus behavior edges at or above `min_count`. Behavior
    /// edges stay directed and must join two known concepts.
    pub fn merged_adjacency(&self, min_count: u32) -> Adjacency {
        let mut adj = self.graph.build_adjacency();
        for edge in self.behavior.iter().filter(|e| e.count >= min_count) {
            if edge.source == edge.target || !adj.contains_key(&edge.target) {
                continue;
            }
            if let Some(set) = adj.get_mut(&edge.source) {
                set.insert(edge.target.clone());
            }
        }
        adj
    }

    /// Route from `start` (or from every eligible concept when `start` is
    /// `None` or unknown) through each goal in order.
    ///
    /// An empty `goals` yields an empty path; callers should reject that
    /// before asking.
    pub fn generate(
        &self,
        start: Option<&str>,
        goals: &[ConceptId],
        progress: &UserProgress,
        options: &PathOptions,
    ) -> LearningPath {
        let adj = self.merged_adjacency(options.min_behavior_count);
        let tiers = progress.tiers();
        let skip = |id: &str| options.skip_gold && tiers.is_gold(id);

        let sources: Vec<&str> = match start.filter(|s| self.graph.get(s).is_some()) {
            Some(start) => vec![start],
            None => self
                .graph
                .nodes()
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| !skip(id))
                .collect(),
        };

        let mut sequence: Vec<ConceptId> = Vec::new();
        let mut seen: HashSet<ConceptId> = HashSet::new();
        let mut unreached = Vec::new();

        for goal in goals {
            match bfs(&adj, &sources, goal, &tiers, options.skip_gold) {
                Some(path) => {
                    for id in path {
                        if seen.insert(id.clone()) {
                            sequence.push(id);
                        }
                    }
                }
                None => unreached.push(goal.clone()),
            }
        }
        for goal in &unreached {
            if seen.insert(goal.clone()) {
                sequence.push(goal.clone());
            }
        }

        let route: Vec<PathStep> = sequence.iter().map(|id| self.step(id, progress)).collect();
        let total_minutes: u32 = route.iter().map(|s| s.minutes).sum();
        debug!(
            start = ?start,
            goals = goals.len(),
            steps = route.len(),
            unreached = unreached.len(),
            total_minutes,
            "path generated"
        );

        LearningPath {
            route,
            total_minutes,
            unreached_goals: unreached,
        }
    }

    fn step(&self, concept_id: &str, progress: &UserProgress) -> PathStep {
        let concept_title = self
            .graph
            .get(concept_id)
            .map(|c| c.title.clone())
            .unwrap_or_else(|| concept_id.to_string());

        match pick_lesson(&self.lessons.for_concept(concept_id), progress) {
            Some(lesson) => PathStep {
                concept_id: concept_id.to_string(),
                concept_title,
                lesson_id: Some(lesson.id.clone()),
                lesson_title: lesson.title.clone(),
                minutes: lesson.minutes,
            },
            None => PathStep {
                concept_id: concept_id.to_string(),
                concept_title,
                lesson_id: None,
                lesson_title: EXPLORE_TITLE.to_string(),
                minutes: EXPLORE_MINUTES,
            },
        }
    }
}

/// First lesson not yet completed, else the shortest one.
fn pick_lesson<'l>(lessons: &[&'l Lesson], progress: &UserProgress) -> Option<&'l Lesson> {
    lessons
        .iter()
        .find(|l| !progress.has_completed(&l.id))
        .or_else(|| lessons.iter().min_by_key(|l| l.minutes))
        .copied()
}

/// Multi-source BFS to `goal`; returns the concept chain source..=goal.
fn bfs(adj: &Adjacency, sources: &[&str], goal: &str, tiers: &TierMap, skip_gold: bool) -> Option<Vec<ConceptId>> {
    let mut prev: HashMap<&str, Option<&str>> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for &source in sources {
        if !prev.contains_key(source) {
            prev.insert(source, None);
            queue.push_back(source);
        }
    }

    let mut found = prev.contains_key(goal);
    while !found {
        let Some(current) = queue.pop_front() else { break };
        let Some(neighbors) = adj.get(current) else { continue };
        for next in neighbors {
            let next = next.as_str();
            if prev.contains_key(next) {
                continue;
            }
            if next != goal && skip_gold && tiers.is_gold(next) {
                continue;
            }
            prev.insert(next, Some(current));
            if next == goal {
                found = true;
                break;
            }
            queue.push_back(next);
        }
    }
    if !found {
        return None;
    }

    let mut path = vec![goal.to_string()];
    let mut cursor = goal;
    while let Some(Some(parent)) = prev.get(cursor) {
        path.push(parent.to_string());
        cursor = *parent;
    }
    path.reverse();
    Some(path)
}
