//! Lesson catalog and the single table of lesson kinds.

use crate::error::{StorageError, StorageResult};
use crate::{ConceptId, LessonId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Lesson payload. One closed set of variants shared by every consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LessonContent {
    Video { url: String },
    Game { url: String },
    Quiz { questions: usize },
    ExternalLink { url: String },
    KeyboardDrill { text: String },
}

impl LessonContent {
    pub fn kind(&self) -> LessonKind {
        match self {
            Self::Video { .. } => LessonKind::Video,
            Self::Game { .. } => LessonKind::Game,
            Self::Quiz { .. } => LessonKind::Quiz,
            Self::ExternalLink { .. } => LessonKind::ExternalLink,
            Self::KeyboardDrill { .. } => LessonKind::KeyboardDrill,
        }
    }
}

/// Bucket a lesson is counted under in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonBucket {
    Watch,
    Play,
    Practice,
    Read,
}

/// Tag of a [`LessonContent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonKind {
    Video,
    Game,
    Quiz,
    ExternalLink,
    KeyboardDrill,
}

struct KindInfo {
    kind: LessonKind,
    icon: &'static str,
    label: &'static str,
    bucket: LessonBucket,
    aliases: &'static [&'static str],
}

const KINDS: &[KindInfo] = &[
    KindInfo {
        kind: LessonKind::Video,
        icon: "\u{25b6}",
        label: "Video",
        bucket: LessonBucket::Watch,
        aliases: &["video", "youtube"],
    },
    KindInfo {
        kind: LessonKind::Game,
        icon: "\u{265f}",
        label: "Game",
        bucket: LessonBucket::Play,
        aliases: &["game", "unity_game", "unity", "interactive"],
    },
    KindInfo {
        kind: LessonKind::Quiz,
        icon: "?",
        label: "Quiz",
        bucket: LessonBucket::Practice,
        aliases: &["quiz"],
    },
    KindInfo {
        kind: LessonKind::ExternalLink,
        icon: "\u{2197}",
        label: "Link",
        bucket: LessonBucket::Read,
        aliases: &["external_link", "link", "external", "article"],
    },
    KindInfo {
        kind: LessonKind::KeyboardDrill,
        icon: "\u{2328}",
        label: "Keyboard drill",
        bucket: LessonBucket::Practice,
        aliases: &["keyboard_drill", "keyboard", "typing"],
    },
];

impl LessonKind {
    fn info(self) -> &'static KindInfo {
        // every variant has exactly one row
        KINDS.iter().find(|k| k.kind == self).unwrap_or(&KINDS[0])
    }

    pub fn icon(self) -> &'static str {
        self.info().icon
    }

    pub fn label(self) -> &'static str {
        self.info().label
    }

    pub fn bucket(self) -> LessonBucket {
        self.info().bucket
    }

    /// Map a legacy type string onto a kind.
    pub fn parse(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_ascii_lowercase().replace('-', "_");
        KINDS
            .iter()
            .find(|k| k.aliases.contains(&needle.as_str()))
            .map(|k| k.kind)
    }

    pub fn all() -> impl Iterator<Item = LessonKind> {
        KINDS.iter().map(|k| k.kind)
    }
}

/// A single lesson for a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub concept_id: ConceptId,
    pub title: String,
    #[serde(default)]
    pub minutes: u32,
    pub content: LessonContent,
}

impl Lesson {
    pub fn kind(&self) -> LessonKind {
        self.content.kind()
    }
}

/// All known lessons, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct LessonCatalog {
    lessons: Vec<Lesson>,
    by_id: HashMap<LessonId, usize>,
    by_concept: HashMap<ConceptId, Vec<usize>>,
}

impl LessonCatalog {
    pub fn new(lessons: Vec<Lesson>) -> Self {
        let mut catalog = Self::default();
        for lesson in lessons {
            catalog.insert(lesson);
        }
        catalog
    }

    /// Load lessons from a JSON array file.
    pub fn from_json(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let lessons: Vec<Lesson> = serde_json::from_str(&content)
            .map_err(|e| StorageError::corrupt(format!("lesson file {}", path.display()), e))?;
        Ok(Self::new(lessons))
    }

    /// Add a lesson. A lesson with an existing id replaces the old one.
    pub fn insert(&mut self, lesson: Lesson) {
        if let Some(&idx) = self.by_id.get(&lesson.id) {
            let old_concept = self.lessons[idx].concept_id.clone();
            if old_concept != lesson.concept_id {
                if let Some(list) = self.by_concept.get_mut(&old_concept) {
                    list.retain(|&i| i != idx);
                }
                self.by_concept
                    .entry(lesson.concept_id.clone())
                    .or_default()
                    .push(idx);
            }
            self.lessons[idx] = lesson;
            return;
        }
        let idx = self.lessons.len();
        self.by_id.insert(lesson.id.clone(), idx);
        self.by_concept
            .entry(lesson.concept_id.clone())
            .or_default()
            .push(idx);
        self.lessons.push(lesson);
    }

    pub fn get(&self, id: &str) -> Option<&Lesson> {
        self.by_id.get(id).map(|&i| &self.lessons[i])
    }

    /// Lessons for a concept in catalog order.
    pub fn for_concept(&self, concept_id: &str) -> Vec<&Lesson> {
        self.by_concept
            .get(concept_id)
            .map(|idxs| idxs.iter().map(|&i| &self.lessons[i]).collect())
            .unwrap_or_default()
    }

    /// Keep only ids that resolve; dangling references are dropped silently.
    pub fn resolve<'a>(&'a self, ids: &'a [LessonId]) -> impl Iterator<Item = &'a Lesson> + 'a {
        ids.iter().filter_map(move |id| self.get(id))
    }

    pub fn counts_by_bucket<'a>(
        &self,
        lessons: impl IntoIterator<Item = &'a Lesson>,
    ) -> BTreeMap<LessonBucket, usize> {
        let mut counts = BTreeMap::new();
        for lesson in lessons {
            *counts.entry(lesson.kind().bucket()).or_insert(0) += 1;
        }
        counts
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: &str, concept: &str, minutes: u32, content: LessonContent) -> Lesson {
        Lesson {
            id: id.into(),
            concept_id: concept.into(),
            title: id.to_uppercase(),
            minutes,
            content,
        }
    }

    #[test]
    fn test_legacy_type_strings() {
        assert_eq!(LessonKind::parse("unity_game"), Some(LessonKind::Game));
        assert_eq!(LessonKind::parse("game"), Some(LessonKind::Game));
        assert_eq!(LessonKind::parse("YouTube"), Some(LessonKind::Video));
        assert_eq!(LessonKind::parse("keyboard-drill"), Some(LessonKind::KeyboardDrill));
        assert_eq!(LessonKind::parse("hologram"), None);
    }

    #[test]
    fn test_every_kind_has_a_row() {
        for kind in LessonKind::all() {
            assert!(!kind.label().is_empty());
            assert!(!kind.icon().is_empty());
        }
        assert_eq!(LessonKind::all().count(), 5);
        assert_eq!(LessonKind::Quiz.bucket(), LessonKind::KeyboardDrill.bucket());
    }

    #[test]
    fn test_catalog_lookup_and_order() {
        let catalog = LessonCatalog::new(vec![
            lesson("l1", "a", 5, LessonContent::Quiz { questions: 3 }),
            lesson("l2", "b", 7, LessonContent::Video { url: "v".into() }),
            lesson("l3", "a", 9, LessonContent::Game { url: "g".into() }),
        ]);
        let ids: Vec<_> = catalog.for_concept("a").iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "l3"]);
        assert!(catalog.for_concept("zzz").is_empty());

        let wanted = vec!["l2".to_string(), "ghost".to_string()];
        let resolved: Vec<_> = catalog.resolve(&wanted).map(|l| l.id.clone()).collect();
        assert_eq!(resolved, vec!["l2"]);
    }

    #[test]
    fn test_insert_replaces_and_moves_concept() {
        let mut catalog = LessonCatalog::new(vec![lesson(
            "l1",
            "a",
            5,
            LessonContent::Quiz { questions: 1 },
        )]);
        catalog.insert(lesson("l1", "b", 6, LessonContent::Quiz { questions: 1 }));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.for_concept("a").is_empty());
        assert_eq!(catalog.for_concept("b")[0].minutes, 6);
    }

    #[test]
    fn test_counts_by_bucket() {
        let catalog = LessonCatalog::new(vec![
            lesson("l1", "a", 5, LessonContent::Quiz { questions: 3 }),
            lesson("l2", "a", 5, LessonContent::KeyboardDrill { text: "asdf".into() }),
            lesson("l3", "a", 5, LessonContent::Video { url: "v".into() }),
        ]);
        let counts = catalog.counts_by_bucket(catalog.lessons());
        assert_eq!(counts[&LessonBucket::Practice], 2);
        assert_eq!(counts[&LessonBucket::Watch], 1);
        assert!(!counts.contains_key(&LessonBucket::Play));
    }

    #[test]
    fn test_content_serde_tag() {
        let json = r#"{"id":"x","conceptId":"a","title":"X","minutes":4,"content":{"type":"external_link","url":"https://example.com"}}"#;
        let lesson: Lesson = serde_json::from_str(json).unwrap();
        assert_eq!(lesson.kind(), LessonKind::ExternalLink);
    }
}
