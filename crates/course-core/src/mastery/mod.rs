//! Study progress and mastery tiers.
//!
//! [`apply_session`] is the only code that mutates a
//! [`UserConceptProgress`]; [`compute_mastery_tier`] is the only code that
//! turns one into a [`Tier`]. Everything else goes through those two.

mod store;
mod tracker;

pub use store::{MemoryProgressStore, ProgressStore};
pub use tracker::MasteryTracker;

use crate::{ConceptId, LessonId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Weight of the newest score in the moving average.
pub const EMA_ALPHA: f64 = 0.3;

/// Mastery tier derived from progress. Ordered by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    #[serde(alias = "none")]
    Unrated,
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    /// Numeric rank: Unrated 0, Bronze 1, Silver 2, Gold 3.
    pub fn rank(self) -> u8 {
        match self {
            Self::Unrated => 0,
            Self::Bronze => 1,
            Self::Silver => 2,
            Self::Gold => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unrated => "Unrated",
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
        }
    }

    /// Parse a badge name as stored in unlock conditions.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "unrated" | "" => Some(Self::Unrated),
            "bronze" => Some(Self::Bronze),
            "silver" => Some(Self::Silver),
            "gold" => Some(Self::Gold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Accumulated study signal for one (user, concept) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConceptProgress {
    #[serde(default)]
    pub times_studied: u32,
    #[serde(default)]
    pub minutes: u32,
    /// Last normalized score, 0-100.
    #[serde(default)]
    pub recent_score: Option<u32>,
    /// Exponential moving average of scores, 0-100.
    #[serde(default)]
    pub moving_average_score: Option<u32>,
    #[serde(default)]
    pub lessons_completed: u32,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_studied_at: Option<NaiveDate>,
}

/// One study session as reported by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub minutes: f64,
    /// Either a 0-1 fraction or a 0-100 score.
    pub score: Option<f64>,
    pub completed: bool,
    /// Lesson the session completed, if any.
    pub lesson_id: Option<LessonId>,
    pub when: DateTime<Utc>,
}

impl Session {
    /// A session at `when` with nothing else recorded.
    pub fn at(when: DateTime<Utc>) -> Self {
        Self {
            minutes: 0.0,
            score: None,
            completed: false,
            lesson_id: None,
            when,
        }
    }

    pub fn minutes(mut self, minutes: f64) -> Self {
        self.minutes = minutes;
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    pub fn lesson(mut self, lesson_id: impl Into<String>) -> Self {
        self.lesson_id = Some(lesson_id.into());
        self
    }
}

/// Map a raw score onto 0-100. Values at or below 1 are fractions.
pub fn normalize_score(raw: f64) -> Option<u32> {
    if !raw.is_finite() {
        return None;
    }
    let scaled = if raw <= 1.0 { raw * 100.0 } else { raw };
    Some(scaled.clamp(0.0, 100.0).round() as u32)
}

/// Fold one session into a progress entry.
pub fn apply_session(progress: &mut UserConceptProgress, session: &Session) {
    progress.times_studied = progress.times_studied.saturating_add(1);

    let minutes = if session.minutes.is_finite() {
        session.minutes.round().max(0.0) as u32
    } else {
        0
    };
    progress.minutes = progress.minutes.saturating_add(minutes);

    if let Some(score) = session.score.and_then(normalize_score) {
        progress.recent_score = Some(score);
        progress.moving_average_score = Some(match progress.moving_average_score {
            Some(avg) => {
                let blended = EMA_ALPHA * score as f64 + (1.0 - EMA_ALPHA) * avg as f64;
                blended.round().clamp(0.0, 100.0) as u32
            }
            None => score,
        });
    }

    if session.completed {
        progress.lessons_completed = progress.lessons_completed.saturating_add(1);
    }

    let day = session.when.date_naive();
    match progress.last_studied_at {
        None => {
            progress.streak = 1;
            progress.last_studied_at = Some(day);
        }
        Some(last) => {
            let gap = day.signed_duration_since(last).num_days();
            match gap {
                0 => progress.streak = progress.streak.max(1),
                1 => {
                    progress.streak = progress.streak.saturating_add(1);
                    progress.last_studied_at = Some(day);
                }
                g if g > 1 => {
                    progress.streak = 1;
                    progress.last_studied_at = Some(day);
                }
                // back-dated session: streak and last date stay put
                _ => {}
            }
        }
    }
}

/// Tier for a progress entry. Checks run Gold, Silver, Bronze in that order.
pub fn compute_mastery_tier(progress: &UserConceptProgress) -> Tier {
    let lessons = progress.lessons_completed;
    let avg = progress.moving_average_score.unwrap_or(0);

    if lessons >= 3 || avg >= 85 {
        Tier::Gold
    } else if lessons >= 2 && avg >= 75 {
        Tier::Silver
    } else if lessons >= 1 || avg >= 60 {
        Tier::Bronze
    } else {
        Tier::Unrated
    }
}

/// Whole-map progress snapshot for one user, read and written as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    #[serde(default)]
    pub concepts: BTreeMap<ConceptId, UserConceptProgress>,
    #[serde(default)]
    pub completed_lessons: BTreeSet<LessonId>,
}

impl UserProgress {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.completed_lessons.is_empty()
    }

    pub fn tier(&self, concept_id: &str) -> Tier {
        self.concepts
            .get(concept_id)
            .map(compute_mastery_tier)
            .unwrap_or_default()
    }

    pub fn tiers(&self) -> TierMap {
        TierMap(
            self.concepts
                .iter()
                .map(|(id, p)| (id.clone(), compute_mastery_tier(p)))
                .collect(),
        )
    }

    pub fn has_completed(&self, lesson_id: &str) -> bool {
        self.completed_lessons.contains(lesson_id)
    }
}

/// Tiers per concept for one user. Missing concepts are Unrated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierMap(BTreeMap<ConceptId, Tier>);

impl TierMap {
    pub fn get(&self, concept_id: &str) -> Tier {
        self.0.get(concept_id).copied().unwrap_or_default()
    }

    pub fn is_gold(&self, concept_id: &str) -> bool {
        self.get(concept_id) == Tier::Gold
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConceptId, &Tier)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ConceptId, Tier)> for TierMap {
    fn from_iter<I: IntoIterator<Item = (ConceptId, Tier)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 15, 30, 0).unwrap()
    }

    fn progress(lessons: u32, avg: Option<u32>) -> UserConceptProgress {
        UserConceptProgress {
            lessons_completed: lessons,
            moving_average_score: avg,
            ..Default::default()
        }
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(compute_mastery_tier(&progress(3, Some(40))), Tier::Gold);
        assert_eq!(compute_mastery_tier(&progress(0, Some(85))), Tier::Gold);
        assert_eq!(compute_mastery_tier(&progress(2, Some(75))), Tier::Silver);
        assert_eq!(compute_mastery_tier(&progress(1, Some(65))), Tier::Bronze);
        assert_eq!(compute_mastery_tier(&progress(2, Some(74))), Tier::Bronze);
        assert_eq!(compute_mastery_tier(&progress(0, Some(60))), Tier::Bronze);
        assert_eq!(compute_mastery_tier(&progress(0, Some(59))), Tier::Unrated);
        assert_eq!(compute_mastery_tier(&progress(0, None)), Tier::Unrated);
    }

    #[test]
    fn test_tier_parse_and_rank() {
        assert_eq!(Tier::parse("none"), Some(Tier::Unrated));
        assert_eq!(Tier::parse("Silver"), Some(Tier::Silver));
        assert_eq!(Tier::parse("platinum"), None);
        assert!(Tier::Gold.rank() > Tier::Silver.rank());
        assert!(Tier::Bronze > Tier::Unrated);
        let badge: Tier = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(badge, Tier::Unrated);
    }

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(0.9), Some(90));
        assert_eq!(normalize_score(1.0), Some(100));
        assert_eq!(normalize_score(72.4), Some(72));
        assert_eq!(normalize_score(140.0), Some(100));
        assert_eq!(normalize_score(-3.0), Some(0));
        assert_eq!(normalize_score(f64::NAN), None);
    }

    #[test]
    fn test_ema_from_fraction() {
        let mut p = progress(0, Some(50));
        p.last_studied_at = Some(day(1).date_naive());
        apply_session(&mut p, &Session::at(day(1)).score(0.9));
        assert_eq!(p.moving_average_score, Some(62));
        assert_eq!(p.recent_score, Some(90));
    }

    #[test]
    fn test_first_score_seeds_average() {
        let mut p = UserConceptProgress::default();
        apply_session(&mut p, &Session::at(day(1)).score(70.0).minutes(12.6).completed());
        assert_eq!(p.moving_average_score, Some(70));
        assert_eq!(p.minutes, 13);
        assert_eq!(p.times_studied, 1);
        assert_eq!(p.lessons_completed, 1);
    }

    #[test]
    fn test_negative_minutes_ignored() {
        let mut p = UserConceptProgress::default();
        apply_session(&mut p, &Session::at(day(1)).minutes(-5.0));
        assert_eq!(p.minutes, 0);
        assert_eq!(p.times_studied, 1);
    }

    #[test]
    fn test_streak_rules() {
        let mut p = UserConceptProgress::default();
        apply_session(&mut p, &Session::at(day(1)));
        assert_eq!(p.streak, 1);

        apply_session(&mut p, &Session::at(day(1)));
        assert_eq!(p.streak, 1);

        apply_session(&mut p, &Session::at(day(2)));
        apply_session(&mut p, &Session::at(day(3)));
        assert_eq!(p.streak, 3);

        apply_session(&mut p, &Session::at(day(6)));
        assert_eq!(p.streak, 1);
        assert_eq!(p.last_studied_at, Some(day(6).date_naive()));
    }

    #[test]
    fn test_backdated_session_keeps_streak() {
        let mut p = UserConceptProgress::default();
        apply_session(&mut p, &Session::at(day(5)));
        apply_session(&mut p, &Session::at(day(6)));
        apply_session(&mut p, &Session::at(day(2)));
        assert_eq!(p.streak, 2);
        assert_eq!(p.last_studied_at, Some(day(6).date_naive()));
    }

    #[test]
    fn test_tier_map_defaults_to_unrated() {
        let mut user = UserProgress::default();
        user.concepts.insert("a".into(), progress(3, None));
        let tiers = user.tiers();
        assert!(tiers.is_gold("a"));
        assert_eq!(tiers.get("b"), Tier::Unrated);
        assert_eq!(user.tier("a"), Tier::Gold);
    }

    proptest! {
        #[test]
        fn test_tier_monotonic_in_score(lessons in 0u32..6, avg in 0u32..100, bump in 0u32..50) {
            let low = compute_mastery_tier(&progress(lessons, Some(avg)));
            let high = compute_mastery_tier(&progress(lessons, Some((avg + bump).min(100))));
            prop_assert!(high >= low);
        }

        #[test]
        fn test_tier_monotonic_in_lessons(lessons in 0u32..6, avg in 0u32..=100, bump in 0u32..4) {
            let low = compute_mastery_tier(&progress(lessons, Some(avg)));
            let high = compute_mastery_tier(&progress(lessons + bump, Some(avg)));
            prop_assert!(high >= low);
        }

        #[test]
        fn test_ema_stays_in_bounds(scores in prop::collection::vec(-50.0f64..250.0, 1..40)) {
            let mut p = UserConceptProgress::default();
            for s in scores {
                apply_session(&mut p, &Session::at(day(1)).score(s));
                let avg = p.moving_average_score.unwrap();
                prop_assert!(avg <= 100);
            }
        }

        #[test]
        fn test_streak_never_zero(gaps in prop::collection::vec(0i64..5, 1..20)) {
            let mut p = UserConceptProgress::default();
            let mut when = day(1);
            for gap in gaps {
                when = when + chrono::Duration::days(gap);
                let before = p.streak;
                apply_session(&mut p, &Session::at(when));
                prop_assert!(p.streak >= 1);
                if gap == 1 {
                    prop_assert_eq!(p.streak, before + 1);
                } else if gap > 1 {
                    prop_assert_eq!(p.streak, 1);
                }
            }
        }
    }
}
