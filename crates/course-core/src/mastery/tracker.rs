//! Session recording on top of a [`ProgressStore`].

use super::{apply_session, ProgressStore, Session, Tier, TierMap, UserConceptProgress, UserProgress};
use crate::error::StorageResult;
use tracing::debug;

/// Records sessions and answers tier questions for users.
///
/// Each write loads the user's full snapshot, changes one entry and saves the
/// full snapshot back. There is no version check, so two writers for the same
/// user race and the last save wins.
#[derive(Debug)]
pub struct MasteryTracker<S: ProgressStore> {
    store: S,
}

impl<S: ProgressStore> MasteryTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a study session and return the updated entry.
    pub fn record_session(
        &self,
        user_id: &str,
        concept_id: &str,
        session: &Session,
    ) -> StorageResult<UserConceptProgress> {
        let mut snapshot = self.store.load(user_id)?;
        let entry = snapshot.concepts.entry(concept_id.to_string()).or_default();
        apply_session(entry, session);
        let updated = entry.clone();

        if session.completed {
            if let Some(lesson_id) = &session.lesson_id {
                snapshot.completed_lessons.insert(lesson_id.clone());
            }
        }

        self.store.save(user_id, &snapshot)?;
        debug!(
            user = user_id,
            concept = concept_id,
            streak = updated.streak,
            average = ?updated.moving_average_score,
            "session recorded"
        );
        Ok(updated)
    }

    pub fn progress(&self, user_id: &str) -> StorageResult<UserProgress> {
        self.store.load(user_id)
    }

    pub fn concept_progress(
        &self,
        user_id: &str,
        concept_id: &str,
    ) -> StorageResult<Option<UserConceptProgress>> {
        Ok(self.store.load(user_id)?.concepts.remove(concept_id))
    }

    pub fn tier(&self, user_id: &str, concept_id: &str) -> StorageResult<Tier> {
        Ok(self.store.load(user_id)?.tier(concept_id))
    }

    pub fn tiers(&self, user_id: &str) -> StorageResult<TierMap> {
        Ok(self.store.load(user_id)?.tiers())
    }

    /// Bulk-clear a user's progress.
    pub fn clear(&self, user_id: &str) -> StorageResult<()> {
        self.store.clear(user_id)
    }
}
