//! Progress persistence boundary.

use super::UserProgress;
use crate::error::{StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-user progress persistence. Reads and writes whole snapshots.
///
/// A user with nothing stored loads as an empty [`UserProgress`]. Stored data
/// that cannot be decoded is a [`StorageError::Corrupt`], never an empty
/// default.
pub trait ProgressStore: Send + Sync {
    fn load(&self, user_id: &str) -> StorageResult<UserProgress>;

    fn save(&self, user_id: &str, progress: &UserProgress) -> StorageResult<()>;

    /// Remove everything stored for a user.
    fn clear(&self, user_id: &str) -> StorageResult<()>;
}

/// In-process store that keeps each snapshot as serialized JSON, the way a
/// browser local-storage cache would.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw stored text for a user, bypassing serialization.
    pub fn with_raw(self, user_id: impl Into<String>, raw: impl Into<String>) -> Self {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(user_id.into(), raw.into());
        }
        self
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("progress store lock poisoned".to_string())
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self, user_id: &str) -> StorageResult<UserProgress> {
        let entries = self.entries.read().map_err(poisoned)?;
        match entries.get(user_id) {
            None => Ok(UserProgress::default()),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| StorageError::corrupt(format!("progress for {}", user_id), e)),
        }
    }

    fn save(&self, user_id: &str, progress: &UserProgress) -> StorageResult<()> {
        let raw = serde_json::to_string(progress)?;
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(user_id.to_string(), raw);
        Ok(())
    }

    fn clear(&self, user_id: &str) -> StorageResult<()> {
        self.entries.write().map_err(poisoned)?.remove(user_id);
        Ok(())
    }
}
