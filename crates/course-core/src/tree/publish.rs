//! Publishing trees into the public catalog.
//!
//! A catalog entry is a denormalized copy of the tree taken at publish time.
//! It is not kept in sync; republishing overwrites it and bumps the version.

use super::{CourseTree, ValidationOptions};
use crate::error::{PublishError, StorageError, StorageResult};
use crate::graph::ConceptIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// A published snapshot of a course tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub tree: CourseTree,
    pub published_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn id(&self) -> &str {
        &self.tree.id
    }

    pub fn version(&self) -> u32 {
        self.tree.version
    }
}

/// Public catalog keyed by tree id.
///
/// Writes carry the version the writer last saw (`None` for "no entry yet");
/// a store must refuse the write with [`StorageError::Conflict`] when the
/// stored version differs.
pub trait CatalogStore: Send + Sync {
    fn get(&self, id: &str) -> StorageResult<Option<CatalogEntry>>;

    fn put(&self, entry: &CatalogEntry, expected_version: Option<u32>) -> StorageResult<()>;

    fn remove(&self, id: &str, expected_version: u32) -> StorageResult<()>;

    fn list(&self) -> StorageResult<Vec<CatalogEntry>>;
}

/// Build the entry that publishing `tree` over `prior` would store.
///
/// Version is `prior + 1` or 1, `created_at` is inherited from the prior
/// entry, `updated_at` is `now`.
pub fn prepare_entry(tree: &CourseTree, prior: Option<&CatalogEntry>, now: DateTime<Utc>) -> CatalogEntry {
    let mut snapshot = tree.clone();
    match prior {
        Some(prior) => {
            snapshot.version = prior.version().saturating_add(1);
            snapshot.created_at = prior.tree.created_at;
        }
        None => snapshot.version = 1,
    }
    snapshot.updated_at = now;
    CatalogEntry {
        tree: snapshot,
        published_at: now,
    }
}

/// Validate `tree` and write it to the catalog.
pub fn publish(
    tree: &CourseTree,
    concepts: &dyn ConceptIndex,
    options: &ValidationOptions,
    store: &dyn CatalogStore,
) -> Result<CatalogEntry, PublishError> {
    let report = tree.validate(concepts, options);
    if !report.ok {
        return Err(PublishError::Invalid(report.errors));
    }

    let prior = store.get(&tree.id)?;
    let expected = prior.as_ref().map(CatalogEntry::version);
    let entry = prepare_entry(tree, prior.as_ref(), Utc::now());

    if let Err(err) = store.put(&entry, expected) {
        if err.is_conflict() {
            warn!(tree = %tree.id, ?expected, "publish lost a version race");
        }
        return Err(err.into());
    }

    info!(tree = %tree.id, version = entry.version(), "tree published");
    Ok(entry)
}

/// Remove a tree from the catalog. Returns the removed entry, if any.
pub fn unpublish(id: &str, store: &dyn CatalogStore) -> Result<Option<CatalogEntry>, PublishError> {
    let Some(current) = store.get(id)? else {
        return Ok(None);
    };
    store.remove(id, current.version())?;
    info!(tree = id, version = current.version(), "tree unpublished");
    Ok(Some(current))
}

/// In-process catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    entries: RwLock<BTreeMap<String, CatalogEntry>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("catalog lock poisoned".to_string())
}

fn check_version(id: &str, expected: Option<u32>, found: Option<u32>) -> StorageResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(StorageError::Conflict {
            id: id.to_string(),
            expected,
            found,
        })
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn get(&self, id: &str) -> StorageResult<Option<CatalogEntry>> {
        Ok(self.entries.read().map_err(poisoned)?.get(id).cloned())
    }

    fn put(&self, entry: &CatalogEntry, expected_version: Option<u32>) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let found = entries.get(entry.id()).map(CatalogEntry::version);
        check_version(entry.id(), expected_version, found)?;
        entries.insert(entry.id().to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, id: &str, expected_version: u32) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let found = entries.get(id).map(CatalogEntry::version);
        check_version(id, Some(expected_version), found)?;
        entries.remove(id);
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<CatalogEntry>> {
        Ok(self.entries.read().map_err(poisoned)?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptNode, GraphSnapshot};
    use crate::tree::TreeMeta;

    fn concepts() -> GraphSnapshot {
        GraphSnapshot::from_nodes(vec![ConceptNode::new("a", "A"), ConceptNode::new("b", "B")])
    }

    fn tree() -> CourseTree {
        let mut t = CourseTree::create(
            "creator",
            TreeMeta {
                title: "Fractions".into(),
                tags: vec!["math".into(), "grade-4".into()],
                ..Default::default()
            },
        );
        t.add_node("a");
        t.add_node("b");
        t.connect_nodes("a", "b").unwrap();
        t
    }

    #[test]
    fn test_first_publish_is_version_one() {
        let store = MemoryCatalogStore::new();
        let source = tree();
        let entry = publish(&source, &concepts(), &ValidationOptions::default(), &store).unwrap();
        assert_eq!(entry.version(), 1);

        let read_back = store.get(&source.id).unwrap().unwrap();
        assert_eq!(read_back.tree.nodes, source.nodes);
        assert_eq!(read_back.tree.title, source.title);
        assert_eq!(read_back.tree.tags, source.tags);
    }

    #[test]
    fn test_republish_bumps_version_and_keeps_created_at() {
        let store = MemoryCatalogStore::new();
        let mut source = tree();
        let first = publish(&source, &concepts(), &ValidationOptions::default(), &store).unwrap();

        source.title = "Fractions II".into();
        source.created_at = Utc::now();
        let second = publish(&source, &concepts(), &ValidationOptions::default(), &store).unwrap();

        assert_eq!(second.version(), 2);
        assert_eq!(second.tree.created_at, first.tree.created_at);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.get(&source.id).unwrap().unwrap().tree.title, "Fractions II");
    }

    #[test]
    fn test_invalid_tree_is_not_published() {
        let store = MemoryCatalogStore::new();
        let mut source = tree();
        source.node_mut("b").unwrap().next_ids.push("zzz".into());
        let err = publish(&source, &concepts(), &ValidationOptions::default(), &store).unwrap_err();
        assert!(matches!(err, PublishError::Invalid(ref errors) if errors.len() == 1));
        assert!(store.get(&source.id).unwrap().is_none());
    }

    #[test]
    fn test_stale_writer_gets_conflict() {
        let store = MemoryCatalogStore::new();
        let source = tree();
        publish(&source, &concepts(), &ValidationOptions::default(), &store).unwrap();

        // a second session prepared its write against "no entry yet"
        let stale = prepare_entry(&source, None, Utc::now());
        let err = store.put(&stale, None).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict { expected: None, found: Some(1), .. }
        ));
    }

    #[test]
    fn test_unpublish() {
        let store = MemoryCatalogStore::new();
        let source = tree();
        publish(&source, &concepts(), &ValidationOptions::default(), &store).unwrap();

        let removed = unpublish(&source.id, &store).unwrap();
        assert_eq!(removed.map(|e| e.version()), Some(1));
        assert!(unpublish(&source.id, &store).unwrap().is_none());
        assert!(store.remove(&source.id, 1).is_err());
    }
}
