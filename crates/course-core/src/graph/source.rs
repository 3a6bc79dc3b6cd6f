//! Where the canonical graph comes from.

use super::RawGraph;
use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};

/// Supplies the raw concept records and edges at load time.
pub trait GraphSource: Send + Sync {
    /// Fetch the whole graph.
    fn fetch(&self) -> StorageResult<RawGraph>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        "graph source".to_string()
    }
}

/// A JSON file holding `{ "concepts": [...], "edges": [...] }`.
#[derive(Debug, Clone)]
pub struct JsonGraphSource {
    path: PathBuf,
}

impl JsonGraphSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GraphSource for JsonGraphSource {
    fn fetch(&self) -> StorageResult<RawGraph> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(self.path.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        serde_json::from_str(&content)
            .map_err(|e| StorageError::corrupt(format!("graph file {}", self.path.display()), e))
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// An in-memory graph, used for tests and seeded demos.
#[derive(Debug, Clone, Default)]
pub struct StaticGraphSource {
    graph: RawGraph,
}

impl StaticGraphSource {
    pub fn new(graph: RawGraph) -> Self {
        Self { graph }
    }
}

impl GraphSource for StaticGraphSource {
    fn fetch(&self) -> StorageResult<RawGraph> {
        Ok(self.graph.clone())
    }

    fn describe(&self) -> String {
        format!("static:{} concepts", self.graph.concepts.len())
    }
}
