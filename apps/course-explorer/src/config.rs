//! Configuration for course explorer.

use course_core::{CyclePolicy, LayoutConfig, LayoutMode, NodeSize, PathOptions, ValidationOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APP_NAME: &str = "course-explorer";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the graph, lessons and database live.
    #[serde(default)]
    pub data: DataConfig,
    /// The learner whose progress is shown.
    #[serde(default)]
    pub learner: LearnerConfig,
    /// Canvas settings.
    #[serde(default)]
    pub layout: LayoutSection,
    /// Tree validation.
    #[serde(default)]
    pub validation: ValidationSection,
}

impl Config {
    /// Load configuration from default path. A missing file yields defaults;
    /// a file that does not parse is reported and also yields defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            debug!(path = %path.display(), "no config file; using defaults");
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config did not parse; using defaults");
                Self::default()
            }
        }
    }

    /// Save configuration to default path.
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(self)?;
            std::fs::write(path, content)?;
        }
        Ok(())
    }

    /// Get configuration file path.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().join("config.toml"))
    }

    /// Directory for the database and log file.
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.data_dir().to_path_buf())
    }

    /// Get database path, honoring the `[data]` override.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.data
            .database
            .clone()
            .or_else(|| Self::data_dir().map(|d| d.join("courses.db")))
    }

    pub fn path_options(&self) -> PathOptions {
        PathOptions {
            skip_gold: self.learner.skip_gold,
            ..Default::default()
        }
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            cycles: self.validation.cycles,
        }
    }
}

/// Data file locations. Unset paths fall back to the built-in demo course.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Concept graph JSON (`{ "concepts": [...], "edges": [...] }`).
    #[serde(default)]
    pub graph: Option<PathBuf>,
    /// Lesson catalog JSON.
    #[serde(default)]
    pub lessons: Option<PathBuf>,
    /// Behavior edges JSON.
    #[serde(default)]
    pub behavior: Option<PathBuf>,
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    #[serde(default = "default_user")]
    pub user_id: String,
    /// Route around concepts already at Gold.
    #[serde(default = "default_true")]
    pub skip_gold: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            user_id: default_user(),
            skip_gold: true,
        }
    }
}

fn default_user() -> String {
    "local".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSection {
    /// Mode for newly created trees.
    #[serde(default)]
    pub mode: LayoutMode,
    #[serde(default = "default_level_spacing")]
    pub level_spacing: f64,
    #[serde(default = "default_sibling_spacing")]
    pub sibling_spacing: f64,
    #[serde(default = "default_node_width")]
    pub node_width: f64,
    #[serde(default = "default_node_height")]
    pub node_height: f64,
    #[serde(default = "default_grid")]
    pub grid: f64,
    /// Snap dragged nodes to the grid on release.
    #[serde(default = "default_true")]
    pub snap: bool,
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            mode: LayoutMode::default(),
            level_spacing: default_level_spacing(),
            sibling_spacing: default_sibling_spacing(),
            node_width: default_node_width(),
            node_height: default_node_height(),
            grid: default_grid(),
            snap: true,
        }
    }
}

impl LayoutSection {
    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            level_spacing: self.level_spacing,
            sibling_spacing: self.sibling_spacing,
            node_size: NodeSize {
                width: self.node_width,
                height: self.node_height,
            },
            grid: self.grid,
        }
    }
}

fn default_level_spacing() -> f64 {
    LayoutConfig::default().level_spacing
}

fn default_sibling_spacing() -> f64 {
    LayoutConfig::default().sibling_spacing
}

fn default_node_width() -> f64 {
    NodeSize::default().width
}

fn default_node_height() -> f64 {
    NodeSize::default().height
}

fn default_grid() -> f64 {
    LayoutConfig::default().grid
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSection {
    /// `allow` or `reject` multi-hop cycles in course links.
    #[serde(default)]
    pub cycles: CyclePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.learner.user_id, "local");
        assert!(config.learner.skip_gold);
        assert!(config.layout.snap);
        assert_eq!(config.layout.layout_config(), LayoutConfig::default());
        assert_eq!(config.validation.cycles, CyclePolicy::Allow);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [learner]
            user_id = "ana"
            skip_gold = false

            [layout]
            mode = "left-right"
            grid = 10.0

            [validation]
            cycles = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(config.learner.user_id, "ana");
        assert!(!config.path_options().skip_gold);
        assert_eq!(config.layout.mode, LayoutMode::LeftRight);
        assert_eq!(config.layout.layout_config().grid, 10.0);
        assert_eq!(config.layout.level_spacing, 140.0);
        assert_eq!(config.validation_options().cycles, CyclePolicy::Reject);
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[learner\nuser_id = 3").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.learner.user_id, "local");
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"));
        assert!(config.data.graph.is_none());
    }

    #[test]
    fn test_database_override() {
        let config: Config = toml::from_str("[data]\ndatabase = \"/tmp/x.db\"").unwrap();
        assert_eq!(config.db_path(), Some(PathBuf::from("/tmp/x.db")));
    }
}
