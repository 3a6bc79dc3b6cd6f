//! Application state and logic.

use crate::config::{Config, DataConfig};
use crate::db::{Database, SqliteCatalogStore, SqliteProgressStore};
use crate::demo;
use chrono::Utc;
use course_core::path::EXPLORE_MINUTES;
use course_core::tree::{publish, unpublish};
use course_core::{
    missing_requirements, BehaviorEdge, CatalogEntry, CatalogStore, ConceptId, CourseTree, GraphSnapshot,
    GraphStore, GraphSurface, JsonGraphSource, LearningPath, Lesson, LessonCatalog, MasteryTracker,
    NodeStatus, PathGenerator, PublishError, RenderTick, Session, StaticGraphSource, StorageError,
    StorageResult, SurfaceEvent, SurfaceMode, Tick, Tier, TierMap, TreeNode, UnlockRules,
    UserConceptProgress, UserProgress,
};
use course_widgets::GraphViewState;
use crossterm::event::{KeyCode, KeyEvent, MouseEvent};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Read-only course content shared with background planning.
#[derive(Debug, Clone)]
pub struct Content {
    pub graph: Arc<GraphSnapshot>,
    pub lessons: Arc<LessonCatalog>,
    pub behavior: Arc<Vec<BehaviorEdge>>,
}

impl Content {
    /// Load configured files; unset paths use the demo course.
    pub fn load(data: &DataConfig) -> anyhow::Result<Self> {
        let mut store = match &data.graph {
            Some(path) => GraphStore::new(JsonGraphSource::new(path)),
            None => GraphStore::new(StaticGraphSource::new(demo::graph())),
        };
        let graph = store.load()?;
        let lessons = match &data.lessons {
            Some(path) => LessonCatalog::from_json(path)?,
            None => demo::lessons(),
        };
        let behavior = match &data.behavior {
            Some(path) => load_behavior(path)?,
            None => Vec::new(),
        };
        Ok(Self {
            graph,
            lessons: Arc::new(lessons),
            behavior: Arc::new(behavior),
        })
    }

    pub fn demo() -> Self {
        Self {
            graph: Arc::new(GraphSnapshot::from_raw(demo::graph())),
            lessons: Arc::new(demo::lessons()),
            behavior: Arc::new(Vec::new()),
        }
    }

    pub fn title<'a>(&'a self, concept_id: &'a str) -> &'a str {
        self.graph
            .get(concept_id)
            .map(|c| c.title.as_str())
            .unwrap_or(concept_id)
    }
}

/// Behavior edges file: a JSON array of `{sourceConceptId, targetConceptId, count}`.
pub fn load_behavior(path: &Path) -> StorageResult<Vec<BehaviorEdge>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| StorageError::corrupt(format!("behavior file {}", path.display()), e))
}

/// Custom unlock rules a tree node can name.
pub fn builtin_rules() -> UnlockRules {
    let mut rules = UnlockRules::new();
    rules.register("gold-prerequisites", |node: &TreeNode, tiers: &TierMap| {
        node.unlock_conditions
            .required_concept_ids
            .iter()
            .all(|id| tiers.is_gold(id))
    });
    rules
}

/// Current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Course canvas.
    Tree,
    /// Tier table.
    Progress,
    /// Planned route to the goals.
    Path,
    /// Published courses.
    Catalog,
}

impl View {
    pub const ALL: [View; 4] = [View::Tree, View::Progress, View::Path, View::Catalog];

    pub fn title(self) -> &'static str {
        match self {
            View::Tree => "Tree",
            View::Progress => "Progress",
            View::Path => "Path",
            View::Catalog => "Catalog",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|v| *v == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Text input in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Score for a study session that completes the concept's next lesson.
    Score(ConceptId),
    /// Score for a practice session; no lesson is completed.
    Practice(ConceptId),
}

impl InputMode {
    pub fn concept(&self) -> Option<&str> {
        match self {
            InputMode::Normal => None,
            InputMode::Score(id) | InputMode::Practice(id) => Some(id),
        }
    }
}

/// Message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Success,
    Warning,
    Error,
}

/// Confirmation dialog.
#[derive(Debug, Clone)]
pub struct ConfirmDialog {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
}

/// Confirm action type.
#[derive(Debug, Clone)]
pub enum ConfirmAction {
    ClearProgress,
    Unpublish(String),
}

/// Result of a background path computation.
#[derive(Debug)]
pub struct PathUpdate {
    pub tick: Tick,
    pub path: LearningPath,
}

/// One row of the progress table.
#[derive(Debug, Clone)]
pub struct ProgressRow {
    pub concept_id: ConceptId,
    pub title: String,
    pub status: NodeStatus,
    pub tier: Tier,
    pub entry: UserConceptProgress,
}

/// Lesson line in the node detail panel.
#[derive(Debug, Clone)]
pub struct LessonLine {
    pub step: u32,
    pub icon: &'static str,
    pub title: String,
    pub minutes: u32,
    pub done: bool,
}

/// Everything the detail panel shows for the selected node.
#[derive(Debug, Clone)]
pub struct NodeDetail {
    pub concept_id: ConceptId,
    pub title: String,
    pub summary: String,
    pub status: NodeStatus,
    pub min_badge: Tier,
    pub missing: Vec<String>,
    pub lessons: Vec<LessonLine>,
    pub entry: UserConceptProgress,
    pub is_goal: bool,
}

/// Application state.
pub struct App {
    pub config: Config,
    db: Database,
    tracker: MasteryTracker<SqliteProgressStore>,
    catalog_store: SqliteCatalogStore,
    pub content: Content,
    rules: UnlockRules,
    pub view: View,
    pub trees: Vec<CourseTree>,
    pub current_tree: usize,
    pub graph_state: GraphViewState,
    /// Node labels, aligned with the current tree's nodes.
    pub labels: Vec<String>,
    /// Node statuses, aligned with the current tree's nodes.
    pub statuses: Vec<NodeStatus>,
    pub progress: UserProgress,
    pub progress_index: usize,
    pub goals: Vec<ConceptId>,
    pub path: Option<LearningPath>,
    pub path_index: usize,
    /// A path request is in flight.
    pub planning: bool,
    tick: RenderTick,
    path_tx: mpsc::UnboundedSender<PathUpdate>,
    path_rx: mpsc::UnboundedReceiver<PathUpdate>,
    pub catalog: Vec<CatalogEntry>,
    pub catalog_index: usize,
    /// Start of the next link drawn in edit mode.
    pub link_source: Option<ConceptId>,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub message: Option<(String, MessageType)>,
    pub show_help: bool,
    pub confirm_dialog: Option<ConfirmDialog>,
}

impl App {
    /// Create the application from the user's config and data directory.
    pub fn new() -> anyhow::Result<Self> {
        let config = Config::load();
        if Config::config_path().is_some_and(|p| !p.exists()) {
            if let Err(e) = config.save() {
                warn!(error = %e, "could not write default config");
            }
        }

        let db_path = config.db_path().unwrap_or_else(|| "courses.db".into());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&db_path)?;
        let content = Content::load(&config.data)?;

        Self::with_parts(config, db, content)
    }

    /// Create the application over an open database. Seeds the demo course
    /// when the database holds no trees.
    pub fn with_parts(config: Config, db: Database, content: Content) -> anyhow::Result<Self> {
        if db.tree_count()? == 0 {
            let tree = demo::tree(&config.learner.user_id, config.layout.mode)?;
            db.save_tree(&tree)?;
            info!(tree = %tree.id, "seeded demo course");
        }
        let trees = db.list_trees()?;
        let tree = match trees.first() {
            Some(tree) => tree,
            None => anyhow::bail!("no course trees available"),
        };

        let graph_state = new_graph_state(tree, &config);
        let (path_tx, path_rx) = mpsc::unbounded_channel();

        let mut app = Self {
            tracker: MasteryTracker::new(db.progress_store()),
            catalog_store: db.catalog_store(),
            db,
            config,
            content,
            rules: builtin_rules(),
            view: View::Tree,
            trees,
            current_tree: 0,
            graph_state,
            labels: Vec::new(),
            statuses: Vec::new(),
            progress: UserProgress::default(),
            progress_index: 0,
            goals: Vec::new(),
            path: None,
            path_index: 0,
            planning: false,
            tick: RenderTick::new(),
            path_tx,
            path_rx,
            catalog: Vec::new(),
            catalog_index: 0,
            link_source: None,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            message: None,
            show_help: false,
            confirm_dialog: None,
        };

        app.refresh_progress();
        app.refresh_catalog();
        app.refresh_nodes();
        Ok(app)
    }

    pub fn tree(&self) -> &CourseTree {
        &self.trees[self.current_tree]
    }

    pub fn user_id(&self) -> &str {
        &self.config.learner.user_id
    }

    /// Check if a text input is open.
    pub fn is_editing(&self) -> bool {
        self.input_mode != InputMode::Normal
    }

    pub fn is_edit_mode(&self) -> bool {
        self.graph_state.surface().mode() == SurfaceMode::Edit
    }

    fn set_message(&mut self, text: impl Into<String>, kind: MessageType) {
        self.message = Some((text.into(), kind));
    }

    /// Log and display a failure.
    fn report<T, E: Display>(&mut self, what: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "{}", what);
                self.set_message(format!("{}: {}", what, e), MessageType::Error);
                None
            }
        }
    }

    /// Reload the learner's progress. Corrupt data is reported and left in
    /// place; the in-memory view falls back to empty.
    pub fn refresh_progress(&mut self) {
        let loaded = self.tracker.progress(&self.config.learner.user_id);
        self.progress = self.report("Could not load progress", loaded).unwrap_or_default();
        self.refresh_statuses();
    }

    pub fn refresh_catalog(&mut self) {
        let listed = self.catalog_store.list();
        self.catalog = self.report("Could not load catalog", listed).unwrap_or_default();
        if self.catalog_index >= self.catalog.len() {
            self.catalog_index = self.catalog.len().saturating_sub(1);
        }
    }

    fn refresh_statuses(&mut self) {
        let tiers = self.progress.tiers();
        self.statuses = self.rules.tree_status(&self.trees[self.current_tree], &tiers);
    }

    /// Recompute labels and statuses after the tree changed.
    fn refresh_nodes(&mut self) {
        let content = &self.content;
        self.labels = self.trees[self.current_tree]
            .nodes
            .iter()
            .map(|n| match n.concept() {
                Some(id) => content.title(id).to_string(),
                None => "(unbound)".to_string(),
            })
            .collect();
        self.refresh_statuses();
    }

    /// Persist the current tree and rerun auto-layout, keeping the viewport.
    fn tree_changed(&mut self) {
        let tree = &mut self.trees[self.current_tree];
        tree.touch();
        self.graph_state.surface_mut().relayout(tree);
        let saved = self.db.save_tree(&self.trees[self.current_tree]);
        self.report("Could not save tree", saved);
        self.refresh_nodes();
    }

    fn switch_tree(&mut self, delta: isize) {
        let len = self.trees.len() as isize;
        if len < 2 {
            return;
        }
        self.current_tree = (self.current_tree as isize + delta).rem_euclid(len) as usize;
        self.graph_state = new_graph_state(self.tree(), &self.config);
        self.link_source = None;
        self.refresh_nodes();
        self.set_message(format!("Course: {}", self.tree().title), MessageType::Info);
    }

    /// Progress rows for every bound node of the current tree.
    pub fn progress_rows(&self) -> Vec<ProgressRow> {
        self.tree()
            .nodes
            .iter()
            .zip(&self.statuses)
            .filter_map(|(node, status)| {
                let id = node.concept()?;
                Some(ProgressRow {
                    concept_id: id.to_string(),
                    title: self.content.title(id).to_string(),
                    status: *status,
                    tier: self.progress.tier(id),
                    entry: self.progress.concepts.get(id).cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Lessons offered for a concept: the node's own list when it has one,
    /// otherwise the catalog's.
    fn concept_lessons(&self, concept_id: &str) -> Vec<(u32, &Lesson)> {
        let catalog = &self.content.lessons;
        match self.tree().node(concept_id) {
            Some(node) if node.subtree_lesson_ids.is_some() => node
                .lesson_steps()
                .into_iter()
                .filter_map(|(step, id)| catalog.get(id).map(|l| (step, l)))
                .collect(),
            _ => catalog.for_concept(concept_id).into_iter().map(|l| (1, l)).collect(),
        }
    }

    /// First lesson not yet completed, else the first lesson.
    fn next_lesson(&self, concept_id: &str) -> Option<Lesson> {
        let lessons = self.concept_lessons(concept_id);
        lessons
            .iter()
            .find(|(_, l)| !self.progress.has_completed(&l.id))
            .or_else(|| lessons.first())
            .map(|(_, l)| (*l).clone())
    }

    pub fn selected_detail(&self) -> Option<NodeDetail> {
        let index = self.graph_state.selected?;
        let node = self.tree().nodes.get(index)?;
        let concept_id = node.concept()?;
        let concept = self.content.graph.get(concept_id);
        let tiers = self.progress.tiers();

        Some(NodeDetail {
            concept_id: concept_id.to_string(),
            title: self.content.title(concept_id).to_string(),
            summary: concept.map(|c| c.summary.clone()).unwrap_or_default(),
            status: self.statuses.get(index).copied().unwrap_or(NodeStatus::Locked),
            min_badge: node.unlock_conditions.min_badge,
            missing: missing_requirements(node, &tiers)
                .iter()
                .map(|id| self.content.title(id).to_string())
                .collect(),
            lessons: self
                .concept_lessons(concept_id)
                .into_iter()
                .map(|(step, l)| LessonLine {
                    step,
                    icon: l.kind().icon(),
                    title: l.title.clone(),
                    minutes: l.minutes,
                    done: self.progress.has_completed(&l.id),
                })
                .collect(),
            entry: self.progress.concepts.get(concept_id).cloned().unwrap_or_default(),
            is_goal: self.goals.iter().any(|g| g == concept_id),
        })
    }

    /// Handle key input.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if let Some(dialog) = self.confirm_dialog.clone() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.confirm_dialog = None;
                    self.execute_confirm(dialog.action);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.confirm_dialog = None;
                }
                _ => {}
            }
            return;
        }

        if self.show_help {
            self.show_help = false;
            return;
        }

        self.message = None;

        if self.is_editing() {
            self.handle_input_key(key);
            return;
        }

        match key.code {
            KeyCode::Tab => {
                self.view = self.view.next();
                return;
            }
            KeyCode::BackTab => {
                self.view = self.view.prev();
                return;
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                return;
            }
            KeyCode::Char(c @ '1'..='4') => {
                self.view = View::ALL[c as usize - '1' as usize];
                return;
            }
            _ => {}
        }

        match self.view {
            View::Tree => self.handle_tree_key(key),
            View::Progress => self.handle_progress_key(key),
            View::Path => self.handle_path_key(key),
            View::Catalog => self.handle_catalog_key(key),
        }
    }

    /// Mouse input drives the canvas.
    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.view != View::Tree || self.confirm_dialog.is_some() || self.show_help || self.is_editing() {
            return;
        }
        if let Some(event) = self.graph_state.handle_mouse(mouse) {
            self.handle_surface_event(event);
        }
    }

    fn handle_surface_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::NodeClicked {
                concept_id: Some(id), ..
            } => {
                if self.is_edit_mode() {
                    if let Some(source) = self.link_source.clone() {
                        if source != id {
                            self.connect(&source, &id);
                        }
                    }
                }
            }
            SurfaceEvent::NodeClicked { concept_id: None, .. } => {}
            SurfaceEvent::NodeMoved {
                concept_id: Some(id),
                to,
                ..
            } => {
                let moved = self.trees[self.current_tree].set_node_position(&id, to);
                if self.report("Could not move node", moved).is_some() {
                    self.trees[self.current_tree].touch();
                    let saved = self.db.save_tree(&self.trees[self.current_tree]);
                    self.report("Could not save tree", saved);
                    debug!(concept = %id, x = to.x, y = to.y, "node position stored");
                }
            }
            SurfaceEvent::NodeMoved { concept_id: None, .. } => {
                debug!("unbound node moved; position not stored");
            }
        }
    }

    fn handle_tree_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => self.start_study(),
            KeyCode::Char('a') => self.start_practice(),
            KeyCode::Char('g') => self.toggle_goal(),
            KeyCode::Char('e') => self.toggle_edit_mode(),
            KeyCode::Char('L') => self.toggle_layout_mode(),
            KeyCode::Char('s') => {
                let enabled = !self.graph_state.surface().snap_enabled();
                self.graph_state.surface_mut().set_snap_enabled(enabled);
                self.set_message(
                    format!("Grid snap {}", if enabled { "on" } else { "off" }),
                    MessageType::Info,
                );
            }
            KeyCode::Char('P') => self.publish_current(),
            KeyCode::Char('[') => self.switch_tree(-1),
            KeyCode::Char(']') => self.switch_tree(1),
            KeyCode::Char('m') if self.is_edit_mode() => self.mark_link_source(),
            KeyCode::Char('c') if self.is_edit_mode() => {
                if let (Some(source), Some(target)) = (self.link_source.clone(), self.selected_concept()) {
                    self.connect(&source, &target);
                } else {
                    self.set_message("Mark a source with 'm', then select a target", MessageType::Warning);
                }
            }
            KeyCode::Char('x') if self.is_edit_mode() => self.disconnect_selected(),
            KeyCode::Char('r') if self.is_edit_mode() => self.reset_position(),
            _ => {
                self.graph_state.handle_key(key);
            }
        }
    }

    fn handle_progress_key(&mut self, key: KeyEvent) {
        let len = self.progress_rows().len();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if len > 0 {
                    self.progress_index = (self.progress_index + 1).min(len - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.progress_index = self.progress_index.saturating_sub(1),
            KeyCode::Char('X') => {
                self.confirm_dialog = Some(ConfirmDialog {
                    title: "Clear Progress".to_string(),
                    message: format!("Clear all progress for '{}'? (y/n)", self.user_id()),
                    action: ConfirmAction::ClearProgress,
                });
            }
            _ => {}
        }
    }

    fn handle_path_key(&mut self, key: KeyEvent) {
        let len = self.path.as_ref().map_or(0, |p| p.route.len());
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if len > 0 {
                    self.path_index = (self.path_index + 1).min(len - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.path_index = self.path_index.saturating_sub(1),
            KeyCode::Char('p') | KeyCode::Char('r') => self.request_path(),
            KeyCode::Char('c') => {
                self.goals.clear();
                self.path = None;
                self.path_index = 0;
                // invalidate anything still in flight
                self.tick.begin();
                self.planning = false;
            }
            _ => {}
        }
    }

    fn handle_catalog_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.catalog.is_empty() {
                    self.catalog_index = (self.catalog_index + 1).min(self.catalog.len() - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.catalog_index = self.catalog_index.saturating_sub(1),
            KeyCode::Char('u') | KeyCode::Char('d') => {
                if let Some(entry) = self.catalog.get(self.catalog_index) {
                    self.confirm_dialog = Some(ConfirmDialog {
                        title: "Unpublish".to_string(),
                        message: format!("Remove '{}' v{} from the catalog? (y/n)", entry.tree.title, entry.version()),
                        action: ConfirmAction::Unpublish(entry.id().to_string()),
                    });
                }
            }
            KeyCode::Char('R') => self.refresh_catalog(),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Enter => self.finish_input(),
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => self.input_buffer.push(c),
            _ => {}
        }
    }

    fn finish_input(&mut self) {
        let mode = std::mem::replace(&mut self.input_mode, InputMode::Normal);
        let raw = std::mem::take(&mut self.input_buffer);
        match mode {
            InputMode::Normal => {}
            InputMode::Score(concept_id) => match parse_score(&raw) {
                Ok(score) => self.record_study(&concept_id, score),
                Err(e) => self.set_message(e, MessageType::Error),
            },
            InputMode::Practice(concept_id) => match parse_score(&raw) {
                Ok(score) => self.record_practice(&concept_id, score),
                Err(e) => self.set_message(e, MessageType::Error),
            },
        }
    }

    fn execute_confirm(&mut self, action: ConfirmAction) {
        match action {
            ConfirmAction::ClearProgress => {
                let cleared = self.tracker.clear(&self.config.learner.user_id);
                if self.report("Could not clear progress", cleared).is_some() {
                    self.set_message("Progress cleared", MessageType::Success);
                }
                self.refresh_progress();
            }
            ConfirmAction::Unpublish(id) => {
                let removed = unpublish(&id, &self.catalog_store);
                if let Some(Some(entry)) = self.report("Could not unpublish", removed) {
                    self.set_message(format!("Unpublished '{}'", entry.tree.title), MessageType::Success);
                }
                self.refresh_catalog();
            }
        }
    }

    pub fn selected_concept(&self) -> Option<ConceptId> {
        self.graph_state.selected_concept().map(str::to_string)
    }

    /// Open the score prompt for the selected node if it is unlocked.
    pub fn start_study(&mut self) {
        if let Some(concept_id) = self.open_concept() {
            self.input_mode = InputMode::Score(concept_id);
            self.input_buffer.clear();
        }
    }

    /// Like `start_study`, but the session leaves the lesson open.
    pub fn start_practice(&mut self) {
        if let Some(concept_id) = self.open_concept() {
            self.input_mode = InputMode::Practice(concept_id);
            self.input_buffer.clear();
        }
    }

    /// The selected node's concept when it is unlocked; reports why not otherwise.
    fn open_concept(&mut self) -> Option<ConceptId> {
        let Some(index) = self.graph_state.selected else {
            self.set_message("Select a node first (n/p or click)", MessageType::Warning);
            return None;
        };
        let Some(node) = self.trees[self.current_tree].nodes.get(index) else {
            return None;
        };
        let Some(concept_id) = node.concept().map(str::to_string) else {
            self.set_message("This node has no concept yet", MessageType::Warning);
            return None;
        };

        let status = self.statuses.get(index).copied().unwrap_or(NodeStatus::Locked);
        if !status.is_open() {
            let missing = missing_requirements(node, &self.progress.tiers());
            let names: Vec<&str> = missing.iter().map(|id| self.content.title(id)).collect();
            let text = if names.is_empty() {
                "Locked by a custom rule".to_string()
            } else {
                format!("Locked: needs {} in {}", node.unlock_conditions.min_badge, names.join(", "))
            };
            self.set_message(text, MessageType::Warning);
            return None;
        }
        Some(concept_id)
    }

    /// Record a completed session on the concept's next lesson.
    pub fn record_study(&mut self, concept_id: &str, score: Option<f64>) {
        self.record(concept_id, score, true);
    }

    /// Record a practice session. Only the score and time count.
    pub fn record_practice(&mut self, concept_id: &str, score: Option<f64>) {
        self.record(concept_id, score, false);
    }

    fn record(&mut self, concept_id: &str, score: Option<f64>, completed: bool) {
        let lesson = self.next_lesson(concept_id);
        let minutes = lesson.as_ref().map_or(EXPLORE_MINUTES, |l| l.minutes);

        let mut session = Session::at(Utc::now()).minutes(f64::from(minutes));
        if completed {
            session = session.completed();
        }
        if let Some(score) = score {
            session = session.score(score);
        }
        if let Some(lesson) = &lesson {
            session = session.lesson(lesson.id.clone());
        }

        let recorded = self
            .tracker
            .record_session(&self.config.learner.user_id, concept_id, &session);
        if self.report("Could not record session", recorded).is_none() {
            return;
        }

        self.refresh_progress();
        let tier = self.progress.tier(concept_id);
        let verb = if completed { "Studied" } else { "Practiced" };
        self.set_message(
            format!("{} {}: {}", verb, self.content.title(concept_id), tier),
            MessageType::Success,
        );
        if !self.goals.is_empty() {
            self.request_path();
        }
    }

    pub fn toggle_goal(&mut self) {
        let Some(concept_id) = self.selected_concept() else {
            self.set_message("Select a node to use as a goal", MessageType::Warning);
            return;
        };
        if let Some(pos) = self.goals.iter().position(|g| *g == concept_id) {
            self.goals.remove(pos);
            self.set_message(format!("Goal removed: {}", self.content.title(&concept_id)), MessageType::Info);
        } else {
            self.set_message(format!("Goal added: {}", self.content.title(&concept_id)), MessageType::Info);
            self.goals.push(concept_id);
        }

        if self.goals.is_empty() {
            self.tick.begin();
            self.path = None;
            self.planning = false;
        } else {
            self.request_path();
        }
    }

    /// Where routes begin: the current course's first root.
    pub fn path_start(&self) -> Option<ConceptId> {
        self.trees[self.current_tree]
            .roots()
            .into_iter()
            .find(|id| self.content.graph.get(id).is_some())
            .map(str::to_string)
    }

    /// Plan a route to the goals on the blocking pool. Only the newest
    /// request's result is applied.
    pub fn request_path(&mut self) {
        if self.goals.is_empty() {
            self.set_message("No goals selected; press 'g' on a node", MessageType::Warning);
            return;
        }

        let tick = self.tick.begin();
        let start = self.path_start();
        let content = self.content.clone();
        let goals = self.goals.clone();
        let progress = self.progress.clone();
        let options = self.config.path_options();
        let tx = self.path_tx.clone();
        self.planning = true;

        tokio::task::spawn_blocking(move || {
            let path = PathGenerator::new(&content.graph, &content.lessons)
                .with_behavior(&content.behavior)
                .generate(start.as_deref(), &goals, &progress, &options);
            // the receiver lives as long as the app
            let _ = tx.send(PathUpdate { tick, path });
        });
    }

    /// Apply finished path computations. Returns true when a path was applied.
    pub fn drain_path_updates(&mut self) -> bool {
        let mut applied = false;
        while let Ok(update) = self.path_rx.try_recv() {
            if !self.tick.is_current(update.tick) {
                warn!(tick = update.tick.value(), current = self.tick.current().value(), "stale path result discarded");
                continue;
            }
            if !update.path.unreached_goals.is_empty() {
                let names: Vec<&str> = update
                    .path
                    .unreached_goals
                    .iter()
                    .map(|id| self.content.title(id))
                    .collect();
                let text = format!("No route to {}; appended at the end", names.join(", "));
                self.set_message(text, MessageType::Warning);
            }
            self.path = Some(update.path);
            self.path_index = 0;
            self.planning = false;
            applied = true;
        }
        applied
    }

    pub fn toggle_edit_mode(&mut self) {
        let mode = if self.is_edit_mode() {
            SurfaceMode::View
        } else {
            SurfaceMode::Edit
        };
        self.graph_state.surface_mut().set_mode(mode);
        self.link_source = None;
        let text = match mode {
            SurfaceMode::Edit => "Edit mode: drag nodes, m/c/x to link",
            SurfaceMode::View => "View mode",
        };
        self.set_message(text, MessageType::Info);
    }

    fn toggle_layout_mode(&mut self) {
        let tree = &mut self.trees[self.current_tree];
        tree.ui.layout_mode = tree.ui.layout_mode.toggle();
        self.tree_changed();
        self.graph_state.request_fit();
    }

    fn mark_link_source(&mut self) {
        match self.selected_concept() {
            Some(id) => {
                self.set_message(format!("Linking from {}", self.content.title(&id)), MessageType::Info);
                self.link_source = Some(id);
            }
            None => self.set_message("Select a node to link from", MessageType::Warning),
        }
    }

    fn connect(&mut self, from: &str, to: &str) {
        let linked = self.trees[self.current_tree].connect_nodes(from, to);
        match self.report("Could not link", linked) {
            Some(true) => {
                self.tree_changed();
                self.set_message(
                    format!("Linked {} -> {}", self.content.title(from), self.content.title(to)),
                    MessageType::Success,
                );
            }
            Some(false) => self.set_message("Already linked", MessageType::Info),
            None => {}
        }
    }

    fn disconnect_selected(&mut self) {
        let (Some(from), Some(to)) = (self.link_source.clone(), self.selected_concept()) else {
            self.set_message("Mark a source with 'm', then select the target to unlink", MessageType::Warning);
            return;
        };
        let unlinked = self.trees[self.current_tree].disconnect_nodes(&from, &to);
        match self.report("Could not unlink", unlinked) {
            Some(true) => {
                self.tree_changed();
                self.set_message("Link removed", MessageType::Success);
            }
            Some(false) => self.set_message("No such link", MessageType::Info),
            None => {}
        }
    }

    fn reset_position(&mut self) {
        let Some(id) = self.selected_concept() else {
            return;
        };
        let cleared = self.trees[self.current_tree].clear_node_position(&id);
        if self.report("Could not reset position", cleared).is_some() {
            self.tree_changed();
            self.set_message("Position reset to auto-layout", MessageType::Info);
        }
    }

    /// Validate the current tree and write it to the catalog.
    pub fn publish_current(&mut self) {
        let options = self.config.validation_options();
        let result = publish(self.tree(), self.content.graph.as_ref(), &options, &self.catalog_store);
        match result {
            Ok(entry) => {
                self.trees[self.current_tree].version = entry.version();
                let saved = self.db.save_tree(&self.trees[self.current_tree]);
                self.report("Could not save tree", saved);
                self.set_message(format!("Published version {}", entry.version()), MessageType::Success);
            }
            Err(PublishError::Invalid(errors)) => {
                let first = errors.first().cloned().unwrap_or_default();
                let more = errors.len().saturating_sub(1);
                let text = if more > 0 {
                    format!("Cannot publish: {} (+{} more)", first, more)
                } else {
                    format!("Cannot publish: {}", first)
                };
                self.set_message(text, MessageType::Error);
            }
            Err(PublishError::Storage(e)) if e.is_conflict() => {
                self.set_message("Catalog changed while publishing; try again", MessageType::Error);
            }
            Err(e) => {
                self.report::<(), _>("Could not publish", Err(e));
            }
        }
        self.refresh_catalog();
    }
}

fn new_graph_state(tree: &CourseTree, config: &Config) -> GraphViewState {
    let mut surface = GraphSurface::new(tree, config.layout.layout_config(), 640.0, 384.0);
    surface.set_snap_enabled(config.layout.snap);
    GraphViewState::new(surface)
}

/// Parse a typed score: empty means none, otherwise 0-100 or a 0-1 fraction.
pub fn parse_score(raw: &str) -> Result<Option<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(score) if score.is_finite() && (0.0..=100.0).contains(&score) => Ok(Some(score)),
        _ => Err(format!("Invalid score '{}': use 0-100 or a 0-1 fraction", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::Point;
    use course_testing::InputSequence;
    use std::time::Duration;

    fn app() -> App {
        App::with_parts(Config::default(), Database::in_memory().unwrap(), Content::demo()).unwrap()
    }

    fn press(app: &mut App, seq: &InputSequence) {
        for key in seq.key_events() {
            app.handle_key(key);
        }
    }

    fn select(app: &mut App, concept: &str) {
        app.graph_state.select_concept(concept);
        assert_eq!(app.selected_concept().as_deref(), Some(concept));
    }

    async fn wait_for_path(app: &mut App) {
        for _ in 0..200 {
            if app.drain_path_updates() && !app.planning {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("path never arrived");
    }

    #[test]
    fn test_seeds_demo_once() {
        let db = Database::in_memory().unwrap();
        let first = App::with_parts(Config::default(), db.clone(), Content::demo()).unwrap();
        let second = App::with_parts(Config::default(), db.clone(), Content::demo()).unwrap();
        assert_eq!(db.tree_count().unwrap(), 1);
        assert_eq!(first.tree().id, second.tree().id);
        assert_eq!(first.labels.len(), 7);
        assert_eq!(first.labels[0], "Variables");
    }

    #[test]
    fn test_initial_statuses() {
        let app = app();
        assert_eq!(app.statuses[0], NodeStatus::Available);
        assert!(app.statuses[1..].iter().all(|s| *s == NodeStatus::Locked));
    }

    #[test]
    fn test_locked_node_does_not_prompt() {
        let mut app = app();
        select(&mut app, "sorting");
        app.start_study();
        assert!(!app.is_editing());
        let (text, kind) = app.message.clone().unwrap();
        assert_eq!(kind, MessageType::Warning);
        assert!(text.contains("Silver"), "{}", text);
        assert!(text.contains("Lists"), "{}", text);
    }

    #[test]
    fn test_study_unlocks_next_nodes() {
        let mut app = app();
        select(&mut app, "variables");

        let mut seq = InputSequence::new();
        seq.enter().text("45").enter();
        press(&mut app, &seq);

        assert!(!app.is_editing());
        let entry = &app.progress.concepts["variables"];
        assert_eq!(entry.lessons_completed, 1);
        assert_eq!(entry.moving_average_score, Some(45));
        assert_eq!(app.progress.tier("variables"), Tier::Bronze);
        assert!(app.progress.has_completed("variables-intro"));

        let conditionals = app.tree().position_of("conditionals").unwrap();
        assert_eq!(app.statuses[conditionals], NodeStatus::Available);
        assert_eq!(app.statuses[0], NodeStatus::Mastered(Tier::Bronze));
    }

    #[test]
    fn test_second_session_takes_next_lesson() {
        let mut app = app();
        app.record_study("variables", None);
        app.record_study("variables", Some(0.9));
        assert!(app.progress.has_completed("variables-intro"));
        assert!(app.progress.has_completed("variables-check"));
        assert_eq!(app.progress.concepts["variables"].minutes, 18);
    }

    #[test]
    fn test_practice_leaves_lessons_open() {
        let mut app = app();
        select(&mut app, "variables");
        for _ in 0..3 {
            let mut seq = InputSequence::new();
            seq.char('a').text("0").enter();
            press(&mut app, &seq);
        }

        let entry = &app.progress.concepts["variables"];
        assert_eq!(entry.times_studied, 3);
        assert_eq!(entry.lessons_completed, 0);
        assert_eq!(entry.moving_average_score, Some(0));
        assert_eq!(app.progress.tier("variables"), Tier::Unrated);
        assert!(!app.progress.has_completed("variables-intro"));
        assert!(app.message.as_ref().unwrap().0.starts_with("Practiced"));

        // 0 -> 29 -> 49 -> 63 on the moving average
        for _ in 0..3 {
            app.record_practice("variables", Some(95.0));
        }
        assert_eq!(app.progress.concepts["variables"].moving_average_score, Some(63));
        assert_eq!(app.progress.tier("variables"), Tier::Bronze);
    }

    #[test]
    fn test_practice_on_locked_node_is_refused() {
        let mut app = app();
        select(&mut app, "loops");
        app.handle_key(KeyEvent::from(KeyCode::Char('a')));
        assert!(!app.is_editing());
        assert_eq!(app.message.as_ref().map(|m| m.1), Some(MessageType::Warning));
    }

    #[test]
    fn test_invalid_score_is_rejected() {
        let mut app = app();
        select(&mut app, "variables");
        let mut seq = InputSequence::new();
        seq.enter().text("250").enter();
        press(&mut app, &seq);
        assert!(app.progress.is_empty());
        assert_eq!(app.message.as_ref().map(|m| m.1), Some(MessageType::Error));
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(""), Ok(None));
        assert_eq!(parse_score(" 0.5 "), Ok(Some(0.5)));
        assert_eq!(parse_score("100"), Ok(Some(100.0)));
        assert!(parse_score("101").is_err());
        assert!(parse_score("1.2.3").is_err());
    }

    #[test]
    fn test_corrupt_progress_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.db");
        drop(Database::open(&path).unwrap());
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute(
                "INSERT INTO progress (user_id, snapshot, updated_at) VALUES ('local', '{\"concepts\": 3', '')",
                [],
            )
            .unwrap();

        let mut app = App::with_parts(Config::default(), Database::open(&path).unwrap(), Content::demo()).unwrap();
        assert!(app.progress.is_empty());
        let (text, kind) = app.message.clone().unwrap();
        assert_eq!(kind, MessageType::Error);
        assert!(text.contains("Corrupt"), "{}", text);

        // a failed load must not be overwritten by the next session
        app.record_study("variables", Some(50.0));
        assert_eq!(app.message.as_ref().map(|m| m.1), Some(MessageType::Error));
    }

    #[test]
    fn test_view_cycling() {
        let mut app = app();
        let mut seq = InputSequence::new();
        seq.tab().tab();
        press(&mut app, &seq);
        assert_eq!(app.view, View::Path);

        let mut seq = InputSequence::new();
        seq.tab().tab();
        press(&mut app, &seq);
        assert_eq!(app.view, View::Tree);

        app.handle_key(KeyEvent::from(KeyCode::BackTab));
        assert_eq!(app.view, View::Catalog);
        app.handle_key(KeyEvent::from(KeyCode::Char('2')));
        assert_eq!(app.view, View::Progress);
    }

    #[test]
    fn test_edit_mode_links_persist() {
        let db = Database::in_memory().unwrap();
        let mut app = App::with_parts(Config::default(), db.clone(), Content::demo()).unwrap();

        let mut seq = InputSequence::new();
        seq.char('e');
        press(&mut app, &seq);
        assert!(app.is_edit_mode());

        select(&mut app, "conditionals");
        app.handle_key(KeyEvent::from(KeyCode::Char('m')));
        select(&mut app, "recursion");
        app.handle_key(KeyEvent::from(KeyCode::Char('c')));

        let stored = db.list_trees().unwrap().remove(0);
        assert!(stored.node("conditionals").unwrap().next_ids.contains(&"recursion".to_string()));
        assert_eq!(app.graph_state.surface().layout().links.len(), 8);

        app.handle_key(KeyEvent::from(KeyCode::Char('x')));
        let stored = db.list_trees().unwrap().remove(0);
        assert!(!stored.node("conditionals").unwrap().next_ids.contains(&"recursion".to_string()));
    }

    #[test]
    fn test_self_link_is_reported() {
        let mut app = app();
        app.toggle_edit_mode();
        select(&mut app, "loops");
        app.handle_key(KeyEvent::from(KeyCode::Char('m')));
        app.handle_key(KeyEvent::from(KeyCode::Char('c')));
        assert_eq!(app.message.as_ref().map(|m| m.1), Some(MessageType::Error));
    }

    #[test]
    fn test_node_moved_is_stored() {
        let db = Database::in_memory().unwrap();
        let mut app = App::with_parts(Config::default(), db.clone(), Content::demo()).unwrap();
        app.handle_surface_event(SurfaceEvent::NodeMoved {
            index: 2,
            concept_id: Some("functions".to_string()),
            to: Point::new(400.0, 120.0),
        });
        let stored = db.list_trees().unwrap().remove(0);
        assert_eq!(stored.node("functions").unwrap().ui, Some(Point::new(400.0, 120.0)));

        select(&mut app, "functions");
        app.toggle_edit_mode();
        app.handle_key(KeyEvent::from(KeyCode::Char('r')));
        let stored = db.list_trees().unwrap().remove(0);
        assert_eq!(stored.node("functions").unwrap().ui, None);
    }

    #[test]
    fn test_layout_toggle_persists() {
        let db = Database::in_memory().unwrap();
        let mut app = App::with_parts(Config::default(), db.clone(), Content::demo()).unwrap();
        app.handle_key(KeyEvent::from(KeyCode::Char('L')));
        assert_eq!(app.tree().layout_mode(), course_core::LayoutMode::LeftRight);
        assert_eq!(db.list_trees().unwrap()[0].layout_mode(), course_core::LayoutMode::LeftRight);
    }

    #[test]
    fn test_publish_and_republish() {
        let mut app = app();
        app.publish_current();
        app.publish_current();
        assert_eq!(app.catalog.len(), 1);
        assert_eq!(app.catalog[0].version(), 2);
        assert_eq!(app.tree().version, 2);

        app.view = View::Catalog;
        app.handle_key(KeyEvent::from(KeyCode::Char('u')));
        assert!(app.confirm_dialog.is_some());
        app.handle_key(KeyEvent::from(KeyCode::Char('y')));
        assert!(app.catalog.is_empty());
    }

    #[test]
    fn test_invalid_tree_is_not_published() {
        let mut app = app();
        app.trees[0]
            .set_node_next_ids("sorting", vec!["ghost".to_string()])
            .unwrap();
        app.publish_current();
        let (text, kind) = app.message.clone().unwrap();
        assert_eq!(kind, MessageType::Error);
        assert!(text.starts_with("Cannot publish"), "{}", text);
        assert!(app.catalog.is_empty());
    }

    #[test]
    fn test_cycle_policy_from_config() {
        let mut config = Config::default();
        config.validation.cycles = course_core::CyclePolicy::Reject;
        let mut app = App::with_parts(config, Database::in_memory().unwrap(), Content::demo()).unwrap();
        app.trees[0].connect_nodes("sorting", "variables").unwrap();
        app.publish_current();
        assert!(app.catalog.is_empty());

        app.config.validation.cycles = course_core::CyclePolicy::Allow;
        app.publish_current();
        assert_eq!(app.catalog.len(), 1);
    }

    #[test]
    fn test_clear_progress_confirm() {
        let mut app = app();
        app.record_study("variables", Some(80.0));
        app.view = View::Progress;
        app.handle_key(KeyEvent::from(KeyCode::Char('X')));
        app.handle_key(KeyEvent::from(KeyCode::Char('n')));
        assert!(!app.progress.is_empty());

        app.handle_key(KeyEvent::from(KeyCode::Char('X')));
        app.handle_key(KeyEvent::from(KeyCode::Char('y')));
        assert!(app.progress.is_empty());
    }

    #[test]
    fn test_progress_rows_follow_tree() {
        let mut app = app();
        app.record_study("variables", Some(90.0));
        let rows = app.progress_rows();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].concept_id, "variables");
        assert_eq!(rows[0].entry.times_studied, 1);
        assert_eq!(rows[1].tier, Tier::Unrated);
    }

    #[test]
    fn test_detail_lists_node_lessons_in_steps() {
        let mut app = app();
        select(&mut app, "recursion");
        let detail = app.selected_detail().unwrap();
        let titles: Vec<&str> = detail.lessons.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro to Recursion", "Recursion, visually", "Recursion check"]);
        assert_eq!(detail.lessons[2].step, 2);
        assert_eq!(detail.missing, vec!["Functions"]);
    }

    #[test]
    fn test_gold_prerequisites_rule() {
        let rules = builtin_rules();
        let mut node = TreeNode::bound("x");
        node.unlock_conditions = course_core::UnlockConditions::requiring(&["a"], Tier::Bronze);
        node.unlock_conditions.custom_rule_id = Some("gold-prerequisites".to_string());

        let silver: TierMap = [("a".to_string(), Tier::Silver)].into_iter().collect();
        let gold: TierMap = [("a".to_string(), Tier::Gold)].into_iter().collect();
        assert_eq!(rules.node_status(&node, &silver), NodeStatus::Locked);
        assert_eq!(rules.node_status(&node, &gold), NodeStatus::Available);
    }

    #[tokio::test]
    async fn test_goal_plans_path() {
        let mut app = app();
        select(&mut app, "loops");
        app.handle_key(KeyEvent::from(KeyCode::Char('g')));
        assert_eq!(app.goals, vec!["loops".to_string()]);
        assert!(app.planning);

        wait_for_path(&mut app).await;
        let path = app.path.clone().unwrap();
        assert_eq!(path.concept_ids(), vec!["variables", "values", "lists", "loops"]);
        assert!(path.unreached_goals.is_empty());
        assert!(path.total_minutes > 0);
    }

    #[tokio::test]
    async fn test_locked_goal_routes_from_course_root() {
        let mut app = app();
        assert_eq!(app.path_start().as_deref(), Some("variables"));
        select(&mut app, "sorting");
        app.handle_key(KeyEvent::from(KeyCode::Char('g')));

        wait_for_path(&mut app).await;
        let path = app.path.clone().unwrap();
        assert_eq!(
            path.concept_ids(),
            vec!["variables", "values", "lists", "loops", "recursion", "sorting"]
        );
        assert!(path.unreached_goals.is_empty());
    }

    #[test]
    fn test_path_start_follows_current_tree() {
        let mut app = app();
        app.trees[0].remove_node("variables").unwrap();
        let start = app.path_start().unwrap();
        assert!(["conditionals", "functions"].contains(&start.as_str()), "{}", start);
    }

    #[tokio::test]
    async fn test_stale_path_is_discarded() {
        let mut app = app();
        app.goals = vec!["sorting".to_string()];
        let stale = app.tick.begin();
        app.request_path();

        app.path_tx
            .send(PathUpdate {
                tick: stale,
                path: LearningPath::default(),
            })
            .unwrap();
        wait_for_path(&mut app).await;

        let path = app.path.clone().unwrap();
        assert!(!path.is_empty());
        assert_eq!(path.concept_ids().last(), Some(&"sorting"));
    }

    #[test]
    fn test_path_without_goals_is_rejected() {
        let mut app = app();
        app.request_path();
        assert!(!app.planning);
        assert_eq!(app.message.as_ref().map(|m| m.1), Some(MessageType::Warning));
    }
}
