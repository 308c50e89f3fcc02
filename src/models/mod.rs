//! Data models for forge project state.
//!
//! This module defines two families of structures:
//! - Source records, deserialized as-is from `.forge/` files:
//!   `TaskManifest`, `ManifestTask`, `Checkpoint`, `TestSummary`
//! - Read-model projections, recomputed on every query:
//!   `PrdRecord`, `PrdTask`, `ProgressView`, `Summary`
//!
//! Plus the transient `ChangeSignal` emitted by the file watcher.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Key-value metadata from a document's `---` header block.
pub type Frontmatter = BTreeMap<String, String>;

/// Stage of the test-driven-development cycle for the active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Red,
    Green,
    Refactor,
}

impl Phase {
    /// Parse a phase name, case-insensitive. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "red" => Some(Phase::Red),
            "green" => Some(Phase::Green),
            "refactor" => Some(Phase::Refactor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Red => "red",
            Phase::Green => "green",
            Phase::Refactor => "refactor",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived status of a single task.
///
/// Task manifests carry no status; it is always computed by joining against
/// the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    InProgress,
    #[default]
    Pending,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Completed => "completed",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

/// The bucket a PRD's free-form status string resolves to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Completed,
    InProgress,
    #[default]
    Pending,
}

impl StatusBucket {
    /// Status strings that mean the PRD is finished.
    pub const COMPLETED: [&'static str; 2] = ["completed", "all_features_complete"];
    /// Status strings that mean work is under way.
    pub const IN_PROGRESS: [&'static str; 2] = ["in_progress", "building"];

    /// Classify a raw status string. Anything unrecognized is pending.
    pub fn classify(status: &str) -> Self {
        let status = status.trim();
        if Self::COMPLETED.contains(&status) {
            StatusBucket::Completed
        } else if Self::IN_PROGRESS.contains(&status) {
            StatusBucket::InProgress
        } else {
            StatusBucket::Pending
        }
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusBucket::Completed => "completed",
            StatusBucket::InProgress => "in_progress",
            StatusBucket::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

/// Test counters recorded in a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub passed: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: u64,
    /// Line coverage in percent
    #[serde(default, deserialize_with = "null_as_default")]
    pub coverage: f64,
}

impl TestSummary {
    /// Pass rate in whole percent, or `None` when no tests have run.
    pub fn pass_rate(&self) -> Option<u64> {
        percent(self.passed, self.total)
    }
}

/// `round(part / whole * 100)`, or `None` when `whole` is zero.
pub fn percent(part: u64, whole: u64) -> Option<u64> {
    if whole == 0 {
        None
    } else {
        Some(((part as f64 / whole as f64) * 100.0).round() as u64)
    }
}

// ============================================================================
// Source records
// ============================================================================
//
// These files are written by other tools and are read field by field: a
// `null` collection or counter reads as its default, and ids may be numbers.

/// Deserialize `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An id given as a string or a number. Anything else has none.
fn id_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_from_value(Value::deserialize(deserializer)?))
}

/// A list of ids; `null` is empty and entries that are not ids are skipped.
fn lenient_id_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(id_from_value)
        .collect())
}

/// Contents of `tasks/<id>/tasks.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    #[serde(default)]
    pub total_tasks: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<ManifestTask>,
}

/// One task as declared in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestTask {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Planned phase; replaced by the checkpoint's phase in projections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Any other fields, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Contents of `progress/<id>/checkpoint.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub current_task: Option<String>,
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default, deserialize_with = "lenient_id_list")]
    pub completed_tasks: Vec<String>,
    #[serde(default, deserialize_with = "lenient_id_list")]
    pub pending_tasks: Vec<String>,
    #[serde(default)]
    pub test_summary: Option<TestSummary>,
}

impl Checkpoint {
    /// The current task pointer, ignoring empty strings.
    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// The current phase, if it names a known phase.
    pub fn current_phase(&self) -> Option<Phase> {
        self.current_phase.as_deref().and_then(Phase::parse)
    }
}

// ============================================================================
// Read-model projections
// ============================================================================

/// Consolidated view of one PRD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrdRecord {
    pub id: String,
    pub title: String,
    /// Raw status string after precedence resolution
    pub status: String,
    pub bucket: StatusBucket,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub current_task: Option<String>,
    pub current_phase: Option<Phase>,
    pub completed_tasks: u64,
    pub total_tasks: u64,
    /// Completion in percent, clamped to 0..=100
    pub progress_percent: u64,
    pub test_summary: Option<TestSummary>,
    /// `null` when no tests have run
    pub test_pass_rate: Option<u64>,
}

/// A manifest task joined with checkpoint state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrdTask {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub status: TaskStatus,
    /// Only set on the in-progress task
    pub phase: Option<Phase>,
}

impl PrdTask {
    /// Display text: the title, then the description, then the id.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Progress view of a PRD's checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub prd_id: String,
    pub status: String,
    pub current_task: Option<String>,
    pub current_phase: Option<Phase>,
    pub completed_tasks: Vec<String>,
    pub pending_tasks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_summary: Option<TestSummary>,
}

impl ProgressView {
    /// Status reported when a PRD has no checkpoint yet.
    pub const NOT_STARTED: &'static str = "not_started";

    /// Synthesized view for a PRD without a checkpoint.
    pub fn not_started(prd_id: impl Into<String>) -> Self {
        Self {
            prd_id: prd_id.into(),
            status: Self::NOT_STARTED.to_string(),
            current_task: None,
            current_phase: None,
            completed_tasks: Vec::new(),
            pending_tasks: Vec::new(),
            test_summary: None,
        }
    }

    pub fn from_checkpoint(prd_id: impl Into<String>, checkpoint: &Checkpoint) -> Self {
        Self {
            prd_id: prd_id.into(),
            status: checkpoint
                .status
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "pending".to_string()),
            current_task: checkpoint.current_task().map(str::to_string),
            current_phase: checkpoint.current_phase(),
            completed_tasks: checkpoint.completed_tasks.clone(),
            pending_tasks: checkpoint.pending_tasks.clone(),
            test_summary: checkpoint.test_summary.clone(),
        }
    }
}

/// Global counters folded over all PRDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_prds: u64,
    pub completed_prds: u64,
    pub in_progress_prds: u64,
    pub pending_prds: u64,
    pub total_tests: u64,
    pub passed_tests: u64,
    pub failed_tests: u64,
    /// 0 when no tests have run
    pub test_pass_rate: u64,
}

/// A diagram source file available for a PRD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramInfo {
    pub name: String,
    pub file: String,
}

/// Raw diagram source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSource {
    pub name: String,
    pub content: String,
}

/// Image references produced by the diagram renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDiagram {
    pub svg: String,
    pub png: String,
}

// ============================================================================
// Change signals
// ============================================================================

/// Kind of filesystem mutation observed under a watched root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// Notification that something under a watched root changed.
///
/// Carries no file contents: receivers re-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub event: ChangeKind,
    pub path: String,
}

impl ChangeSignal {
    pub fn new(event: ChangeKind, path: &Path) -> Self {
        Self {
            event,
            path: path.display().to_string(),
        }
    }
}
