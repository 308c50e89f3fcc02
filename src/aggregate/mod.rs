//! Merging of PRD document, task manifest and checkpoint into one view.
//!
//! Precedence rules:
//! - `id`: declared frontmatter `id` > file stem
//! - `title`: frontmatter `title` > `id`
//! - `status`: checkpoint `status` > frontmatter `status` > `"pending"`
//! - `priority`: frontmatter `priority` > `"medium"`
//!
//! Any of the three sources may be missing. Nothing here is cached: every
//! call re-reads the files.

pub mod summary;

pub use summary::{SummaryAccumulator, summarize};

use std::collections::HashSet;

use crate::models::{
    Checkpoint, PrdRecord, PrdTask, ProgressView, StatusBucket, TaskManifest, TaskStatus, percent,
};
use crate::storage::{PrdDocument, SourceStore};

pub const DEFAULT_STATUS: &str = "pending";
pub const DEFAULT_PRIORITY: &str = "medium";

/// Everything derived for one PRD in a single pass over its files.
#[derive(Debug, Clone, PartialEq)]
pub struct PrdState {
    pub record: PrdRecord,
    pub tasks: Vec<PrdTask>,
    pub progress: ProgressView,
}

/// Aggregate a loaded PRD document with its manifest and checkpoint.
pub fn aggregate(store: &SourceStore, doc: &PrdDocument) -> PrdState {
    let id = doc.id().to_string();
    let manifest = store.read_task_manifest(&id);
    let checkpoint = store.read_checkpoint(&id);
    merge(doc, manifest.as_ref(), checkpoint.as_ref())
}

/// Pure merge of the three sources.
pub fn merge(
    doc: &PrdDocument,
    manifest: Option<&TaskManifest>,
    checkpoint: Option<&Checkpoint>,
) -> PrdState {
    let id = doc.id().to_string();
    let status = resolve_status(checkpoint, doc);
    let tasks = derive_tasks(manifest, checkpoint);

    let completed_tasks = checkpoint.map_or(0, |c| c.completed_tasks.len() as u64);
    let total_tasks = manifest.map_or(0, |m| {
        m.total_tasks.unwrap_or(m.tasks.len() as u64)
    });
    let test_summary = checkpoint.and_then(|c| c.test_summary.clone());

    let record = PrdRecord {
        title: doc.meta("title").unwrap_or(&id).to_string(),
        bucket: StatusBucket::classify(&status),
        status,
        priority: doc.meta("priority").unwrap_or(DEFAULT_PRIORITY).to_string(),
        created: doc.meta("created").map(str::to_string),
        current_task: checkpoint.and_then(|c| c.current_task()).map(str::to_string),
        current_phase: checkpoint.and_then(Checkpoint::current_phase),
        completed_tasks,
        total_tasks,
        progress_percent: progress_percent(completed_tasks, total_tasks),
        test_pass_rate: test_summary.as_ref().and_then(|t| t.pass_rate()),
        test_summary,
        id: id.clone(),
    };

    let progress = match checkpoint {
        Some(checkpoint) => ProgressView::from_checkpoint(&id, checkpoint),
        None => ProgressView::not_started(&id),
    };

    PrdState {
        record,
        tasks,
        progress,
    }
}

/// Resolve the status string: checkpoint, then frontmatter, then pending.
pub fn resolve_status(checkpoint: Option<&Checkpoint>, doc: &PrdDocument) -> String {
    checkpoint
        .and_then(|c| c.status.as_deref())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| doc.meta("status"))
        .unwrap_or(DEFAULT_STATUS)
        .to_string()
}

/// Completion percentage, clamped to 0..=100. Zero when there are no tasks.
///
/// Source data may report more completed tasks than the manifest declares;
/// only this display value is clamped.
pub fn progress_percent(completed: u64, total: u64) -> u64 {
    percent(completed, total).unwrap_or(0).min(100)
}

/// Join manifest tasks against checkpoint state, preserving manifest order.
///
/// A task is completed if its id is in the checkpoint's completed set,
/// otherwise in progress if it is the checkpoint's current task, otherwise
/// pending. Only the first matching task is marked in progress, and only it
/// carries the checkpoint's phase.
pub fn derive_tasks(
    manifest: Option<&TaskManifest>,
    checkpoint: Option<&Checkpoint>,
) -> Vec<PrdTask> {
    let Some(manifest) = manifest else {
        return Vec::new();
    };

    let completed: HashSet<&str> = checkpoint
        .map(|c| c.completed_tasks.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let current = checkpoint.and_then(Checkpoint::current_task);
    let phase = checkpoint.and_then(Checkpoint::current_phase);
    let mut current_claimed = false;

    manifest
        .tasks
        .iter()
        .map(|task| {
            let status = if completed.contains(task.id.as_str()) {
                TaskStatus::Completed
            } else if !current_claimed && current == Some(task.id.as_str()) {
                current_claimed = true;
                TaskStatus::InProgress
            } else {
                TaskStatus::Pending
            };

            // Declared statuses are superseded by the join
            let mut extra = task.extra.clone();
            extra.remove("status");

            PrdTask {
                id: task.id.clone(),
                title: task.title.clone(),
                description: task.description.clone(),
                extra,
                phase: (status == TaskStatus::InProgress).then_some(phase).flatten(),
                status,
            }
        })
        .collect()
}
