//! Query operations shared by the CLI and the HTTP API.
//!
//! Every function recomputes its result from the files on disk. Results
//! implement [`Output`] so the CLI can print them as JSON or for humans.

use serde::Serialize;

use crate::aggregate::{self, PrdState};
use crate::models::{
    DiagramInfo, DiagramSource, PrdRecord, PrdTask, ProgressView, RenderedDiagram, Summary,
    TaskStatus,
};
use crate::storage::{PrdDocument, SourceStore, validate_component};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

// === PRD list ===

/// All PRDs, in document order.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PrdList {
    pub prds: Vec<PrdRecord>,
}

impl Output for PrdList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.prds.is_empty() {
            return "No PRDs found.".to_string();
        }
        let mut lines = vec![format!("{} PRD(s):", self.prds.len())];
        for prd in &self.prds {
            let mut line = format!(
                "  {} [{}] {} - {}/{} tasks ({}%)",
                prd.id,
                prd.status,
                prd.title,
                prd.completed_tasks,
                prd.total_tasks,
                prd.progress_percent
            );
            if let Some(task) = &prd.current_task {
                line.push_str(&format!(" @ {}", task));
                if let Some(phase) = prd.current_phase {
                    line.push_str(&format!(" ({})", phase));
                }
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

pub fn list_prds(store: &SourceStore) -> PrdList {
    let prds = store
        .prd_documents()
        .iter()
        .map(|doc| aggregate::aggregate(store, doc).record)
        .collect();
    PrdList { prds }
}

// === PRD detail ===

/// Full view of one PRD including its raw document text.
#[derive(Debug, Clone, Serialize)]
pub struct PrdDetail {
    #[serde(flatten)]
    pub record: PrdRecord,
    pub content: String,
    pub progress: ProgressView,
    pub tasks: Vec<PrdTask>,
}

impl Output for PrdDetail {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let r = &self.record;
        let mut lines = vec![
            format!("{} - {}", r.id, r.title),
            format!("  Status:   {} ({})", r.status, r.bucket),
            format!("  Priority: {}", r.priority),
        ];
        if let Some(created) = &r.created {
            lines.push(format!("  Created:  {}", created));
        }
        lines.push(format!(
            "  Progress: {}/{} tasks ({}%)",
            r.completed_tasks, r.total_tasks, r.progress_percent
        ));
        if let Some(tests) = &r.test_summary {
            let rate = r
                .test_pass_rate
                .map(|p| format!("{}%", p))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  Tests:    {}/{} passed ({}), coverage {:.1}%",
                tests.passed, tests.total, rate, tests.coverage
            ));
        }
        if !self.tasks.is_empty() {
            lines.push(String::new());
            lines.extend(self.tasks.iter().map(task_line));
        }
        lines.join("\n")
    }
}

fn task_line(task: &PrdTask) -> String {
    let marker = match task.status {
        TaskStatus::Completed => "[x]",
        TaskStatus::InProgress => "[>]",
        TaskStatus::Pending => "[ ]",
    };
    match task.phase {
        Some(phase) => format!("  {} {} {} ({})", marker, task.id, task.label(), phase),
        None => format!("  {} {} {}", marker, task.id, task.label()),
    }
}

/// Load one PRD. Fails with `NotFound` when no document exists.
pub fn show_prd(store: &SourceStore, id: &str) -> Result<PrdDetail> {
    let doc = require_document(store, id)?;
    let PrdState {
        record,
        tasks,
        progress,
    } = aggregate::aggregate(store, &doc);
    Ok(PrdDetail {
        record,
        content: doc.content,
        progress,
        tasks,
    })
}

fn require_document(store: &SourceStore, id: &str) -> Result<PrdDocument> {
    store
        .find_prd_document(id)?
        .ok_or_else(|| Error::NotFound(format!("PRD {}", id)))
}

// === Tasks ===

/// A PRD's tasks joined with checkpoint state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub prd_id: String,
    pub total_tasks: u64,
    pub tasks: Vec<PrdTask>,
}

impl Output for TaskList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return format!("{}: no tasks.", self.prd_id);
        }
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let mut lines = vec![format!(
            "{}: {} of {} task(s) completed",
            self.prd_id, done, self.total_tasks
        )];
        lines.extend(self.tasks.iter().map(task_line));
        lines.join("\n")
    }
}

/// Tasks for a PRD id. Missing manifests yield an empty list.
pub fn prd_tasks(store: &SourceStore, id: &str) -> Result<TaskList> {
    validate_component("PRD id", id)?;
    let manifest = store.read_task_manifest(id);
    let checkpoint = store.read_checkpoint(id);
    let tasks = aggregate::derive_tasks(manifest.as_ref(), checkpoint.as_ref());
    let total_tasks = manifest
        .as_ref()
        .and_then(|m| m.total_tasks)
        .unwrap_or(tasks.len() as u64);
    Ok(TaskList {
        prd_id: id.to_string(),
        total_tasks,
        tasks,
    })
}

// === Progress ===

impl Output for ProgressView {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.prd_id, self.status)];
        if let Some(task) = &self.current_task {
            match self.current_phase {
                Some(phase) => lines.push(format!("  Current: {} ({})", task, phase)),
                None => lines.push(format!("  Current: {}", task)),
            }
        }
        lines.push(format!(
            "  Completed: {}",
            display_ids(&self.completed_tasks)
        ));
        lines.push(format!("  Pending:   {}", display_ids(&self.pending_tasks)));
        if let Some(tests) = &self.test_summary {
            lines.push(format!(
                "  Tests:     {} total, {} passed, {} failed",
                tests.total, tests.passed, tests.failed
            ));
        }
        lines.join("\n")
    }
}

fn display_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}

/// Checkpoint view for a PRD id, synthesized as `not_started` when absent.
pub fn prd_progress(store: &SourceStore, id: &str) -> Result<ProgressView> {
    validate_component("PRD id", id)?;
    Ok(match store.read_checkpoint(id) {
        Some(checkpoint) => ProgressView::from_checkpoint(id, &checkpoint),
        None => ProgressView::not_started(id),
    })
}

// === Diagrams ===

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct DiagramList {
    pub diagrams: Vec<DiagramInfo>,
}

impl Output for DiagramList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.diagrams.is_empty() {
            return "No diagrams.".to_string();
        }
        self.diagrams
            .iter()
            .map(|d| format!("  {} ({})", d.name, d.file))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn list_diagrams(store: &SourceStore, id: &str) -> Result<DiagramList> {
    Ok(DiagramList {
        diagrams: store.list_diagrams(id)?,
    })
}

impl Output for DiagramSource {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        self.content.clone()
    }
}

/// Diagram source text. Fails with `NotFound` when the file is missing.
pub fn show_diagram(store: &SourceStore, id: &str, name: &str) -> Result<DiagramSource> {
    store
        .read_diagram(id, name)?
        .ok_or_else(|| Error::NotFound(format!("diagram {}/{}", id, name)))
}

impl Output for RenderedDiagram {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("SVG: {}\nPNG: {}", self.svg, self.png)
    }
}

// === Summary ===

impl Output for Summary {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let rate = if self.total_tests == 0 {
            "-".to_string()
        } else {
            format!("{}%", self.test_pass_rate)
        };
        [
            format!(
                "PRDs:  {} total, {} completed, {} in progress, {} pending",
                self.total_prds, self.completed_prds, self.in_progress_prds, self.pending_prds
            ),
            format!(
                "Tests: {} total, {} passed, {} failed (pass rate {})",
                self.total_tests, self.passed_tests, self.failed_tests, rate
            ),
        ]
        .join("\n")
    }
}

pub fn summary(store: &SourceStore) -> Summary {
    aggregate::summarize(store)
}
