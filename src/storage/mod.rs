//! Read-only access to the `.forge/` source files.
//!
//! Layout, relative to the forge directory:
//!
//! ```text
//! prds/<id>.md                          PRD document with header block
//! tasks/<id>/tasks.json                 task manifest
//! progress/<id>/checkpoint.json         progress checkpoint
//! design/<id>/diagrams/<name>.puml      PlantUML diagram sources
//! ```
//!
//! Missing files are reported as `None`. Files that exist but fail to parse
//! are logged and also reported as `None`, so callers aggregate with
//! defaults instead of failing.

mod frontmatter;

pub use frontmatter::parse_frontmatter;

use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::{Checkpoint, DiagramInfo, DiagramSource, Frontmatter, TaskManifest};
use crate::{Error, Result};

/// Name of the state directory inside a project root.
pub const FORGE_DIR_NAME: &str = ".forge";

pub const PRDS_DIR: &str = "prds";
pub const TASKS_DIR: &str = "tasks";
pub const PROGRESS_DIR: &str = "progress";
pub const DESIGN_DIR: &str = "design";
pub const DIAGRAMS_DIR: &str = "diagrams";

pub const TASKS_FILE: &str = "tasks.json";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

pub const PRD_EXT: &str = "md";
pub const DIAGRAM_EXT: &str = "puml";

/// A PRD document loaded from `prds/`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrdDocument {
    /// File name without extension
    pub stem: String,
    pub path: PathBuf,
    /// Raw document text
    pub content: String,
    pub frontmatter: Frontmatter,
}

impl PrdDocument {
    /// The PRD id: the declared `id` field, falling back to the file stem.
    pub fn id(&self) -> &str {
        self.meta("id").unwrap_or(&self.stem)
    }

    /// A frontmatter value, treating empty strings as absent.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.frontmatter
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Reader over one project's `.forge/` directory.
#[derive(Debug, Clone)]
pub struct SourceStore {
    root: PathBuf,
}

impl SourceStore {
    /// Open the store for a project root (the parent of `.forge/`).
    pub fn open(project_root: &Path) -> Self {
        Self::at(project_root.join(FORGE_DIR_NAME))
    }

    /// Open the store at an explicit forge directory.
    pub fn at(forge_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: forge_dir.into(),
        }
    }

    /// The forge directory this store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// The directory trees the change watcher observes.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        [PRDS_DIR, TASKS_DIR, PROGRESS_DIR, DESIGN_DIR]
            .iter()
            .map(|dir| self.root.join(dir))
            .collect()
    }

    /// Load every PRD document, sorted by file name.
    ///
    /// This is the authoritative enumeration of which PRDs exist. Unreadable
    /// documents are logged and skipped.
    pub fn prd_documents(&self) -> Vec<PrdDocument> {
        let dir = self.root.join(PRDS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to list PRD directory");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, PRD_EXT))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| load_document(&path))
            .collect()
    }

    /// Load `prds/<id>.md`.
    pub fn read_prd_document(&self, id: &str) -> Result<Option<PrdDocument>> {
        validate_component("PRD id", id)?;
        let path = self.root.join(PRDS_DIR).join(format!("{}.{}", id, PRD_EXT));
        Ok(load_document(&path))
    }

    /// Find a PRD by id: by file name first, then by declared `id`.
    pub fn find_prd_document(&self, id: &str) -> Result<Option<PrdDocument>> {
        if let Some(doc) = self.read_prd_document(id)? {
            return Ok(Some(doc));
        }
        Ok(self.prd_documents().into_iter().find(|doc| doc.id() == id))
    }

    /// Load `tasks/<id>/tasks.json`.
    pub fn read_task_manifest(&self, id: &str) -> Option<TaskManifest> {
        let path = self.entity_file(TASKS_DIR, id, TASKS_FILE)?;
        read_json(&path)
    }

    /// Load `progress/<id>/checkpoint.json`.
    pub fn read_checkpoint(&self, id: &str) -> Option<Checkpoint> {
        let path = self.entity_file(PROGRESS_DIR, id, CHECKPOINT_FILE)?;
        read_json(&path)
    }

    /// List `design/<id>/diagrams/*.puml`, sorted by name.
    pub fn list_diagrams(&self, id: &str) -> Result<Vec<DiagramInfo>> {
        validate_component("PRD id", id)?;
        let dir = self.diagrams_dir(id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut diagrams: Vec<DiagramInfo> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, DIAGRAM_EXT))
            .filter_map(|path| {
                let name = path.file_stem()?.to_str()?.to_string();
                let file = path.file_name()?.to_str()?.to_string();
                Some(DiagramInfo { name, file })
            })
            .collect();
        diagrams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(diagrams)
    }

    /// Load `design/<id>/diagrams/<name>.puml`.
    pub fn read_diagram(&self, id: &str, name: &str) -> Result<Option<DiagramSource>> {
        validate_component("PRD id", id)?;
        validate_component("diagram name", name)?;
        let path = self
            .diagrams_dir(id)
            .join(format!("{}.{}", name, DIAGRAM_EXT));
        Ok(read_text(&path).map(|content| DiagramSource {
            name: name.to_string(),
            content,
        }))
    }

    fn diagrams_dir(&self, id: &str) -> PathBuf {
        self.root.join(DESIGN_DIR).join(id).join(DIAGRAMS_DIR)
    }

    /// `<category>/<id>/<file>`, or `None` if `id` cannot name a directory.
    fn entity_file(&self, category: &str, id: &str, file: &str) -> Option<PathBuf> {
        if let Err(e) = validate_component("PRD id", id) {
            tracing::warn!(category, error = %e, "Skipping unsafe PRD id");
            return None;
        }
        Some(self.root.join(category).join(id).join(file))
    }
}

/// Reject values that cannot be used as a single path component.
pub fn validate_component(kind: &str, value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidInput(format!("invalid {}: {:?}", kind, value)));
    }
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn load_document(path: &Path) -> Option<PrdDocument> {
    let content = read_text(path)?;
    let stem = path.file_stem()?.to_str()?.to_string();
    Some(PrdDocument {
        stem,
        path: path.to_path_buf(),
        frontmatter: parse_frontmatter(&content),
        content,
    })
}

/// Read a text file. Missing files are `None`; other failures are logged.
fn read_text(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read source file");
            None
        }
    }
}

/// Read and parse a JSON file. Parse failures are logged and treated as absent.
fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = read_text(path)?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed source file, treating as absent");
            None
        }
    }
}
