//! File system watcher for `.forge` source changes.
//!
//! One notify watcher and one debounce task run per watched root. Raw events
//! are coalesced per path: a path must be quiet for the debounce window
//! before its change is published through the [`ConnectionManager`].
//!
//! A root that does not exist yet is watched through its parent and attached
//! once it appears. Files already inside it by then are published as created.

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::broadcast::ConnectionManager;
use crate::models::{ChangeKind, ChangeSignal};

/// Lifecycle of the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherState {
    /// Not started yet.
    Idle,
    /// Watching the listed roots, including ones still waiting to appear.
    Watching { roots: Vec<PathBuf> },
    /// No root could be watched; the dashboard is pull-only.
    Unavailable { reason: String },
}

impl WatcherState {
    pub fn is_watching(&self) -> bool {
        matches!(self, WatcherState::Watching { .. })
    }
}

/// Watches the `.forge` subdirectories and publishes change signals.
pub struct ChangeWatcher {
    roots: Vec<PathBuf>,
    debounce: Duration,
    connections: Arc<ConnectionManager>,
    state: WatcherState,
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeWatcher {
    pub fn new(roots: Vec<PathBuf>, debounce: Duration, connections: Arc<ConnectionManager>) -> Self {
        Self {
            roots,
            debounce,
            connections,
            state: WatcherState::Idle,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// A missing root is watched through its parent; a root with neither is
    /// skipped with a warning. If no root can be watched the state becomes
    /// [`WatcherState::Unavailable`].
    pub fn start(&mut self) -> &WatcherState {
        if self.state != WatcherState::Idle {
            return &self.state;
        }

        let mut watched = Vec::new();
        for root in &self.roots {
            match RootWatch::open(root) {
                Ok((watch, rx)) => {
                    tracing::debug!(
                        root = %root.display(),
                        attached = watch.attached,
                        "Watching"
                    );
                    let task = tokio::spawn(debounce_loop(
                        rx,
                        self.debounce,
                        self.connections.clone(),
                        watch,
                    ));
                    self.tasks.push(task);
                    watched.push(root.clone());
                }
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Failed to watch root");
                }
            }
        }

        self.state = if watched.is_empty() {
            let reason = "no .forge source directories could be watched".to_string();
            tracing::warn!("File watching unavailable: {}; live updates disabled", reason);
            WatcherState::Unavailable { reason }
        } else {
            tracing::info!(roots = watched.len(), "File watcher started");
            WatcherState::Watching { roots: watched }
        };
        &self.state
    }

    /// Stop all watch tasks.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if self.state.is_watching() {
            self.state = WatcherState::Idle;
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

type RawEvents = UnboundedReceiver<notify::Result<Event>>;

/// A notify watcher over one root, plus a non-recursive watch on its parent
/// so a missing root is seen when it is created.
struct RootWatch {
    root: PathBuf,
    /// `root` under its resolved parent; some backends report resolved paths
    resolved: Option<PathBuf>,
    watcher: RecommendedWatcher,
    /// The recursive watch on `root` itself is active
    attached: bool,
}

impl RootWatch {
    fn open(root: &Path) -> notify::Result<(Self, RawEvents)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        let resolved = root
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .zip(root.file_name())
            .map(|(parent, name)| parent.join(name))
            .filter(|resolved| resolved != root);
        let mut watch = Self {
            root: root.to_path_buf(),
            resolved,
            watcher,
            attached: false,
        };

        let parent = root.parent().filter(|p| p.is_dir());
        if let Some(parent) = parent {
            watch.watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }
        if root.is_dir() {
            watch.watcher.watch(root, RecursiveMode::Recursive)?;
            watch.attached = true;
        } else if parent.is_none() {
            return Err(notify::Error::path_not_found().add_path(root.to_path_buf()));
        }
        Ok((watch, rx))
    }

    /// Whether `path` is this root or lies under it.
    fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            || self
                .resolved
                .as_ref()
                .is_some_and(|resolved| path.starts_with(resolved))
    }

    fn is_root(&self, path: &Path) -> bool {
        path == self.root || self.resolved.as_deref() == Some(path)
    }

    /// Attach the recursive watch if the root has appeared.
    ///
    /// Returns the files already inside it, which were written before any
    /// watch could see them.
    fn try_attach(&mut self) -> Vec<PathBuf> {
        if self.attached || !self.root.is_dir() {
            return Vec::new();
        }
        if let Err(e) = self.watcher.watch(&self.root, RecursiveMode::Recursive) {
            tracing::warn!(root = %self.root.display(), error = %e, "Failed to attach watch root");
            return Vec::new();
        }
        self.attached = true;
        tracing::info!(root = %self.root.display(), "Watch root appeared, attached");
        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        files
    }

    /// Drop the recursive watch after the root itself was removed.
    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        // The backend may already have dropped it with the directory.
        let _ = self.watcher.unwatch(&self.root);
        self.attached = false;
        tracing::info!(root = %self.root.display(), "Watch root removed, waiting for it to return");
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}

/// Map a raw notify event onto per-path change kinds.
pub(crate) fn classify(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut changes = Vec::new();
            if let Some(from) = event.paths.first() {
                changes.push((from.clone(), ChangeKind::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push((to.clone(), ChangeKind::Created));
            }
            return changes;
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };
    event.paths.iter().map(|p| (p.clone(), kind)).collect()
}

/// Pending changes, coalesced per path.
#[derive(Debug, Default)]
pub(crate) struct Debouncer {
    pending: HashMap<PathBuf, (ChangeKind, Instant)>,
}

impl Debouncer {
    pub(crate) fn record(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        let merged = match self.pending.get(&path) {
            // A file that appeared in this window is still new to subscribers.
            Some((ChangeKind::Created, _)) if kind == ChangeKind::Modified => ChangeKind::Created,
            _ => kind,
        };
        self.pending.insert(path, (merged, now));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Time until the earliest pending path becomes quiet.
    pub(crate) fn next_deadline(&self, window: Duration) -> Option<Instant> {
        self.pending.values().map(|(_, at)| *at + window).min()
    }

    /// Remove and return every path quiet for at least `window`.
    pub(crate) fn drain_quiet(&mut self, window: Duration, now: Instant) -> Vec<ChangeSignal> {
        let quiet: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= window)
            .map(|(path, _)| path.clone())
            .collect();

        let mut signals: Vec<ChangeSignal> = quiet
            .into_iter()
            .filter_map(|path| {
                self.pending
                    .remove(&path)
                    .map(|(kind, _)| ChangeSignal::new(kind, &path))
            })
            .collect();
        signals.sort_by(|a, b| a.path.cmp(&b.path));
        signals
    }
}

async fn debounce_loop(
    mut rx: RawEvents,
    window: Duration,
    connections: Arc<ConnectionManager>,
    mut watch: RootWatch,
) {
    let mut debouncer = Debouncer::default();

    loop {
        let deadline = debouncer
            .next_deadline(window)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(Ok(event)) => {
                        let now = Instant::now();
                        for (path, kind) in classify(&event) {
                            if !watch.covers(&path) {
                                continue;
                            }
                            if kind == ChangeKind::Deleted && watch.is_root(&path) {
                                watch.detach();
                            }
                            debouncer.record(path, kind, now);
                        }
                        for path in watch.try_attach() {
                            debouncer.record(path, ChangeKind::Created, now);
                        }
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "File watcher error"),
                    None => break,
                }
            }
            _ = tokio::time::sleep_until(deadline), if !debouncer.is_empty() => {
                for signal in debouncer.drain_quiet(window, Instant::now()) {
                    let delivered = connections.publish(&signal).await;
                    tracing::debug!(
                        event = %signal.event,
                        path = %signal.path,
                        delivered,
                        "Published change"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestForge;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    const WINDOW: Duration = Duration::from_millis(100);

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_classify_kinds() {
        let created = classify(&event(EventKind::Create(CreateKind::File), &["/a"]));
        assert_eq!(created, vec![(PathBuf::from("/a"), ChangeKind::Created)]);

        let modified = classify(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/a"],
        ));
        assert_eq!(modified, vec![(PathBuf::from("/a"), ChangeKind::Modified)]);

        let removed = classify(&event(EventKind::Remove(RemoveKind::File), &["/a"]));
        assert_eq!(removed, vec![(PathBuf::from("/a"), ChangeKind::Deleted)]);

        let metadata = classify(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/a"],
        ));
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_classify_rename_both() {
        let changes = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/old", "/new"],
        ));
        assert_eq!(
            changes,
            vec![
                (PathBuf::from("/old"), ChangeKind::Deleted),
                (PathBuf::from("/new"), ChangeKind::Created),
            ]
        );
    }

    #[tokio::test]
    async fn test_burst_coalesces_to_one_signal() {
        let mut debouncer = Debouncer::default();
        let start = Instant::now();
        for i in 0..5 {
            debouncer.record(
                PathBuf::from("/p/checkpoint.json"),
                ChangeKind::Modified,
                start + Duration::from_millis(i * 10),
            );
        }

        // Not quiet yet relative to the last event.
        assert!(
            debouncer
                .drain_quiet(WINDOW, start + Duration::from_millis(100))
                .is_empty()
        );

        let signals = debouncer.drain_quiet(WINDOW, start + Duration::from_millis(200));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].event, ChangeKind::Modified);
        assert!(debouncer.is_empty());
    }

    #[tokio::test]
    async fn test_created_then_modified_stays_created() {
        let mut debouncer = Debouncer::default();
        let now = Instant::now();
        debouncer.record(PathBuf::from("/n"), ChangeKind::Created, now);
        debouncer.record(PathBuf::from("/n"), ChangeKind::Modified, now);
        let signals = debouncer.drain_quiet(WINDOW, now + WINDOW);
        assert_eq!(signals[0].event, ChangeKind::Created);
    }

    #[tokio::test]
    async fn test_paths_debounce_independently() {
        let mut debouncer = Debouncer::default();
        let start = Instant::now();
        debouncer.record(PathBuf::from("/a"), ChangeKind::Modified, start);
        debouncer.record(
            PathBuf::from("/b"),
            ChangeKind::Deleted,
            start + Duration::from_millis(80),
        );

        assert_eq!(debouncer.next_deadline(WINDOW), Some(start + WINDOW));

        let first = debouncer.drain_quiet(WINDOW, start + Duration::from_millis(120));
        assert_eq!(first.len(), 1);
        assert!(first[0].path.ends_with("a"));

        let second = debouncer.drain_quiet(WINDOW, start + Duration::from_millis(180));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_unavailable_when_no_roots_exist() {
        let forge = TestForge::new();
        let mut watcher = ChangeWatcher::new(
            forge.store().watch_roots(),
            WINDOW,
            Arc::new(ConnectionManager::new()),
        );
        assert_eq!(watcher.state(), &WatcherState::Idle);
        assert!(matches!(
            watcher.start(),
            WatcherState::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_roots_watched_through_parent() {
        let forge = TestForge::new();
        forge.prd("auth", "---\ntitle: Auth\n---\n");
        let roots = forge.store().watch_roots();
        let mut watcher = ChangeWatcher::new(
            roots.clone(),
            WINDOW,
            Arc::new(ConnectionManager::new()),
        );
        match watcher.start() {
            WatcherState::Watching { roots: watched } => assert_eq!(watched, &roots),
            other => panic!("expected watching, got {:?}", other),
        }
        watcher.stop();
        assert_eq!(watcher.state(), &WatcherState::Idle);
    }

    #[tokio::test]
    async fn test_root_created_after_start_is_attached() {
        let forge = TestForge::new();
        forge.prd("auth", "---\ntitle: Auth\n---\n");
        assert!(!forge.forge_dir().join("progress").exists());

        let connections = Arc::new(ConnectionManager::new());
        let mut sub = connections.subscribe().await;
        let mut watcher = ChangeWatcher::new(forge.store().watch_roots(), WINDOW, connections);
        assert!(watcher.start().is_watching());

        forge.checkpoint("auth", serde_json::json!({"status": "building"}));
        tokio::time::sleep(Duration::from_millis(300)).await;
        forge.checkpoint("auth", serde_json::json!({"status": "completed"}));

        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(text) = sub.receiver.recv().await {
                if text.contains("checkpoint.json") {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(found, "no change signal for a checkpoint under a new root");
    }

    #[test]
    fn test_collect_files_walks_nested_dirs() {
        let forge = TestForge::new();
        forge.checkpoint("auth", serde_json::json!({}));
        forge.checkpoint("billing", serde_json::json!({}));

        let mut files = Vec::new();
        collect_files(&forge.forge_dir().join("progress"), &mut files);
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("auth/checkpoint.json"));
        assert!(files[1].ends_with("billing/checkpoint.json"));

        let mut none = Vec::new();
        collect_files(&forge.forge_dir().join("missing"), &mut none);
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_file_write_publishes_single_signal() {
        let forge = TestForge::new();
        forge.checkpoint("auth", serde_json::json!({"status": "building"}));

        let connections = Arc::new(ConnectionManager::new());
        let mut sub = connections.subscribe().await;
        let mut watcher = ChangeWatcher::new(forge.store().watch_roots(), WINDOW, connections);
        assert!(watcher.start().is_watching());

        forge.checkpoint("auth", serde_json::json!({"status": "completed"}));

        let text = tokio::time::timeout(Duration::from_secs(5), sub.receiver.recv())
            .await
            .expect("no change signal")
            .unwrap();
        assert!(text.contains("file_change"));
        assert!(text.contains("checkpoint.json"));

        // The burst from a single write is coalesced.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(sub.receiver.try_recv().is_err());
    }
}
