use notify_debouncer_full::{
    new_debouncer,
    notify::{
        self,
        event::{ModifyKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Receiver of classified filesystem changes.
///
/// Called from the watcher's dispatch thread, one event at a time, in the
/// order the OS reported them.
pub trait WatchHandler: Send + Sync + 'static {
    fn on_created(&self, path: &Path);
    fn on_modified(&self, path: &Path);
    fn on_deleted(&self, path: &Path);
    fn on_moved(&self, from: &Path, to: &Path);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Starting,
    Watching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl WatchEvent {
    fn dispatch(&self, handler: &dyn WatchHandler) {
        match self {
            WatchEvent::Created(path) => handler.on_created(path),
            WatchEvent::Modified(path) => handler.on_modified(path),
            WatchEvent::Deleted(path) => handler.on_deleted(path),
            WatchEvent::Moved { from, to } => handler.on_moved(from, to),
        }
    }
}

struct Inner {
    state: WatchState,
    debouncer: Option<Debouncer<RecommendedWatcher, FileIdMap>>,
    dispatcher: Option<JoinHandle<()>>,
    paths: BTreeSet<PathBuf>,
}

/// Recursive watcher over the registered source roots
pub struct FileWatcher {
    debounce: Duration,
    inner: Mutex<Inner>,
}

impl FileWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            inner: Mutex::new(Inner {
                state: WatchState::Stopped,
                debouncer: None,
                dispatcher: None,
                paths: BTreeSet::new(),
            }),
        }
    }

    /// Whether the platform watch backend can be created at all
    pub fn is_available() -> bool {
        notify::recommended_watcher(|_: notify::Result<notify::Event>| {}).is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start watching `roots`, sending changes to `handler`.
    ///
    /// Returns false if the watch backend is unavailable. Roots that cannot be
    /// watched are logged and skipped. Calling this while already watching
    /// keeps the existing session.
    pub fn start(&self, handler: Arc<dyn WatchHandler>, roots: &[PathBuf]) -> bool {
        let mut inner = self.lock();
        if inner.state != WatchState::Stopped {
            return inner.state == WatchState::Watching;
        }
        inner.state = WatchState::Starting;

        let (tx, rx) = mpsc::channel::<Vec<WatchEvent>>();
        let debouncer = new_debouncer(self.debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let batch: Vec<WatchEvent> =
                        events.iter().flat_map(|event| classify_event(event)).collect();
                    if !batch.is_empty() {
                        let _ = tx.send(batch);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(error = %error, "Watch backend error");
                    }
                }
            }
        });
        let mut debouncer = match debouncer {
            Ok(debouncer) => debouncer,
            Err(e) => {
                tracing::warn!(error = %e, "Filesystem watching unavailable");
                inner.state = WatchState::Stopped;
                return false;
            }
        };

        // Handler calls run here so the OS event queue is never blocked on index writes
        let dispatcher = std::thread::Builder::new()
            .name("mediadex-watch".to_string())
            .spawn(move || {
                for batch in rx {
                    for event in &batch {
                        event.dispatch(handler.as_ref());
                    }
                }
            });
        let dispatcher = match dispatcher {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn watch dispatcher");
                inner.state = WatchState::Stopped;
                return false;
            }
        };

        let mut paths = BTreeSet::new();
        for root in roots {
            if watch_root(&mut debouncer, root) {
                paths.insert(root.clone());
            }
        }

        tracing::info!(roots = paths.len(), "Watching sources");
        inner.debouncer = Some(debouncer);
        inner.dispatcher = Some(dispatcher);
        inner.paths = paths;
        inner.state = WatchState::Watching;
        true
    }

    /// Stop watching. Changes still inside the debounce window are dropped.
    pub fn stop(&self) {
        let (debouncer, dispatcher) = {
            let mut inner = self.lock();
            if inner.state == WatchState::Stopped {
                return;
            }
            inner.state = WatchState::Stopped;
            inner.paths.clear();
            (inner.debouncer.take(), inner.dispatcher.take())
        };

        if let Some(debouncer) = debouncer {
            debouncer.stop();
        }
        if let Some(dispatcher) = dispatcher {
            if dispatcher.thread().id() != std::thread::current().id() {
                let _ = dispatcher.join();
            }
        }
        tracing::info!("Stopped watching");
    }

    /// Watch one more root. False when not watching or the root cannot be watched.
    pub fn add_path(&self, path: &Path) -> bool {
        let mut inner = self.lock();
        if inner.paths.contains(path) {
            return true;
        }
        let Some(debouncer) = inner.debouncer.as_mut() else {
            return false;
        };
        if !watch_root(debouncer, path) {
            return false;
        }
        inner.paths.insert(path.to_path_buf());
        true
    }

    /// Stop watching one root. False when it was not watched.
    pub fn remove_path(&self, path: &Path) -> bool {
        let mut inner = self.lock();
        if !inner.paths.remove(path) {
            return false;
        }
        if let Some(debouncer) = inner.debouncer.as_mut() {
            if let Err(e) = debouncer.watcher().unwatch(path) {
                tracing::debug!(path = %path.display(), error = %e, "Failed to unwatch");
            }
            debouncer.cache().remove_root(path);
        }
        tracing::info!(path = %path.display(), "Stopped watching source");
        true
    }

    pub fn state(&self) -> WatchState {
        self.lock().state
    }

    pub fn is_watching(&self) -> bool {
        self.state() == WatchState::Watching
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.lock().paths.iter().cloned().collect()
    }

    pub fn watched_path_count(&self) -> usize {
        self.lock().paths.len()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_root(debouncer: &mut Debouncer<RecommendedWatcher, FileIdMap>, root: &Path) -> bool {
    match debouncer.watcher().watch(root, RecursiveMode::Recursive) {
        Ok(()) => {
            debouncer.cache().add_root(root, RecursiveMode::Recursive);
            tracing::debug!(path = %root.display(), "Watching source");
            true
        }
        Err(e) => {
            tracing::warn!(path = %root.display(), error = %e, "Failed to watch source");
            false
        }
    }
}

/// Map one OS event onto created/modified/deleted/moved.
///
/// Renames seen as a single event become `Moved`; a rename half whose partner
/// was not reported becomes a delete or a create. Directory events are dropped.
pub fn classify_event(event: &notify::Event) -> Vec<WatchEvent> {
    let files = |paths: &[PathBuf]| -> Vec<PathBuf> {
        paths.iter().filter(|p| !p.is_dir()).cloned().collect()
    };

    match event.kind {
        EventKind::Create(_) => files(&event.paths)
            .into_iter()
            .map(WatchEvent::Created)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] if !to.is_dir() => vec![WatchEvent::Moved {
                from: from.clone(),
                to: to.clone(),
            }],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .cloned()
            .map(WatchEvent::Deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => files(&event.paths)
            .into_iter()
            .map(WatchEvent::Created)
            .collect(),
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| {
                if p.exists() {
                    WatchEvent::Created(p.clone())
                } else {
                    WatchEvent::Deleted(p.clone())
                }
            })
            .collect(),
        EventKind::Modify(_) => files(&event.paths)
            .into_iter()
            .map(WatchEvent::Modified)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .cloned()
            .map(WatchEvent::Deleted)
            .collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
