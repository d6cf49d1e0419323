use crate::core::error::{Error, Result};
use crate::indexing::scanner::{ProgressFn, Scanner};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

/// Bounded pool that runs whole-source scans off the caller's thread
pub struct ScanPool {
    pool: ThreadPool,
    scanner: Arc<Scanner>,
}

impl ScanPool {
    /// `workers` is clamped to 1..=2
    pub fn new(scanner: Arc<Scanner>, workers: usize) -> Result<Self> {
        let workers = workers.clamp(1, 2);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mediadex-scan-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build scan pool: {}", e)))?;
        tracing::debug!(workers, "Scan pool ready");
        Ok(Self { pool, scanner })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue a scan of `root`. The progress callback runs on the worker thread.
    pub fn submit(&self, root: PathBuf, on_progress: Option<Arc<ProgressFn<'static>>>) -> ScanHandle {
        let (tx, rx) = mpsc::channel();
        let scanner = Arc::clone(&self.scanner);
        let handle_root = root.clone();
        self.pool.spawn(move || {
            let result = scanner.scan_source(&root, on_progress.as_deref());
            if let Err(e) = &result {
                tracing::warn!(root = %root.display(), error = %e, "Background scan failed");
            }
            // The handle may already be dropped
            let _ = tx.send(result);
        });
        ScanHandle {
            root: handle_root,
            rx,
        }
    }
}

/// Completion handle for one queued scan
pub struct ScanHandle {
    root: PathBuf,
    rx: Receiver<Result<u64>>,
}

impl ScanHandle {
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Block until the scan finishes
    pub fn wait(self) -> Result<u64> {
        self.rx.recv().map_err(|_| abandoned(&self.root))?
    }

    /// `None` while the scan is still running
    pub fn try_result(&self) -> Option<Result<u64>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(abandoned(&self.root))),
        }
    }
}

fn abandoned(root: &std::path::Path) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Scan of {} ended without a result", root.display()),
    ))
}
