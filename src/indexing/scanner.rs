use crate::core::error::{Error, Result};
use crate::core::paths::{normalize_path, relative_posix};
use crate::indexing::kind::infer_kind;
use crate::storage::index::IndexStore;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Progress listener: `(path, processed, total)`, called after every file
pub type ProgressFn<'a> = dyn Fn(&Path, u64, u64) + Send + Sync + 'a;

/// Walks sources into the index and repairs single paths for the watcher
pub struct Scanner {
    store: Arc<IndexStore>,
}

impl Scanner {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Register `root` (or reuse its registration) and index every file under it.
    ///
    /// Files that cannot be stat'ed or stored are skipped; they still count as
    /// processed so progress stays monotonic. Returns the processed count.
    pub fn scan_source(&self, root: &Path, on_progress: Option<&ProgressFn<'_>>) -> Result<u64> {
        if !root.is_dir() {
            return Err(Error::InvalidSource(root.to_path_buf()));
        }
        let root = normalize_path(root);
        let source_id = self.store.add_source(&root)?;

        let total = walk_files(&root).count() as u64;
        tracing::info!(root = %root.display(), total, "Scanning source");

        let mut processed = 0u64;
        let mut skipped = 0u64;
        for path in walk_files(&root) {
            if let Err(e) = self.index_file(source_id, &root, &path) {
                tracing::warn!(path = %path.display(), error = %e, "Skipping file");
                skipped += 1;
            }
            processed += 1;
            if let Some(report) = on_progress {
                // Files created between the two walks can push us past the first count
                report(&path, processed, total.max(processed));
            }
        }

        tracing::info!(root = %root.display(), processed, skipped, "Scan complete");
        Ok(processed)
    }

    fn index_file(&self, source_id: u64, root: &Path, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path)?;
        let relative_path = relative_posix(root, path).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is outside {}", path.display(), root.display()),
            ))
        })?;
        self.store.upsert_file(
            source_id,
            &relative_path,
            metadata.len(),
            modified_secs(&metadata)?,
            infer_kind(path),
        )?;
        tracing::debug!(path = %path.display(), "Indexed file");
        Ok(())
    }

    /// Index one file by absolute path.
    /// Returns false if it is outside every source or cannot be stat'ed.
    pub fn add_file_by_path(&self, path: &Path) -> Result<bool> {
        let Some(resolved) = self.store.resolve(path)? else {
            tracing::debug!(path = %path.display(), "Path is not inside any source");
            return Ok(false);
        };

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(false),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot stat file");
                return Ok(false);
            }
        };

        self.store.upsert_file(
            resolved.source_id,
            &resolved.relative_path,
            metadata.len(),
            modified_secs(&metadata)?,
            infer_kind(path),
        )?;
        tracing::debug!(path = %path.display(), "Added file to index");
        Ok(true)
    }

    /// Refresh one file; same upsert as [`Scanner::add_file_by_path`]
    pub fn update_file_by_path(&self, path: &Path) -> Result<bool> {
        self.add_file_by_path(path)
    }

    /// Drop one file from the index. Returns false if it was not indexed.
    pub fn remove_file_by_path(&self, path: &Path) -> Result<bool> {
        let Some(resolved) = self.store.resolve(path)? else {
            tracing::debug!(path = %path.display(), "Path is not inside any source");
            return Ok(false);
        };
        let removed = self
            .store
            .remove_file(resolved.source_id, &resolved.relative_path)?;
        if removed {
            tracing::debug!(path = %path.display(), "Removed file from index");
        }
        Ok(removed)
    }

    /// Delete `from` and index `to`, carrying rating and tags across.
    /// Returns whether `to` ended up indexed.
    pub fn move_file(&self, from: &Path, to: &Path) -> Result<bool> {
        let (rating, tags) = self.get_attributes(from)?;
        self.remove_file_by_path(from)?;
        let added = self.add_file_by_path(to)?;
        if added {
            if rating.is_some() {
                self.set_rating(to, rating)?;
            }
            if !tags.is_empty() {
                self.set_tags(to, &tags)?;
            }
        }
        Ok(added)
    }

    pub fn set_rating(&self, path: &Path, rating: Option<u8>) -> Result<bool> {
        match self.store.resolve(path)? {
            Some(resolved) => Ok(self.store.set_rating(
                resolved.source_id,
                &resolved.relative_path,
                rating,
            )?),
            None => {
                tracing::warn!(path = %path.display(), "Cannot rate a file outside every source");
                Ok(false)
            }
        }
    }

    pub fn set_tags(&self, path: &Path, tags: &[String]) -> Result<bool> {
        match self.store.resolve(path)? {
            Some(resolved) => Ok(self.store.set_tags(
                resolved.source_id,
                &resolved.relative_path,
                tags,
            )?),
            None => {
                tracing::warn!(path = %path.display(), "Cannot tag a file outside every source");
                Ok(false)
            }
        }
    }

    /// Rating and tags of an indexed file; `(None, [])` when unknown
    pub fn get_attributes(&self, path: &Path) -> Result<(Option<u8>, Vec<String>)> {
        let Some(resolved) = self.store.resolve(path)? else {
            return Ok((None, Vec::new()));
        };
        Ok(self
            .store
            .get_file(resolved.source_id, &resolved.relative_path)?
            .map(|record| (record.rating, record.tags))
            .unwrap_or_default())
    }
}

/// Every non-directory entry under `root`, hidden files and ignore files included
fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build()
        .filter_map(|result| match result {
            Ok(entry) => {
                let is_candidate = entry
                    .file_type()
                    .map(|ft| ft.is_file() || (ft.is_symlink() && !entry.path().is_dir()))
                    .unwrap_or(false);
                is_candidate.then(|| entry.into_path())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to access entry");
                None
            }
        })
}

fn modified_secs(metadata: &std::fs::Metadata) -> Result<f64> {
    let modified = metadata.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    })
}
