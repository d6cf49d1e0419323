use crate::core::paths::normalize_path;
use crate::metadata::model::MediaMetadata;
use crate::metadata::reader::TagReader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Memoized tag reads keyed by absolute path.
///
/// Keys are normalized, so `a/../b.mp3`, a relative spelling or a symlinked
/// alias all share one entry with the canonical path the watcher reports.
/// Entries never expire; they live until `evict` or `clear`.
pub struct MetadataCache {
    reader: Arc<dyn TagReader>,
    entries: Mutex<HashMap<PathBuf, MediaMetadata>>,
}

impl MetadataCache {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self {
            reader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MediaMetadata>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Metadata for `path`, reading tags on a miss.
    /// A failed tag read yields the filename-derived fallback.
    pub fn get(&self, path: &Path) -> MediaMetadata {
        let key = normalize_path(path);
        if let Some(hit) = self.lock().get(&key) {
            return hit.clone();
        }

        // Tag reads can be slow; the map is not locked during them
        let metadata = match self.reader.read(&key) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(path = %key.display(), error = %e, "Tag read failed, using fallback");
                MediaMetadata::from_path(&key)
            }
        };

        self.lock().insert(key, metadata.clone());
        metadata
    }

    /// Drop the entry for `path`. Returns whether one was cached.
    pub fn evict(&self, path: &Path) -> bool {
        self.lock().remove(&normalize_path(path)).is_some()
    }

    /// Drop every entry under `root`; returns how many were removed
    pub fn evict_under(&self, root: &Path) -> usize {
        let root = normalize_path(root);
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|path, _| !path.starts_with(&root));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(&normalize_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        reads: AtomicUsize,
    }

    impl TagReader for CountingReader {
        fn read(&self, path: &Path) -> Result<MediaMetadata> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if path.extension().is_some_and(|e| e == "bad") {
                return Err(Error::Metadata("unreadable".to_string()));
            }
            let mut metadata = MediaMetadata::from_path(path);
            metadata.artist = Some("ABBA".to_string());
            Ok(metadata)
        }
    }

    fn cache() -> (Arc<CountingReader>, MetadataCache) {
        let reader = Arc::new(CountingReader {
            reads: AtomicUsize::new(0),
        });
        let cache = MetadataCache::new(reader.clone());
        (reader, cache)
    }

    #[test]
    fn test_get_memoizes() {
        let (reader, cache) = cache();
        let path = Path::new("/music/waterloo.mp3");

        assert_eq!(cache.get(path).artist.as_deref(), Some("ABBA"));
        assert_eq!(cache.get(path).artist.as_deref(), Some("ABBA"));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_forces_reread() {
        let (reader, cache) = cache();
        let path = Path::new("/music/waterloo.mp3");

        cache.get(path);
        assert!(cache.evict(path));
        assert!(!cache.evict(path));
        cache.get(path);
        assert_eq!(reader.reads.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_under_root() {
        let (_, cache) = cache();
        cache.get(Path::new("/music/a.mp3"));
        cache.get(Path::new("/music/sub/b.mp3"));
        cache.get(Path::new("/musicals/c.mp3"));

        assert_eq!(cache.evict_under(Path::new("/music")), 2);
        assert!(cache.contains(Path::new("/musicals/c.mp3")));
    }

    #[test]
    fn test_failed_read_falls_back_to_filename() {
        let (_, cache) = cache();
        let metadata = cache.get(Path::new("/music/Mamma Mia.bad"));
        assert_eq!(metadata.title.as_deref(), Some("Mamma Mia"));
        assert!(metadata.artist.is_none());
        assert!(cache.contains(Path::new("/music/Mamma Mia.bad")));
    }

    #[test]
    fn test_aliased_spellings_share_one_entry() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("media");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        let song = root.join("a.mp3");
        std::fs::write(&song, b"12345").unwrap();

        let (reader, cache) = cache();
        cache.get(&root.join("sub/../a.mp3"));
        cache.get(&root.join("./a.mp3"));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        // Eviction by the canonical path reaches the entry read through an alias
        assert!(cache.evict(&std::fs::canonicalize(&song).unwrap()));
        assert!(!cache.contains(&root.join("sub/../a.mp3")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_evicts_under_canonical_root() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("media");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.mp3"), b"x").unwrap();
        let alias = temp_dir.path().join("alias");
        std::os::unix::fs::symlink(&root, &alias).unwrap();

        let (_, cache) = cache();
        cache.get(&alias.join("a.mp3"));
        assert_eq!(cache.evict_under(&root), 1);
        assert!(cache.is_empty());
    }
}
