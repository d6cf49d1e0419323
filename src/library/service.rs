use crate::core::clock::{Clock, SystemClock};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::paths::normalize_path;
use crate::enrichment::manager::{EnrichmentManager, RankedCandidate};
use crate::enrichment::provider::{MusicBrainzStub, Provider};
use crate::indexing::kind::MediaKind;
use crate::indexing::pool::{ScanHandle, ScanPool};
use crate::indexing::scanner::{ProgressFn, Scanner};
use crate::indexing::watcher::{FileWatcher, WatchHandler};
use crate::library::playlists::{load_smart_playlists, save_smart_playlists, SmartPlaylist};
use crate::library::queries::files_by_genre;
use crate::library::stats::LibraryStats;
use crate::metadata::cache::MetadataCache;
use crate::metadata::model::MediaMetadata;
use crate::metadata::reader::{MediaReader, TagReader};
use crate::storage::enrichment_cache::EnrichmentCache;
use crate::storage::index::{FileRecord, IndexStore, Source};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Change notifications delivered to a [`LibraryListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    SourceAdded(PathBuf),
    SourceRemoved(PathBuf),
    ScanFinished { root: PathBuf, processed: u64 },
    FileAdded(PathBuf),
    FileModified(PathBuf),
    FileRemoved(PathBuf),
    FileMoved { from: PathBuf, to: PathBuf },
}

/// Consumer of library changes, e.g. a view that needs refreshing.
/// Runs on whichever thread caused the change.
pub trait LibraryListener: Send + Sync {
    fn on_event(&self, event: &LibraryEvent);
}

type ListenerSlot = Arc<RwLock<Option<Arc<dyn LibraryListener>>>>;

fn notify(listener: &ListenerSlot, event: LibraryEvent) {
    let listener = listener
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(listener) = listener {
        listener.on_event(&event);
    }
}

/// Watch handler that keeps the index and metadata cache in step with disk.
/// Metadata is evicted before the listener hears about a change.
struct IndexSync {
    scanner: Arc<Scanner>,
    metadata: Arc<MetadataCache>,
    listener: ListenerSlot,
}

impl IndexSync {
    fn log_failure(&self, action: &str, path: &Path, result: Result<bool>) {
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to {} file", action);
        }
    }
}

impl WatchHandler for IndexSync {
    fn on_created(&self, path: &Path) {
        self.metadata.evict(path);
        self.log_failure("add", path, self.scanner.add_file_by_path(path));
        notify(&self.listener, LibraryEvent::FileAdded(path.to_path_buf()));
    }

    fn on_modified(&self, path: &Path) {
        self.metadata.evict(path);
        self.log_failure("update", path, self.scanner.update_file_by_path(path));
        notify(&self.listener, LibraryEvent::FileModified(path.to_path_buf()));
    }

    fn on_deleted(&self, path: &Path) {
        self.metadata.evict(path);
        self.log_failure("remove", path, self.scanner.remove_file_by_path(path));
        notify(&self.listener, LibraryEvent::FileRemoved(path.to_path_buf()));
    }

    fn on_moved(&self, from: &Path, to: &Path) {
        self.metadata.evict(from);
        self.metadata.evict(to);
        self.log_failure("move", to, self.scanner.move_file(from, to));
        notify(
            &self.listener,
            LibraryEvent::FileMoved {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            },
        );
    }
}

/// Entry point for front ends: registration, scanning, watching, queries,
/// metadata and enrichment over one index.
pub struct MediaLibrary {
    config: Config,
    store: Arc<IndexStore>,
    scanner: Arc<Scanner>,
    pool: ScanPool,
    watcher: FileWatcher,
    metadata: Arc<MetadataCache>,
    enrichment: EnrichmentManager,
    listener: ListenerSlot,
    clock: Arc<dyn Clock>,
}

impl MediaLibrary {
    /// Open the library under `config` with per-kind metadata reading and the
    /// bundled MusicBrainz provider
    pub fn open(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(MusicBrainzStub::new(clock.clone()))];
        Self::with_parts(config, Arc::new(MediaReader), providers, clock)
    }

    pub fn with_parts(
        config: Config,
        reader: Arc<dyn TagReader>,
        providers: Vec<Arc<dyn Provider>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = Arc::new(IndexStore::open(&config)?);
        let scanner = Arc::new(Scanner::new(Arc::clone(&store)));
        let pool = ScanPool::new(Arc::clone(&scanner), config.settings.scan_workers())?;
        let watcher = FileWatcher::new(config.settings.watch_debounce());
        let metadata = Arc::new(MetadataCache::new(reader));
        let cache = EnrichmentCache::open(&config, clock.clone());
        let enrichment = EnrichmentManager::new(
            cache,
            providers,
            config.settings.provider_timeout(),
            clock.clone(),
        );

        Ok(Self {
            config,
            store,
            scanner,
            pool,
            watcher,
            metadata,
            enrichment,
            listener: Arc::new(RwLock::new(None)),
            clock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn LibraryListener>>) {
        *self.listener.write().unwrap_or_else(|e| e.into_inner()) = listener;
    }

    // Registration

    /// Register an existing directory as a source; watched at once if watching
    pub fn add_source(&self, path: &Path) -> Result<u64> {
        if !path.is_dir() {
            return Err(Error::InvalidSource(path.to_path_buf()));
        }
        let root = normalize_path(path);
        let id = self.store.add_source(&root)?;
        if self.watcher.is_watching() {
            self.watcher.add_path(&root);
        }
        notify(&self.listener, LibraryEvent::SourceAdded(root));
        Ok(id)
    }

    /// Deregister a source, dropping its files, its watch and its cached metadata
    pub fn remove_source(&self, path: &Path) -> Result<bool> {
        let removed = self.store.remove_source(path)?;
        let root = normalize_path(path);
        self.watcher.remove_path(&root);
        if removed {
            self.metadata.evict_under(&root);
            notify(&self.listener, LibraryEvent::SourceRemoved(root));
        }
        Ok(removed)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.store.list_sources()?)
    }

    // Indexing

    pub fn scan_source(&self, root: &Path, on_progress: Option<&ProgressFn<'_>>) -> Result<u64> {
        let processed = self.scanner.scan_source(root, on_progress)?;
        notify(
            &self.listener,
            LibraryEvent::ScanFinished {
                root: normalize_path(root),
                processed,
            },
        );
        Ok(processed)
    }

    /// Scan a root, then start watching it if a watch session is active
    pub fn scan_new_source(&self, root: &Path, on_progress: Option<&ProgressFn<'_>>) -> Result<u64> {
        let processed = self.scan_source(root, on_progress)?;
        if self.watcher.is_watching() {
            self.watcher.add_path(&normalize_path(root));
        }
        Ok(processed)
    }

    /// Rescan every registered source whose root still exists
    pub fn full_rescan(&self, on_progress: Option<&ProgressFn<'_>>) -> Result<u64> {
        let mut total = 0;
        for source in self.store.list_sources()? {
            if !source.path.is_dir() {
                tracing::warn!(path = %source.path.display(), "Source root is missing, skipping");
                continue;
            }
            total += self.scan_source(&source.path, on_progress)?;
        }
        Ok(total)
    }

    /// Queue a scan on the bounded pool; the callback runs on the worker
    pub fn submit_scan(&self, root: PathBuf, on_progress: Option<Arc<ProgressFn<'static>>>) -> ScanHandle {
        self.pool.submit(root, on_progress)
    }

    pub fn add_file_by_path(&self, path: &Path) -> Result<bool> {
        self.metadata.evict(path);
        self.scanner.add_file_by_path(path)
    }

    pub fn update_file_by_path(&self, path: &Path) -> Result<bool> {
        self.metadata.evict(path);
        self.scanner.update_file_by_path(path)
    }

    pub fn remove_file_by_path(&self, path: &Path) -> Result<bool> {
        self.metadata.evict(path);
        self.scanner.remove_file_by_path(path)
    }

    // Queries

    pub fn list_files(&self, limit: Option<usize>) -> Result<Vec<FileRecord>> {
        Ok(self.store.list_files(limit)?)
    }

    pub fn list_files_with_sources(&self, limit: Option<usize>) -> Result<Vec<(FileRecord, PathBuf)>> {
        Ok(self.store.list_files_with_sources(limit)?)
    }

    pub fn list_files_by_kind(
        &self,
        kind: MediaKind,
        limit: Option<usize>,
    ) -> Result<Vec<(FileRecord, PathBuf)>> {
        Ok(self.store.list_files_by_kind(kind, limit)?)
    }

    pub fn list_top_rated(&self, limit: Option<usize>) -> Result<Vec<(FileRecord, PathBuf)>> {
        Ok(self.store.list_top_rated(limit)?)
    }

    pub fn files_by_genre(&self, genre: &str, limit: Option<usize>) -> Result<Vec<(FileRecord, PathBuf)>> {
        let entries = self.store.list_files_with_sources(None)?;
        Ok(files_by_genre(entries, &self.metadata, genre, limit))
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let entries = self.store.list_files_with_sources(None)?;
        Ok(LibraryStats::collect(&entries, &self.metadata))
    }

    // Smart playlists

    pub fn smart_playlists(&self) -> Vec<SmartPlaylist> {
        load_smart_playlists(&self.config.playlists_path)
    }

    pub fn save_smart_playlists(&self, playlists: &[SmartPlaylist]) -> Result<()> {
        save_smart_playlists(&self.config.playlists_path, playlists)
    }

    /// Indexed files matching the playlist's rules, most recent first
    pub fn evaluate_smart_playlist(
        &self,
        playlist: &SmartPlaylist,
    ) -> Result<Vec<(FileRecord, PathBuf)>> {
        let entries = self.store.list_files_with_sources(None)?;
        Ok(playlist.evaluate(entries, &self.metadata, self.clock.now()))
    }

    // Attributes

    pub fn set_rating(&self, path: &Path, rating: Option<u8>) -> Result<bool> {
        self.scanner.set_rating(path, rating)
    }

    pub fn set_tags(&self, path: &Path, tags: &[String]) -> Result<bool> {
        self.scanner.set_tags(path, tags)
    }

    pub fn get_attributes(&self, path: &Path) -> Result<(Option<u8>, Vec<String>)> {
        self.scanner.get_attributes(path)
    }

    // Watching

    /// Watch every registered source. False if watching is unavailable.
    pub fn start_watching(&self) -> bool {
        let roots = match self.store.list_sources() {
            Ok(sources) => sources.into_iter().map(|s| s.path).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot list sources to watch");
                return false;
            }
        };
        let handler = Arc::new(IndexSync {
            scanner: Arc::clone(&self.scanner),
            metadata: Arc::clone(&self.metadata),
            listener: Arc::clone(&self.listener),
        });
        self.watcher.start(handler, &roots)
    }

    pub fn stop_watching(&self) {
        self.watcher.stop();
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_watching()
    }

    pub fn is_watch_available(&self) -> bool {
        FileWatcher::is_available()
    }

    pub fn watched_path_count(&self) -> usize {
        self.watcher.watched_path_count()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watcher.watched_paths()
    }

    // Metadata

    /// Tag metadata for a file with its stored rating and tags laid over it
    pub fn get_metadata(&self, path: &Path) -> MediaMetadata {
        let mut metadata = self.metadata.get(path);
        match self.scanner.get_attributes(path) {
            Ok((rating, tags)) => {
                if rating.is_some() {
                    metadata.rating = rating;
                }
                if !tags.is_empty() {
                    metadata.tags = tags;
                }
            }
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "No stored attributes"),
        }
        metadata
    }

    pub fn evict_metadata(&self, path: &Path) -> bool {
        self.metadata.evict(path)
    }

    // Enrichment

    pub fn search(
        &self,
        query: &str,
        kind: MediaKind,
        context: Option<&MediaMetadata>,
    ) -> Vec<RankedCandidate> {
        self.enrichment.search(query, kind, context)
    }

    pub fn enrich(&self, metadata: MediaMetadata, selected: &RankedCandidate) -> Result<MediaMetadata> {
        self.enrichment.enrich(metadata, selected)
    }

    pub fn purge_enrichment_cache(&self) -> usize {
        self.enrichment.cache().purge_expired()
    }
}
