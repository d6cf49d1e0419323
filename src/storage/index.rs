use crate::core::config::Config;
use crate::core::error::StoreError;
use crate::core::paths::{join_posix, normalize_path, relative_posix};
use crate::indexing::kind::MediaKind;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Registered roots: id -> absolute path
const SOURCES_TABLE: TableDefinition<u64, &str> = TableDefinition::new("sources");

/// Reverse index enforcing one id per path
const SOURCE_PATHS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("source_paths");

/// Indexed files keyed by (source id, relative path); value is a JSON row
const FILES_TABLE: TableDefinition<(u64, &str), &str> = TableDefinition::new("files");

/// Monotonic id and sequence allocation
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const NEXT_SOURCE_ID: &str = "next_source_id";
const NEXT_FILE_SEQ: &str = "next_file_seq";

type StoreResult<T> = std::result::Result<T, StoreError>;

/// A registered root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: u64,
    pub path: PathBuf,
}

/// One indexed file, relative to its source
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub source_id: u64,
    /// POSIX-style path relative to the source root
    pub relative_path: String,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified_time: f64,
    pub kind: MediaKind,
    /// User rating, 0..=5
    pub rating: Option<u8>,
    pub tags: Vec<String>,
}

impl FileRecord {
    /// Absolute location under the given source root
    pub fn absolute_path(&self, source_path: &Path) -> PathBuf {
        join_posix(source_path, &self.relative_path)
    }
}

/// A path mapped onto its owning source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub source_id: u64,
    pub source_path: PathBuf,
    pub relative_path: String,
}

/// Stored value of a file row. Unknown fields are ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRow {
    /// Insertion sequence; kept across updates so recency means "first indexed"
    seq: u64,
    size: u64,
    modified_time: f64,
    kind: MediaKind,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(default)]
    tags: Vec<String>,
}

impl FileRow {
    fn into_record(self, source_id: u64, relative_path: String) -> FileRecord {
        FileRecord {
            source_id,
            relative_path,
            size: self.size,
            modified_time: self.modified_time,
            kind: self.kind,
            rating: self.rating,
            tags: self.tags,
        }
    }
}

/// Persistent index of sources and their files.
///
/// Every mutating call is a single redb write transaction that commits before
/// returning. redb admits one writer at a time, so concurrent scans and
/// watcher repairs serialize on the same key instead of racing.
pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    /// Open or create the index store at the configured location
    pub fn open(config: &Config) -> StoreResult<Self> {
        Self::open_at(&config.index_path)
    }

    /// Open or create the index store at an explicit path
    pub fn open_at(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = if path.exists() {
            Database::open(path).map_err(|e| {
                if e.to_string().to_lowercase().contains("lock")
                    || e.to_string().to_lowercase().contains("already open")
                {
                    StoreError::Locked
                } else {
                    StoreError::Open(e)
                }
            })?
        } else {
            Database::create(path)?
        };

        // Create every table up front so read transactions never miss one
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SOURCES_TABLE)?;
            write_txn.open_table(SOURCE_PATHS_TABLE)?;
            write_txn.open_table(FILES_TABLE)?;
            write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Register a source root. Registering the same path again returns the
    /// existing id without writing anything.
    pub fn add_source(&self, path: &Path) -> StoreResult<u64> {
        let normalized = normalize_path(path);
        if let Some(id) = self.source_id(path)? {
            return Ok(id);
        }

        let key = path_key(&normalized);
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut paths = write_txn.open_table(SOURCE_PATHS_TABLE)?;
            let existing = paths.get(key.as_str())?.map(|guard| guard.value());
            match existing {
                Some(id) => id,
                None => {
                    let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
                    let id = counters
                        .get(NEXT_SOURCE_ID)?
                        .map(|guard| guard.value())
                        .unwrap_or(1);
                    counters.insert(NEXT_SOURCE_ID, id + 1)?;

                    let mut sources = write_txn.open_table(SOURCES_TABLE)?;
                    sources.insert(id, key.as_str())?;
                    paths.insert(key.as_str(), id)?;
                    id
                }
            }
        };
        write_txn.commit()?;

        tracing::info!(source_id = id, path = %normalized.display(), "Registered source");
        Ok(id)
    }

    /// Remove a source and every file indexed under it.
    /// Returns false if the path was not registered.
    pub fn remove_source(&self, path: &Path) -> StoreResult<bool> {
        let candidates = [path_key(&normalize_path(path)), path_key(path)];

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut paths = write_txn.open_table(SOURCE_PATHS_TABLE)?;
            let mut found = None;
            for key in &candidates {
                if let Some(id) = paths.remove(key.as_str())?.map(|guard| guard.value()) {
                    found = Some(id);
                    break;
                }
            }

            match found {
                Some(id) => {
                    let mut sources = write_txn.open_table(SOURCES_TABLE)?;
                    sources.remove(id)?;

                    let mut files = write_txn.open_table(FILES_TABLE)?;
                    let doomed = files
                        .range((id, "")..(id + 1, ""))?
                        .map(|item| item.map(|(key, _)| key.value().1.to_string()))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    for relative_path in &doomed {
                        files.remove((id, relative_path.as_str()))?;
                    }
                    tracing::info!(source_id = id, files = doomed.len(), "Removed source");
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;

        Ok(removed)
    }

    /// Id of a registered source path
    pub fn source_id(&self, path: &Path) -> StoreResult<Option<u64>> {
        let key = path_key(&normalize_path(path));
        let read_txn = self.db.begin_read()?;
        let paths = read_txn.open_table(SOURCE_PATHS_TABLE)?;
        let id = paths.get(key.as_str())?.map(|guard| guard.value());
        Ok(id)
    }

    /// All registered sources ordered by id
    pub fn list_sources(&self) -> StoreResult<Vec<Source>> {
        let read_txn = self.db.begin_read()?;
        let sources = read_txn.open_table(SOURCES_TABLE)?;

        let mut out = Vec::new();
        for item in sources.iter()? {
            let (id, path) = item?;
            out.push(Source {
                id: id.value(),
                path: PathBuf::from(path.value()),
            });
        }
        Ok(out)
    }

    /// Map an absolute path onto the source that contains it.
    /// Nested sources resolve to the deepest root.
    pub fn resolve(&self, path: &Path) -> StoreResult<Option<ResolvedPath>> {
        let normalized = normalize_path(path);
        let resolved = self
            .list_sources()?
            .into_iter()
            .filter_map(|source| {
                relative_posix(&source.path, &normalized).map(|relative_path| ResolvedPath {
                    source_id: source.id,
                    source_path: source.path,
                    relative_path,
                })
            })
            .max_by_key(|resolved| resolved.source_path.components().count());
        Ok(resolved)
    }

    /// Insert or update a file in one transaction.
    ///
    /// An existing row keeps its insertion order and its rating/tags; only
    /// size, modification time and kind are replaced.
    pub fn upsert_file(
        &self,
        source_id: u64,
        relative_path: &str,
        size: u64,
        modified_time: f64,
        kind: MediaKind,
    ) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        let known_source = {
            let sources = write_txn.open_table(SOURCES_TABLE)?;
            let known = sources.get(source_id)?.is_some();
            known
        };
        if !known_source {
            write_txn.abort()?;
            return Err(StoreError::UnknownSource(source_id));
        }

        {
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let existing: Option<FileRow> = match files.get((source_id, relative_path))? {
                Some(guard) => Some(serde_json::from_str(guard.value())?),
                None => None,
            };

            let row = match existing {
                Some(mut row) => {
                    row.size = size;
                    row.modified_time = modified_time;
                    row.kind = kind;
                    row
                }
                None => {
                    let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
                    let seq = counters
                        .get(NEXT_FILE_SEQ)?
                        .map(|guard| guard.value())
                        .unwrap_or(1);
                    counters.insert(NEXT_FILE_SEQ, seq + 1)?;
                    FileRow {
                        seq,
                        size,
                        modified_time,
                        kind,
                        rating: None,
                        tags: Vec::new(),
                    }
                }
            };

            let json = serde_json::to_string(&row)?;
            files.insert((source_id, relative_path), json.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    /// Delete a file row. Returns false if there was nothing to delete.
    pub fn remove_file(&self, source_id: u64, relative_path: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let removed = files.remove((source_id, relative_path))?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Look up a single file row
    pub fn get_file(&self, source_id: u64, relative_path: &str) -> StoreResult<Option<FileRecord>> {
        let read_txn = self.db.begin_read()?;
        let files = read_txn.open_table(FILES_TABLE)?;
        let row: Option<FileRow> = match files.get((source_id, relative_path))? {
            Some(guard) => Some(serde_json::from_str(guard.value())?),
            None => None,
        };
        Ok(row.map(|row| row.into_record(source_id, relative_path.to_string())))
    }

    /// Set or clear the rating of an indexed file (clamped to 0..=5)
    pub fn set_rating(
        &self,
        source_id: u64,
        relative_path: &str,
        rating: Option<u8>,
    ) -> StoreResult<bool> {
        let rating = rating.map(|r| r.min(5));
        self.modify_row(source_id, relative_path, |row| row.rating = rating)
    }

    /// Replace the tags of an indexed file; blank tags are dropped
    pub fn set_tags(&self, source_id: u64, relative_path: &str, tags: &[String]) -> StoreResult<bool> {
        let cleaned: Vec<String> = tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        self.modify_row(source_id, relative_path, |row| row.tags = cleaned)
    }

    fn modify_row(
        &self,
        source_id: u64,
        relative_path: &str,
        apply: impl FnOnce(&mut FileRow),
    ) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let existing: Option<FileRow> = match files.get((source_id, relative_path))? {
                Some(guard) => Some(serde_json::from_str(guard.value())?),
                None => None,
            };
            match existing {
                Some(mut row) => {
                    apply(&mut row);
                    let json = serde_json::to_string(&row)?;
                    files.insert((source_id, relative_path), json.as_str())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Files ordered most-recently-inserted first
    pub fn list_files(&self, limit: Option<usize>) -> StoreResult<Vec<FileRecord>> {
        Ok(self
            .list_files_with_sources(limit)?
            .into_iter()
            .map(|(record, _)| record)
            .collect())
    }

    /// Files with their source root, most-recently-inserted first
    pub fn list_files_with_sources(
        &self,
        limit: Option<usize>,
    ) -> StoreResult<Vec<(FileRecord, PathBuf)>> {
        let mut rows = self.load_rows()?;
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(truncate(rows, limit))
    }

    /// Files of one kind, newest modification first
    pub fn list_files_by_kind(
        &self,
        kind: MediaKind,
        limit: Option<usize>,
    ) -> StoreResult<Vec<(FileRecord, PathBuf)>> {
        let mut rows: Vec<_> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, record, _)| record.kind == kind)
            .collect();
        rows.sort_by(|a, b| b.1.modified_time.total_cmp(&a.1.modified_time));
        Ok(truncate(rows, limit))
    }

    /// Rated files, highest rating first, newest modification breaking ties
    pub fn list_top_rated(&self, limit: Option<usize>) -> StoreResult<Vec<(FileRecord, PathBuf)>> {
        let mut rows: Vec<_> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, record, _)| record.rating.is_some())
            .collect();
        rows.sort_by(|a, b| {
            b.1.rating
                .cmp(&a.1.rating)
                .then_with(|| b.1.modified_time.total_cmp(&a.1.modified_time))
        });
        Ok(truncate(rows, limit))
    }

    /// Number of indexed files
    pub fn file_count(&self) -> StoreResult<usize> {
        let read_txn = self.db.begin_read()?;
        let files = read_txn.open_table(FILES_TABLE)?;
        let mut count = 0;
        for item in files.iter()? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn load_rows(&self) -> StoreResult<Vec<(u64, FileRecord, PathBuf)>> {
        let read_txn = self.db.begin_read()?;
        let sources_table = read_txn.open_table(SOURCES_TABLE)?;
        let mut sources = HashMap::new();
        for item in sources_table.iter()? {
            let (id, path) = item?;
            sources.insert(id.value(), PathBuf::from(path.value()));
        }

        let files = read_txn.open_table(FILES_TABLE)?;
        let mut rows = Vec::new();
        for item in files.iter()? {
            let (key, value) = item?;
            let (source_id, relative_path) = key.value();
            let Some(source_path) = sources.get(&source_id) else {
                continue;
            };
            match serde_json::from_str::<FileRow>(value.value()) {
                Ok(row) => rows.push((
                    row.seq,
                    row.into_record(source_id, relative_path.to_string()),
                    source_path.clone(),
                )),
                Err(e) => {
                    tracing::warn!(source_id, relative_path, error = %e, "Skipping undecodable file row");
                }
            }
        }
        Ok(rows)
    }
}

fn truncate(
    rows: Vec<(u64, FileRecord, PathBuf)>,
    limit: Option<usize>,
) -> Vec<(FileRecord, PathBuf)> {
    rows.into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(_, record, source)| (record, source))
        .collect()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
