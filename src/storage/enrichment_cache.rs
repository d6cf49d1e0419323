use crate::core::clock::Clock;
use crate::core::config::Config;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Trim, casefold and collapse internal whitespace
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized query
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub provider: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    entries: Vec<&'a CacheEntry>,
}

#[derive(Default)]
struct CacheState {
    loaded: bool,
    entries: BTreeMap<String, CacheEntry>,
}

/// TTL cache of provider search results, persisted as one JSON snapshot.
///
/// The snapshot is read once on first access. Every `set` rewrites it through
/// a temp file and a rename, so the previous snapshot survives a crash. An
/// unreadable or corrupt snapshot is an empty cache.
pub struct EnrichmentCache {
    path: PathBuf,
    ttl_days: i64,
    provider_scoped: bool,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl EnrichmentCache {
    pub fn new(path: PathBuf, ttl_days: i64, provider_scoped: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            ttl_days,
            provider_scoped,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn open(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.enrichment_cache_path.clone(),
            config.settings.enrichment_ttl_days,
            config.settings.provider_scoped_cache,
            clock,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached payload, or `None` if missing or expired (expired entries are dropped)
    pub fn get(&self, query: &str, provider: &str) -> Option<Value> {
        let internal_key = self.make_key(&normalize_query(query), provider);
        let mut state = self.lock_loaded();
        let expired = self.is_expired(state.entries.get(&internal_key)?);
        if expired {
            state.entries.remove(&internal_key);
            tracing::debug!(key = %internal_key, "Enrichment cache entry expired");
            return None;
        }
        state.entries.get(&internal_key).map(|entry| entry.payload.clone())
    }

    /// Store `payload` and rewrite the snapshot
    pub fn set(&self, query: &str, provider: &str, payload: Value) {
        let norm = normalize_query(query);
        let internal_key = self.make_key(&norm, provider);
        let mut state = self.lock_loaded();
        state.entries.insert(
            internal_key,
            CacheEntry {
                key: norm,
                provider: provider.to_string(),
                created_at: self.clock.now(),
                payload,
            },
        );
        self.save(&state);
    }

    /// Remove every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut state = self.lock_loaded();
        let before = state.entries.len();
        let now = self.clock.now();
        state.entries.retain(|_, entry| !self.is_expired_at(entry, now));
        let removed = before - state.entries.len();
        if removed > 0 {
            self.save(&state);
        }
        tracing::info!(removed, "Purged expired enrichment cache entries");
        removed
    }

    pub fn len(&self) -> usize {
        self.lock_loaded().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_key(&self, norm_query: &str, provider: &str) -> String {
        if self.provider_scoped {
            format!("{}::{}", provider, norm_query)
        } else {
            norm_query.to_string()
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.is_expired_at(entry, self.clock.now())
    }

    /// A TTL too large for chrono to represent never expires
    fn is_expired_at(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        self.ttl_days > 0
            && Duration::try_days(self.ttl_days).is_some_and(|ttl| now - entry.created_at > ttl)
    }

    fn lock_loaded(&self) -> MutexGuard<'_, CacheState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.loaded {
            state.loaded = true;
            state.entries = self.load();
        }
        state
    }

    fn load(&self) -> BTreeMap<String, CacheEntry> {
        let mut entries = BTreeMap::new();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return entries,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Enrichment cache unreadable, starting empty");
                return entries;
            }
        };
        let raw: Value = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Enrichment cache corrupt, starting empty");
                return entries;
            }
        };

        let items = raw
            .get("entries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let loaded_at = self.clock.now();
        for mut item in items {
            // Entries written without a timestamp start their TTL now
            if let Some(fields) = item.as_object_mut() {
                if !fields.contains_key("created_at") {
                    if let Ok(now) = serde_json::to_value(loaded_at) {
                        fields.insert("created_at".to_string(), now);
                    }
                }
            }
            match serde_json::from_value::<CacheEntry>(item) {
                Ok(entry) => {
                    let internal_key = self.make_key(&entry.key, &entry.provider);
                    entries.insert(internal_key, entry);
                }
                Err(e) => tracing::debug!(error = %e, "Skipping malformed enrichment cache entry"),
            }
        }
        tracing::debug!(count = entries.len(), "Loaded enrichment cache");
        entries
    }

    fn save(&self, state: &CacheState) {
        if let Err(e) = self.write_snapshot(state) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist enrichment cache");
        }
    }

    fn write_snapshot(&self, state: &CacheState) -> crate::core::error::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            entries: state.entries.values().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
