use crate::core::clock::Clock;
use crate::core::error::{Error, Result};
use crate::enrichment::provider::{Candidate, Provider};
use crate::enrichment::scoring::{aggregate_score, title_similarity, year_proximity};
use crate::indexing::kind::MediaKind;
use crate::metadata::model::MediaMetadata;
use crate::storage::enrichment_cache::EnrichmentCache;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// A candidate with its context-aware score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub aggregated_score: f64,
}

/// Provider search through the enrichment cache, ranking and merge
pub struct EnrichmentManager {
    cache: EnrichmentCache,
    providers: Vec<Arc<dyn Provider>>,
    timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl EnrichmentManager {
    /// `providers` are consulted in order; `timeout` bounds each provider search
    pub fn new(
        cache: EnrichmentCache,
        providers: Vec<Arc<dyn Provider>>,
        timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            providers,
            timeout,
            clock,
        }
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Ranked candidates from every provider, best first.
    ///
    /// Cached results are reused; a provider that fails or times out
    /// contributes nothing and nothing is cached for it.
    pub fn search(
        &self,
        query: &str,
        kind: MediaKind,
        context: Option<&MediaMetadata>,
    ) -> Vec<RankedCandidate> {
        let mut ranked = Vec::new();

        for provider in &self.providers {
            let candidates = match self.cache.get(query, provider.name()) {
                Some(cached) => {
                    tracing::debug!(provider = provider.name(), query, "Enrichment cache hit");
                    decode_candidates(&cached, provider.name())
                }
                None => match self.search_provider(provider, query, kind) {
                    Ok(candidates) => {
                        self.cache.set(query, provider.name(), encode_candidates(&candidates));
                        candidates
                    }
                    Err(e) => {
                        tracing::warn!(provider = provider.name(), query, error = %e, "Provider search failed");
                        continue;
                    }
                },
            };

            ranked.extend(candidates.into_iter().map(|candidate| {
                let aggregated_score = score_candidate(&candidate, context);
                RankedCandidate {
                    candidate,
                    aggregated_score,
                }
            }));
        }

        ranked.sort_by(|a, b| {
            b.aggregated_score
                .total_cmp(&a.aggregated_score)
                .then_with(|| {
                    a.candidate
                        .title
                        .to_lowercase()
                        .cmp(&b.candidate.title.to_lowercase())
                })
        });
        ranked
    }

    fn search_provider(
        &self,
        provider: &Arc<dyn Provider>,
        query: &str,
        kind: MediaKind,
    ) -> Result<Vec<Candidate>> {
        let Some(timeout) = self.timeout else {
            return provider.search(query, kind);
        };

        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(provider);
        let owned_query = query.to_string();
        std::thread::Builder::new()
            .name(format!("mediadex-provider-{}", provider.name()))
            .spawn(move || {
                let _ = tx.send(worker.search(&owned_query, kind));
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            // The worker thread is left to finish on its own
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Provider(format!(
                "{} timed out after {:?}",
                provider.name(),
                timeout
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Provider(format!(
                "{} search thread panicked",
                provider.name()
            ))),
        }
    }

    /// Merge full detail for `selected` into `metadata` without overwriting
    /// fields that already have values.
    pub fn enrich(&self, mut metadata: MediaMetadata, selected: &RankedCandidate) -> Result<MediaMetadata> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.name() == selected.candidate.provider)
            .ok_or_else(|| Error::UnknownProvider(selected.candidate.provider.clone()))?;

        let detail = provider.enrich(&selected.candidate)?;
        let changed = merge_enrichment(
            &mut metadata,
            &detail,
            provider.name(),
            selected.aggregated_score,
            self.clock.now(),
        );
        tracing::info!(
            provider = provider.name(),
            title = %metadata.display_title(),
            changed,
            "Applied enrichment"
        );
        Ok(metadata)
    }
}

fn score_candidate(candidate: &Candidate, context: Option<&MediaMetadata>) -> f64 {
    let Some(context) = context else {
        return candidate.score;
    };
    let title_score = context
        .title
        .as_deref()
        .map(|title| title_similarity(title, &candidate.title))
        .unwrap_or(0.0);
    let context_year = context.year.and_then(|y| i32::try_from(y).ok());
    let year_score = year_proximity(context_year, candidate.year);
    aggregate_score(candidate.score, title_score, year_score)
}

fn encode_candidates(candidates: &[Candidate]) -> Value {
    json!({ "candidates": candidates })
}

/// Candidates from a cached payload; undecodable items are skipped
fn decode_candidates(payload: &Value, provider: &str) -> Vec<Candidate> {
    let Some(items) = payload.get("candidates").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Candidate>(item.clone()) {
            Ok(mut candidate) => {
                candidate.provider = provider.to_string();
                Some(candidate)
            }
            Err(e) => {
                tracing::debug!(provider, error = %e, "Skipping cached candidate");
                None
            }
        })
        .collect()
}

/// Write `value` into `slot` only if the slot is empty and the value is a string
fn fill(slot: &mut Option<String>, value: Option<&Value>) -> bool {
    if slot.as_deref().is_some_and(|s| !s.is_empty()) {
        return false;
    }
    match value.and_then(Value::as_str) {
        Some(text) => {
            *slot = Some(text.to_string());
            true
        }
        None => false,
    }
}

/// Non-destructive merge of provider detail into `metadata`.
///
/// Returns whether anything changed: an enrichable field was filled or the
/// provider joined `enrichment_sources`. Timestamp and confidence move only
/// on change.
pub fn merge_enrichment(
    metadata: &mut MediaMetadata,
    detail: &Map<String, Value>,
    provider: &str,
    confidence: f64,
    now: DateTime<Utc>,
) -> bool {
    let mut changed = false;
    changed |= fill(&mut metadata.musicbrainz_track_id, detail.get("musicbrainz_track_id"));
    changed |= fill(&mut metadata.musicbrainz_release_id, detail.get("musicbrainz_release_id"));
    changed |= fill(&mut metadata.original_title, detail.get("original_title"));
    changed |= fill(&mut metadata.overview, detail.get("overview"));

    if !metadata.enrichment_sources.iter().any(|p| p == provider) {
        metadata.enrichment_sources.push(provider.to_string());
        changed = true;
    }
    if changed {
        metadata.enrichment_fetched_at = Some(now);
        metadata.enrichment_confidence = Some(confidence);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{ManualClock, SystemClock};
    use crate::enrichment::provider::MusicBrainzStub;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingProvider {
        name: &'static str,
        calls: AtomicUsize,
        candidates: Vec<Candidate>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl CountingProvider {
        fn new(name: &'static str, candidates: Vec<Candidate>) -> Self {
            Self {
                name,
                calls: AtomicUsize::new(0),
                candidates,
                delay: None,
                fail: false,
            }
        }
    }

    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn search(&self, _query: &str, _kind: MediaKind) -> Result<Vec<Candidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                return Err(Error::Provider("catalog offline".to_string()));
            }
            Ok(self.candidates.clone())
        }
    }

    fn candidate(provider: &str, title: &str, year: Option<i32>, score: f64) -> Candidate {
        Candidate {
            title: title.to_string(),
            year,
            provider: provider.to_string(),
            provider_id: format!("{}-{}", provider, title),
            score,
            extra: Map::new(),
        }
    }

    fn manager(temp_dir: &TempDir, providers: Vec<Arc<dyn Provider>>, timeout: Option<Duration>) -> EnrichmentManager {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = EnrichmentCache::new(temp_dir.path().join("cache.json"), 14, true, clock.clone());
        EnrichmentManager::new(cache, providers, timeout, clock)
    }

    #[test]
    fn test_search_uses_cache() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new("fake", vec![candidate("fake", "Waterloo", Some(1974), 0.9)]));
        let manager = manager(&temp_dir, vec![provider.clone() as Arc<dyn Provider>], None);

        let first = manager.search("Waterloo", MediaKind::Audio, None);
        let second = manager.search("  waterloo ", MediaKind::Audio, None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first[0].aggregated_score, 0.9);
    }

    #[test]
    fn test_search_ranks_by_score_then_title() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new(
            "fake",
            vec![
                candidate("fake", "beta", None, 0.5),
                candidate("fake", "Alpha", None, 0.5),
                candidate("fake", "Gamma", None, 0.8),
            ],
        ));
        let manager = manager(&temp_dir, vec![provider as Arc<dyn Provider>], None);

        let titles: Vec<_> = manager
            .search("q", MediaKind::Audio, None)
            .into_iter()
            .map(|r| r.candidate.title)
            .collect();
        assert_eq!(titles, vec!["Gamma", "Alpha", "beta"]);
    }

    #[test]
    fn test_exact_year_ranks_above_two_years_off() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new(
            "fake",
            vec![
                candidate("fake", "Arrival", Some(1974), 0.7),
                candidate("fake", "Arrival", Some(1976), 0.7),
            ],
        ));
        let manager = manager(&temp_dir, vec![provider as Arc<dyn Provider>], None);
        let context = MediaMetadata {
            title: Some("Arrival".to_string()),
            year: Some(1976),
            ..MediaMetadata::default()
        };

        let ranked = manager.search("arrival", MediaKind::Audio, Some(&context));
        assert_eq!(ranked[0].candidate.year, Some(1976));
        assert!(ranked[0].aggregated_score >= ranked[1].aggregated_score);
        assert!((ranked[0].aggregated_score - (0.7 * 0.6 + 0.3 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_failing_provider_is_skipped_and_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let mut broken = CountingProvider::new("broken", vec![]);
        broken.fail = true;
        let broken = Arc::new(broken);
        let good = Arc::new(CountingProvider::new("good", vec![candidate("good", "Ok", None, 0.4)]));
        let manager = manager(&temp_dir, vec![broken.clone() as Arc<dyn Provider>, good], None);

        assert_eq!(manager.search("x", MediaKind::Audio, None).len(), 1);
        assert_eq!(manager.search("x", MediaKind::Audio, None).len(), 1);
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
        assert!(manager.cache().get("x", "broken").is_none());
    }

    #[test]
    fn test_slow_provider_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let mut slow = CountingProvider::new("slow", vec![candidate("slow", "Late", None, 1.0)]);
        slow.delay = Some(Duration::from_millis(500));
        let manager = manager(&temp_dir, vec![Arc::new(slow) as Arc<dyn Provider>], Some(Duration::from_millis(20)));

        assert!(manager.search("x", MediaKind::Audio, None).is_empty());
        assert!(manager.cache().get("x", "slow").is_none());
    }

    #[test]
    fn test_bad_cached_items_are_skipped() {
        let payload = json!({"candidates": [
            {"title": "Good", "year": 2001, "provider_id": "g", "score": 0.5, "extra": {}},
            {"title": "Bad", "year": "two thousand"},
            "junk"
        ]});
        let decoded = decode_candidates(&payload, "musicbrainz");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].provider, "musicbrainz");
        assert!(decode_candidates(&json!({"other": 1}), "p").is_empty());
    }

    #[test]
    fn test_enrich_is_non_destructive() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        let stub: Arc<dyn Provider> = Arc::new(MusicBrainzStub::new(clock.clone()));
        let cache = EnrichmentCache::new(temp_dir.path().join("cache.json"), 14, true, clock.clone());
        let manager = EnrichmentManager::new(cache, vec![stub], None, clock.clone());

        let metadata = MediaMetadata {
            title: Some("Fernando".to_string()),
            original_title: Some("X".to_string()),
            ..MediaMetadata::default()
        };
        let ranked = manager.search("fernando", MediaKind::Audio, Some(&metadata));
        let enriched = manager.enrich(metadata, &ranked[0]).unwrap();

        assert_eq!(enriched.original_title.as_deref(), Some("X"));
        assert_eq!(enriched.overview.as_deref(), Some("Mock overview for fernando"));
        assert_eq!(enriched.musicbrainz_track_id.as_deref(), Some("mb-track-8"));
        assert_eq!(enriched.enrichment_sources, vec!["musicbrainz".to_string()]);
        assert_eq!(enriched.enrichment_fetched_at, Some(clock.now()));
        assert_eq!(enriched.enrichment_confidence, Some(ranked[0].aggregated_score));
    }

    #[test]
    fn test_second_merge_keeps_provenance() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut detail = Map::new();
        detail.insert("overview".into(), json!("first"));

        let mut metadata = MediaMetadata::default();
        assert!(merge_enrichment(&mut metadata, &detail, "musicbrainz", 0.8, now));

        detail.insert("overview".into(), json!("second"));
        let later = now + chrono::Duration::days(1);
        assert!(!merge_enrichment(&mut metadata, &detail, "musicbrainz", 0.3, later));
        assert_eq!(metadata.overview.as_deref(), Some("first"));
        assert_eq!(metadata.enrichment_fetched_at, Some(now));
        assert_eq!(metadata.enrichment_confidence, Some(0.8));
        assert_eq!(metadata.enrichment_sources.len(), 1);
    }

    #[test]
    fn test_new_provider_counts_as_change() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut metadata = MediaMetadata {
            musicbrainz_track_id: Some("t".to_string()),
            musicbrainz_release_id: Some("r".to_string()),
            original_title: Some("Heat".to_string()),
            overview: Some("Known".to_string()),
            ..MediaMetadata::default()
        };
        let mut detail = Map::new();
        detail.insert("overview".into(), json!("Other"));

        assert!(merge_enrichment(&mut metadata, &detail, "tmdb", 0.6, now));
        assert_eq!(metadata.overview.as_deref(), Some("Known"));
        assert_eq!(metadata.enrichment_sources, vec!["tmdb".to_string()]);
        assert_eq!(metadata.enrichment_fetched_at, Some(now));
        assert_eq!(metadata.enrichment_confidence, Some(0.6));

        let later = now + chrono::Duration::days(1);
        assert!(!merge_enrichment(&mut metadata, &detail, "tmdb", 0.1, later));
        assert_eq!(metadata.enrichment_fetched_at, Some(now));
    }

    #[test]
    fn test_enrich_unknown_provider() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir, vec![], None);
        let selected = RankedCandidate {
            candidate: candidate("tmdb", "Heat", Some(1995), 0.9),
            aggregated_score: 0.9,
        };
        assert!(matches!(
            manager.enrich(MediaMetadata::default(), &selected),
            Err(Error::UnknownProvider(name)) if name == "tmdb"
        ));
    }
}
