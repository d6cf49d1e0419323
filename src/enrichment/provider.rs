use crate::core::clock::{Clock, SystemClock};
use crate::core::error::Result;
use crate::indexing::kind::MediaKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One search hit from a metadata provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_id: String,
    /// Provider's own confidence, 0..1
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// External metadata catalog
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, query: &str, kind: MediaKind) -> Result<Vec<Candidate>>;

    /// Full detail for a chosen candidate; defaults to its `extra` payload
    fn enrich(&self, candidate: &Candidate) -> Result<Map<String, Value>> {
        Ok(candidate.extra.clone())
    }
}

/// Offline MusicBrainz stand-in returning deterministic candidates
pub struct MusicBrainzStub {
    clock: Arc<dyn Clock>,
}

impl MusicBrainzStub {
    pub const NAME: &'static str = "musicbrainz";

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for MusicBrainzStub {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Provider for MusicBrainzStub {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn search(&self, query: &str, _kind: MediaKind) -> Result<Vec<Candidate>> {
        let norm = crate::storage::enrichment_cache::normalize_query(query);
        let len = norm.chars().count() as i32;
        let title = title_case(&norm);

        let extra = |track: String, release: String, original: String, overview: String| {
            let mut extra = Map::new();
            extra.insert("musicbrainz_track_id".into(), Value::String(track));
            extra.insert("musicbrainz_release_id".into(), Value::String(release));
            extra.insert("original_title".into(), Value::String(original));
            extra.insert("overview".into(), Value::String(overview));
            extra
        };

        Ok(vec![
            Candidate {
                title: if title.is_empty() {
                    "Unknown".to_string()
                } else {
                    title.clone()
                },
                year: Some(2020 + len % 5),
                provider: Self::NAME.to_string(),
                provider_id: format!("mb-track-{}", len),
                score: 0.85,
                extra: extra(
                    format!("mb-track-{}", len),
                    format!("mb-release-{}", len),
                    title.clone(),
                    format!("Mock overview for {}", norm),
                ),
            },
            Candidate {
                title: format!("{} Alt", title),
                year: Some(2019 + len % 7),
                provider: Self::NAME.to_string(),
                provider_id: format!("mb-track-alt-{}", len),
                score: 0.72,
                extra: extra(
                    format!("mb-track-alt-{}", len),
                    format!("mb-release-alt-{}", len),
                    format!("{} Alt", title),
                    format!("Alternate mock overview for {}", norm),
                ),
            },
        ])
    }

    fn enrich(&self, candidate: &Candidate) -> Result<Map<String, Value>> {
        let mut detail = candidate.extra.clone();
        detail.insert(
            "enriched_at_provider".into(),
            Value::String(self.clock.now().to_rfc3339()),
        );
        Ok(detail)
    }
}

/// Uppercase the first letter of every word
fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_is_deterministic() {
        let stub = MusicBrainzStub::default();
        let first = stub.search("  dancing   QUEEN ", MediaKind::Audio).unwrap();
        let second = stub.search("dancing queen", MediaKind::Audio).unwrap();
        assert_eq!(first, second);

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "Dancing Queen");
        assert_eq!(first[0].score, 0.85);
        assert_eq!(first[0].year, Some(2020 + 13 % 5));
        assert_eq!(first[0].provider_id, "mb-track-13");
        assert_eq!(first[1].title, "Dancing Queen Alt");
        assert_eq!(first[1].score, 0.72);
        assert_eq!(
            first[0].extra.get("overview"),
            Some(&Value::String("Mock overview for dancing queen".into()))
        );
    }

    #[test]
    fn test_stub_empty_query() {
        let candidates = MusicBrainzStub::default().search("   ", MediaKind::Audio).unwrap();
        assert_eq!(candidates[0].title, "Unknown");
        assert_eq!(candidates[0].year, Some(2020));
    }

    #[test]
    fn test_stub_enrich_adds_timestamp() {
        let stub = MusicBrainzStub::default();
        let candidate = stub.search("abba", MediaKind::Audio).unwrap().remove(0);
        let detail = stub.enrich(&candidate).unwrap();
        assert!(detail.contains_key("enriched_at_provider"));
        assert_eq!(detail.get("musicbrainz_track_id"), candidate.extra.get("musicbrainz_track_id"));
    }
}
