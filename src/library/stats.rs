use crate::indexing::kind::MediaKind;
use crate::metadata::cache::MetadataCache;
use crate::storage::index::FileRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

const TOP_N: usize = 10;

/// Aggregate figures over the whole library
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryStats {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Seconds, from tag metadata where known
    pub total_duration: f64,
    pub kinds: BTreeMap<MediaKind, usize>,
    /// Mean over rated files with a rating above zero
    pub average_rating: Option<f64>,
    /// Index = rating; unrated files count as 0
    pub rating_distribution: [usize; 6],
    pub top_genres: Vec<(String, usize)>,
    pub top_artists: Vec<(String, usize)>,
    pub tag_frequency: Vec<(String, usize)>,
}

impl LibraryStats {
    /// Never fails: unreadable tags fall back like any metadata lookup
    pub fn collect(entries: &[(FileRecord, PathBuf)], metadata: &MetadataCache) -> Self {
        let mut stats = LibraryStats::default();
        let mut rating_sum = 0u64;
        let mut rating_count = 0u64;
        let mut genres: HashMap<String, usize> = HashMap::new();
        let mut artists: HashMap<String, usize> = HashMap::new();
        let mut tags: HashMap<String, usize> = HashMap::new();

        for (record, source_path) in entries {
            stats.total_files += 1;
            stats.total_bytes += record.size;
            *stats.kinds.entry(record.kind).or_insert(0) += 1;

            let rating = record.rating.unwrap_or(0).min(5);
            stats.rating_distribution[rating as usize] += 1;
            if rating > 0 {
                rating_sum += rating as u64;
                rating_count += 1;
            }
            for tag in &record.tags {
                *tags.entry(tag.clone()).or_insert(0) += 1;
            }

            let md = metadata.get(&record.absolute_path(source_path));
            if let Some(duration) = md.duration {
                stats.total_duration += duration;
            }
            if let Some(genre) = md.genre.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
                *genres.entry(genre.to_string()).or_insert(0) += 1;
            }
            if let Some(artist) = md.artist.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                *artists.entry(artist.to_string()).or_insert(0) += 1;
            }
        }

        stats.average_rating = (rating_count > 0).then(|| rating_sum as f64 / rating_count as f64);
        stats.top_genres = ranked(genres, Some(TOP_N));
        stats.top_artists = ranked(artists, Some(TOP_N));
        stats.tag_frequency = ranked(tags, None);
        stats
    }
}

/// Count desc, then name asc
fn ranked(counts: HashMap<String, usize>, limit: Option<usize>) -> Vec<(String, usize)> {
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(limit) = limit {
        counts.truncate(limit);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{Error, Result};
    use crate::metadata::model::MediaMetadata;
    use crate::metadata::reader::TagReader;
    use std::path::Path;
    use std::sync::Arc;

    /// Genre and artist come from the file stem: "<genre>-<artist>"
    struct StemReader;

    impl TagReader for StemReader {
        fn read(&self, path: &Path) -> Result<MediaMetadata> {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let Some((genre, artist)) = stem.split_once('-') else {
                return Err(Error::Metadata("no tags".to_string()));
            };
            Ok(MediaMetadata {
                genre: Some(genre.to_string()),
                artist: Some(artist.to_string()),
                duration: Some(60.0),
                ..MediaMetadata::from_path(path)
            })
        }
    }

    fn record(path: &str, kind: MediaKind, size: u64, rating: Option<u8>, tags: &[&str]) -> (FileRecord, PathBuf) {
        (
            FileRecord {
                source_id: 1,
                relative_path: path.to_string(),
                size,
                modified_time: 0.0,
                kind,
                rating,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
            PathBuf::from("/lib"),
        )
    }

    #[test]
    fn test_collect() {
        let cache = MetadataCache::new(Arc::new(StemReader));
        let entries = vec![
            record("pop-abba.mp3", MediaKind::Audio, 100, Some(5), &["party"]),
            record("pop-abba2.mp3", MediaKind::Audio, 50, Some(3), &["party", "70s"]),
            record("rock-queen.flac", MediaKind::Audio, 10, None, &[]),
            record("poster.png", MediaKind::Image, 5, Some(0), &[]),
        ];

        let stats = LibraryStats::collect(&entries, &cache);
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.total_bytes, 165);
        assert_eq!(stats.total_duration, 180.0);
        assert_eq!(stats.kinds.get(&MediaKind::Audio), Some(&3));
        assert_eq!(stats.kinds.get(&MediaKind::Image), Some(&1));
        assert_eq!(stats.average_rating, Some(4.0));
        assert_eq!(stats.rating_distribution, [2, 0, 0, 1, 0, 1]);
        assert_eq!(
            stats.top_genres,
            vec![("pop".to_string(), 2), ("rock".to_string(), 1)]
        );
        assert_eq!(stats.top_artists[0], ("abba".to_string(), 1));
        assert_eq!(
            stats.tag_frequency,
            vec![("party".to_string(), 2), ("70s".to_string(), 1)]
        );
    }

    #[test]
    fn test_collect_empty() {
        let cache = MetadataCache::new(Arc::new(StemReader));
        let stats = LibraryStats::collect(&[], &cache);
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.average_rating, None);
        assert!(stats.top_genres.is_empty());
    }

    #[test]
    fn test_top_lists_are_capped() {
        let mut counts = HashMap::new();
        for i in 0..15 {
            counts.insert(format!("g{:02}", i), 1);
        }
        counts.insert("zz".to_string(), 3);
        let top = ranked(counts, Some(TOP_N));
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].0, "zz");
        assert_eq!(top[1].0, "g00");
    }
}
