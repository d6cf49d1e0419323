use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rich per-file view built from embedded tags and enrichment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaMetadata {
    pub path: PathBuf,
    pub filename: String,
    pub filesize: u64,
    /// Container format, e.g. "MP3" or "FLAC"
    pub format: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub composer: Option<String>,
    pub director: Option<String>,
    pub actors: Vec<String>,
    pub description: Option<String>,

    /// Kilobits per second
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub codec: Option<String>,
    /// "WIDTHxHEIGHT" for images and video
    pub resolution: Option<String>,

    pub rating: Option<u8>,
    pub tags: Vec<String>,
    pub date_modified: Option<DateTime<Utc>>,

    // Enrichment provenance
    pub musicbrainz_track_id: Option<String>,
    pub musicbrainz_release_id: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub enrichment_sources: Vec<String>,
    pub enrichment_fetched_at: Option<DateTime<Utc>>,
    pub enrichment_confidence: Option<f64>,
}

impl MediaMetadata {
    /// Minimal record derived from the path alone: file name, stem as title,
    /// plus size and mtime when the file can be stat'ed.
    pub fn from_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty());
        let format = path
            .extension()
            .map(|e| e.to_string_lossy().to_uppercase());

        let mut metadata = Self {
            path: path.to_path_buf(),
            filename,
            title,
            format,
            ..Self::default()
        };
        if let Ok(stat) = std::fs::metadata(path) {
            metadata.filesize = stat.len();
            metadata.date_modified = stat.modified().ok().map(DateTime::<Utc>::from);
        }
        metadata
    }

    /// Title to show and to match against: tag title, else the file stem
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.filename)
    }
}
