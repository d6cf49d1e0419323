use crate::core::error::{Error, Result};
use crate::indexing::kind::{infer_kind, MediaKind};
use crate::metadata::container;
use crate::metadata::model::MediaMetadata;
use lofty::file::{FileType, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use std::path::Path;

/// Extracts embedded tags from one file
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<MediaMetadata>;
}

/// Default reader: routes each file by kind. Audio goes through lofty, video
/// and images through their container headers. Documents and unknown files
/// have nothing to read.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaReader;

impl TagReader for MediaReader {
    fn read(&self, path: &Path) -> Result<MediaMetadata> {
        match infer_kind(path) {
            MediaKind::Audio => LoftyTagReader.read(path),
            MediaKind::Video => container::read_video(path),
            MediaKind::Image => container::read_image(path),
            MediaKind::Doc | MediaKind::Other => Err(Error::Metadata(format!(
                "{}: no embedded metadata reader",
                path.display()
            ))),
        }
    }
}

/// Tag reader backed by lofty (ID3, Vorbis comments, MP4 atoms, ...)
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<MediaMetadata> {
        let tagged_file = Probe::open(path)
            .map_err(|e| Error::Metadata(format!("{}: {}", path.display(), e)))?
            .read()
            .map_err(|e| Error::Metadata(format!("{}: {}", path.display(), e)))?;

        let mut metadata = MediaMetadata::from_path(path);

        let properties = tagged_file.properties();
        let duration = properties.duration().as_secs_f64();
        metadata.duration = (duration > 0.0).then_some(duration);
        metadata.bitrate = properties.audio_bitrate();
        metadata.sample_rate = properties.sample_rate();
        metadata.channels = properties.channels();

        let file_type = tagged_file.file_type();
        metadata.codec = Some(codec_name(&file_type).to_string());
        metadata.format = Some(format_name(&file_type).to_string());

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            if let Some(title) = tag.title().filter(|t| !t.trim().is_empty()) {
                metadata.title = Some(title.to_string());
            }
            metadata.artist = tag.artist().map(|s| s.to_string());
            metadata.album = tag.album().map(|s| s.to_string());
            metadata.genre = tag.genre().map(|s| s.to_string());
            metadata.comment = tag.comment().map(|s| s.to_string());
            metadata.year = tag.year();
            metadata.track_number = tag.track();
            metadata.track_total = tag.track_total();
            metadata.disc_number = tag.disk();
            metadata.disc_total = tag.disk_total();
            metadata.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string());
            metadata.composer = tag.get_string(&ItemKey::Composer).map(|s| s.to_string());
            metadata.description = tag.get_string(&ItemKey::Description).map(|s| s.to_string());
        }

        tracing::debug!(
            file = %path.display(),
            artist = ?metadata.artist,
            title = ?metadata.title,
            format = ?metadata.format,
            "Extracted metadata"
        );
        Ok(metadata)
    }
}

fn format_name(file_type: &FileType) -> &'static str {
    match file_type {
        FileType::Mpeg => "MP3",
        FileType::Flac => "FLAC",
        FileType::Opus => "Opus",
        FileType::Vorbis => "OGG Vorbis",
        FileType::Aac => "AAC",
        FileType::Aiff => "AIFF",
        FileType::Wav => "WAV",
        FileType::WavPack => "WavPack",
        FileType::Mp4 => "MP4",
        FileType::Ape => "APE",
        _ => "Unknown",
    }
}

fn codec_name(file_type: &FileType) -> &'static str {
    match file_type {
        FileType::Mpeg => "mp3",
        FileType::Flac => "flac",
        FileType::Opus => "opus",
        FileType::Vorbis => "vorbis",
        FileType::Aac | FileType::Mp4 => "aac",
        FileType::Aiff | FileType::Wav => "pcm",
        FileType::WavPack => "wavpack",
        FileType::Ape => "ape",
        _ => "unknown",
    }
}
