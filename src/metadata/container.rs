use crate::core::error::{Error, Result};
use crate::metadata::model::MediaMetadata;
use matroska::{Matroska, Settings, Tracktype};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn metadata_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Metadata(format!("{}: {}", path.display(), e))
}

/// Sniff the container from magic bytes rather than trusting the extension
fn sniff(path: &Path) -> Result<infer::Type> {
    infer::get_from_path(path)?
        .ok_or_else(|| metadata_error(path, "unrecognized container"))
}

/// Image dimensions and format
pub fn read_image(path: &Path) -> Result<MediaMetadata> {
    let kind = sniff(path)?;
    let size = imagesize::size(path).map_err(|e| metadata_error(path, e))?;

    let mut metadata = MediaMetadata::from_path(path);
    metadata.format = Some(kind.extension().to_uppercase());
    metadata.resolution = Some(format!("{}x{}", size.width, size.height));
    tracing::debug!(file = %path.display(), resolution = ?metadata.resolution, "Read image header");
    Ok(metadata)
}

/// Container format, duration, resolution and video codec.
///
/// MP4/QuickTime and Matroska/WebM headers are parsed; other containers only
/// get their format.
pub fn read_video(path: &Path) -> Result<MediaMetadata> {
    let kind = sniff(path)?;
    let mut metadata = MediaMetadata::from_path(path);
    metadata.format = Some(kind.extension().to_uppercase());

    match kind.mime_type() {
        "video/mp4" | "video/quicktime" | "video/x-m4v" => read_mp4(path, &mut metadata)?,
        "video/x-matroska" | "video/webm" => read_matroska(path, &mut metadata)?,
        other => tracing::debug!(file = %path.display(), mime = other, "No header parser for container"),
    }

    tracing::debug!(
        file = %path.display(),
        format = ?metadata.format,
        resolution = ?metadata.resolution,
        codec = ?metadata.codec,
        "Read video header"
    );
    Ok(metadata)
}

fn read_mp4(path: &Path, metadata: &mut MediaMetadata) -> Result<()> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let reader =
        mp4::Mp4Reader::read_header(BufReader::new(file), size).map_err(|e| metadata_error(path, e))?;

    let duration = reader.duration().as_secs_f64();
    metadata.duration = (duration > 0.0).then_some(duration);

    for track in reader.tracks().values() {
        if !matches!(track.track_type(), Ok(mp4::TrackType::Video)) {
            continue;
        }
        metadata.resolution = Some(format!("{}x{}", track.width(), track.height()));
        if let Ok(media_type) = track.media_type() {
            metadata.codec = Some(format!("{:?}", media_type).to_lowercase());
        }
        break;
    }
    Ok(())
}

fn read_matroska(path: &Path, metadata: &mut MediaMetadata) -> Result<()> {
    let file = File::open(path)?;
    let mkv = Matroska::open(file).map_err(|e| metadata_error(path, e))?;

    metadata.duration = mkv
        .info
        .duration
        .map(|d| d.as_secs_f64())
        .filter(|secs| *secs > 0.0);
    if let Some(title) = mkv.info.title.as_ref().filter(|t| !t.trim().is_empty()) {
        metadata.title = Some(title.clone());
    }

    for track in &mkv.tracks {
        match (&track.tracktype, &track.settings) {
            (Tracktype::Video, Settings::Video(video)) if metadata.resolution.is_none() => {
                metadata.resolution = Some(format!("{}x{}", video.pixel_width, video.pixel_height));
                metadata.codec = Some(matroska_codec_name(&track.codec_id));
            }
            (Tracktype::Audio, Settings::Audio(audio)) if metadata.sample_rate.is_none() => {
                metadata.sample_rate = Some(audio.sample_rate as u32);
                metadata.channels = u8::try_from(audio.channels).ok();
            }
            _ => {}
        }
    }
    Ok(())
}

/// Short codec name for a Matroska codec id such as `V_MPEG4/ISO/AVC`
fn matroska_codec_name(codec_id: &str) -> String {
    match codec_id {
        "V_MPEG4/ISO/AVC" => "h264".to_string(),
        "V_MPEGH/ISO/HEVC" => "h265".to_string(),
        "V_VP8" => "vp8".to_string(),
        "V_VP9" => "vp9".to_string(),
        "V_AV1" => "av1".to_string(),
        other => other
            .strip_prefix("V_")
            .unwrap_or(other)
            .to_lowercase(),
    }
}
