use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Coarse media kind of an indexed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
    Doc,
    Other,
}

impl MediaKind {
    pub const ALL: [MediaKind; 5] = [
        MediaKind::Audio,
        MediaKind::Video,
        MediaKind::Image,
        MediaKind::Doc,
        MediaKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::Doc => "doc",
            MediaKind::Other => "other",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            "image" => Ok(MediaKind::Image),
            "doc" => Ok(MediaKind::Doc),
            "other" => Ok(MediaKind::Other),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Classify a file by its extension (case-insensitive)
pub fn infer_kind(path: &Path) -> MediaKind {
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return MediaKind::Other,
    };

    match ext.as_str() {
        "mp3" | "flac" | "wav" | "aac" | "m4a" | "ogg" => MediaKind::Audio,
        "mp4" | "mkv" | "mov" | "avi" | "webm" => MediaKind::Video,
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" => MediaKind::Image,
        "pdf" | "epub" | "mobi" => MediaKind::Doc,
        _ => MediaKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_kind_table() {
        for ext in ["mp3", "flac", "wav", "aac", "m4a", "ogg"] {
            assert_eq!(infer_kind(Path::new(&format!("a.{}", ext))), MediaKind::Audio);
        }
        for ext in ["mp4", "mkv", "mov", "avi", "webm"] {
            assert_eq!(infer_kind(Path::new(&format!("a.{}", ext))), MediaKind::Video);
        }
        for ext in ["jpg", "jpeg", "png", "gif", "webp", "bmp"] {
            assert_eq!(infer_kind(Path::new(&format!("a.{}", ext))), MediaKind::Image);
        }
        for ext in ["pdf", "epub", "mobi"] {
            assert_eq!(infer_kind(Path::new(&format!("a.{}", ext))), MediaKind::Doc);
        }
    }

    #[test]
    fn test_infer_kind_case_insensitive() {
        assert_eq!(infer_kind(Path::new("Track01.FLAC")), MediaKind::Audio);
        assert_eq!(infer_kind(Path::new("/x/Movie.MkV")), MediaKind::Video);
    }

    #[test]
    fn test_infer_kind_fallback() {
        assert_eq!(infer_kind(Path::new("README")), MediaKind::Other);
        assert_eq!(infer_kind(Path::new("notes.txt")), MediaKind::Other);
        assert_eq!(infer_kind(Path::new(".hidden")), MediaKind::Other);
        assert_eq!(infer_kind(Path::new("archive.tar.gz")), MediaKind::Other);
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in MediaKind::ALL {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
        assert_eq!(" Audio ".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert!("podcast".parse::<MediaKind>().is_err());
    }
}
