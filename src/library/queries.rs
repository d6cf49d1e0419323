use crate::metadata::cache::MetadataCache;
use crate::storage::index::FileRecord;
use std::path::PathBuf;

/// Entries whose tag genre matches `genre` case-insensitively, in input order
pub fn files_by_genre(
    entries: Vec<(FileRecord, PathBuf)>,
    metadata: &MetadataCache,
    genre: &str,
    limit: Option<usize>,
) -> Vec<(FileRecord, PathBuf)> {
    let wanted = genre.trim().to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    entries
        .into_iter()
        .filter(|(record, source_path)| {
            metadata
                .get(&record.absolute_path(source_path))
                .genre
                .is_some_and(|g| g.trim().to_lowercase() == wanted)
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Result;
    use crate::indexing::kind::MediaKind;
    use crate::metadata::model::MediaMetadata;
    use crate::metadata::reader::TagReader;
    use std::path::Path;
    use std::sync::Arc;

    struct GenreFromParent;

    impl TagReader for GenreFromParent {
        fn read(&self, path: &Path) -> Result<MediaMetadata> {
            let genre = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned());
            Ok(MediaMetadata {
                genre,
                ..MediaMetadata::from_path(path)
            })
        }
    }

    fn entry(relative_path: &str) -> (FileRecord, PathBuf) {
        (
            FileRecord {
                source_id: 1,
                relative_path: relative_path.to_string(),
                size: 1,
                modified_time: 0.0,
                kind: MediaKind::Audio,
                rating: None,
                tags: Vec::new(),
            },
            PathBuf::from("/lib"),
        )
    }

    #[test]
    fn test_files_by_genre() {
        let cache = MetadataCache::new(Arc::new(GenreFromParent));
        let entries = vec![
            entry("Jazz/a.mp3"),
            entry("rock/b.mp3"),
            entry("jazz/c.mp3"),
            entry("JAZZ/d.mp3"),
        ];

        let jazz = files_by_genre(entries.clone(), &cache, " jazz ", None);
        assert_eq!(jazz.len(), 3);
        assert_eq!(jazz[0].0.relative_path, "Jazz/a.mp3");

        assert_eq!(files_by_genre(entries.clone(), &cache, "jazz", Some(2)).len(), 2);
        assert!(files_by_genre(entries.clone(), &cache, "polka", None).is_empty());
        assert!(files_by_genre(entries, &cache, "  ", None).is_empty());
    }
}
