use mediadex::{Config, Error, IndexStore, MediaKind, MediaLibrary, Result, Scanner};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open_library(base_dir: &Path) -> Result<MediaLibrary> {
    let config = Config::new(Some(base_dir.to_path_buf()))?;
    config.init()?;
    MediaLibrary::open(config)
}

#[test]
fn test_init_command() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path().join("test_mediadex");

    let config = Config::new(Some(base_dir.clone()))?;
    assert!(!config.is_initialized());

    config.init()?;
    assert!(config.is_initialized());
    assert!(config.base_dir.exists());
    assert!(config.index_path.parent().unwrap().exists());
    assert!(config.enrichment_cache_path.parent().unwrap().exists());

    Ok(())
}

#[test]
fn test_round_trip_scan() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let library = open_library(&temp_dir.path().join("base"))?;
    let media_dir = temp_dir.path().join("media");
    fs::create_dir_all(media_dir.join("nested/deeper"))?;

    let files = [
        ("song.mp3", 11usize),
        ("movie.MKV", 22),
        ("nested/photo.jpeg", 33),
        ("nested/deeper/book.epub", 44),
        ("nested/deeper/notes", 0),
    ];
    for (name, size) in files {
        fs::write(media_dir.join(name), vec![b'x'; size])?;
    }

    let processed = library.scan_source(&media_dir, None)?;
    assert_eq!(processed, files.len() as u64);

    let records = library.list_files(Some(100))?;
    assert_eq!(records.len(), files.len());
    for (name, size) in files {
        let record = records
            .iter()
            .find(|r| r.relative_path == name)
            .unwrap_or_else(|| panic!("{} was not indexed", name));
        assert_eq!(record.size, size as u64);
    }

    let kinds: Vec<_> = ["song.mp3", "movie.MKV", "nested/photo.jpeg", "nested/deeper/book.epub", "nested/deeper/notes"]
        .iter()
        .map(|name| records.iter().find(|r| r.relative_path == *name).unwrap().kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            MediaKind::Audio,
            MediaKind::Video,
            MediaKind::Image,
            MediaKind::Doc,
            MediaKind::Other
        ]
    );

    Ok(())
}

#[test]
fn test_index_persists_across_reopen() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path().join("base");
    let media_dir = temp_dir.path().join("media");
    fs::create_dir_all(&media_dir)?;
    fs::write(media_dir.join("a.flac"), b"flac")?;

    {
        let library = open_library(&base_dir)?;
        library.scan_source(&media_dir, None)?;
        library.set_rating(&media_dir.join("a.flac"), Some(4))?;
    }

    let library = open_library(&base_dir)?;
    assert_eq!(library.list_sources()?.len(), 1);
    let top = library.list_top_rated(None)?;
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].0.rating, Some(4));
    assert_eq!(top[0].0.absolute_path(&top[0].1), media_dir.canonicalize()?.join("a.flac"));

    Ok(())
}

#[test]
fn test_second_open_is_locked() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path().join("base");
    let _library = open_library(&base_dir)?;

    let config = Config::new(Some(base_dir))?;
    match MediaLibrary::open(config) {
        Err(Error::Store(_)) => {}
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("second open of the same index should fail"),
    }
    Ok(())
}

#[test]
fn test_repair_idempotence() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(IndexStore::open_at(&temp_dir.path().join("index.redb"))?);
    let scanner = Scanner::new(Arc::clone(&store));
    let media_dir = temp_dir.path().join("media");
    fs::create_dir_all(&media_dir)?;
    let song = media_dir.join("song.ogg");
    fs::write(&song, b"ogg")?;
    scanner.scan_source(&media_dir, None)?;

    fs::remove_file(&song)?;
    assert!(scanner.remove_file_by_path(&song)?);
    assert!(!scanner.remove_file_by_path(&song)?);
    assert!(!scanner.remove_file_by_path(&song)?);
    assert_eq!(store.file_count()?, 0);

    // A path that never existed in any source
    assert!(!scanner.remove_file_by_path(&temp_dir.path().join("elsewhere.mp3"))?);
    assert!(!scanner.add_file_by_path(&media_dir.join("missing.mp3"))?);
    assert_eq!(store.file_count()?, 0);

    Ok(())
}

#[test]
fn test_rescan_preserves_user_attributes() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let library = open_library(&temp_dir.path().join("base"))?;
    let media_dir = temp_dir.path().join("media");
    fs::create_dir_all(&media_dir)?;
    let song = media_dir.join("song.wav");
    fs::write(&song, b"RIFF")?;

    library.scan_source(&media_dir, None)?;
    library.set_rating(&song, Some(2))?;
    library.set_tags(&song, &["demo".to_string(), "  ".to_string()])?;

    fs::write(&song, b"RIFF with more bytes")?;
    library.full_rescan(None)?;

    let records = library.list_files(None)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].size, 20);
    assert_eq!(records[0].rating, Some(2));
    assert_eq!(records[0].tags, vec!["demo".to_string()]);

    Ok(())
}

#[test]
fn test_nested_sources_resolve_to_deepest_root() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let library = open_library(&temp_dir.path().join("base"))?;
    let outer = temp_dir.path().join("media");
    let inner = outer.join("podcasts");
    fs::create_dir_all(&inner)?;

    let outer_id = library.add_source(&outer)?;
    let inner_id = library.add_source(&inner)?;
    assert_ne!(outer_id, inner_id);
    assert_eq!(library.add_source(&outer)?, outer_id);

    let episode = inner.join("ep1.mp3");
    fs::write(&episode, b"ep")?;
    assert!(library.add_file_by_path(&episode)?);

    let records = library.list_files(None)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source_id, inner_id);
    assert_eq!(records[0].relative_path, "ep1.mp3");

    Ok(())
}

#[test]
fn test_kind_and_genre_projections() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let library = open_library(&temp_dir.path().join("base"))?;
    let media_dir = temp_dir.path().join("media");
    fs::create_dir_all(&media_dir)?;
    fs::write(media_dir.join("a.mp3"), b"a")?;
    fs::write(media_dir.join("b.mp4"), b"b")?;
    fs::write(media_dir.join("c.m4a"), b"c")?;
    library.scan_source(&media_dir, None)?;

    assert_eq!(library.list_files_by_kind(MediaKind::Audio, None)?.len(), 2);
    assert_eq!(library.list_files_by_kind(MediaKind::Video, None)?.len(), 1);
    assert!(library.list_files_by_kind(MediaKind::Doc, None)?.is_empty());
    // None of these carry real tags
    assert!(library.files_by_genre("pop", None)?.is_empty());

    let stats = library.stats()?;
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.total_bytes, 3);
    assert_eq!(stats.rating_distribution[0], 3);

    Ok(())
}
