use anyhow::{bail, Context, Result};
use clap::Parser;
use mediadex::{Cli, Commands, Config, FileRecord, MediaKind, MediaLibrary};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::new(cli.base_dir.clone())?;

    if let Commands::Init = cli.command {
        return handle_init(&config);
    }
    if !config.is_initialized() {
        bail!(
            "mediadex is not initialized at {}. Run 'mediadex init' first.",
            config.base_dir.display()
        );
    }

    let library = MediaLibrary::open(config).context("Failed to open media library")?;
    match cli.command {
        Commands::Init => Ok(()),
        Commands::Add { path } => handle_add(&library, &path),
        Commands::Remove { path } => handle_remove(&library, &path),
        Commands::Sources => handle_sources(&library),
        Commands::Scan { path } => handle_scan(&library, path.as_deref()),
        Commands::List { limit, kind } => handle_list(&library, limit, kind.as_deref()),
        Commands::TopRated { limit } => handle_top_rated(&library, limit),
        Commands::Rate { path, rating } => handle_rate(&library, &path, rating),
        Commands::Tag { path, tags } => handle_tag(&library, &path, &tags),
        Commands::Info { path } => handle_info(&library, &path),
        Commands::Stats => handle_stats(&library),
        Commands::Watch => handle_watch(&library),
        Commands::Enrich { query, kind } => handle_enrich(&library, &query, &kind),
        Commands::PurgeCache => handle_purge_cache(&library),
        Commands::Playlist { name } => handle_playlist(&library, name.as_deref()),
    }
}

/// Logs go to stderr; `MEDIADEX_LOG` takes an EnvFilter directive (default: warn)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MEDIADEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_init(config: &Config) -> Result<()> {
    println!("Initializing mediadex...");

    if config.is_initialized() {
        println!("mediadex is already initialized at: {}", config.base_dir.display());
        return Ok(());
    }

    config.init()?;
    println!("✓ Created base directory: {}", config.base_dir.display());
    println!("✓ Index database: {}", config.index_path.display());
    println!("✓ Enrichment cache: {}", config.enrichment_cache_path.display());
    println!("✓ Settings: {}", config.settings_path().display());

    println!("\nInitialization complete!");
    println!("Next steps:");
    println!("  1. Register a folder: mediadex add /path/to/media");
    println!("  2. Index it:          mediadex scan");
    println!("  3. Keep it in sync:   mediadex watch");
    Ok(())
}

fn handle_add(library: &MediaLibrary, path: &Path) -> Result<()> {
    let id = library.add_source(path)?;
    println!("✓ Source {} registered: {}", id, path.display());
    Ok(())
}

fn handle_remove(library: &MediaLibrary, path: &Path) -> Result<()> {
    if library.remove_source(path)? {
        println!("✓ Removed source: {}", path.display());
    } else {
        println!("Not a registered source: {}", path.display());
    }
    Ok(())
}

fn handle_sources(library: &MediaLibrary) -> Result<()> {
    let sources = library.list_sources()?;
    if sources.is_empty() {
        println!("No sources registered. Add one with: mediadex add /path/to/media");
        return Ok(());
    }
    for source in sources {
        let marker = if source.path.is_dir() { " " } else { "!" };
        println!("{} [{}] {}", marker, source.id, source.path.display());
    }
    Ok(())
}

fn print_progress(path: &Path, processed: u64, total: u64) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    eprint!("\r  [{}/{}] {:<60.60}", processed, total, name);
    let _ = std::io::stderr().flush();
}

fn handle_scan(library: &MediaLibrary, path: Option<&Path>) -> Result<()> {
    let processed = match path {
        Some(path) => {
            println!("Scanning {}...", path.display());
            library.scan_new_source(path, Some(&print_progress))?
        }
        None => {
            let sources = library.list_sources()?;
            if sources.is_empty() {
                println!("No sources registered. Add one with: mediadex add /path/to/media");
                return Ok(());
            }
            println!("Rescanning {} source(s)...", sources.len());
            library.full_rescan(Some(&print_progress))?
        }
    };
    eprintln!();

    println!("✓ Processed {} files", processed);
    println!("  Files in index: {}", library.store().file_count()?);
    Ok(())
}

fn print_entries(entries: &[(FileRecord, PathBuf)]) {
    for (record, source_path) in entries {
        let rating = record
            .rating
            .map(|r| format!("{}/5", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:>10} {:>4}  {}",
            record.kind,
            human_size(record.size),
            rating,
            record.absolute_path(source_path).display()
        );
        if !record.tags.is_empty() {
            println!("{:>24}{}", "", record.tags.join(", "));
        }
    }
}

fn parse_kind(kind: &str) -> Result<MediaKind> {
    kind.parse::<MediaKind>().map_err(anyhow::Error::msg)
}

fn handle_list(library: &MediaLibrary, limit: usize, kind: Option<&str>) -> Result<()> {
    let entries = match kind {
        Some(kind) => library.list_files_by_kind(parse_kind(kind)?, Some(limit))?,
        None => library.list_files_with_sources(Some(limit))?,
    };
    if entries.is_empty() {
        println!("No files indexed.");
        return Ok(());
    }
    print_entries(&entries);
    Ok(())
}

fn handle_top_rated(library: &MediaLibrary, limit: usize) -> Result<()> {
    let entries = library.list_top_rated(Some(limit))?;
    if entries.is_empty() {
        println!("No rated files yet. Rate one with: mediadex rate <path> <0-5>");
        return Ok(());
    }
    print_entries(&entries);
    Ok(())
}

fn handle_rate(library: &MediaLibrary, path: &Path, rating: u8) -> Result<()> {
    if !library.set_rating(path, Some(rating))? {
        bail!("{} is not an indexed file", path.display());
    }
    println!("✓ Rated {} {}/5", path.display(), rating);
    Ok(())
}

fn handle_tag(library: &MediaLibrary, path: &Path, tags: &[String]) -> Result<()> {
    if !library.set_tags(path, tags)? {
        bail!("{} is not an indexed file", path.display());
    }
    let (_, stored) = library.get_attributes(path)?;
    println!("✓ Tagged {}: {}", path.display(), stored.join(", "));
    Ok(())
}

fn handle_info(library: &MediaLibrary, path: &Path) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot open {}", path.display()))?;
    let md = library.get_metadata(&path);

    println!("{}", md.display_title());
    println!("  Path:     {}", md.path.display());
    println!("  Size:     {}", human_size(md.filesize));
    let fields = [
        ("Format", md.format.clone()),
        ("Artist", md.artist.clone()),
        ("Album", md.album.clone()),
        ("Album artist", md.album_artist.clone()),
        ("Genre", md.genre.clone()),
        ("Year", md.year.map(|y| y.to_string())),
        ("Track", md.track_number.map(|t| match md.track_total {
            Some(total) => format!("{}/{}", t, total),
            None => t.to_string(),
        })),
        ("Composer", md.composer.clone()),
        ("Duration", md.duration.map(|d| format!("{}:{:02}", d as u64 / 60, d as u64 % 60))),
        ("Bitrate", md.bitrate.map(|b| format!("{} kbps", b))),
        ("Sample rate", md.sample_rate.map(|s| format!("{} Hz", s))),
        ("Channels", md.channels.map(|c| c.to_string())),
        ("Codec", md.codec.clone()),
        ("Resolution", md.resolution.clone()),
        ("Rating", md.rating.map(|r| format!("{}/5", r))),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:<13}{}", format!("{}:", label), value);
        }
    }
    if !md.tags.is_empty() {
        println!("  {:<13}{}", "Tags:", md.tags.join(", "));
    }
    Ok(())
}

fn handle_stats(library: &MediaLibrary) -> Result<()> {
    let stats = library.stats()?;
    println!("Files:    {}", stats.total_files);
    println!("Size:     {}", human_size(stats.total_bytes));
    println!("Duration: {:.1} h", stats.total_duration / 3600.0);
    for (kind, count) in &stats.kinds {
        println!("  {:<6} {}", kind, count);
    }
    match stats.average_rating {
        Some(avg) => println!("Average rating: {:.2}", avg),
        None => println!("Average rating: -"),
    }
    println!(
        "Ratings 0..5: {}",
        stats
            .rating_distribution
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    print_top("Top genres", &stats.top_genres);
    print_top("Top artists", &stats.top_artists);
    Ok(())
}

fn print_top(title: &str, items: &[(String, usize)]) {
    if items.is_empty() {
        return;
    }
    println!("{}:", title);
    for (name, count) in items {
        println!("  {:>5}  {}", count, name);
    }
}

fn handle_watch(library: &MediaLibrary) -> Result<()> {
    if !library.is_watch_available() || !library.start_watching() {
        bail!("Filesystem watching is unavailable on this system; use 'mediadex scan' instead");
    }

    println!("Watching {} source(s):", library.watched_path_count());
    for path in library.watched_paths() {
        println!("  {}", path.display());
    }
    println!("Press Ctrl+D to stop watching...\n");

    // Block until stdin closes
    let mut sink = Vec::new();
    let _ = std::io::stdin().read_to_end(&mut sink);

    library.stop_watching();
    println!("Stopped watching.");
    Ok(())
}

fn handle_enrich(library: &MediaLibrary, query: &str, kind: &str) -> Result<()> {
    let ranked = library.search(query, parse_kind(kind)?, None);
    if ranked.is_empty() {
        println!("No candidates found for '{}'", query);
        return Ok(());
    }

    for (i, ranked) in ranked.iter().enumerate() {
        let candidate = &ranked.candidate;
        let year = candidate
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "----".to_string());
        println!(
            "{}. [{:.3}] {} ({}) - {}:{}",
            i + 1,
            ranked.aggregated_score,
            candidate.title,
            year,
            candidate.provider,
            candidate.provider_id
        );
    }
    Ok(())
}

fn handle_playlist(library: &MediaLibrary, name: Option<&str>) -> Result<()> {
    let playlists = library.smart_playlists();
    let Some(name) = name else {
        if playlists.is_empty() {
            println!(
                "No smart playlists. Define them in {}",
                library.config().playlists_path.display()
            );
        }
        for playlist in &playlists {
            match &playlist.description {
                Some(description) => println!("{}  {}", playlist.name, description),
                None => println!("{}", playlist.name),
            }
        }
        return Ok(());
    };

    let Some(playlist) = playlists.iter().find(|p| p.name.eq_ignore_ascii_case(name)) else {
        bail!("No smart playlist named '{}'", name);
    };
    let entries = library.evaluate_smart_playlist(playlist)?;
    println!("✓ {} ({} files)", playlist.name, entries.len());
    print_entries(&entries);
    Ok(())
}

fn handle_purge_cache(library: &MediaLibrary) -> Result<()> {
    let removed = library.purge_enrichment_cache();
    println!("✓ Removed {} expired cache entries", removed);
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
