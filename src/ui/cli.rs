use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mediadex - Local media library indexer
#[derive(Parser, Debug)]
#[command(name = "mediadex")]
#[command(about = "Index, watch and enrich local media collections", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Custom base directory (default: ~/.mediadex)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the base directory and a default config.toml
    Init,
    /// Register a directory as a source
    Add {
        /// Source root directory
        path: PathBuf,
    },
    /// Deregister a source and drop its files from the index
    Remove {
        path: PathBuf,
    },
    /// List registered sources
    Sources,
    /// Scan one directory, or every registered source when omitted
    Scan {
        path: Option<PathBuf>,
    },
    /// List indexed files, most recently added first
    List {
        /// Maximum number of files to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Only files of this kind (audio, video, image, doc, other)
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// List the highest rated files
    TopRated {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Rate a file from 0 to 5
    Rate {
        path: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: u8,
    },
    /// Replace the tags of a file
    Tag {
        path: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Show metadata for a file
    Info {
        path: PathBuf,
    },
    /// Show library statistics
    Stats,
    /// Watch every source and keep the index in sync until EOF on stdin
    Watch,
    /// Search metadata providers
    Enrich {
        query: String,
        /// Media kind hint for providers
        #[arg(short, long, default_value = "audio")]
        kind: String,
    },
    /// Remove expired entries from the enrichment cache
    PurgeCache,
    /// List smart playlists, or show the files one of them matches
    Playlist {
        name: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_base_dir() {
        let cli = Cli::try_parse_from(["mediadex", "list", "--base-dir", "/tmp/x", "-k", "audio"]).unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::List { limit, kind } => {
                assert_eq!(limit, 20);
                assert_eq!(kind.as_deref(), Some("audio"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_playlist_name_is_optional() {
        let cli = Cli::try_parse_from(["mediadex", "playlist"]).unwrap();
        assert!(matches!(cli.command, Commands::Playlist { name: None }));
        let cli = Cli::try_parse_from(["mediadex", "playlist", "Recent jazz"]).unwrap();
        assert!(matches!(cli.command, Commands::Playlist { name: Some(n) } if n == "Recent jazz"));
    }

    #[test]
    fn test_rating_range_is_enforced() {
        assert!(Cli::try_parse_from(["mediadex", "rate", "a.mp3", "5"]).is_ok());
        assert!(Cli::try_parse_from(["mediadex", "rate", "a.mp3", "6"]).is_err());
    }
}
