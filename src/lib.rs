// Core functionality
pub mod core {
    pub mod clock;
    pub mod config;
    pub mod error;
    pub mod paths;
}

// Persistent state
pub mod storage {
    pub mod enrichment_cache;
    pub mod index;
}

// Scanning and watching
pub mod indexing {
    pub mod kind;
    pub mod pool;
    pub mod scanner;
    pub mod watcher;
}

// Tag metadata
pub mod metadata {
    pub mod cache;
    pub mod container;
    pub mod model;
    pub mod reader;
}

// External catalogs
pub mod enrichment {
    pub mod manager;
    pub mod provider;
    pub mod scoring;
}

// Facade and projections
pub mod library {
    pub mod playlists;
    pub mod queries;
    pub mod service;
    pub mod stats;
}

// User interfaces
pub mod ui {
    pub mod cli;
}

// Re-export commonly used types
pub use core::clock::{Clock, ManualClock, SystemClock};
pub use core::config::{Config, Settings};
pub use core::error::{Error, Result, StoreError};
pub use enrichment::manager::{merge_enrichment, EnrichmentManager, RankedCandidate};
pub use enrichment::provider::{Candidate, MusicBrainzStub, Provider};
pub use indexing::kind::{infer_kind, MediaKind};
pub use indexing::pool::{ScanHandle, ScanPool};
pub use indexing::scanner::{ProgressFn, Scanner};
pub use indexing::watcher::{FileWatcher, WatchHandler, WatchState};
pub use library::playlists::{
    load_smart_playlists, save_smart_playlists, Field, MatchMode, Op, Rule, RuleGroup, SmartPlaylist,
};
pub use library::service::{LibraryEvent, LibraryListener, MediaLibrary};
pub use library::stats::LibraryStats;
pub use metadata::cache::MetadataCache;
pub use metadata::model::MediaMetadata;
pub use metadata::reader::{LoftyTagReader, MediaReader, TagReader};
pub use storage::enrichment_cache::{normalize_query, EnrichmentCache};
pub use storage::index::{FileRecord, IndexStore, ResolvedPath, Source};
pub use ui::cli::{Cli, Commands};
