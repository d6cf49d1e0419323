use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const SETTINGS_FILE: &str = "config.toml";

/// Tunables read from `config.toml` in the base directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Age in days after which enrichment cache entries expire (<= 0 disables expiry)
    pub enrichment_ttl_days: i64,
    /// Scope enrichment cache keys by provider name
    pub provider_scoped_cache: bool,
    /// Number of concurrent scans (clamped to 1..=2)
    pub scan_workers: usize,
    /// Debounce window for filesystem events
    pub watch_debounce_ms: u64,
    /// Upper bound for a single provider search (0 disables)
    pub provider_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enrichment_ttl_days: 14,
            provider_scoped_cache: true,
            scan_workers: 1,
            watch_debounce_ms: 2000,
            provider_timeout_secs: 10,
        }
    }
}

impl Settings {
    pub fn scan_workers(&self) -> usize {
        self.scan_workers.clamp(1, 2)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    pub fn provider_timeout(&self) -> Option<Duration> {
        (self.provider_timeout_secs > 0).then(|| Duration::from_secs(self.provider_timeout_secs))
    }
}

/// Configuration for mediadex
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for mediadex data
    pub base_dir: PathBuf,
    /// Path to the index database
    pub index_path: PathBuf,
    /// Path to the enrichment cache snapshot
    pub enrichment_cache_path: PathBuf,
    /// Saved smart playlists
    pub playlists_path: PathBuf,
    /// Tunables, defaults unless overridden by `config.toml`
    pub settings: Settings,
}

impl Config {
    /// Get the default configuration directory
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
            .map(|home| home.join(".mediadex"))
    }

    /// Create a new configuration, reading `config.toml` when present
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.unwrap_or_else(|| {
            Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".mediadex"))
        });

        let settings = Self::load_settings(&base_dir)?;

        Ok(Self {
            index_path: base_dir.join("index").join("library.redb"),
            enrichment_cache_path: base_dir.join("cache").join("enrichment.json"),
            playlists_path: base_dir.join("playlists.json"),
            settings,
            base_dir,
        })
    }

    fn load_settings(base_dir: &std::path::Path) -> Result<Settings> {
        let path = base_dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    /// Create the data directories and write the current settings to
    /// `config.toml` if it does not exist yet
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        for path in [&self.index_path, &self.enrichment_cache_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let settings_path = self.settings_path();
        if !settings_path.exists() {
            let raw = toml::to_string_pretty(&self.settings)
                .map_err(|e| Error::Config(format!("Cannot encode settings: {}", e)))?;
            std::fs::write(&settings_path, raw)?;
        }
        Ok(())
    }

    /// Check if the configuration is already initialized
    pub fn is_initialized(&self) -> bool {
        self.base_dir.exists()
            && self
                .index_path
                .parent()
                .map(|dir| dir.exists())
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_layout() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(Some(temp_dir.path().join("mdx"))).unwrap();
        assert!(config.index_path.ends_with("index/library.redb"));
        assert!(config.enrichment_cache_path.ends_with("cache/enrichment.json"));
        assert!(config.playlists_path.ends_with("playlists.json"));
        assert!(!config.is_initialized());

        config.init().unwrap();
        assert!(config.is_initialized());
        assert_eq!(config.settings, Settings::default());

        // The written defaults load back unchanged
        assert!(config.settings_path().exists());
        let reloaded = Config::new(Some(config.base_dir.clone())).unwrap();
        assert_eq!(reloaded.settings, Settings::default());
    }

    #[test]
    fn test_settings_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            "enrichment_ttl_days = 3\nscan_workers = 8\nsome_future_key = true\n",
        )
        .unwrap();

        let config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
        assert_eq!(config.settings.enrichment_ttl_days, 3);
        assert_eq!(config.settings.scan_workers(), 2);
        assert!(config.settings.provider_scoped_cache);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(SETTINGS_FILE), "scan_workers = \"many\"").unwrap();
        assert!(matches!(
            Config::new(Some(temp_dir.path().to_path_buf())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_provider_timeout_zero_disables() {
        let settings = Settings {
            provider_timeout_secs: 0,
            ..Settings::default()
        };
        assert!(settings.provider_timeout().is_none());
        assert_eq!(Settings::default().provider_timeout(), Some(Duration::from_secs(10)));
    }
}
