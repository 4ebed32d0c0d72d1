//! Configuration file parser for eddy.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::pull::PullerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("config file too large: {0}")]
    TooLarge(String),
}

/// Top-level daemon configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path.
    pub db_path: String,

    /// Directory for cached favicons. Unset disables the favicon repair pass.
    pub favicon_cache_dir: Option<String>,

    /// Default refresh interval in minutes, used whenever the database
    /// setting is unset or unreadable.
    pub refresh_interval_minutes: u64,

    /// Maximum number of simultaneously in-flight feed pulls.
    pub max_concurrent_pulls: usize,

    /// Per-feed fetch deadline in seconds.
    pub feed_timeout_secs: u64,

    /// Whether a forced refresh may fetch a user-suspended feed.
    pub force_overrides_suspension: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "eddy.db".to_string(),
            favicon_cache_dir: None,
            refresh_interval_minutes: 30,
            max_concurrent_pulls: 10,
            feed_timeout_secs: 30,
            force_overrides_suspension: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Reject absurdly large files before reading them into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to warn about probable typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "db_path",
                "favicon_cache_dir",
                "refresh_interval_minutes",
                "max_concurrent_pulls",
                "feed_timeout_secs",
                "force_overrides_suspension",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), db_path = %config.db_path, "loaded configuration");
        Ok(config)
    }

    /// The puller tunables this configuration describes.
    pub fn puller_config(&self) -> PullerConfig {
        PullerConfig {
            default_interval: Duration::from_secs(self.refresh_interval_minutes.max(1) * 60),
            max_concurrent_pulls: self.max_concurrent_pulls.max(1),
            feed_timeout: Duration::from_secs(self.feed_timeout_secs.max(1)),
            force_overrides_suspension: self.force_overrides_suspension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.db_path, "eddy.db");
        assert!(config.favicon_cache_dir.is_none());
        assert_eq!(config.refresh_interval_minutes, 30);
        assert_eq!(config.max_concurrent_pulls, 10);
        assert_eq!(config.feed_timeout_secs, 30);
        assert!(!config.force_overrides_suspension);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/eddy_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.db_path, "eddy.db");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("eddy_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_interval_minutes, 30);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("eddy_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");
        std::fs::write(&path, "refresh_interval_minutes = 15\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_interval_minutes, 15);
        assert_eq!(config.db_path, "eddy.db"); // default
        assert_eq!(config.max_concurrent_pulls, 10); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("eddy_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");

        let content = r#"
db_path = "/var/lib/eddy/eddy.db"
favicon_cache_dir = "/var/cache/eddy/favicons"
refresh_interval_minutes = 60
max_concurrent_pulls = 4
feed_timeout_secs = 10
force_overrides_suspension = true
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_path, "/var/lib/eddy/eddy.db");
        assert_eq!(
            config.favicon_cache_dir.as_deref(),
            Some("/var/cache/eddy/favicons")
        );
        assert_eq!(config.refresh_interval_minutes, 60);
        assert_eq!(config.max_concurrent_pulls, 4);
        assert_eq!(config.feed_timeout_secs, 10);
        assert!(config.force_overrides_suspension);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("eddy_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("eddy_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");
        std::fs::write(&path, "db_path = \"x.db\"\ntotally_fake_key = 42\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_path, "x.db");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("eddy_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");
        // refresh_interval_minutes should be an integer, not a string
        std::fs::write(&path, "refresh_interval_minutes = \"soon\"\n").unwrap();

        assert!(Config::load(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("eddy_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eddy.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let result = Config::load(&path);
        assert!(matches!(result.unwrap_err(), ConfigError::TooLarge(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_puller_config_conversion() {
        let config = Config {
            refresh_interval_minutes: 15,
            max_concurrent_pulls: 4,
            feed_timeout_secs: 10,
            force_overrides_suspension: true,
            ..Default::default()
        };
        let puller = config.puller_config();
        assert_eq!(puller.default_interval, Duration::from_secs(15 * 60));
        assert_eq!(puller.max_concurrent_pulls, 4);
        assert_eq!(puller.feed_timeout, Duration::from_secs(10));
        assert!(puller.force_overrides_suspension);
    }

    #[test]
    fn test_puller_config_clamps_zeros() {
        let config = Config {
            refresh_interval_minutes: 0,
            max_concurrent_pulls: 0,
            feed_timeout_secs: 0,
            ..Default::default()
        };
        let puller = config.puller_config();
        assert_eq!(puller.default_interval, Duration::from_secs(60));
        assert_eq!(puller.max_concurrent_pulls, 1);
        assert_eq!(puller.feed_timeout, Duration::from_secs(1));
    }
}
