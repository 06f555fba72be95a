use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use lazy_static::lazy_static;

const APP_DIR: &str = "com.readplan.app";
const CONFIG_FILE: &str = "readplan.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote progress store
    pub api_base_url: String,
    /// Bearer token forwarded by the HTTP store, if any
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Suppression window for repeated chapter toggles
    pub toggle_cooldown_ms: u64,
    pub replay_interval_secs: u64,
    pub connectivity_poll_ms: u64,
    pub range_cache_capacity: usize,
    pub breaker_failure_threshold: u64,
    pub breaker_timeout_secs: u64,
    /// Directory for the offline queue; defaults to the platform app-data dir
    pub data_dir: Option<PathBuf>,
    /// JSON file of `{ book: [verses in chapter 1, chapter 2, ...] }`
    pub verse_counts_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            api_base_url: "http://localhost:8787/api".to_string(),
            auth_token: None,
            request_timeout_secs: 15,
            toggle_cooldown_ms: 250,
            replay_interval_secs: 30,
            connectivity_poll_ms: 1000,
            range_cache_capacity: 512,
            breaker_failure_threshold: 3,
            breaker_timeout_secs: 60,
            data_dir: None,
            verse_counts_path: None,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn toggle_cooldown(&self) -> Duration {
        Duration::from_millis(self.toggle_cooldown_ms)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_secs)
    }

    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_millis(self.connectivity_poll_ms.max(10))
    }

    /// Directory holding the offline queue files
    pub fn resolved_data_dir(&self) -> PathBuf {
        match self.data_dir {
            Some(ref dir) => dir.clone(),
            None => app_data_dir().join("offline"),
        }
    }

    /// Load settings from an explicit TOML file
    pub fn from_file(path: &Path) -> Result<SyncConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str::<SyncConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Platform-specific application data directory
pub fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let mut dir = PathBuf::from(home);
            dir.push("Library/Application Support");
            dir.push(APP_DIR);
            return dir;
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            let mut dir = PathBuf::from(appdata);
            dir.push(APP_DIR);
            return dir;
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let mut dir = PathBuf::from(home);
            dir.push(".local/share");
            dir.push(APP_DIR);
            return dir;
        }
    }

    // Fallback
    PathBuf::from(".")
}

fn get_config_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("READPLAN_CONFIG") {
        return PathBuf::from(explicit);
    }
    app_data_dir().join(CONFIG_FILE)
}

fn load_sync_config_internal() -> SyncConfig {
    let config_path = get_config_path();

    match SyncConfig::from_file(&config_path) {
        Ok(config) => {
            tracing::info!(path = ?config_path, "Loaded sync config");
            config
        }
        Err(ConfigError::Read { ref source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = ?config_path, "No config file, using default sync configuration");
            SyncConfig::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load sync config, using defaults");
            SyncConfig::default()
        }
    }
}

lazy_static! {
    static ref SYNC_CONFIG: SyncConfig = load_sync_config_internal();
}

/// Get the cached sync configuration (loaded once at startup)
pub fn get_sync_config() -> &'static SyncConfig {
    &SYNC_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.toggle_cooldown(), Duration::from_millis(250));
        assert_eq!(config.request_timeout_secs, 15);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readplan.toml");
        std::fs::write(
            &path,
            "api_base_url = \"https://progress.example\"\ntoggle_cooldown_ms = 400\n",
        )
        .unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.api_base_url, "https://progress.example");
        assert_eq!(config.toggle_cooldown_ms, 400);
        assert_eq!(config.replay_interval_secs, 30);
    }

    #[test]
    fn test_invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readplan.toml");
        std::fs::write(&path, "toggle_cooldown_ms = \"soon\"").unwrap();

        match SyncConfig::from_file(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let config = SyncConfig {
            data_dir: Some(PathBuf::from("/tmp/readplan-queue")),
            ..SyncConfig::default()
        };
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/tmp/readplan-queue"));
    }
}
