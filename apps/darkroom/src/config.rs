//! Client configuration.
//!
//! Stored as TOML in `~/.config/darkroom/client.toml` (`%APPDATA%` on
//! Windows). A missing file is created with defaults on first run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use darkroom_protocol::constants::{CHUNK_SIZE, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
use darkroom_uploader::UploadConfig;

const APP_DIR: &str = "darkroom";
const CONFIG_FILE: &str = "client.toml";

/// Everything the client needs to reach the gallery and keep its queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the gallery server.
    pub server_url: String,

    /// Token sent in the `join` handshake.
    pub token: String,

    /// Directory holding one JSON file per queued upload.
    pub queue_dir: PathBuf,

    /// Key/value cache file (album mappings, resume ledgers).
    pub cache_path: PathBuf,

    pub concurrency: usize,
    pub batch_size: usize,
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base = config_base_dir().join(APP_DIR);
        Self {
            server_url: "ws://localhost:8080/live".into(),
            token: String::new(),
            queue_dir: base.join("queue"),
            cache_path: base.join("cache.json"),
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    /// Loads the default config file, creating it if missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads `path`, creating it with defaults if it does not exist.
    ///
    /// Keys missing from the file take their default value.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = ClientConfig::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "created default configuration");
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid configuration {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        set_permissions_0600(path);
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Upload tuning derived from this configuration.
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            chunk_size: self.chunk_size,
        }
        .normalized()
    }
}

// The file holds the gallery token.
fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

pub fn config_path() -> PathBuf {
    config_base_dir().join(APP_DIR).join(CONFIG_FILE)
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
            && !xdg.is_empty()
        {
            return PathBuf::from(xdg);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = ClientConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.chunk_size, 2_621_440);

        let reloaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "server_url = \"wss://gallery.example/live\"\ntoken = \"t0k\"\nconcurrency = 2\n",
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.server_url, "wss://gallery.example/live");
        assert_eq!(config.token, "t0k");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(ClientConfig::load_from(&path).is_err());
    }

    #[test]
    fn upload_config_is_normalized() {
        let config = ClientConfig {
            concurrency: 0,
            batch_size: 0,
            ..Default::default()
        };
        let upload = config.upload_config();
        assert!(upload.concurrency >= 1);
        assert!(upload.batch_size >= 1);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        ClientConfig::default().save_to(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
