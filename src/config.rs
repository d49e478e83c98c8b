// Persisted settings
//
// Stored as JSON under the platform config directory:
//   {"settings": {"download_directory": "/home/me/Videos"}}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::downloader::models::DownloadDirectory;

const APP_DIR: &str = "yt-downloader";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no config directory on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Settings {
    download_directory: DownloadDirectory,
}

/// `~/Videos`, or `./Videos` when there is no home directory
pub fn default_download_directory() -> DownloadDirectory {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    DownloadDirectory::new(home.join("Videos"))
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    default_directory: DownloadDirectory,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_directory: default_download_directory(),
        }
    }

    /// Store at `<config dir>/yt-downloader/config.json`
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dir.join(APP_DIR).join(CONFIG_FILE)))
    }

    pub fn with_default_directory(mut self, directory: DownloadDirectory) -> Self {
        self.default_directory = directory;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved directory, or the default.
    ///
    /// A missing file is created holding the default. A malformed file is
    /// left untouched.
    pub fn load(&self) -> DownloadDirectory {
        match self.read() {
            Ok(Some(directory)) => {
                debug!(path = %self.path.display(), directory = %directory, "loaded settings");
                directory
            }
            Ok(None) => {
                let directory = self.default_directory.clone();
                if let Err(e) = self.save(&directory) {
                    warn!(error = %e, "could not write default settings");
                }
                directory
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable settings");
                self.default_directory.clone()
            }
        }
    }

    pub fn save(&self, directory: &DownloadDirectory) -> Result<(), ConfigError> {
        let file = ConfigFile {
            settings: Settings {
                download_directory: directory.clone(),
            },
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        std::fs::write(&self.path, json).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), directory = %directory, "saved settings");
        Ok(())
    }

    fn read(&self) -> Result<Option<DownloadDirectory>, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        let file: ConfigFile = serde_json::from_str(&content)?;
        Ok(Some(file.settings.download_directory))
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
