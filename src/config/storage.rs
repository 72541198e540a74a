//! Settings file
//!
//! `sync.json` under `~/.brows3` (`%APPDATA%\Brows3` on Windows). A missing
//! file means defaults. An unreadable file is moved aside to `sync.json.bak`
//! so the next save starts clean, and defaults are used. Values the sync layer
//! cannot run with are normalized on load and before every save.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use super::types::{SyncConfig, CONFIG_VERSION};

pub const CONFIG_FILE_NAME: &str = "sync.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No home directory to keep settings in")]
    NoConfigDir,

    #[error("Cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot encode settings: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Settings version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where the settings file lives unless a path is given
pub fn default_config_path() -> Result<PathBuf, StorageError> {
    let app_data = if cfg!(windows) {
        dirs::config_dir().map(|dir| dir.join("Brows3"))
    } else {
        None
    };
    app_data
        .or_else(|| dirs::home_dir().map(|home| home.join(".brows3")))
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(StorageError::NoConfigDir)
}

pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self::with_path(default_config_path()?))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<SyncConfig, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncConfig::default());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let mut config = match serde_json::from_str::<SyncConfig>(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!("Unreadable settings in {}: {}", self.path.display(), e);
                self.set_aside().await;
                return Ok(SyncConfig::default());
            }
        };

        if config.version > CONFIG_VERSION {
            return Err(StorageError::VersionTooNew {
                found: config.version,
                supported: CONFIG_VERSION,
            });
        }

        let changed = config.normalize();
        if !changed.is_empty() {
            warn!(
                "Settings {:?} in {} out of range, using defaults for them",
                changed,
                self.path.display()
            );
        }
        Ok(config)
    }

    /// Write through a temp file and rename, so a crash never leaves half a file
    pub async fn save(&self, config: &SyncConfig) -> Result<(), StorageError> {
        let mut config = config.clone();
        config.normalize();
        config.version = CONFIG_VERSION;
        let json = serde_json::to_vec_pretty(&config)?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::io(dir, e))?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)
            .await
            .map_err(|e| StorageError::io(&staging, e))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }

    /// Move an unreadable file to `sync.json.bak`, replacing an older one
    async fn set_aside(&self) {
        let aside = self.path.with_extension("json.bak");
        match fs::rename(&self.path, &aside).await {
            Ok(()) => info!("Moved unreadable settings to {}", aside.display()),
            Err(e) => warn!("Could not move unreadable settings aside: {}", e),
        }
    }
}
