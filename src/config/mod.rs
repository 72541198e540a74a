//! Configuration Management Module
//!
//! Tunables for the sync layer and their persistent storage.

pub mod storage;
pub mod types;

pub use storage::{default_config_path, ConfigStorage, StorageError, CONFIG_FILE_NAME};
pub use types::{SyncConfig, CONFIG_VERSION, MAX_PAGE_SIZE};
