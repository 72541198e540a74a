//! Sync layer error types

use thiserror::Error;

use crate::config::StorageError;
use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(#[from] StorageError),

    #[error("Transfer job not found: {0}")]
    JobNotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

// Make SyncError serializable for the presentation layer
impl serde::Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
