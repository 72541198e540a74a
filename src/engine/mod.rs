//! Job engine boundary
//!
//! The external process that owns credentials, the storage protocol client and
//! transfer execution. This crate only reaches it through [`JobEngine`] commands
//! and the [`EngineEvent`] push stream.

pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use thiserror::Error;

use crate::transfer::TransferJob;

pub use types::{
    BucketRecord, ConnectionContext, EngineEvent, FolderQueued, ListObjectsRequest, ListingPage,
    ObjectMutation, ObjectRecord, QueueFolderRequest, QueueTransferRequest,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Command side of the engine boundary.
///
/// Every call is a suspension point; none of them hold local state locks.
#[async_trait]
pub trait JobEngine: Send + Sync {
    async fn list_buckets(&self, context: &ConnectionContext) -> EngineResult<Vec<BucketRecord>>;

    /// Drop and rebuild the engine's client for this profile (credential or region change)
    async fn reset_client(&self, context: &ConnectionContext) -> EngineResult<()>;

    async fn list_objects(&self, request: &ListObjectsRequest) -> EngineResult<ListingPage>;

    /// Recursive enumeration of a subtree; warms the engine cache and returns the object count
    async fn enumerate_all(
        &self,
        bucket: &str,
        region: Option<&str>,
        prefix: &str,
    ) -> EngineResult<u64>;

    async fn search_objects(
        &self,
        bucket: &str,
        region: Option<&str>,
        prefix: &str,
        query: &str,
    ) -> EngineResult<Vec<ObjectRecord>>;

    /// Returns the new job ID
    async fn queue_transfer(&self, request: &QueueTransferRequest) -> EngineResult<String>;

    async fn queue_folder(&self, request: &QueueFolderRequest) -> EngineResult<FolderQueued>;

    async fn list_transfers(&self) -> EngineResult<Vec<TransferJob>>;

    async fn cancel_transfer(&self, job_id: &str) -> EngineResult<bool>;

    /// Returns the ID of the replacement job, never mutates the original
    async fn retry_transfer(&self, job_id: &str) -> EngineResult<Option<String>>;

    async fn remove_transfer(&self, job_id: &str) -> EngineResult<bool>;

    async fn clear_completed_transfers(&self) -> EngineResult<usize>;

    async fn mutate_object(&self, mutation: &ObjectMutation) -> EngineResult<()>;

    async fn get_object_content(
        &self,
        bucket: &str,
        region: Option<&str>,
        key: &str,
    ) -> EngineResult<String>;
}
