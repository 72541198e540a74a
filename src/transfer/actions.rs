//! Transfer commands
//!
//! Thin wrappers over the engine commands. None of them changes a job's local
//! status ahead of the engine; status changes arrive through the reconciler.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::{FolderQueued, JobEngine, QueueFolderRequest, QueueTransferRequest};
use crate::error::{Result, SyncError};

use super::reconciler::EventReconciler;
use super::registry::TransferRegistry;
use super::types::{TransferKind, TransferStatus};

pub struct TransferActions {
    engine: Arc<dyn JobEngine>,
    registry: Arc<TransferRegistry>,
    reconciler: Option<Arc<EventReconciler>>,
}

impl TransferActions {
    pub fn new(engine: Arc<dyn JobEngine>, registry: Arc<TransferRegistry>) -> Self {
        Self {
            engine,
            registry,
            reconciler: None,
        }
    }

    /// Poll soon after each successful command
    pub fn with_reconciler(mut self, reconciler: Arc<EventReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    fn nudge(&self) {
        if let Some(reconciler) = &self.reconciler {
            reconciler.request_poll();
        }
    }

    pub async fn queue(&self, request: QueueTransferRequest) -> Result<String> {
        let id = self.engine.queue_transfer(&request).await?;
        info!(
            "Queued {:?} {}/{} as {}",
            request.kind, request.bucket, request.key, id
        );
        self.nudge();
        Ok(id)
    }

    pub async fn queue_upload(
        &self,
        bucket: &str,
        region: Option<&str>,
        key: &str,
        local_path: impl Into<PathBuf>,
        declared_size: u64,
    ) -> Result<String> {
        self.queue(QueueTransferRequest {
            kind: TransferKind::Upload,
            bucket: bucket.to_string(),
            region: region.map(str::to_string),
            key: key.to_string(),
            local_path: local_path.into(),
            declared_size,
        })
        .await
    }

    pub async fn queue_download(
        &self,
        bucket: &str,
        region: Option<&str>,
        key: &str,
        local_path: impl Into<PathBuf>,
        declared_size: u64,
    ) -> Result<String> {
        self.queue(QueueTransferRequest {
            kind: TransferKind::Download,
            bucket: bucket.to_string(),
            region: region.map(str::to_string),
            key: key.to_string(),
            local_path: local_path.into(),
            declared_size,
        })
        .await
    }

    async fn queue_folder(&self, request: QueueFolderRequest) -> Result<FolderQueued> {
        let queued = self.engine.queue_folder(&request).await?;
        info!(
            "Queued folder {:?} s3://{}/{}: {} jobs in group {}",
            request.kind, request.bucket, request.prefix, queued.count, queued.group_id
        );
        self.nudge();
        Ok(queued)
    }

    pub async fn queue_folder_upload(
        &self,
        bucket: &str,
        region: Option<&str>,
        prefix: &str,
        local_dir: impl Into<PathBuf>,
    ) -> Result<FolderQueued> {
        self.queue_folder(QueueFolderRequest {
            kind: TransferKind::Upload,
            bucket: bucket.to_string(),
            region: region.map(str::to_string),
            prefix: prefix.to_string(),
            local_path: local_dir.into(),
        })
        .await
    }

    pub async fn queue_folder_download(
        &self,
        bucket: &str,
        region: Option<&str>,
        prefix: &str,
        local_dir: impl Into<PathBuf>,
    ) -> Result<FolderQueued> {
        self.queue_folder(QueueFolderRequest {
            kind: TransferKind::Download,
            bucket: bucket.to_string(),
            region: region.map(str::to_string),
            prefix: prefix.to_string(),
            local_path: local_dir.into(),
        })
        .await
    }

    /// Ask the engine to cancel. The local record shows `Cancelled` only once
    /// the engine reports it.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        let acknowledged = self.engine.cancel_transfer(job_id).await?;
        debug!("Cancel {} acknowledged: {}", job_id, acknowledged);
        if acknowledged {
            self.nudge();
        }
        Ok(acknowledged)
    }

    /// Retry a failed or cancelled job, returns the replacement job's ID
    pub async fn retry(&self, job_id: &str) -> Result<String> {
        let job = self
            .registry
            .get(job_id)
            .ok_or_else(|| SyncError::JobNotFound(job_id.to_string()))?;
        if !matches!(
            job.status,
            TransferStatus::Failed(_) | TransferStatus::Cancelled
        ) {
            return Err(SyncError::Rejected(format!(
                "transfer {} is {:?}, only failed or cancelled transfers can be retried",
                job_id, job.status
            )));
        }

        let new_id = self
            .engine
            .retry_transfer(job_id)
            .await?
            .ok_or_else(|| SyncError::Rejected(format!("engine declined retry of {}", job_id)))?;
        info!("Retrying transfer {} as {}", job_id, new_id);
        self.nudge();
        Ok(new_id)
    }

    /// Remove a job; the local record goes once the engine confirms
    pub async fn remove(&self, job_id: &str) -> Result<bool> {
        let removed = self.engine.remove_transfer(job_id).await?;
        if removed {
            self.registry.remove(job_id);
        }
        Ok(removed)
    }

    /// Clear finished jobs, returns the engine's count
    pub async fn clear_completed(&self) -> Result<usize> {
        let cleared = self.engine.clear_completed_transfers().await?;
        let local = self.registry.clear_terminal();
        debug!("Cleared {} finished transfers ({} locally)", cleared, local);
        Ok(cleared)
    }
}
