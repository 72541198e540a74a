//! Transfer job data types

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Upload,
    Download,
}

/// Transfer status
///
/// ```text
/// Pending ──progress──▶ InProgress ──▶ Completed
///    │                     │  └──error──▶ Failed(reason)
///    └──cancel──▶ Cancelled ◀──cancel──┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Waiting in the engine queue
    Pending,
    /// Currently transferring
    InProgress,
    /// Completed successfully
    Completed,
    /// Cancelled by user
    Cancelled,
    /// Failed, reason passed through from the engine
    Failed(String),
}

impl TransferStatus {
    /// No further automatic transition happens from a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Cancelled | TransferStatus::Failed(_)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TransferStatus::Pending | TransferStatus::InProgress)
    }

    /// Position in the state machine; a status update never moves to a lower rank
    pub fn rank(&self) -> u8 {
        match self {
            TransferStatus::Pending => 0,
            TransferStatus::InProgress => 1,
            _ => 2,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TransferStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Local projection of one engine transfer job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferJob {
    pub id: String,
    pub kind: TransferKind,
    pub bucket: String,
    pub bucket_region: Option<String>,
    pub key: String,
    pub local_path: String,
    pub status: TransferStatus,
    /// 0 means unknown until the first progress event
    pub total_bytes: u64,
    pub processed_bytes: u64,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis, set once the job reaches a terminal status
    pub finished_at: Option<i64>,
    /// Folder batch this job belongs to
    pub group_id: Option<String>,
    pub group_name: Option<String>,
}

impl TransferJob {
    pub fn new(
        id: impl Into<String>,
        kind: TransferKind,
        bucket: impl Into<String>,
        key: impl Into<String>,
        local_path: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            bucket: bucket.into(),
            bucket_region: None,
            key: key.into(),
            local_path: local_path.into(),
            status: TransferStatus::Pending,
            total_bytes,
            processed_bytes: 0,
            created_at: Utc::now().timestamp_millis(),
            finished_at: None,
            group_id: None,
            group_name: None,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self.group_name = Some(name.into());
        self
    }

    /// Calculate completion percentage (0-100)
    pub fn progress_percent(&self) -> f64 {
        if self.status == TransferStatus::Completed {
            return 100.0;
        }
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.processed_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Progress notification pushed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: String,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl JobProgress {
    /// Progress view of a full job record (poll results are merged like events)
    pub fn from_job(job: &TransferJob) -> Self {
        Self {
            job_id: job.id.clone(),
            processed_bytes: job.processed_bytes,
            total_bytes: job.total_bytes,
            status: job.status.clone(),
            finished_at: job.finished_at,
        }
    }
}

/// Mutable progress fields of a job. Identity fields are not representable here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPatch {
    pub processed_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub status: Option<TransferStatus>,
    pub finished_at: Option<i64>,
}

impl TransferPatch {
    pub fn is_empty(&self) -> bool {
        self.processed_bytes.is_none()
            && self.total_bytes.is_none()
            && self.status.is_none()
            && self.finished_at.is_none()
    }

    /// Apply to a job, returns whether anything changed
    pub fn apply(&self, job: &mut TransferJob) -> bool {
        let before = (
            job.processed_bytes,
            job.total_bytes,
            job.status.clone(),
            job.finished_at,
        );

        if let Some(processed) = self.processed_bytes {
            job.processed_bytes = processed;
        }
        if let Some(total) = self.total_bytes {
            job.total_bytes = total;
        }
        if let Some(status) = &self.status {
            job.status = status.clone();
        }
        if let Some(finished_at) = self.finished_at {
            job.finished_at = Some(finished_at);
        }

        before
            != (
                job.processed_bytes,
                job.total_bytes,
                job.status.clone(),
                job.finished_at,
            )
    }
}
