//! Wire types exchanged with the job engine

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transfer::{JobProgress, TransferJob, TransferKind};

/// Profile/region scope that every cache entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionContext {
    /// Connection profile ID
    pub profile_id: String,
    /// Default region of the profile (if pinned)
    pub region: Option<String>,
}

impl ConnectionContext {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Bucket entry as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    pub name: String,
    pub region: String,
    pub creation_date: Option<DateTime<Utc>>,
    /// Size summary, only present when the engine has enumerated the bucket
    pub object_count: Option<u64>,
    pub total_size: Option<u64>,
}

/// Object entry within a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Full object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
}

/// One page of a delimiter-bound listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    /// Common prefixes (immediate child folders)
    pub folders: Vec<String>,
    /// Objects directly under the prefix
    pub objects: Vec<ObjectRecord>,
    /// Continuation token for the next page
    pub cursor: Option<String>,
    pub truncated: bool,
}

impl ListingPage {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.objects.is_empty()
    }
}

/// `list objects` command input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub region: Option<String>,
    pub prefix: String,
    pub delimiter: String,
    pub cursor: Option<String>,
    pub max_keys: u32,
    pub bypass_cache: bool,
}

/// `queue upload/download` command input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTransferRequest {
    pub kind: TransferKind,
    pub bucket: String,
    pub region: Option<String>,
    pub key: String,
    pub local_path: PathBuf,
    /// 0 when the size is not known yet
    pub declared_size: u64,
}

/// `queue folder upload/download` command input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueFolderRequest {
    pub kind: TransferKind,
    pub bucket: String,
    pub region: Option<String>,
    pub prefix: String,
    pub local_path: PathBuf,
}

/// Result of a folder batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderQueued {
    /// Number of jobs queued
    pub count: u32,
    /// Group ID shared by every job of the batch
    pub group_id: String,
}

/// Object write operations. Each one may change what a listing shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ObjectMutation {
    Put {
        bucket: String,
        key: String,
        content: String,
    },
    Delete {
        bucket: String,
        keys: Vec<String>,
    },
    Copy {
        source_bucket: String,
        source_key: String,
        dest_bucket: String,
        dest_key: String,
    },
    Move {
        source_bucket: String,
        source_key: String,
        dest_bucket: String,
        dest_key: String,
    },
}

impl ObjectMutation {
    /// Buckets whose contents this mutation changes
    pub fn touched_buckets(&self) -> Vec<&str> {
        match self {
            ObjectMutation::Put { bucket, .. } | ObjectMutation::Delete { bucket, .. } => {
                vec![bucket.as_str()]
            }
            // Copy only writes the destination; move also removes the source
            ObjectMutation::Copy { dest_bucket, .. } => vec![dest_bucket.as_str()],
            ObjectMutation::Move {
                source_bucket,
                dest_bucket,
                ..
            } => {
                if source_bucket == dest_bucket {
                    vec![source_bucket.as_str()]
                } else {
                    vec![source_bucket.as_str(), dest_bucket.as_str()]
                }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectMutation::Put { .. } => "put",
            ObjectMutation::Delete { .. } => "delete",
            ObjectMutation::Copy { .. } => "copy",
            ObjectMutation::Move { .. } => "move",
        }
    }
}

/// Push notifications from the engine. Arrival order is not guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Job progress/status changed
    JobProgress(JobProgress),
    /// A job was queued
    JobAdded { job: TransferJob },
}

impl EngineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            EngineEvent::JobProgress(progress) => &progress.job_id,
            EngineEvent::JobAdded { job } => &job.id,
        }
    }
}
