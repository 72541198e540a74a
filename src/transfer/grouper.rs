//! Job grouping
//!
//! Folder transfers share a `group_id`. The transfer view shows one aggregate
//! row per group next to the standalone jobs; all of it is derived from the
//! registry and never stored on its own.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::registry::TransferRegistry;
use super::types::{TransferJob, TransferStatus};

/// Aggregate status of a group. Active beats failed beats completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum GroupStatus {
    /// Pending + in-progress member count
    Active(usize),
    /// Failed member count
    Failed(usize),
    Completed,
}

impl GroupStatus {
    pub fn label(&self) -> String {
        match self {
            GroupStatus::Active(n) => format!("active ({})", n),
            GroupStatus::Failed(n) => format!("failed ({})", n),
            GroupStatus::Completed => "completed".to_string(),
        }
    }
}

impl From<GroupStatus> for String {
    fn from(status: GroupStatus) -> Self {
        status.label()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobGroup {
    pub group_id: String,
    pub name: String,
    pub jobs: Vec<TransferJob>,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    /// 0-100
    pub progress: f64,
    pub status: GroupStatus,
    /// Earliest member `created_at` (0 if none is set)
    pub start_time: i64,
    /// Latest member `finished_at` once every member completed, else 0
    pub end_time: i64,
    /// Newest member `created_at`, used for ordering
    pub latest: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransferRow {
    Group(JobGroup),
    Job(TransferJob),
}

impl TransferRow {
    pub fn latest(&self) -> i64 {
        match self {
            TransferRow::Group(group) => group.latest,
            TransferRow::Job(job) => job.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedView {
    pub rows: Vec<TransferRow>,
}

impl GroupedView {
    pub fn groups(&self) -> impl Iterator<Item = &JobGroup> {
        self.rows.iter().filter_map(|row| match row {
            TransferRow::Group(group) => Some(group),
            TransferRow::Job(_) => None,
        })
    }

    pub fn standalone(&self) -> impl Iterator<Item = &TransferJob> {
        self.rows.iter().filter_map(|row| match row {
            TransferRow::Job(job) => Some(job),
            TransferRow::Group(_) => None,
        })
    }
}

pub struct JobGrouper;

impl JobGrouper {
    pub fn derive(jobs: &[TransferJob]) -> GroupedView {
        let mut rows = Vec::new();
        let mut order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<TransferJob>> = HashMap::new();

        for job in jobs {
            match &job.group_id {
                Some(group_id) => {
                    if !members.contains_key(group_id) {
                        order.push(group_id.clone());
                    }
                    members
                        .entry(group_id.clone())
                        .or_default()
                        .push(job.clone());
                }
                None => rows.push(TransferRow::Job(job.clone())),
            }
        }

        for group_id in order {
            if let Some(jobs) = members.remove(&group_id) {
                rows.push(TransferRow::Group(aggregate(group_id, jobs)));
            }
        }

        // Stable sort keeps input order for equal timestamps
        rows.sort_by(|a, b| b.latest().cmp(&a.latest()));
        GroupedView { rows }
    }
}

fn aggregate(group_id: String, jobs: Vec<TransferJob>) -> JobGroup {
    let all_completed = jobs.iter().all(|j| j.status == TransferStatus::Completed);

    let total_bytes: u64 = jobs
        .iter()
        .map(|j| {
            let done = if j.status == TransferStatus::Completed {
                j.processed_bytes
            } else {
                0
            };
            j.total_bytes.max(done)
        })
        .sum();
    let processed_bytes: u64 = jobs.iter().map(|j| j.processed_bytes).sum();

    let progress = if all_completed {
        100.0
    } else if total_bytes > 0 {
        processed_bytes as f64 / total_bytes as f64 * 100.0
    } else {
        0.0
    };

    let active = jobs.iter().filter(|j| j.status.is_active()).count();
    let failed = jobs
        .iter()
        .filter(|j| matches!(j.status, TransferStatus::Failed(_)))
        .count();
    let status = if active > 0 {
        GroupStatus::Active(active)
    } else if failed > 0 {
        GroupStatus::Failed(failed)
    } else {
        GroupStatus::Completed
    };

    let start_time = jobs
        .iter()
        .map(|j| j.created_at)
        .filter(|t| *t > 0)
        .min()
        .unwrap_or(0);
    let end_time = if all_completed {
        jobs.iter().filter_map(|j| j.finished_at).max().unwrap_or(0)
    } else {
        0
    };
    let latest = jobs.iter().map(|j| j.created_at).max().unwrap_or(0);

    let name = jobs
        .iter()
        .find_map(|j| j.group_name.clone())
        .unwrap_or_else(|| group_id.clone());

    JobGroup {
        group_id,
        name,
        jobs,
        total_bytes,
        processed_bytes,
        progress,
        status,
        start_time,
        end_time,
        latest,
    }
}

/// Memoised [`GroupedView`] keyed by registry version
#[derive(Default)]
pub struct GroupCache {
    cached: Mutex<Option<(u64, Arc<GroupedView>)>>,
}

impl GroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self, registry: &TransferRegistry) -> Arc<GroupedView> {
        let version = registry.version();
        if let Some((cached_version, view)) = self.cached.lock().as_ref() {
            if *cached_version == version {
                return Arc::clone(view);
            }
        }

        let view = Arc::new(JobGrouper::derive(&registry.list_all()));
        *self.cached.lock() = Some((version, Arc::clone(&view)));
        view
    }
}
