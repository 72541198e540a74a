//! Reconciliation policy
//!
//! Pure functions deciding how push events and poll results are merged into the
//! registry. The reconciler task only moves data between these functions, the
//! engine and the registry.
//!
//! # Invariants
//! - A job already terminal locally is never changed again, not even to
//!   another terminal status
//! - Status never moves to a lower rank (Pending < InProgress < terminal)
//! - `processed_bytes` never decreases
//! - While hidden, only terminal progress events and "job added" events are applied

use std::collections::{HashMap, HashSet};

use crate::engine::EngineEvent;

use super::types::{JobProgress, TransferJob, TransferPatch};

/// Whether the transfer view is on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn from_visible(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::Hidden
        }
    }

    pub fn is_visible(self) -> bool {
        self == Visibility::Visible
    }
}

/// Decide whether a push event is applied at all
pub fn admit_push(event: &EngineEvent, visibility: Visibility) -> bool {
    match event {
        EngineEvent::JobAdded { .. } => true,
        EngineEvent::JobProgress(progress) => {
            visibility.is_visible() || progress.status.is_terminal()
        }
    }
}

/// Merge an incoming progress record into the local job.
///
/// Returns `None` when nothing should change.
pub fn merge_progress(local: &TransferJob, incoming: &JobProgress) -> Option<TransferPatch> {
    if local.status.is_terminal() {
        return None;
    }

    let status = if incoming.status.rank() >= local.status.rank() {
        incoming.status.clone()
    } else {
        local.status.clone()
    };

    let processed_bytes = local.processed_bytes.max(incoming.processed_bytes);

    let total_bytes = if incoming.total_bytes > 0 {
        incoming.total_bytes
    } else {
        local.total_bytes
    };

    let mut patch = TransferPatch::default();
    if status != local.status {
        patch.status = Some(status);
    }
    if processed_bytes != local.processed_bytes {
        patch.processed_bytes = Some(processed_bytes);
    }
    if total_bytes != local.total_bytes {
        patch.total_bytes = Some(total_bytes);
    }
    if incoming.finished_at.is_some() && incoming.finished_at != local.finished_at {
        patch.finished_at = incoming.finished_at;
    }

    if patch.is_empty() {
        None
    } else {
        Some(patch)
    }
}

/// Changes derived from one full poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollPlan {
    /// Jobs the registry does not know yet
    pub inserts: Vec<TransferJob>,
    /// Merged progress for known jobs
    pub patches: Vec<(String, TransferPatch)>,
    /// Jobs the engine no longer reports
    pub removals: Vec<String>,
}

impl PollPlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.patches.is_empty() && self.removals.is_empty()
    }
}

/// Build the plan for a poll result.
///
/// `known_before_poll` holds the IDs present when the poll request was issued;
/// only those can be removed, so a job added by a push event while the poll
/// was in flight survives a poll snapshot that predates it.
pub fn plan_poll(
    local: &[TransferJob],
    known_before_poll: &HashSet<String>,
    polled: Vec<TransferJob>,
) -> PollPlan {
    let local_by_id: HashMap<&str, &TransferJob> =
        local.iter().map(|job| (job.id.as_str(), job)).collect();
    let polled_ids: HashSet<String> = polled.iter().map(|job| job.id.clone()).collect();

    let mut plan = PollPlan::default();

    for job in polled {
        match local_by_id.get(job.id.as_str()) {
            Some(existing) => {
                if let Some(patch) = merge_progress(existing, &JobProgress::from_job(&job)) {
                    plan.patches.push((job.id.clone(), patch));
                }
            }
            None => plan.inserts.push(job),
        }
    }

    for job in local {
        if known_before_poll.contains(&job.id) && !polled_ids.contains(&job.id) {
            plan.removals.push(job.id.clone());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::types::{TransferKind, TransferStatus};

    fn job(id: &str, status: TransferStatus, processed: u64, total: u64) -> TransferJob {
        let mut job = TransferJob::new(id, TransferKind::Download, "b", id, "/tmp/x", total);
        job.status = status;
        job.processed_bytes = processed;
        job
    }

    fn progress(id: &str, status: TransferStatus, processed: u64, total: u64) -> JobProgress {
        JobProgress {
            job_id: id.into(),
            processed_bytes: processed,
            total_bytes: total,
            status,
            finished_at: None,
        }
    }

    #[test]
    fn test_hidden_drops_non_terminal_progress() {
        let running = EngineEvent::JobProgress(progress("a", TransferStatus::InProgress, 1, 2));
        let done = EngineEvent::JobProgress(progress("a", TransferStatus::Completed, 2, 2));
        let added = EngineEvent::JobAdded {
            job: job("b", TransferStatus::Pending, 0, 0),
        };

        assert!(!admit_push(&running, Visibility::Hidden));
        assert!(admit_push(&done, Visibility::Hidden));
        assert!(admit_push(&added, Visibility::Hidden));
        assert!(admit_push(&running, Visibility::Visible));
    }

    #[test]
    fn test_terminal_is_sticky() {
        let local = job("a", TransferStatus::Completed, 100, 100);
        let stale = progress("a", TransferStatus::InProgress, 40, 100);
        assert_eq!(merge_progress(&local, &stale), None);
    }

    #[test]
    fn test_terminal_ignores_later_terminal() {
        let local = job("a", TransferStatus::Completed, 10, 10);
        let late_cancel = progress("a", TransferStatus::Cancelled, 0, 10);
        assert_eq!(merge_progress(&local, &late_cancel), None);

        let local = job("b", TransferStatus::Failed("timeout".into()), 4, 10);
        let late_done = progress("b", TransferStatus::Completed, 10, 10);
        assert_eq!(merge_progress(&local, &late_done), None);
    }

    #[test]
    fn test_cancel_keeps_transferred_bytes() {
        let local = job("a", TransferStatus::InProgress, 60, 100);
        let cancelled = progress("a", TransferStatus::Cancelled, 0, 100);
        let patch = merge_progress(&local, &cancelled).unwrap();
        assert_eq!(patch.status, Some(TransferStatus::Cancelled));
        assert_eq!(patch.processed_bytes, None);
    }

    #[test]
    fn test_status_never_regresses() {
        let local = job("a", TransferStatus::InProgress, 50, 100);
        let late = progress("a", TransferStatus::Pending, 0, 100);
        assert_eq!(merge_progress(&local, &late), None);
    }

    #[test]
    fn test_processed_is_monotonic_while_running() {
        let local = job("a", TransferStatus::InProgress, 60, 100);
        let out_of_order = progress("a", TransferStatus::InProgress, 30, 100);
        assert_eq!(merge_progress(&local, &out_of_order), None);

        let newer = progress("a", TransferStatus::InProgress, 80, 100);
        let patch = merge_progress(&local, &newer).unwrap();
        assert_eq!(patch.processed_bytes, Some(80));
        assert_eq!(patch.status, None);
    }

    #[test]
    fn test_unknown_total_is_filled_in() {
        let local = job("a", TransferStatus::Pending, 0, 0);
        let first = progress("a", TransferStatus::InProgress, 10, 500);
        let patch = merge_progress(&local, &first).unwrap();
        assert_eq!(patch.total_bytes, Some(500));
        assert_eq!(patch.status, Some(TransferStatus::InProgress));

        // Unknown incoming total keeps the local one
        let local = job("a", TransferStatus::InProgress, 10, 500);
        let no_total = progress("a", TransferStatus::InProgress, 20, 0);
        let patch = merge_progress(&local, &no_total).unwrap();
        assert_eq!(patch.total_bytes, None);
    }

    #[test]
    fn test_failure_carries_reason_and_finish_time() {
        let local = job("a", TransferStatus::InProgress, 10, 100);
        let mut failed = progress("a", TransferStatus::Failed("AccessDenied".into()), 10, 100);
        failed.finished_at = Some(42);
        let patch = merge_progress(&local, &failed).unwrap();
        assert_eq!(patch.status, Some(TransferStatus::Failed("AccessDenied".into())));
        assert_eq!(patch.finished_at, Some(42));
    }

    #[test]
    fn test_plan_poll_inserts_patches_and_removes() {
        let local = vec![
            job("kept", TransferStatus::InProgress, 10, 100),
            job("gone", TransferStatus::Pending, 0, 10),
            job("fresh", TransferStatus::Pending, 0, 10),
        ];
        // "fresh" arrived through a push event after the poll was issued
        let known: HashSet<String> = ["kept", "gone"].iter().map(|s| s.to_string()).collect();
        let polled = vec![
            job("kept", TransferStatus::InProgress, 70, 100),
            job("new", TransferStatus::Pending, 0, 5),
        ];

        let plan = plan_poll(&local, &known, polled);

        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].id, "new");
        assert_eq!(plan.patches.len(), 1);
        assert_eq!(plan.patches[0].0, "kept");
        assert_eq!(plan.patches[0].1.processed_bytes, Some(70));
        assert_eq!(plan.removals, vec!["gone".to_string()]);
    }

    #[test]
    fn test_plan_poll_respects_terminal_stickiness() {
        let local = vec![job("a", TransferStatus::Completed, 100, 100)];
        let known: HashSet<String> = ["a".to_string()].into_iter().collect();
        let polled = vec![job("a", TransferStatus::InProgress, 50, 100)];

        let plan = plan_poll(&local, &known, polled);
        assert!(plan.is_empty());
    }
}
