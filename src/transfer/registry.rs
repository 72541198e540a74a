//! Transfer Registry
//!
//! Single owner of the local transfer job table. The presentation layer and the
//! reconciler both go through this API; readers get clones, never references
//! into the table. Every effective change bumps a version counter and is
//! broadcast to subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use super::reconcile::PollPlan;
use super::types::{TransferJob, TransferPatch};

/// Capacity of the change broadcast; slow subscribers see `Lagged` and should re-read
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What happened to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Upserted(String),
    Patched(String),
    Removed(String),
    /// Terminal jobs cleared (count)
    Cleared(usize),
    /// Poll result merged
    Reconciled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChange {
    /// Registry version after the change
    pub version: u64,
    pub kind: ChangeKind,
}

pub struct TransferRegistry {
    jobs: RwLock<HashMap<String, TransferJob>>,
    version: AtomicU64,
    changes: broadcast::Sender<RegistryChange>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            changes,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    /// Current version (0 for a registry that never changed)
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn bump(&self, kind: ChangeKind) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        // No receivers is fine
        let _ = self.changes.send(RegistryChange { version, kind });
    }

    /// Insert a new job or replace the record with the same ID
    pub fn upsert(&self, job: TransferJob) {
        let id = job.id.clone();
        let changed = {
            let mut jobs = self.jobs.write();
            match jobs.get(&id) {
                Some(existing) if *existing == job => false,
                _ => {
                    jobs.insert(id.clone(), job);
                    true
                }
            }
        };
        if changed {
            debug!("Transfer {} upserted", id);
            self.bump(ChangeKind::Upserted(id));
        }
    }

    /// Insert only if the ID is unknown, returns false if a record already exists
    pub fn insert_new(&self, job: TransferJob) -> bool {
        let id = job.id.clone();
        {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&id) {
                return false;
            }
            jobs.insert(id.clone(), job);
        }
        debug!("Transfer {} added", id);
        self.bump(ChangeKind::Upserted(id));
        true
    }

    /// Merge progress fields into an existing job.
    ///
    /// Returns false if the job is unknown or nothing changed.
    pub fn patch(&self, id: &str, patch: &TransferPatch) -> bool {
        let changed = {
            let mut jobs = self.jobs.write();
            match jobs.get_mut(id) {
                Some(job) => patch.apply(job),
                None => false,
            }
        };
        if changed {
            self.bump(ChangeKind::Patched(id.to_string()));
        }
        changed
    }

    pub fn remove(&self, id: &str) -> Option<TransferJob> {
        let removed = self.jobs.write().remove(id);
        if removed.is_some() {
            debug!("Transfer {} removed", id);
            self.bump(ChangeKind::Removed(id.to_string()));
        }
        removed
    }

    /// Remove every Completed/Cancelled/Failed job, returns how many were removed
    pub fn clear_terminal(&self) -> usize {
        let removed = {
            let mut jobs = self.jobs.write();
            let before = jobs.len();
            jobs.retain(|_, job| !job.status.is_terminal());
            before - jobs.len()
        };
        if removed > 0 {
            debug!("Cleared {} finished transfers", removed);
            self.bump(ChangeKind::Cleared(removed));
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<TransferJob> {
        self.jobs.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.read().contains_key(id)
    }

    /// All jobs, newest first
    pub fn list_all(&self) -> Vec<TransferJob> {
        let mut list: Vec<TransferJob> = self.jobs.read().values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn ids(&self) -> Vec<String> {
        self.jobs.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Merge a computed patch into one job atomically.
    ///
    /// `merge` sees the current record and returns the patch to apply, if any.
    pub fn patch_with<F>(&self, id: &str, merge: F) -> bool
    where
        F: FnOnce(&TransferJob) -> Option<TransferPatch>,
    {
        let changed = {
            let mut jobs = self.jobs.write();
            match jobs.get_mut(id) {
                Some(job) => match merge(job) {
                    Some(patch) => patch.apply(job),
                    None => false,
                },
                None => false,
            }
        };
        if changed {
            self.bump(ChangeKind::Patched(id.to_string()));
        }
        changed
    }

    /// Plan and apply a poll result under one write lock and one version bump
    pub fn reconcile<F>(&self, plan: F) -> bool
    where
        F: FnOnce(&[TransferJob]) -> PollPlan,
    {
        let changed = {
            let mut jobs = self.jobs.write();
            let current: Vec<TransferJob> = jobs.values().cloned().collect();
            let plan = plan(&current);
            if plan.is_empty() {
                return false;
            }

            let mut changed = false;
            for job in plan.inserts {
                jobs.insert(job.id.clone(), job);
                changed = true;
            }
            for (id, patch) in &plan.patches {
                if let Some(job) = jobs.get_mut(id) {
                    changed |= patch.apply(job);
                }
            }
            for id in &plan.removals {
                changed |= jobs.remove(id).is_some();
            }
            changed
        };
        if changed {
            self.bump(ChangeKind::Reconciled);
        }
        changed
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}
