//! Scripted in-memory engine for tests
//!
//! Responses are configured up front; gates let a test hold a call open and
//! release it later, so responses can be delivered in any order. A listing
//! response is taken when the request arrives, so a held call returns what
//! the bucket held at that moment.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::{
    BucketRecord, ConnectionContext, EngineError, EngineResult, FolderQueued, JobEngine,
    ListObjectsRequest, ListingPage, ObjectMutation, ObjectRecord, QueueFolderRequest,
    QueueTransferRequest,
};
use crate::transfer::{TransferJob, TransferStatus};

#[derive(Default)]
pub(crate) struct FakeEngine {
    buckets: Mutex<Vec<BucketRecord>>,
    bucket_calls: AtomicUsize,
    bucket_gate: Mutex<Option<Arc<Semaphore>>>,
    reset_calls: AtomicUsize,

    pages: Mutex<HashMap<(String, Option<String>), ListingPage>>,
    failing_prefixes: Mutex<HashSet<String>>,
    listing_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    list_requests: Mutex<Vec<ListObjectsRequest>>,

    enumerate_total: AtomicU64,
    enumerate_calls: AtomicUsize,
    enumerate_gate: Mutex<Option<Arc<Semaphore>>>,

    searchable: Mutex<Vec<ObjectRecord>>,
    search_gates: Mutex<HashMap<String, Arc<Semaphore>>>,

    transfers: Mutex<Vec<TransferJob>>,
    poll_calls: AtomicUsize,
    queued: Mutex<Vec<QueueTransferRequest>>,
    cancelled: Mutex<Vec<String>>,

    mutations: Mutex<Vec<ObjectMutation>>,
    content_delay: Mutex<Option<Duration>>,
}

pub(crate) fn bucket(name: &str) -> BucketRecord {
    BucketRecord {
        name: name.to_string(),
        region: "us-east-1".to_string(),
        creation_date: None,
        object_count: None,
        total_size: None,
    }
}

pub(crate) fn object(key: &str, size: u64) -> ObjectRecord {
    ObjectRecord {
        key: key.to_string(),
        size,
        last_modified: None,
        storage_class: Some("STANDARD".to_string()),
    }
}

pub(crate) fn page(folders: &[&str], objects: &[&str], cursor: Option<&str>) -> ListingPage {
    ListingPage {
        folders: folders.iter().map(|f| f.to_string()).collect(),
        objects: objects.iter().map(|k| object(k, 1)).collect(),
        cursor: cursor.map(|c| c.to_string()),
        truncated: cursor.is_some(),
    }
}

async fn pass_gate(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

impl FakeEngine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ---- buckets ----

    pub(crate) fn set_buckets(&self, buckets: Vec<BucketRecord>) {
        *self.buckets.lock() = buckets;
    }

    pub(crate) fn bucket_calls(&self) -> usize {
        self.bucket_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    /// Hold every bucket fetch until `release_buckets`
    pub(crate) fn hold_buckets(&self) {
        *self.bucket_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_buckets(&self, permits: usize) {
        if let Some(gate) = self.bucket_gate.lock().as_ref() {
            gate.add_permits(permits);
        }
    }

    // ---- listing ----

    pub(crate) fn set_page(&self, prefix: &str, cursor: Option<&str>, page: ListingPage) {
        self.pages
            .lock()
            .insert((prefix.to_string(), cursor.map(|c| c.to_string())), page);
    }

    pub(crate) fn fail_prefix(&self, prefix: &str, fail: bool) {
        let mut failing = self.failing_prefixes.lock();
        if fail {
            failing.insert(prefix.to_string());
        } else {
            failing.remove(prefix);
        }
    }

    /// Hold listing calls for `prefix` until released
    pub(crate) fn hold_prefix(&self, prefix: &str) {
        self.listing_gates
            .lock()
            .insert(prefix.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_prefix(&self, prefix: &str) {
        if let Some(gate) = self.listing_gates.lock().get(prefix) {
            gate.add_permits(1);
        }
    }

    /// Stop holding new calls for `prefix`; calls already waiting stay on the
    /// returned gate
    pub(crate) fn lift_prefix(&self, prefix: &str) -> Option<Arc<Semaphore>> {
        self.listing_gates.lock().remove(prefix)
    }

    pub(crate) fn list_requests(&self) -> Vec<ListObjectsRequest> {
        self.list_requests.lock().clone()
    }

    // ---- enumeration ----

    pub(crate) fn set_enumerate_total(&self, total: u64) {
        self.enumerate_total.store(total, Ordering::SeqCst);
    }

    pub(crate) fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn hold_enumeration(&self) {
        *self.enumerate_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_enumeration(&self) {
        if let Some(gate) = self.enumerate_gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    // ---- search ----

    pub(crate) fn set_searchable(&self, objects: Vec<ObjectRecord>) {
        *self.searchable.lock() = objects;
    }

    pub(crate) fn hold_query(&self, query: &str) {
        self.search_gates
            .lock()
            .insert(query.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_query(&self, query: &str) {
        if let Some(gate) = self.search_gates.lock().get(query) {
            gate.add_permits(1);
        }
    }

    // ---- transfers ----

    pub(crate) fn set_transfers(&self, jobs: Vec<TransferJob>) {
        *self.transfers.lock() = jobs;
    }

    pub(crate) fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn queued(&self) -> Vec<QueueTransferRequest> {
        self.queued.lock().clone()
    }

    pub(crate) fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }

    // ---- objects ----

    pub(crate) fn mutations(&self) -> Vec<ObjectMutation> {
        self.mutations.lock().clone()
    }

    pub(crate) fn set_content_delay(&self, delay: Duration) {
        *self.content_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl JobEngine for FakeEngine {
    async fn list_buckets(&self, _context: &ConnectionContext) -> EngineResult<Vec<BucketRecord>> {
        self.bucket_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.bucket_gate.lock().clone();
        pass_gate(gate).await;
        Ok(self.buckets.lock().clone())
    }

    async fn reset_client(&self, _context: &ConnectionContext) -> EngineResult<()> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> EngineResult<ListingPage> {
        self.list_requests.lock().push(request.clone());
        let response = if self.failing_prefixes.lock().contains(&request.prefix) {
            Err(EngineError::Transport(format!(
                "listing {} failed",
                request.prefix
            )))
        } else {
            Ok(self
                .pages
                .lock()
                .get(&(request.prefix.clone(), request.cursor.clone()))
                .cloned()
                .unwrap_or_default())
        };

        let gate = self.listing_gates.lock().get(&request.prefix).cloned();
        pass_gate(gate).await;
        response
    }

    async fn enumerate_all(
        &self,
        _bucket: &str,
        _region: Option<&str>,
        _prefix: &str,
    ) -> EngineResult<u64> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.enumerate_gate.lock().clone();
        pass_gate(gate).await;
        Ok(self.enumerate_total.load(Ordering::SeqCst))
    }

    async fn search_objects(
        &self,
        _bucket: &str,
        _region: Option<&str>,
        prefix: &str,
        query: &str,
    ) -> EngineResult<Vec<ObjectRecord>> {
        let gate = self.search_gates.lock().get(query).cloned();
        pass_gate(gate).await;
        let needle = query.to_lowercase();
        Ok(self
            .searchable
            .lock()
            .iter()
            .filter(|o| o.key.starts_with(prefix) && o.key.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn queue_transfer(&self, request: &QueueTransferRequest) -> EngineResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut job = TransferJob::new(
            id.clone(),
            request.kind,
            request.bucket.clone(),
            request.key.clone(),
            request.local_path.to_string_lossy().to_string(),
            request.declared_size,
        );
        job.bucket_region = request.region.clone();
        self.transfers.lock().push(job);
        self.queued.lock().push(request.clone());
        Ok(id)
    }

    async fn queue_folder(&self, request: &QueueFolderRequest) -> EngineResult<FolderQueued> {
        let group_id = uuid::Uuid::new_v4().to_string();
        let name = format!("s3://{}/{}", request.bucket, request.prefix);
        let mut transfers = self.transfers.lock();
        for i in 0..2 {
            transfers.push(
                TransferJob::new(
                    uuid::Uuid::new_v4().to_string(),
                    request.kind,
                    request.bucket.clone(),
                    format!("{}file-{}", request.prefix, i),
                    request.local_path.join(format!("file-{}", i)).to_string_lossy(),
                    0,
                )
                .with_group(group_id.clone(), name.clone()),
            );
        }
        Ok(FolderQueued { count: 2, group_id })
    }

    async fn list_transfers(&self) -> EngineResult<Vec<TransferJob>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transfers.lock().clone())
    }

    async fn cancel_transfer(&self, job_id: &str) -> EngineResult<bool> {
        self.cancelled.lock().push(job_id.to_string());
        Ok(self.transfers.lock().iter().any(|j| j.id == job_id))
    }

    async fn retry_transfer(&self, job_id: &str) -> EngineResult<Option<String>> {
        let mut transfers = self.transfers.lock();
        let original = match transfers.iter().find(|j| j.id == job_id) {
            Some(job) => job.clone(),
            None => return Err(EngineError::NotFound(job_id.to_string())),
        };
        if !matches!(
            original.status,
            TransferStatus::Failed(_) | TransferStatus::Cancelled
        ) {
            return Ok(None);
        }
        let mut retried = original.clone();
        retried.id = uuid::Uuid::new_v4().to_string();
        retried.status = TransferStatus::Pending;
        retried.processed_bytes = 0;
        retried.finished_at = None;
        let new_id = retried.id.clone();
        transfers.push(retried);
        Ok(Some(new_id))
    }

    async fn remove_transfer(&self, job_id: &str) -> EngineResult<bool> {
        let mut transfers = self.transfers.lock();
        let before = transfers.len();
        transfers.retain(|j| j.id != job_id);
        Ok(transfers.len() < before)
    }

    async fn clear_completed_transfers(&self) -> EngineResult<usize> {
        let mut transfers = self.transfers.lock();
        let before = transfers.len();
        transfers.retain(|j| j.status.is_active());
        Ok(before - transfers.len())
    }

    async fn mutate_object(&self, mutation: &ObjectMutation) -> EngineResult<()> {
        self.mutations.lock().push(mutation.clone());
        Ok(())
    }

    async fn get_object_content(
        &self,
        _bucket: &str,
        _region: Option<&str>,
        key: &str,
    ) -> EngineResult<String> {
        let delay = *self.content_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(format!("contents of {}", key))
    }
}
