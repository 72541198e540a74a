//! Listing Session
//!
//! State of the folder view for one (bucket, prefix) at a time: the first page,
//! pages appended by "load more", and the background full enumeration that
//! supplies the total count.
//!
//! Every request takes a [`RequestFence`] token before it is sent and only
//! commits if no newer request was begun in the meantime. Navigating to another
//! key begins a token too, so everything still in flight for the old key is
//! dropped on arrival. Navigating to the key already shown changes nothing.
//!
//! Writes mark a bucket (or the shown key) stale. The mark outlives navigation:
//! every key under a marked bucket loads with `bypass_cache` until a bypassing
//! response for that key has been committed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::engine::{ConnectionContext, JobEngine, ListObjectsRequest, ListingPage, ObjectRecord};

use super::fence::{FenceToken, RequestFence};

/// Which folder a session shows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingKey {
    pub context: ConnectionContext,
    pub bucket: String,
    pub region: Option<String>,
    pub prefix: String,
}

impl ListingKey {
    pub fn new(context: ConnectionContext, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            context,
            bucket: bucket.into(),
            region: None,
            prefix: prefix.into(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Result of a load request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Response committed to the session
    Applied,
    /// A newer request was begun; response dropped
    Superseded,
    /// Request failed; message recorded in the snapshot
    Failed(String),
    /// Nothing to do (no key, no cursor, or a load already running)
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<ObjectRecord>,
    pub searching: bool,
    pub error: Option<String>,
}

/// Immutable view of a session, published on every change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    pub key: Option<ListingKey>,
    pub folders: Vec<String>,
    pub objects: Vec<ObjectRecord>,
    pub cursor: Option<String>,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<String>,
    pub background_synced: bool,
    /// Authoritative object count from the background enumeration
    pub total_count: Option<u64>,
    pub search: Option<SearchResults>,
}

#[derive(Default)]
struct SessionState {
    key: Option<ListingKey>,
    /// Token begun when `key` was entered; identifies this visit
    visit: Option<FenceToken>,

    folders: Vec<String>,
    objects: Vec<ObjectRecord>,
    cursor: Option<String>,
    truncated: bool,
    loaded: bool,
    loading: bool,
    loading_more: bool,
    error: Option<String>,

    sync_started: bool,
    background_synced: bool,
    total_count: Option<u64>,
    /// First page of this visit came back truncated or empty
    first_page_suspect: bool,
    recovered: bool,

    search: Option<SearchResults>,
}

impl SessionState {
    fn visiting(key: ListingKey, visit: FenceToken) -> Self {
        Self {
            key: Some(key),
            visit: Some(visit),
            ..Default::default()
        }
    }

    fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot {
            key: self.key.clone(),
            folders: self.folders.clone(),
            objects: self.objects.clone(),
            cursor: self.cursor.clone(),
            has_more: self.truncated && self.cursor.is_some(),
            loading: self.loading,
            loading_more: self.loading_more,
            error: self.error.clone(),
            background_synced: self.background_synced,
            total_count: self.total_count,
            search: self.search.clone(),
        }
    }

    fn replace_page(&mut self, page: ListingPage) {
        self.folders = Vec::with_capacity(page.folders.len());
        let mut seen = HashSet::new();
        for folder in page.folders {
            if seen.insert(folder.clone()) {
                self.folders.push(folder);
            }
        }
        self.objects = Vec::with_capacity(page.objects.len());
        let mut seen = HashSet::new();
        for object in page.objects {
            if seen.insert(object.key.clone()) {
                self.objects.push(object);
            }
        }
        self.cursor = page.cursor;
        self.truncated = page.truncated;
    }

    fn append_page(&mut self, page: ListingPage) {
        let mut folders: HashSet<String> = self.folders.iter().cloned().collect();
        for folder in page.folders {
            if folders.insert(folder.clone()) {
                self.folders.push(folder);
            }
        }
        let mut keys: HashSet<String> = self.objects.iter().map(|o| o.key.clone()).collect();
        for object in page.objects {
            if keys.insert(object.key.clone()) {
                self.objects.push(object);
            }
        }
        self.cursor = page.cursor;
        self.truncated = page.truncated;
    }
}

/// Stale marks, numbered by a generation counter. A key is stale while its
/// newest mark (own or bucket-wide) is above the generation its last
/// committed bypassing load started at.
#[derive(Default)]
struct Invalidations {
    generation: u64,
    buckets: HashMap<(ConnectionContext, String), u64>,
    keys: HashMap<ListingKey, u64>,
    refreshed: HashMap<ListingKey, u64>,
}

impl Invalidations {
    fn mark_key(&mut self, key: ListingKey) {
        self.generation += 1;
        self.keys.insert(key, self.generation);
    }

    fn mark_bucket(&mut self, context: ConnectionContext, bucket: String) {
        self.generation += 1;
        self.buckets.insert((context, bucket), self.generation);
    }

    fn is_stale(&self, key: &ListingKey) -> bool {
        let bucket = self
            .buckets
            .get(&(key.context.clone(), key.bucket.clone()))
            .copied()
            .unwrap_or(0);
        let own = self.keys.get(key).copied().unwrap_or(0);
        let refreshed = self.refreshed.get(key).copied().unwrap_or(0);
        bucket.max(own) > refreshed
    }

    /// A bypassing load begun at `generation` was committed for `key`
    fn committed(&mut self, key: &ListingKey, generation: u64) {
        let refreshed = self.refreshed.entry(key.clone()).or_insert(0);
        *refreshed = (*refreshed).max(generation);
        if self.keys.get(key).is_some_and(|&mark| mark <= generation) {
            self.keys.remove(key);
        }
    }
}

pub struct ListingSession {
    engine: Arc<dyn JobEngine>,
    page_size: u32,
    delimiter: String,
    fence: RequestFence,
    search_fence: RequestFence,
    state: Mutex<SessionState>,
    // Lock after `state` when both are needed
    invalidations: Mutex<Invalidations>,
    snapshots: watch::Sender<ListingSnapshot>,
}

impl ListingSession {
    pub fn new(engine: Arc<dyn JobEngine>, config: &SyncConfig) -> Arc<Self> {
        let (snapshots, _) = watch::channel(ListingSnapshot::default());
        Arc::new(Self {
            engine,
            page_size: config.page_size(),
            delimiter: config.delimiter().to_string(),
            fence: RequestFence::new(),
            search_fence: RequestFence::new(),
            state: Mutex::new(SessionState::default()),
            invalidations: Mutex::new(Invalidations::default()),
            snapshots,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ListingSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ListingSnapshot {
        self.state.lock().snapshot()
    }

    pub fn key(&self) -> Option<ListingKey> {
        self.state.lock().key.clone()
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    fn request(&self, key: &ListingKey, cursor: Option<String>, bypass_cache: bool) -> ListObjectsRequest {
        ListObjectsRequest {
            bucket: key.bucket.clone(),
            region: key.region.clone(),
            prefix: key.prefix.clone(),
            delimiter: self.delimiter.clone(),
            cursor,
            max_keys: self.page_size,
            bypass_cache,
        }
    }

    /// Switch to `key`. Returns false, leaving state untouched, for the key
    /// already shown.
    pub fn navigate(&self, key: ListingKey) -> bool {
        let mut state = self.state.lock();
        if state.key.as_ref() == Some(&key) {
            return false;
        }

        let visit = self.fence.begin();
        self.search_fence.begin();
        debug!("Navigating to s3://{}/{}", key.bucket, key.prefix);
        *state = SessionState::visiting(key, visit);
        self.publish(&state);
        true
    }

    /// Navigate and load the first page when the key changed or nothing is loaded yet
    pub async fn open(self: &Arc<Self>, key: ListingKey) -> LoadOutcome {
        let changed = self.navigate(key);
        let loaded = self.state.lock().loaded;
        if changed || !loaded {
            self.load(false).await
        } else {
            LoadOutcome::Skipped
        }
    }

    /// Loads of the shown key bypass the engine cache until one commits
    pub fn mark_stale(&self) {
        let state = self.state.lock();
        if let Some(key) = state.key.clone() {
            self.invalidations.lock().mark_key(key);
        }
    }

    /// Loads of any key under `bucket` bypass the engine cache until a
    /// bypassing load for that key commits, including keys visited later
    pub fn mark_bucket_stale(&self, context: &ConnectionContext, bucket: &str) {
        self.invalidations
            .lock()
            .mark_bucket(context.clone(), bucket.to_string());
    }

    /// Fetch the first page and replace the session contents
    pub async fn load(self: &Arc<Self>, bypass_cache: bool) -> LoadOutcome {
        let (token, request, key, generation) = {
            let mut state = self.state.lock();
            let key = match &state.key {
                Some(key) => key.clone(),
                None => return LoadOutcome::Skipped,
            };

            let (stale, generation) = {
                let invalidations = self.invalidations.lock();
                (invalidations.is_stale(&key), invalidations.generation)
            };
            let bypass = bypass_cache || stale;
            if bypass {
                // Stale "load more" must not run against a refreshing view
                state.cursor = None;
                state.truncated = false;
            }
            state.loading = true;
            state.loading_more = false;
            let token = self.fence.begin();
            self.publish(&state);
            let request = self.request(&key, None, bypass);
            (token, request, key, generation)
        };

        let result = self.engine.list_objects(&request).await;

        let mut state = self.state.lock();
        if !self.fence.is_current(token) {
            debug!(
                "Listing s3://{}/{} superseded (token {})",
                request.bucket,
                request.prefix,
                token.value()
            );
            return LoadOutcome::Superseded;
        }
        state.loading = false;

        match result {
            Ok(page) => {
                if request.bypass_cache {
                    self.invalidations.lock().committed(&key, generation);
                }
                let first_load = !state.loaded;
                if first_load {
                    state.first_page_suspect = page.truncated || page.is_empty();
                }
                state.replace_page(page);
                state.loaded = true;
                state.error = None;

                let background = if state.sync_started {
                    None
                } else {
                    state.sync_started = true;
                    state.key.clone().zip(state.visit)
                };
                self.publish(&state);
                drop(state);

                if let Some((key, visit)) = background {
                    self.spawn_background_sync(key, visit);
                }
                LoadOutcome::Applied
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    "Listing s3://{}/{} failed: {}",
                    request.bucket, request.prefix, message
                );
                if !state.loaded {
                    state.folders.clear();
                    state.objects.clear();
                    state.cursor = None;
                    state.truncated = false;
                }
                state.error = Some(message.clone());
                self.publish(&state);
                LoadOutcome::Failed(message)
            }
        }
    }

    /// Fetch the page after the stored cursor and append it
    pub async fn load_more(&self) -> LoadOutcome {
        let (token, request) = {
            let mut state = self.state.lock();
            let key = match &state.key {
                Some(key) => key.clone(),
                None => return LoadOutcome::Skipped,
            };
            let cursor = match &state.cursor {
                Some(cursor) => cursor.clone(),
                None => return LoadOutcome::Skipped,
            };
            if state.loading || state.loading_more {
                return LoadOutcome::Skipped;
            }

            state.loading_more = true;
            let token = self.fence.begin();
            self.publish(&state);
            (token, self.request(&key, Some(cursor), false))
        };

        let result = self.engine.list_objects(&request).await;

        let mut state = self.state.lock();
        if !self.fence.is_current(token) {
            debug!("Load more for s3://{}/{} superseded", request.bucket, request.prefix);
            return LoadOutcome::Superseded;
        }
        state.loading_more = false;

        match result {
            Ok(page) => {
                state.append_page(page);
                state.error = None;
                self.publish(&state);
                LoadOutcome::Applied
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    "Load more for s3://{}/{} failed: {}",
                    request.bucket, request.prefix, message
                );
                state.error = Some(message.clone());
                self.publish(&state);
                LoadOutcome::Failed(message)
            }
        }
    }

    /// Enumerate the whole subtree in the background, once per visit
    fn spawn_background_sync(self: &Arc<Self>, key: ListingKey, visit: FenceToken) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let result = session
                .engine
                .enumerate_all(&key.bucket, key.region.as_deref(), &key.prefix)
                .await;

            let refetch = {
                let mut state = session.state.lock();
                if state.visit != Some(visit) {
                    debug!(
                        "Background sync for s3://{}/{} finished after navigation, dropped",
                        key.bucket, key.prefix
                    );
                    return;
                }
                match result {
                    Ok(total) => {
                        info!(
                            "Background sync of s3://{}/{} complete: {} objects",
                            key.bucket, key.prefix, total
                        );
                        state.total_count = Some(total);
                        state.background_synced = true;
                        let refetch = state.first_page_suspect && !state.recovered;
                        if refetch {
                            state.recovered = true;
                        }
                        session.publish(&state);
                        refetch
                    }
                    Err(e) => {
                        warn!(
                            "Background sync of s3://{}/{} failed: {}",
                            key.bucket, key.prefix, e
                        );
                        false
                    }
                }
            };

            if refetch {
                debug!("Re-fetching first page of s3://{}/{}", key.bucket, key.prefix);
                session.load(false).await;
            }
        });
    }

    /// Search objects under the current prefix. An empty query clears the results.
    pub async fn search(&self, query: &str) -> LoadOutcome {
        let query = query.trim().to_string();
        let (token, key) = {
            let mut state = self.state.lock();
            let key = match &state.key {
                Some(key) => key.clone(),
                None => return LoadOutcome::Skipped,
            };
            let token = self.search_fence.begin();
            if query.is_empty() {
                state.search = None;
                self.publish(&state);
                return LoadOutcome::Applied;
            }
            state.search = Some(SearchResults {
                query: query.clone(),
                searching: true,
                ..Default::default()
            });
            self.publish(&state);
            (token, key)
        };

        let result = self
            .engine
            .search_objects(&key.bucket, key.region.as_deref(), &key.prefix, &query)
            .await;

        let mut state = self.state.lock();
        if !self.search_fence.is_current(token) {
            debug!("Search {:?} superseded", query);
            return LoadOutcome::Superseded;
        }

        let outcome = match result {
            Ok(results) => {
                state.search = Some(SearchResults {
                    query,
                    results,
                    searching: false,
                    error: None,
                });
                LoadOutcome::Applied
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Search {:?} failed: {}", query, message);
                state.search = Some(SearchResults {
                    query,
                    results: Vec::new(),
                    searching: false,
                    error: Some(message.clone()),
                });
                LoadOutcome::Failed(message)
            }
        };
        self.publish(&state);
        outcome
    }
}
