//! Bucket Directory
//!
//! Per-profile bucket list cache. Lists change rarely, so entries live for a
//! long TTL and freshness relies on explicit invalidation after writes.
//!
//! Concurrent `get`s for one profile share a single fetch through a per-profile
//! async lock. An invalidation that lands while a fetch is in flight wins: the
//! late result goes back to its caller but is not cached. Lock entries live
//! only while a fetch holds or waits on them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::config::SyncConfig;
use crate::engine::{BucketRecord, ConnectionContext, JobEngine};
use crate::error::Result;

use super::cache::CacheEntry;

pub type BucketList = Arc<Vec<BucketRecord>>;

pub struct BucketDirectory {
    engine: Arc<dyn JobEngine>,
    ttl: Duration,
    entries: DashMap<ConnectionContext, CacheEntry<BucketList>>,
    in_flight: DashMap<ConnectionContext, Arc<tokio::sync::Mutex<()>>>,
    /// Per-profile invalidation counter
    epochs: DashMap<ConnectionContext, u64>,
    /// Bumped by a full invalidation
    global_epoch: AtomicU64,
}

impl BucketDirectory {
    pub fn new(engine: Arc<dyn JobEngine>, config: &SyncConfig) -> Self {
        Self {
            engine,
            ttl: config.bucket_cache_ttl(),
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            epochs: DashMap::new(),
            global_epoch: AtomicU64::new(0),
        }
    }

    fn cached(&self, context: &ConnectionContext) -> Option<BucketList> {
        self.entries
            .get(context)
            .and_then(|entry| entry.fresh(self.ttl).cloned())
    }

    fn epoch(&self, context: &ConnectionContext) -> (u64, u64) {
        (
            self.global_epoch.load(Ordering::SeqCst),
            self.epochs.get(context).map(|e| *e).unwrap_or(0),
        )
    }

    /// Bucket list for a profile, from cache when fresh unless `skip_cache`
    pub async fn get(&self, context: &ConnectionContext, skip_cache: bool) -> Result<BucketList> {
        if !skip_cache {
            if let Some(hit) = self.cached(context) {
                debug!("Bucket cache hit for profile {}", context.profile_id);
                return Ok(hit);
            }
        }

        let lock = self
            .in_flight
            .entry(context.clone())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.fetch_locked(context, skip_cache).await
        };

        // Only the map and `lock` left means no one is waiting
        self.in_flight
            .remove_if(context, |_, held| Arc::strong_count(held) <= 2);
        result
    }

    async fn fetch_locked(&self, context: &ConnectionContext, skip_cache: bool) -> Result<BucketList> {
        // Filled by the fetch we waited on
        if !skip_cache {
            if let Some(hit) = self.cached(context) {
                return Ok(hit);
            }
        }

        debug!("Fetching buckets for profile {}", context.profile_id);
        let epoch = self.epoch(context);
        let buckets: BucketList = Arc::new(self.engine.list_buckets(context).await?);

        if self.epoch(context) == epoch {
            self.entries
                .insert(context.clone(), CacheEntry::new(Arc::clone(&buckets)));
        } else {
            debug!(
                "Profile {} invalidated during fetch, result not cached",
                context.profile_id
            );
        }
        Ok(buckets)
    }

    /// Drop one profile's entry, or every entry when `context` is `None`
    pub fn invalidate(&self, context: Option<&ConnectionContext>) {
        match context {
            Some(context) => {
                self.entries.remove(context);
                *self.epochs.entry(context.clone()).or_insert(0) += 1;
                debug!("Bucket cache invalidated for profile {}", context.profile_id);
            }
            None => {
                self.global_epoch.fetch_add(1, Ordering::SeqCst);
                self.entries.clear();
                // Fetches in flight already see the global bump
                self.epochs.clear();
                self.in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
                debug!("Bucket cache invalidated for all profiles");
            }
        }
    }

    /// Re-prime the engine client (credential or region change) and fetch fresh
    pub async fn refresh(&self, context: &ConnectionContext) -> Result<BucketList> {
        self.engine.reset_client(context).await?;
        self.get(context, true).await
    }
}
