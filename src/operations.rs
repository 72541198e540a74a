//! Object operations
//!
//! Writes that change what a listing shows (put, delete, copy, move) and the
//! bounded preview fetch. After a write succeeds the bucket cache for the
//! profile is dropped and every watched session records the touched buckets
//! as stale, so loads of any folder in them skip the engine cache, including
//! folders the session navigates to later.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::engine::{ConnectionContext, JobEngine, ObjectMutation};
use crate::error::{Result, SyncError};
use crate::listing::{BucketDirectory, ListingSession};

pub struct ObjectOperations {
    engine: Arc<dyn JobEngine>,
    directory: Arc<BucketDirectory>,
    sessions: Mutex<Vec<Weak<ListingSession>>>,
    preview_timeout: Duration,
}

impl ObjectOperations {
    pub fn new(
        engine: Arc<dyn JobEngine>,
        directory: Arc<BucketDirectory>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            engine,
            directory,
            sessions: Mutex::new(Vec::new()),
            preview_timeout: config.preview_timeout(),
        }
    }

    /// Record writes in `session` so its listings of touched buckets bypass the cache
    pub fn watch(&self, session: &Arc<ListingSession>) {
        self.sessions.lock().push(Arc::downgrade(session));
    }

    pub async fn put(
        &self,
        context: &ConnectionContext,
        bucket: &str,
        key: &str,
        content: impl Into<String>,
    ) -> Result<()> {
        self.apply(
            context,
            ObjectMutation::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content: content.into(),
            },
        )
        .await
    }

    pub async fn delete(
        &self,
        context: &ConnectionContext,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<()> {
        self.apply(
            context,
            ObjectMutation::Delete {
                bucket: bucket.to_string(),
                keys,
            },
        )
        .await
    }

    pub async fn copy(
        &self,
        context: &ConnectionContext,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<()> {
        self.apply(
            context,
            ObjectMutation::Copy {
                source_bucket: source_bucket.to_string(),
                source_key: source_key.to_string(),
                dest_bucket: dest_bucket.to_string(),
                dest_key: dest_key.to_string(),
            },
        )
        .await
    }

    pub async fn move_object(
        &self,
        context: &ConnectionContext,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<()> {
        self.apply(
            context,
            ObjectMutation::Move {
                source_bucket: source_bucket.to_string(),
                source_key: source_key.to_string(),
                dest_bucket: dest_bucket.to_string(),
                dest_key: dest_key.to_string(),
            },
        )
        .await
    }

    /// Run a mutation, then invalidate what it may have changed
    pub async fn apply(&self, context: &ConnectionContext, mutation: ObjectMutation) -> Result<()> {
        self.engine.mutate_object(&mutation).await?;
        info!("Object {} succeeded", mutation.label());

        self.directory.invalidate(Some(context));

        let touched = mutation.touched_buckets();
        let mut sessions = self.sessions.lock();
        sessions.retain(|weak| weak.strong_count() > 0);
        for session in sessions.iter().filter_map(Weak::upgrade) {
            for bucket in &touched {
                session.mark_bucket_stale(context, bucket);
            }
        }
        debug!("Invalidated listings for buckets {:?}", touched);
        Ok(())
    }

    /// Object content for preview, bounded by the preview timeout
    pub async fn get_content(
        &self,
        bucket: &str,
        region: Option<&str>,
        key: &str,
    ) -> Result<String> {
        let fetch = self.engine.get_object_content(bucket, region, key);
        match tokio::time::timeout(self.preview_timeout, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout(format!(
                "preview of s3://{}/{} after {}s",
                bucket,
                key,
                self.preview_timeout.as_secs()
            ))),
        }
    }
}
