//! Timestamped cache entries

use std::time::Duration;

use tokio::time::Instant;

/// A cached value and when it was fetched. An entry is either fresh and
/// returned whole, or treated as absent.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            fetched_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }

    pub fn fresh(&self, ttl: Duration) -> Option<&T> {
        if self.is_fresh(ttl) {
            Some(&self.data)
        } else {
            None
        }
    }
}
