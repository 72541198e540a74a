//! Configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Most keys a single list request may ask for
pub const MAX_PAGE_SIZE: u32 = 1_000;

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_bucket_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_preview_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_delimiter() -> String {
    "/".to_string()
}

/// Sync layer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// How long a bucket list stays fresh
    #[serde(default = "default_bucket_cache_ttl_secs")]
    pub bucket_cache_ttl_secs: u64,

    /// Transfer poll period while the transfer view is visible
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a preview content fetch
    #[serde(default = "default_preview_timeout_secs")]
    pub preview_timeout_secs: u64,

    /// Keys requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            bucket_cache_ttl_secs: default_bucket_cache_ttl_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            preview_timeout_secs: default_preview_timeout_secs(),
            page_size: default_page_size(),
            delimiter: default_delimiter(),
        }
    }
}

impl SyncConfig {
    pub fn bucket_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_cache_ttl_secs)
    }

    /// Never zero; `tokio::time::interval` panics on a zero period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn preview_timeout(&self) -> Duration {
        Duration::from_secs(self.preview_timeout_secs)
    }

    /// Page size as sent to the engine, within `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn delimiter(&self) -> &str {
        if self.delimiter.is_empty() {
            "/"
        } else {
            &self.delimiter
        }
    }

    /// Replace values the sync layer cannot run with. Returns the names of the
    /// fields that changed.
    pub fn normalize(&mut self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.page_size == 0 {
            self.page_size = default_page_size();
            changed.push("pageSize");
        } else if self.page_size > MAX_PAGE_SIZE {
            self.page_size = MAX_PAGE_SIZE;
            changed.push("pageSize");
        }
        if self.delimiter.is_empty() {
            self.delimiter = default_delimiter();
            changed.push("delimiter");
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
            changed.push("pollIntervalMs");
        }
        if self.preview_timeout_secs == 0 {
            self.preview_timeout_secs = default_preview_timeout_secs();
            changed.push("previewTimeoutSecs");
        }
        changed
    }
}
