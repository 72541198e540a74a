//! Brows3 sync layer
//!
//! Client-side state for a desktop object-storage browser: cached bucket
//! lists, fenced folder listings, and a local transfer table reconciled
//! against the job engine's push events and polls.
//!
//! The job engine itself (credentials, the storage client, transfer
//! execution) sits behind [`engine::JobEngine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod listing;
pub mod operations;
pub mod transfer;

pub use config::{ConfigStorage, SyncConfig};
pub use engine::{EngineError, EngineEvent, JobEngine};
pub use error::{Result, SyncError};
pub use listing::{BucketDirectory, ListingKey, ListingSession, ListingSnapshot, LoadOutcome};
pub use operations::ObjectOperations;
pub use transfer::{
    EventReconciler, GroupCache, JobGrouper, ReconcilerHandle, TransferActions, TransferJob,
    TransferRegistry, TransferStatus,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if the host already installed a global subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
