//! Bucket and folder listings
//!
//! Bucket lists are cached per profile; folder listings live in sessions that
//! discard out-of-order responses through a request fence.

pub mod buckets;
pub mod cache;
pub mod fence;
pub mod session;

pub use buckets::{BucketDirectory, BucketList};
pub use cache::CacheEntry;
pub use fence::{FenceToken, RequestFence};
pub use session::{ListingKey, ListingSession, ListingSnapshot, LoadOutcome, SearchResults};
