//! Eviction claims for entries pending destruction.

use crate::error::MetadataResult;
use crate::models::CacheEntryRow;
use async_trait::async_trait;

/// Exclusive claim on one `pending_destruction` entry.
///
/// While a claim is held no other claimant receives the same row. Dropping a
/// claim without completing it behaves like [`EvictionClaim::release`]: the
/// row becomes claimable again (immediately on PostgreSQL, after the lease
/// expires on SQLite).
#[async_trait]
pub trait EvictionClaim: Send {
    /// The claimed entry.
    fn entry(&self) -> &CacheEntryRow;

    /// Delete the row and end the claim.
    async fn complete(self: Box<Self>) -> MetadataResult<()>;

    /// Leave the row untouched and end the claim.
    async fn release(self: Box<Self>) -> MetadataResult<()>;
}

/// Pull-based source of eviction work.
#[async_trait]
pub trait EvictionRepo: Send + Sync {
    /// Claim the oldest unclaimed `pending_destruction` entry, if any.
    ///
    /// Never blocks on rows held by other claimants.
    async fn next_pending_destruction(&self) -> MetadataResult<Option<Box<dyn EvictionClaim>>>;

    /// Number of entries awaiting destruction.
    async fn count_pending_destruction(&self) -> MetadataResult<u64>;
}
