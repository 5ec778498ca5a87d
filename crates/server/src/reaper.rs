//! One-shot reaper for cache entries pending destruction.
//!
//! Meant to be run by an external scheduler (`depot reap`). Several reapers
//! may run concurrently; claims keep them off each other's rows.

use depot_metadata::MetadataStore;
use depot_metadata::repos::EvictionClaim;
use depot_storage::ObjectStore;
use std::collections::HashSet;

/// Outcome of one reaper run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapStats {
    /// Claims taken.
    pub processed: u64,
    /// Entries whose bytes and row are gone.
    pub deleted: u64,
    /// Claims released after a failure.
    pub errors: u64,
}

/// Drain up to `limit` entries pending destruction.
pub async fn reap(
    metadata: &dyn MetadataStore,
    storage: &dyn ObjectStore,
    limit: u32,
) -> depot_metadata::MetadataResult<ReapStats> {
    let mut stats = ReapStats::default();
    // Entries released in this run; seeing one again means only failures remain.
    let mut failed = HashSet::new();

    while stats.processed < u64::from(limit) {
        let Some(claim) = metadata.next_pending_destruction().await? else {
            break;
        };

        let entry_id = claim.entry().id;
        if failed.contains(&entry_id) {
            claim.release().await?;
            break;
        }
        stats.processed += 1;

        if destroy(storage, claim).await {
            stats.deleted += 1;
            crate::metrics::EVICTIONS_COMPLETED.inc();
        } else {
            stats.errors += 1;
            failed.insert(entry_id);
            crate::metrics::EVICTIONS_FAILED.inc();
        }
    }

    tracing::info!(
        processed = stats.processed,
        deleted = stats.deleted,
        errors = stats.errors,
        "Reaper run finished"
    );
    Ok(stats)
}

/// Delete the bytes, then the row. Returns whether both succeeded.
async fn destroy(storage: &dyn ObjectStore, claim: Box<dyn EvictionClaim>) -> bool {
    let entry = claim.entry();
    let entry_id = entry.id;
    let key = entry.object_storage_key.clone();

    match storage.delete(&key).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            tracing::debug!(cache_entry_id = entry_id, "Object already gone");
        }
        Err(e) => {
            tracing::warn!(
                cache_entry_id = entry_id,
                error = %e,
                "Failed to delete cached object, releasing claim"
            );
            if let Err(e) = claim.release().await {
                tracing::warn!(cache_entry_id = entry_id, error = %e, "Failed to release claim");
            }
            return false;
        }
    }

    match claim.complete().await {
        Ok(()) => {
            tracing::debug!(cache_entry_id = entry_id, "Cache entry destroyed");
            true
        }
        Err(e) => {
            tracing::warn!(
                cache_entry_id = entry_id,
                error = %e,
                "Failed to delete cache entry row"
            );
            false
        }
    }
}
