//! Cache entry repository.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{CacheEntryKey, CacheEntryRow, CacheEntryUpdates};
use async_trait::async_trait;
use depot_core::Upstream;
use time::OffsetDateTime;

/// Repository for cached upstream responses.
///
/// Backends implement the primitives; the race-safe upsert is shared.
#[async_trait]
pub trait CacheEntryRepo: Send + Sync {
    /// Find the live (`default`) entry for a key.
    async fn find_default_entry(
        &self,
        upstream_id: i64,
        relative_path: &str,
    ) -> MetadataResult<Option<CacheEntryRow>>;

    /// Get an entry by ID regardless of status.
    async fn get_cache_entry(&self, id: i64) -> MetadataResult<Option<CacheEntryRow>>;

    /// Insert a new `default` entry.
    ///
    /// Returns `Constraint` when a live entry for the key already exists.
    async fn insert_entry(
        &self,
        key: &CacheEntryKey,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<CacheEntryRow>;

    /// Overwrite content attributes of a live entry in place.
    ///
    /// Only matches while the row is `default`; returns `None` once it has
    /// left that state. The stored `object_storage_key` and `group_id` are
    /// never changed.
    async fn update_entry(
        &self,
        id: i64,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<Option<CacheEntryRow>>;

    /// Record a successful revalidation without touching content.
    async fn bump_upstream_checked_at(
        &self,
        id: i64,
        checked_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Move an entry to `pending_destruction`, renaming its path out of the
    /// way of the live-entry index.
    ///
    /// Column-only update guarded on the status the caller saw; an entry
    /// that moved on in the meantime yields `InvalidStateTransition`.
    async fn mark_pending_destruction(&self, entry: &CacheEntryRow)
    -> MetadataResult<CacheEntryRow>;

    /// List live entries of an upstream, newest first, optionally filtered
    /// by a substring of the relative path.
    async fn list_default_entries(
        &self,
        upstream_id: i64,
        search: Option<&str>,
    ) -> MetadataResult<Vec<CacheEntryRow>>;

    /// Look up the live entry for `key`, inserting one with `updates` if
    /// absent and updating it in place otherwise.
    ///
    /// A concurrent writer may insert between lookup and insert; the loser
    /// retries "look up, then update" exactly once. After this returns, exactly
    /// one live entry exists for the key.
    ///
    /// Content is only written to a live entry whose `object_storage_key`
    /// matches `updates`. A live entry holding another object is returned
    /// untouched; the caller owns the orphaned object.
    async fn get_or_create(
        &self,
        key: &CacheEntryKey,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<CacheEntryRow> {
        if let Some(row) = self.refresh_live_entry(key, updates).await? {
            return Ok(row);
        }

        match self.insert_entry(key, updates).await {
            Ok(row) => Ok(row),
            Err(MetadataError::Constraint(_)) => {
                tracing::debug!(
                    upstream_id = key.upstream_id,
                    relative_path = %key.relative_path,
                    "Lost cache entry insert race, retrying against winner"
                );
                self.refresh_live_entry(key, updates)
                    .await?
                    .ok_or_else(|| {
                        MetadataError::Internal(format!(
                            "cache entry for {} vanished after unique violation",
                            key.relative_path
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// One "look up, then update" step of [`CacheEntryRepo::get_or_create`].
    ///
    /// `None` when no live entry exists, including one that left `default`
    /// between lookup and update.
    async fn refresh_live_entry(
        &self,
        key: &CacheEntryKey,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<Option<CacheEntryRow>> {
        let Some(existing) = self
            .find_default_entry(key.upstream_id, &key.relative_path)
            .await?
        else {
            return Ok(None);
        };

        if existing.object_storage_key != updates.object_storage_key {
            return Ok(Some(existing));
        }

        self.update_entry(existing.id, updates).await
    }

    /// Object storage key for a path: the live entry's key if one exists,
    /// otherwise a freshly minted one.
    async fn object_storage_key_for(
        &self,
        upstream: &Upstream,
        relative_path: &str,
    ) -> MetadataResult<String> {
        Ok(
            match self.find_default_entry(upstream.id, relative_path).await? {
                Some(entry) => entry.object_storage_key,
                None => upstream.new_object_storage_key(relative_path),
            },
        )
    }
}

/// Error for a guarded status update that matched no row.
pub(crate) async fn lost_transition<R: CacheEntryRepo + ?Sized>(
    repo: &R,
    id: i64,
    to: depot_core::CacheEntryStatus,
) -> MetadataError {
    match repo.get_cache_entry(id).await {
        Ok(Some(current)) => MetadataError::InvalidStateTransition {
            from: current.status,
            to: to.to_string(),
        },
        Ok(None) => MetadataError::NotFound(format!("cache entry {id}")),
        Err(e) => e,
    }
}
