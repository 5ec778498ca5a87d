//! Cache entry store tests, run against SQLite and (when Docker is available)
//! PostgreSQL.

mod common;

use common::fixtures::{JAR_PATH, entry_key, entry_updates, seed_registry};
use common::metadata::{TestMetadata, run_metadata_test_both};
use depot_core::CacheEntryStatus;
use depot_core::upstream::DELETED_SEGMENT;
use async_trait::async_trait;
use depot_metadata::models::{CacheEntryKey, CacheEntryRow, CacheEntryUpdates};
use depot_metadata::repos::CacheEntryRepo;
use depot_metadata::{MetadataError, MetadataResult, MetadataStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn test_get_or_create_inserts_then_updates() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);

        let first = entry_updates(&seeded.upstream, JAR_PATH);
        let created = metadata.get_or_create(&key, &first).await.unwrap();
        assert_eq!(created.status().unwrap(), CacheEntryStatus::Default);
        assert_eq!(created.object_storage_key, first.object_storage_key);
        assert_eq!(created.group_id, seeded.group.id);

        // A refetch written back under the live entry's key.
        let mut second = entry_updates(&seeded.upstream, JAR_PATH);
        second.object_storage_key = first.object_storage_key.clone();
        second.upstream_etag = Some("\"v2\"".to_string());
        second.size = 42;
        let updated = metadata.get_or_create(&key, &second).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.size, 42);
        assert_eq!(updated.upstream_etag.as_deref(), Some("\"v2\""));
        assert_eq!(updated.object_storage_key, first.object_storage_key);
    })
    .await;
}

#[tokio::test]
async fn test_get_or_create_keeps_content_of_entry_with_other_object() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);
        let winner = metadata
            .get_or_create(&key, &entry_updates(&seeded.upstream, JAR_PATH))
            .await
            .unwrap();

        let mut late = entry_updates(&seeded.upstream, JAR_PATH);
        late.size = 4;
        late.sha1 = "81fe8bfe87576c3ecb22426f8e57847382917acf".to_string();
        late.md5 = None;
        late.upstream_etag = Some("\"other\"".to_string());
        let returned = metadata.get_or_create(&key, &late).await.unwrap();

        assert_eq!(returned.id, winner.id);
        assert_eq!(returned.object_storage_key, winner.object_storage_key);
        assert_eq!(returned.size, winner.size);
        assert_eq!(returned.sha1, winner.sha1);
        let stored = metadata.get_cache_entry(winner.id).await.unwrap().unwrap();
        assert_eq!(stored.size, winner.size);
        assert_eq!(stored.sha1, winner.sha1);
        assert_eq!(stored.md5, winner.md5);
        assert_eq!(stored.upstream_etag, winner.upstream_etag);
    })
    .await;
}

#[tokio::test]
async fn test_update_entry_skips_rows_that_left_default() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);
        let updates = entry_updates(&seeded.upstream, JAR_PATH);
        let entry = metadata.get_or_create(&key, &updates).await.unwrap();
        metadata.mark_pending_destruction(&entry).await.unwrap();

        let updated = metadata.update_entry(entry.id, &updates).await.unwrap();
        assert!(updated.is_none());
        let row = metadata.get_cache_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(row.status().unwrap(), CacheEntryStatus::PendingDestruction);
    })
    .await;
}

#[tokio::test]
async fn test_mark_pending_destruction_twice_is_rejected() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let entry = metadata
            .get_or_create(
                &entry_key(&seeded.upstream, JAR_PATH),
                &entry_updates(&seeded.upstream, JAR_PATH),
            )
            .await
            .unwrap();
        let marked = metadata.mark_pending_destruction(&entry).await.unwrap();

        // Stale copy of the row and the marked row are both refused.
        for row in [&entry, &marked] {
            let err = metadata.mark_pending_destruction(row).await.unwrap_err();
            assert!(
                matches!(err, MetadataError::InvalidStateTransition { .. }),
                "expected invalid transition, got {err:?}"
            );
        }
        let row = metadata.get_cache_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(row.relative_path, marked.relative_path);
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_get_or_create_leaves_one_live_entry() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let metadata = metadata.clone();
            let key = key.clone();
            let updates = entry_updates(&seeded.upstream, JAR_PATH);
            handles.push(tokio::spawn(async move {
                metadata.get_or_create(&key, &updates).await
            }));
        }

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for handle in handles {
            let row = handle.await.unwrap().expect("get_or_create should succeed");
            ids.insert(row.id);
            keys.insert(row.object_storage_key);
        }

        assert_eq!(ids.len(), 1, "all callers must end on the same row");
        assert_eq!(keys.len(), 1, "the winner's storage key is kept");

        let live = metadata
            .list_default_entries(seeded.upstream.id, None)
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_insert_entry_rejects_second_live_row() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);

        metadata
            .insert_entry(&key, &entry_updates(&seeded.upstream, JAR_PATH))
            .await
            .unwrap();
        let err = metadata
            .insert_entry(&key, &entry_updates(&seeded.upstream, JAR_PATH))
            .await
            .unwrap_err();
        assert!(
            matches!(err, MetadataError::Constraint(_)),
            "expected constraint violation, got {err:?}"
        );
    })
    .await;
}

#[tokio::test]
async fn test_mark_pending_destruction_frees_the_path() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);

        let entry = metadata
            .get_or_create(&key, &entry_updates(&seeded.upstream, JAR_PATH))
            .await
            .unwrap();
        let marked = metadata.mark_pending_destruction(&entry).await.unwrap();

        assert_eq!(marked.id, entry.id);
        assert_eq!(
            marked.status().unwrap(),
            CacheEntryStatus::PendingDestruction
        );
        assert!(
            marked
                .relative_path
                .starts_with(&format!("{JAR_PATH}{DELETED_SEGMENT}"))
        );
        assert!(
            metadata
                .find_default_entry(seeded.upstream.id, JAR_PATH)
                .await
                .unwrap()
                .is_none()
        );

        // The same path can be cached again.
        let replacement = metadata
            .get_or_create(&key, &entry_updates(&seeded.upstream, JAR_PATH))
            .await
            .unwrap();
        assert_ne!(replacement.id, entry.id);
        assert_eq!(metadata.count_pending_destruction().await.unwrap(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_repeated_destruction_renames_are_distinct() {
    let test_metadata = TestMetadata::new().await.unwrap();
    let metadata = test_metadata.store();
    let seeded = seed_registry(metadata.as_ref(), 24).await;
    let key = entry_key(&seeded.upstream, JAR_PATH);

    let mut renamed = HashSet::new();
    for _ in 0..50 {
        let entry = metadata
            .get_or_create(&key, &entry_updates(&seeded.upstream, JAR_PATH))
            .await
            .unwrap();
        let marked = metadata.mark_pending_destruction(&entry).await.unwrap();
        assert!(renamed.insert(marked.relative_path));
    }
    assert_eq!(metadata.count_pending_destruction().await.unwrap(), 50);
}

#[tokio::test]
async fn test_list_default_entries_filters_and_orders() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let paths = [
            "com/example/lib/1.0/lib-1.0.pom",
            "com/example/lib/1.0/lib-1.0.jar",
            "org/other/util/2.0/util-2.0.jar",
        ];
        for path in paths {
            metadata
                .get_or_create(
                    &entry_key(&seeded.upstream, path),
                    &entry_updates(&seeded.upstream, path),
                )
                .await
                .unwrap();
        }

        let all = metadata
            .list_default_entries(seeded.upstream.id, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        // Newest first; rows created in one instant fall back to id.
        assert_eq!(all[0].relative_path, paths[2]);

        let filtered = metadata
            .list_default_entries(seeded.upstream.id, Some("com/example"))
            .await
            .unwrap();
        let found: HashSet<_> = filtered.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(found, HashSet::from([paths[0], paths[1]]));

        let destroyed = metadata.mark_pending_destruction(&all[0]).await.unwrap();
        let remaining = metadata
            .list_default_entries(seeded.upstream.id, None)
            .await
            .unwrap();
        assert!(remaining.iter().all(|e| e.id != destroyed.id));
    })
    .await;
}

#[tokio::test]
async fn test_bump_upstream_checked_at_keeps_content() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 1).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);
        let mut updates = entry_updates(&seeded.upstream, JAR_PATH);
        updates.upstream_checked_at = OffsetDateTime::now_utc() - Duration::hours(2);
        let entry = metadata.get_or_create(&key, &updates).await.unwrap();
        let now = OffsetDateTime::now_utc();
        assert!(entry.is_stale(seeded.upstream.cache_validity_hours, now));

        metadata.bump_upstream_checked_at(entry.id, now).await.unwrap();

        let fresh = metadata.get_cache_entry(entry.id).await.unwrap().unwrap();
        assert!(!fresh.is_stale(seeded.upstream.cache_validity_hours, now));
        assert_eq!(fresh.sha1, entry.sha1);
        assert_eq!(fresh.object_storage_key, entry.object_storage_key);
    })
    .await;
}

#[tokio::test]
async fn test_object_storage_key_for_reuses_live_key() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let upstream = seeded.upstream.to_upstream();

        let minted_a = metadata
            .object_storage_key_for(&upstream, JAR_PATH)
            .await
            .unwrap();
        let minted_b = metadata
            .object_storage_key_for(&upstream, JAR_PATH)
            .await
            .unwrap();
        assert_ne!(minted_a, minted_b, "keys are random until an entry exists");

        let entry = metadata
            .get_or_create(
                &entry_key(&seeded.upstream, JAR_PATH),
                &entry_updates(&seeded.upstream, JAR_PATH),
            )
            .await
            .unwrap();
        let reused = metadata
            .object_storage_key_for(&upstream, JAR_PATH)
            .await
            .unwrap();
        assert_eq!(reused, entry.object_storage_key);
    })
    .await;
}

#[tokio::test]
async fn test_upstreams_listed_by_position() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let second = metadata
            .create_upstream(&depot_metadata::models::NewUpstream {
                registry_id: seeded.registry.id,
                url: "https://mirror.example.org/maven".to_string(),
                username: Some("reader".to_string()),
                password: Some("secret".to_string()),
                cache_validity_hours: 0,
                position: 0,
            })
            .await
            .unwrap();

        assert_eq!(second.group_id, seeded.group.id);
        let upstreams = metadata.list_upstreams(seeded.registry.id).await.unwrap();
        let ids: Vec<i64> = upstreams.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![second.id, seeded.upstream.id]);
    })
    .await;
}

#[tokio::test]
async fn test_create_upstream_requires_registry() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let err = metadata
            .create_upstream(&depot_metadata::models::NewUpstream {
                registry_id: 999_999,
                url: "https://repo.example.com".to_string(),
                username: None,
                password: None,
                cache_validity_hours: 24,
                position: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)), "got {err:?}");
    })
    .await;
}

/// What another writer does right after the first live-entry lookup.
enum Interleave {
    /// Inserts its own live entry, after the lookup missed.
    InsertWinner(CacheEntryUpdates),
    /// Marks the entry found by the lookup for destruction.
    DestroyFound,
}

/// Delegating store that runs one interleaved write inside the first
/// `find_default_entry` of a `get_or_create`.
struct InterleavedStore {
    inner: Arc<dyn MetadataStore>,
    interleave: Mutex<Option<Interleave>>,
}

impl InterleavedStore {
    fn new(inner: Arc<dyn MetadataStore>, interleave: Interleave) -> Self {
        Self {
            inner,
            interleave: Mutex::new(Some(interleave)),
        }
    }
}

#[async_trait]
impl CacheEntryRepo for InterleavedStore {
    async fn find_default_entry(
        &self,
        upstream_id: i64,
        relative_path: &str,
    ) -> MetadataResult<Option<CacheEntryRow>> {
        let interleave = self.interleave.lock().unwrap().take();
        match interleave {
            Some(Interleave::InsertWinner(winner)) => {
                let key = CacheEntryKey {
                    upstream_id,
                    relative_path: relative_path.to_string(),
                };
                self.inner.insert_entry(&key, &winner).await?;
                Ok(None)
            }
            Some(Interleave::DestroyFound) => {
                let found = self
                    .inner
                    .find_default_entry(upstream_id, relative_path)
                    .await?;
                if let Some(entry) = &found {
                    self.inner.mark_pending_destruction(entry).await?;
                }
                Ok(found)
            }
            None => {
                self.inner
                    .find_default_entry(upstream_id, relative_path)
                    .await
            }
        }
    }

    async fn get_cache_entry(&self, id: i64) -> MetadataResult<Option<CacheEntryRow>> {
        self.inner.get_cache_entry(id).await
    }

    async fn insert_entry(
        &self,
        key: &CacheEntryKey,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<CacheEntryRow> {
        self.inner.insert_entry(key, updates).await
    }

    async fn update_entry(
        &self,
        id: i64,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<Option<CacheEntryRow>> {
        self.inner.update_entry(id, updates).await
    }

    async fn bump_upstream_checked_at(
        &self,
        id: i64,
        checked_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        self.inner.bump_upstream_checked_at(id, checked_at).await
    }

    async fn mark_pending_destruction(
        &self,
        entry: &CacheEntryRow,
    ) -> MetadataResult<CacheEntryRow> {
        self.inner.mark_pending_destruction(entry).await
    }

    async fn list_default_entries(
        &self,
        upstream_id: i64,
        search: Option<&str>,
    ) -> MetadataResult<Vec<CacheEntryRow>> {
        self.inner.list_default_entries(upstream_id, search).await
    }
}

#[tokio::test]
async fn test_lost_insert_race_returns_winner_untouched() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);
        let winner = entry_updates(&seeded.upstream, JAR_PATH);
        let store = InterleavedStore::new(
            metadata.clone(),
            Interleave::InsertWinner(winner.clone()),
        );

        let mut loser = entry_updates(&seeded.upstream, JAR_PATH);
        loser.size = 4;
        let row = store.get_or_create(&key, &loser).await.unwrap();

        assert_eq!(row.object_storage_key, winner.object_storage_key);
        assert_eq!(row.size, winner.size);
        let live = metadata
            .list_default_entries(seeded.upstream.id, None)
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, row.id);
    })
    .await;
}

#[tokio::test]
async fn test_lost_insert_race_updates_winner_with_same_object() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);
        let winner = entry_updates(&seeded.upstream, JAR_PATH);
        let store = InterleavedStore::new(
            metadata.clone(),
            Interleave::InsertWinner(winner.clone()),
        );

        let mut refetch = winner.clone();
        refetch.upstream_etag = Some("\"v2\"".to_string());
        let row = store.get_or_create(&key, &refetch).await.unwrap();

        assert_eq!(row.upstream_etag.as_deref(), Some("\"v2\""));
        let live = metadata
            .list_default_entries(seeded.upstream.id, None)
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, row.id);
    })
    .await;
}

#[tokio::test]
async fn test_entry_destroyed_during_get_or_create_is_replaced() {
    run_metadata_test_both(|metadata: Arc<dyn MetadataStore>| async move {
        let seeded = seed_registry(metadata.as_ref(), 24).await;
        let key = entry_key(&seeded.upstream, JAR_PATH);
        let updates = entry_updates(&seeded.upstream, JAR_PATH);
        let original = metadata.get_or_create(&key, &updates).await.unwrap();
        let store = InterleavedStore::new(metadata.clone(), Interleave::DestroyFound);

        let row = store.get_or_create(&key, &updates).await.unwrap();

        assert_ne!(row.id, original.id);
        assert_eq!(row.status().unwrap(), CacheEntryStatus::Default);
        assert_eq!(row.relative_path, JAR_PATH);
        let live = metadata
            .list_default_entries(seeded.upstream.id, None)
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(metadata.count_pending_destruction().await.unwrap(), 1);
    })
    .await;
}
