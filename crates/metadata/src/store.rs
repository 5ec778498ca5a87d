//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    BootstrapRepo, CacheEntryRepo, CatalogRepo, EvictionRepo, RegistryRepo, TokenRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    RegistryRepo
    + CacheEntryRepo
    + CatalogRepo
    + EvictionRepo
    + TokenRepo
    + BootstrapRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// Default claim lease for SQLite eviction.
const DEFAULT_EVICTION_LEASE: time::Duration = time::Duration::minutes(5);

/// SQLite-based metadata store.
///
/// SQLite has no row locks, so eviction claims are leases recorded on the
/// row (`lease_owner`, `lease_expires_at`).
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    eviction_lease: time::Duration,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite allows a single writer and the store relies
        // on statements being serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            eviction_lease: DEFAULT_EVICTION_LEASE,
        };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::debug!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only; use PostgreSQL for enforced timeouts"
            );
        }

        Ok(store)
    }

    /// Set the eviction claim lease.
    pub fn with_eviction_lease(mut self, lease: time::Duration) -> Self {
        self.eviction_lease = lease;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::EvictionClaim;
    use crate::repos::cache_entries::lost_transition;
    use depot_core::{CacheEntryStatus, RequestScope};
    use sqlx::QueryBuilder;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl RegistryRepo for SqliteStore {
        async fn create_registry(&self, registry: &NewRegistry) -> MetadataResult<RegistryRow> {
            let now = OffsetDateTime::now_utc();
            let row = sqlx::query_as::<_, RegistryRow>(
                r#"
                INSERT INTO registries (group_id, name, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(registry.group_id)
            .bind(&registry.name)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, "registry"))?;
            Ok(row)
        }

        async fn get_registry(&self, registry_id: i64) -> MetadataResult<Option<RegistryRow>> {
            let row = sqlx::query_as::<_, RegistryRow>("SELECT * FROM registries WHERE id = ?")
                .bind(registry_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn create_upstream(&self, upstream: &NewUpstream) -> MetadataResult<UpstreamRow> {
            let registry = self
                .get_registry(upstream.registry_id)
                .await?
                .ok_or_else(|| {
                    MetadataError::NotFound(format!("registry {}", upstream.registry_id))
                })?;

            let now = OffsetDateTime::now_utc();
            let row = sqlx::query_as::<_, UpstreamRow>(
                r#"
                INSERT INTO upstreams (
                    registry_id, group_id, url, username, password,
                    cache_validity_hours, position, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(registry.id)
            .bind(registry.group_id)
            .bind(&upstream.url)
            .bind(&upstream.username)
            .bind(&upstream.password)
            .bind(upstream.cache_validity_hours)
            .bind(upstream.position)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, "upstream position"))?;
            Ok(row)
        }

        async fn get_upstream(&self, upstream_id: i64) -> MetadataResult<Option<UpstreamRow>> {
            let row = sqlx::query_as::<_, UpstreamRow>("SELECT * FROM upstreams WHERE id = ?")
                .bind(upstream_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_upstreams(&self, registry_id: i64) -> MetadataResult<Vec<UpstreamRow>> {
            let rows = sqlx::query_as::<_, UpstreamRow>(
                "SELECT * FROM upstreams WHERE registry_id = ? ORDER BY position, id",
            )
            .bind(registry_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl CacheEntryRepo for SqliteStore {
        async fn find_default_entry(
            &self,
            upstream_id: i64,
            relative_path: &str,
        ) -> MetadataResult<Option<CacheEntryRow>> {
            let row = sqlx::query_as::<_, CacheEntryRow>(
                r#"
                SELECT * FROM cache_entries
                WHERE upstream_id = ? AND relative_path = ? AND status = 'default'
                "#,
            )
            .bind(upstream_id)
            .bind(relative_path)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_cache_entry(&self, id: i64) -> MetadataResult<Option<CacheEntryRow>> {
            let row = sqlx::query_as::<_, CacheEntryRow>("SELECT * FROM cache_entries WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn insert_entry(
            &self,
            key: &CacheEntryKey,
            updates: &CacheEntryUpdates,
        ) -> MetadataResult<CacheEntryRow> {
            let now = OffsetDateTime::now_utc();
            let row = sqlx::query_as::<_, CacheEntryRow>(
                r#"
                INSERT INTO cache_entries (
                    group_id, upstream_id, relative_path, object_storage_key, size,
                    content_type, sha1, md5, status, upstream_checked_at, upstream_etag,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(updates.group_id)
            .bind(key.upstream_id)
            .bind(&key.relative_path)
            .bind(&updates.object_storage_key)
            .bind(updates.size)
            .bind(&updates.content_type)
            .bind(&updates.sha1)
            .bind(&updates.md5)
            .bind(CacheEntryStatus::Default.as_str())
            .bind(updates.upstream_checked_at)
            .bind(&updates.upstream_etag)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, "cache entry"))?;
            Ok(row)
        }

        async fn update_entry(
            &self,
            id: i64,
            updates: &CacheEntryUpdates,
        ) -> MetadataResult<Option<CacheEntryRow>> {
            let row = sqlx::query_as::<_, CacheEntryRow>(
                r#"
                UPDATE cache_entries
                SET size = ?, content_type = ?, sha1 = ?, md5 = ?,
                    upstream_etag = ?, upstream_checked_at = ?, updated_at = ?
                WHERE id = ? AND status = 'default'
                RETURNING *
                "#,
            )
            .bind(updates.size)
            .bind(&updates.content_type)
            .bind(&updates.sha1)
            .bind(&updates.md5)
            .bind(&updates.upstream_etag)
            .bind(updates.upstream_checked_at)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn bump_upstream_checked_at(
            &self,
            id: i64,
            checked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE cache_entries SET upstream_checked_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(checked_at)
            .bind(checked_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn mark_pending_destruction(
            &self,
            entry: &CacheEntryRow,
        ) -> MetadataResult<CacheEntryRow> {
            let from = entry.status()?;
            let to = from.transition(CacheEntryStatus::PendingDestruction)?;
            let renamed = depot_core::upstream::pending_destruction_path(&entry.relative_path);
            let row = sqlx::query_as::<_, CacheEntryRow>(
                r#"
                UPDATE cache_entries
                SET status = ?, relative_path = ?, updated_at = ?
                WHERE id = ? AND status = ?
                RETURNING *
                "#,
            )
            .bind(to.as_str())
            .bind(&renamed)
            .bind(OffsetDateTime::now_utc())
            .bind(entry.id)
            .bind(from.as_str())
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => Ok(row),
                None => Err(lost_transition(self, entry.id, to).await),
            }
        }

        async fn list_default_entries(
            &self,
            upstream_id: i64,
            search: Option<&str>,
        ) -> MetadataResult<Vec<CacheEntryRow>> {
            let rows = match search.filter(|s| !s.is_empty()) {
                Some(term) => {
                    sqlx::query_as::<_, CacheEntryRow>(
                        r#"
                        SELECT * FROM cache_entries
                        WHERE upstream_id = ? AND status = 'default'
                          AND instr(relative_path, ?) > 0
                        ORDER BY created_at DESC, id DESC
                        "#,
                    )
                    .bind(upstream_id)
                    .bind(term)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, CacheEntryRow>(
                        r#"
                        SELECT * FROM cache_entries
                        WHERE upstream_id = ? AND status = 'default'
                        ORDER BY created_at DESC, id DESC
                        "#,
                    )
                    .bind(upstream_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }
    }

    #[async_trait]
    impl CatalogRepo for SqliteStore {
        async fn create_namespace(
            &self,
            name: &str,
            parent_id: Option<i64>,
        ) -> MetadataResult<NamespaceRow> {
            let mut tx = self.pool.begin().await?;

            let parent_chain = match parent_id {
                Some(pid) => Some(
                    sqlx::query_scalar::<_, String>(
                        "SELECT traversal_ids FROM namespaces WHERE id = ?",
                    )
                    .bind(pid)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(format!("namespace {pid}")))?,
                ),
                None => None,
            };

            let id: i64 = sqlx::query_scalar(
                "INSERT INTO namespaces (parent_id, name, traversal_ids) VALUES (?, ?, '') RETURNING id",
            )
            .bind(parent_id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

            let traversal_ids = match parent_chain {
                Some(chain) => format!("{chain}/{id}"),
                None => id.to_string(),
            };
            let row = sqlx::query_as::<_, NamespaceRow>(
                "UPDATE namespaces SET traversal_ids = ? WHERE id = ? RETURNING *",
            )
            .bind(&traversal_ids)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(row)
        }

        async fn create_project(
            &self,
            namespace_id: i64,
            name: &str,
        ) -> MetadataResult<ProjectRow> {
            let row = sqlx::query_as::<_, ProjectRow>(
                "INSERT INTO projects (namespace_id, name) VALUES (?, ?) RETURNING *",
            )
            .bind(namespace_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn create_package(&self, package: &NewPackage) -> MetadataResult<PackageRow> {
            let row = sqlx::query_as::<_, PackageRow>(
                r#"
                INSERT INTO packages (project_id, name, version, path, created_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(package.project_id)
            .bind(&package.name)
            .bind(&package.version)
            .bind(&package.path)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn create_package_file(
            &self,
            file: &NewPackageFile,
        ) -> MetadataResult<PackageFileRow> {
            let row = sqlx::query_as::<_, PackageFileRow>(
                r#"
                INSERT INTO package_files (
                    package_id, file_name, object_storage_key, size,
                    content_type, sha1, md5, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(file.package_id)
            .bind(&file.file_name)
            .bind(&file.object_storage_key)
            .bind(file.size)
            .bind(&file.content_type)
            .bind(&file.sha1)
            .bind(&file.md5)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn candidate_package_ids(
            &self,
            scope: &RequestScope,
            folder_path: &str,
        ) -> MetadataResult<Vec<i64>> {
            let mut qb = QueryBuilder::<Sqlite>::new(
                r#"
                SELECT p.id FROM packages p
                JOIN projects pr ON pr.id = p.project_id
                JOIN namespaces n ON n.id = pr.namespace_id
                WHERE p.path = "#,
            );
            qb.push_bind(folder_path);
            qb.push(" AND (0");
            if !scope.project_ids.is_empty() {
                qb.push(" OR p.project_id IN (");
                {
                    let mut ids = qb.separated(", ");
                    for id in &scope.project_ids {
                        ids.push_bind(*id);
                    }
                }
                qb.push(")");
            }
            for group_id in &scope.group_ids {
                qb.push(" OR ('/' || n.traversal_ids || '/') LIKE ");
                qb.push_bind(format!("%/{group_id}/%"));
            }
            qb.push(") ORDER BY p.id");

            let ids = qb
                .build_query_scalar::<i64>()
                .fetch_all(&self.pool)
                .await?;
            Ok(ids)
        }

        async fn package_files_named(
            &self,
            package_ids: &[i64],
            file_name: &str,
        ) -> MetadataResult<Vec<PackageFileRow>> {
            if package_ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut qb =
                QueryBuilder::<Sqlite>::new("SELECT * FROM package_files WHERE file_name = ");
            qb.push_bind(file_name);
            qb.push(" AND package_id IN (");
            {
                let mut ids = qb.separated(", ");
                for id in package_ids {
                    ids.push_bind(*id);
                }
            }
            qb.push(")");

            let rows = qb
                .build_query_as::<PackageFileRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    /// Lease-based claim on a SQLite row.
    struct SqliteEvictionClaim {
        pool: Pool<Sqlite>,
        entry: CacheEntryRow,
        owner: String,
    }

    #[async_trait]
    impl EvictionClaim for SqliteEvictionClaim {
        fn entry(&self) -> &CacheEntryRow {
            &self.entry
        }

        async fn complete(self: Box<Self>) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM cache_entries WHERE id = ? AND lease_owner = ?")
                .bind(self.entry.id)
                .bind(&self.owner)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "eviction lease on cache entry {} expired",
                    self.entry.id
                )));
            }
            Ok(())
        }

        async fn release(self: Box<Self>) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE cache_entries SET lease_owner = NULL, lease_expires_at = NULL
                WHERE id = ? AND lease_owner = ?
                "#,
            )
            .bind(self.entry.id)
            .bind(&self.owner)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl EvictionRepo for SqliteStore {
        async fn next_pending_destruction(
            &self,
        ) -> MetadataResult<Option<Box<dyn EvictionClaim>>> {
            let now = OffsetDateTime::now_utc();
            let owner = Uuid::new_v4().to_string();

            // Single UPDATE: the select and the lease write cannot interleave.
            let row = sqlx::query_as::<_, CacheEntryRow>(
                r#"
                UPDATE cache_entries
                SET lease_owner = ?, lease_expires_at = ?
                WHERE id = (
                    SELECT id FROM cache_entries
                    WHERE status = 'pending_destruction'
                      AND (lease_expires_at IS NULL OR lease_expires_at < ?)
                    ORDER BY id
                    LIMIT 1
                )
                RETURNING *
                "#,
            )
            .bind(&owner)
            .bind(now + self.eviction_lease)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|entry| {
                Box::new(SqliteEvictionClaim {
                    pool: self.pool.clone(),
                    entry,
                    owner,
                }) as Box<dyn EvictionClaim>
            }))
        }

        async fn count_pending_destruction(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM cache_entries WHERE status = 'pending_destruction'",
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, group_id, token_hash, scopes, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(token.group_id)
            .bind(&token.token_hash)
            .bind(&token.scopes)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, "token"))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<Uuid>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(value.flatten())
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id) VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Virtual registries, owned by a top-level group
CREATE TABLE IF NOT EXISTS registries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_registries_group_name ON registries(group_id, name);

CREATE TABLE IF NOT EXISTS upstreams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    registry_id INTEGER NOT NULL REFERENCES registries(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    username TEXT,
    password TEXT,
    cache_validity_hours INTEGER NOT NULL DEFAULT 24 CHECK (cache_validity_hours >= 0),
    position INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_upstreams_registry_position ON upstreams(registry_id, position);

-- Cached upstream responses
CREATE TABLE IF NOT EXISTS cache_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    upstream_id INTEGER NOT NULL REFERENCES upstreams(id) ON DELETE CASCADE,
    relative_path TEXT NOT NULL,
    object_storage_key TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
    sha1 TEXT NOT NULL,
    md5 TEXT,
    status TEXT NOT NULL DEFAULT 'default'
        CHECK (status IN ('default', 'processing', 'pending_destruction', 'error')),
    upstream_checked_at TEXT NOT NULL,
    upstream_etag TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    lease_owner TEXT,
    lease_expires_at TEXT
);
-- At most one live entry per (upstream, relative_path)
CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_entries_upstream_path_default
    ON cache_entries(upstream_id, relative_path) WHERE status = 'default';
CREATE INDEX IF NOT EXISTS idx_cache_entries_pending
    ON cache_entries(id) WHERE status = 'pending_destruction';
CREATE INDEX IF NOT EXISTS idx_cache_entries_group ON cache_entries(group_id);

-- Locally hosted packages
CREATE TABLE IF NOT EXISTS namespaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES namespaces(id),
    name TEXT NOT NULL,
    traversal_ids TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace_id INTEGER NOT NULL REFERENCES namespaces(id),
    name TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_namespace ON projects(namespace_id);

CREATE TABLE IF NOT EXISTS packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    version TEXT,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_packages_path ON packages(path);

CREATE TABLE IF NOT EXISTS package_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    package_id INTEGER NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
    file_name TEXT NOT NULL,
    object_storage_key TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
    sha1 TEXT NOT NULL,
    md5 TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_package_files_package_name ON package_files(package_id, file_name);

-- Tokens
CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    group_id INTEGER,
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);

CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id BLOB
);
"#;
