//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{
    BootstrapRepo, CacheEntryRepo, CatalogRepo, EvictionClaim, EvictionRepo, RegistryRepo,
    TokenRepo,
};
use crate::repos::cache_entries::lost_transition;
use crate::store::MetadataStore;
use async_trait::async_trait;
use depot_core::config::PgSslMode;
use depot_core::{CacheEntryStatus, RequestScope};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema into executable statements, skipping comment-only chunks.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|statement| {
            statement.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            })
        })
        .collect()
}

/// PostgreSQL-based metadata store.
///
/// Eviction claims hold a `FOR UPDATE SKIP LOCKED` row lock inside a
/// transaction owned by the claim.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryRepo for PostgresStore {
    async fn create_registry(&self, registry: &NewRegistry) -> MetadataResult<RegistryRow> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, RegistryRow>(
            r#"
            INSERT INTO registries (group_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING *
            "#,
        )
        .bind(registry.group_id)
        .bind(&registry.name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MetadataError::from_insert(e, "registry"))
    }

    async fn get_registry(&self, registry_id: i64) -> MetadataResult<Option<RegistryRow>> {
        let row = sqlx::query_as::<_, RegistryRow>("SELECT * FROM registries WHERE id = $1")
            .bind(registry_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_upstream(&self, upstream: &NewUpstream) -> MetadataResult<UpstreamRow> {
        let now = OffsetDateTime::now_utc();
        // Group is copied from the registry in the same statement.
        sqlx::query_as::<_, UpstreamRow>(
            r#"
            INSERT INTO upstreams (
                registry_id, group_id, url, username, password,
                cache_validity_hours, position, created_at, updated_at
            )
            SELECT r.id, r.group_id, $2, $3, $4, $5, $6, $7, $7
            FROM registries r WHERE r.id = $1
            RETURNING *
            "#,
        )
        .bind(upstream.registry_id)
        .bind(&upstream.url)
        .bind(&upstream.username)
        .bind(&upstream.password)
        .bind(upstream.cache_validity_hours)
        .bind(upstream.position)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MetadataError::from_insert(e, "upstream position"))?
        .ok_or_else(|| MetadataError::NotFound(format!("registry {}", upstream.registry_id)))
    }

    async fn get_upstream(&self, upstream_id: i64) -> MetadataResult<Option<UpstreamRow>> {
        let row = sqlx::query_as::<_, UpstreamRow>("SELECT * FROM upstreams WHERE id = $1")
            .bind(upstream_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_upstreams(&self, registry_id: i64) -> MetadataResult<Vec<UpstreamRow>> {
        let rows = sqlx::query_as::<_, UpstreamRow>(
            "SELECT * FROM upstreams WHERE registry_id = $1 ORDER BY position, id",
        )
        .bind(registry_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl CacheEntryRepo for PostgresStore {
    async fn find_default_entry(
        &self,
        upstream_id: i64,
        relative_path: &str,
    ) -> MetadataResult<Option<CacheEntryRow>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT * FROM cache_entries
            WHERE upstream_id = $1 AND relative_path = $2 AND status = 'default'
            "#,
        )
        .bind(upstream_id)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_cache_entry(&self, id: i64) -> MetadataResult<Option<CacheEntryRow>> {
        let row = sqlx::query_as::<_, CacheEntryRow>("SELECT * FROM cache_entries WHERE id = $1")
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
        sqlx::query_as::<_, CacheEntryRow>(
            r#"
            INSERT INTO cache_entries (
                group_id, upstream_id, relative_path, object_storage_key, size,
                content_type, sha1, md5, status, upstream_checked_at, upstream_etag,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
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
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MetadataError::from_insert(e, "cache entry"))
    }

    async fn update_entry(
        &self,
        id: i64,
        updates: &CacheEntryUpdates,
    ) -> MetadataResult<Option<CacheEntryRow>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            UPDATE cache_entries
            SET size = $1, content_type = $2, sha1 = $3, md5 = $4,
                upstream_etag = $5, upstream_checked_at = $6, updated_at = $7
            WHERE id = $8 AND status = 'default'
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
            "UPDATE cache_entries SET upstream_checked_at = $1, updated_at = $1 WHERE id = $2",
        )
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
            SET status = $1, relative_path = $2, updated_at = $3
            WHERE id = $4 AND status = $5
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
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT * FROM cache_entries
            WHERE upstream_id = $1 AND status = 'default'
              AND ($2::TEXT IS NULL OR strpos(relative_path, $2) > 0)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(upstream_id)
        .bind(search.filter(|s| !s.is_empty()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl CatalogRepo for PostgresStore {
    async fn create_namespace(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> MetadataResult<NamespaceRow> {
        let mut tx = self.pool.begin().await?;

        let parent_chain = match parent_id {
            Some(pid) => Some(
                sqlx::query_scalar::<_, String>(
                    "SELECT traversal_ids FROM namespaces WHERE id = $1",
                )
                .bind(pid)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("namespace {pid}")))?,
            ),
            None => None,
        };

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO namespaces (parent_id, name, traversal_ids) VALUES ($1, $2, '') RETURNING id",
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
            "UPDATE namespaces SET traversal_ids = $1 WHERE id = $2 RETURNING *",
        )
        .bind(&traversal_ids)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn create_project(&self, namespace_id: i64, name: &str) -> MetadataResult<ProjectRow> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "INSERT INTO projects (namespace_id, name) VALUES ($1, $2) RETURNING *",
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
            VALUES ($1, $2, $3, $4, $5)
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

    async fn create_package_file(&self, file: &NewPackageFile) -> MetadataResult<PackageFileRow> {
        let row = sqlx::query_as::<_, PackageFileRow>(
            r#"
            INSERT INTO package_files (
                package_id, file_name, object_storage_key, size,
                content_type, sha1, md5, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT p.id FROM packages p
            JOIN projects pr ON pr.id = p.project_id
            JOIN namespaces n ON n.id = pr.namespace_id
            WHERE p.path = "#,
        );
        qb.push_bind(folder_path);
        qb.push(" AND (FALSE");
        if !scope.project_ids.is_empty() {
            let project_ids: Vec<i64> = scope.project_ids.iter().copied().collect();
            qb.push(" OR p.project_id = ANY(");
            qb.push_bind(project_ids);
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
        let rows = sqlx::query_as::<_, PackageFileRow>(
            "SELECT * FROM package_files WHERE file_name = $1 AND package_id = ANY($2)",
        )
        .bind(file_name)
        .bind(package_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Row-lock claim: the transaction holds `FOR UPDATE` on the entry until it
/// is committed or rolled back (dropping it rolls back).
struct PgEvictionClaim {
    tx: Transaction<'static, Postgres>,
    entry: CacheEntryRow,
}

#[async_trait]
impl EvictionClaim for PgEvictionClaim {
    fn entry(&self) -> &CacheEntryRow {
        &self.entry
    }

    async fn complete(self: Box<Self>) -> MetadataResult<()> {
        let PgEvictionClaim { mut tx, entry } = *self;
        sqlx::query("DELETE FROM cache_entries WHERE id = $1")
            .bind(entry.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn release(self: Box<Self>) -> MetadataResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl EvictionRepo for PostgresStore {
    async fn next_pending_destruction(&self) -> MetadataResult<Option<Box<dyn EvictionClaim>>> {
        let mut tx = self.pool.begin().await?;

        let entry = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT * FROM cache_entries
            WHERE status = 'pending_destruction'
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        match entry {
            Some(entry) => Ok(Some(Box::new(PgEvictionClaim { tx, entry }))),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
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
impl TokenRepo for PostgresStore {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, group_id, token_hash, scopes, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $1 WHERE token_id = $2")
            .bind(used_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET revoked_at = $1 WHERE token_id = $2")
            .bind(revoked_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BootstrapRepo for PostgresStore {
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
            INSERT INTO bootstrap_state (id, bootstrap_token_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_token_id = EXCLUDED.bootstrap_token_id
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
