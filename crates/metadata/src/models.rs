//! Database models mapping to the metadata schema.

use depot_core::{CacheEntryStatus, Upstream};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Virtual registries
// =============================================================================

/// Maven virtual registry owned by a top-level group.
#[derive(Debug, Clone, FromRow)]
pub struct RegistryRow {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Upstream registration for a registry.
#[derive(Clone, FromRow)]
pub struct UpstreamRow {
    pub id: i64,
    pub registry_id: i64,
    pub group_id: i64,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cache_validity_hours: i64,
    /// Lowest position wins when a registry has several upstreams.
    pub position: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl std::fmt::Debug for UpstreamRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamRow")
            .field("id", &self.id)
            .field("registry_id", &self.registry_id)
            .field("url", &self.url)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl UpstreamRow {
    /// Convert into the domain type.
    pub fn to_upstream(&self) -> Upstream {
        Upstream {
            id: self.id,
            registry_id: self.registry_id,
            group_id: self.group_id,
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            cache_validity_hours: self.cache_validity_hours,
        }
    }
}

/// Input for registering a registry.
#[derive(Debug, Clone)]
pub struct NewRegistry {
    pub group_id: i64,
    pub name: String,
}

/// Input for registering an upstream.
#[derive(Debug, Clone)]
pub struct NewUpstream {
    pub registry_id: i64,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cache_validity_hours: i64,
    pub position: i64,
}

// =============================================================================
// Cache entries
// =============================================================================

/// Cached upstream response.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRow {
    pub id: i64,
    pub group_id: i64,
    pub upstream_id: i64,
    pub relative_path: String,
    pub object_storage_key: String,
    pub size: i64,
    pub content_type: String,
    pub sha1: String,
    pub md5: Option<String>,
    pub status: String,
    pub upstream_checked_at: OffsetDateTime,
    pub upstream_etag: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<OffsetDateTime>,
}

impl CacheEntryRow {
    /// Parse the stored status.
    pub fn status(&self) -> depot_core::Result<CacheEntryStatus> {
        self.status.parse()
    }

    /// Check whether the cached response needs revalidation.
    pub fn is_stale(&self, validity_hours: i64, now: OffsetDateTime) -> bool {
        depot_core::upstream::is_stale(self.upstream_checked_at, validity_hours, now)
    }
}

/// Natural key of a live cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryKey {
    pub upstream_id: i64,
    pub relative_path: String,
}

/// Attributes written by `get_or_create`.
///
/// `object_storage_key` is only used on insert; existing entries keep their key.
#[derive(Debug, Clone)]
pub struct CacheEntryUpdates {
    pub group_id: i64,
    pub object_storage_key: String,
    pub size: i64,
    pub content_type: String,
    pub sha1: String,
    pub md5: Option<String>,
    pub upstream_etag: Option<String>,
    pub upstream_checked_at: OffsetDateTime,
}

// =============================================================================
// Locally hosted packages (catalog)
// =============================================================================

/// Group or user namespace.
#[derive(Debug, Clone, FromRow)]
pub struct NamespaceRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    /// `/`-joined ancestor ids, ending with this namespace's own id.
    pub traversal_ids: String,
}

impl NamespaceRow {
    /// Parsed ancestor chain, root first.
    pub fn ancestor_ids(&self) -> Vec<i64> {
        self.traversal_ids
            .split('/')
            .filter_map(|id| id.parse().ok())
            .collect()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub namespace_id: i64,
    pub name: String,
}

/// Maven package hosted in a project.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub version: Option<String>,
    /// Maven folder path, e.g. `com/example/lib/1.0`.
    pub path: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPackage {
    pub project_id: i64,
    pub name: String,
    pub version: Option<String>,
    pub path: String,
}

/// File belonging to a hosted package.
#[derive(Debug, Clone, FromRow)]
pub struct PackageFileRow {
    pub id: i64,
    pub package_id: i64,
    pub file_name: String,
    pub object_storage_key: String,
    pub size: i64,
    pub content_type: String,
    pub sha1: String,
    pub md5: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPackageFile {
    pub package_id: i64,
    pub file_name: String,
    pub object_storage_key: String,
    pub size: i64,
    pub content_type: String,
    pub sha1: String,
    pub md5: Option<String>,
}

// =============================================================================
// Tokens
// =============================================================================

/// Token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    /// Top-level group restriction; `None` for global tokens.
    pub group_id: Option<i64>,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

impl TokenRow {
    /// Parse the JSON scope list, skipping unknown scopes.
    pub fn parsed_scopes(&self) -> Vec<depot_core::TokenScope> {
        serde_json::from_str::<Vec<String>>(&self.scopes)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| depot_core::TokenScope::parse(s).ok())
            .collect()
    }
}
