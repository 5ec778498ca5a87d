//! Cache entry administration.

use crate::auth::{Action, AuthenticatedUser, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use depot_metadata::MetadataError;
use depot_metadata::models::{CacheEntryRow, RegistryRow, UpstreamRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Cache entry as exposed by the admin API. The storage key is never shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryResponse {
    /// URL-safe base64 of the relative path.
    pub id: String,
    pub group_id: i64,
    pub upstream_id: i64,
    pub relative_path: String,
    pub size: i64,
    pub content_type: String,
    pub sha1: String,
    pub md5: Option<String>,
    pub status: String,
    pub upstream_etag: Option<String>,
    pub upstream_checked_at: String,
    pub created_at: String,
    pub updated_at: String,
}

fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

/// Identifier of an entry in admin URLs.
pub fn cache_entry_id(relative_path: &str) -> String {
    URL_SAFE.encode(relative_path.as_bytes())
}

/// Inverse of [`cache_entry_id`]; padding is optional.
pub fn decode_cache_entry_id(id: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(id)
        .or_else(|_| URL_SAFE_NO_PAD.decode(id))
        .ok()?;
    String::from_utf8(bytes).ok()
}

impl From<CacheEntryRow> for CacheEntryResponse {
    fn from(row: CacheEntryRow) -> Self {
        Self {
            id: cache_entry_id(&row.relative_path),
            group_id: row.group_id,
            upstream_id: row.upstream_id,
            relative_path: row.relative_path,
            size: row.size,
            content_type: row.content_type,
            sha1: row.sha1,
            md5: row.md5,
            status: row.status,
            upstream_etag: row.upstream_etag,
            upstream_checked_at: rfc3339(row.upstream_checked_at),
            created_at: rfc3339(row.created_at),
            updated_at: rfc3339(row.updated_at),
        }
    }
}

/// Query parameters for listing entries.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Substring of the relative path.
    pub search: Option<String>,
}

/// Path parameters shared by the admin routes.
#[derive(Debug, Deserialize)]
pub struct UpstreamPath {
    pub registry_id: i64,
    pub upstream_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CacheEntryPath {
    pub registry_id: i64,
    pub upstream_id: i64,
    pub cache_entry_id: String,
}

/// Load a registry and one of its upstreams after checking admin access.
async fn authorize_upstream(
    state: &AppState,
    user: Option<&AuthenticatedUser>,
    registry_id: i64,
    upstream_id: i64,
) -> ApiResult<(RegistryRow, UpstreamRow)> {
    let user = require_auth(user)?;

    let registry = state
        .metadata
        .get_registry(registry_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("registry {registry_id}")))?;

    if !state
        .authorizer
        .allowed(Some(user), registry.group_id, Action::Admin)
    {
        return Err(ApiError::Forbidden(
            "admin access to this registry required".to_string(),
        ));
    }

    let upstream = state
        .metadata
        .get_upstream(upstream_id)
        .await?
        .filter(|u| u.registry_id == registry.id)
        .ok_or_else(|| ApiError::NotFound(format!("upstream {upstream_id}")))?;

    Ok((registry, upstream))
}

/// GET /api/v1/virtual_registries/packages/maven/registries/{registry_id}/upstreams/{upstream_id}/cache_entries
pub async fn list_cache_entries(
    State(state): State<AppState>,
    Path(UpstreamPath {
        registry_id,
        upstream_id,
    }): Path<UpstreamPath>,
    Query(query): Query<ListQuery>,
    req: Request,
) -> ApiResult<Json<Vec<CacheEntryResponse>>> {
    let user = req.extensions().get::<AuthenticatedUser>().cloned();
    let (_, upstream) = authorize_upstream(&state, user.as_ref(), registry_id, upstream_id).await?;

    let search = query.search.as_deref().filter(|s| !s.is_empty());
    let entries = state
        .metadata
        .list_default_entries(upstream.id, search)
        .await?;

    Ok(Json(
        entries.into_iter().map(CacheEntryResponse::from).collect(),
    ))
}

/// DELETE /api/v1/virtual_registries/packages/maven/registries/{registry_id}/upstreams/{upstream_id}/cache_entries/{cache_entry_id}
///
/// Soft delete: the entry is handed to the reaper, which removes the bytes.
pub async fn delete_cache_entry(
    State(state): State<AppState>,
    Path(CacheEntryPath {
        registry_id,
        upstream_id,
        cache_entry_id,
    }): Path<CacheEntryPath>,
    req: Request,
) -> ApiResult<StatusCode> {
    let user = req.extensions().get::<AuthenticatedUser>().cloned();
    let (_, upstream) = authorize_upstream(&state, user.as_ref(), registry_id, upstream_id).await?;

    let relative_path = decode_cache_entry_id(&cache_entry_id)
        .ok_or_else(|| ApiError::BadRequest("invalid cache entry id".to_string()))?;

    let entry = state
        .metadata
        .find_default_entry(upstream.id, &relative_path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("cache entry {cache_entry_id}")))?;

    let marked = match state.metadata.mark_pending_destruction(&entry).await {
        Ok(marked) => marked,
        // Deleted concurrently.
        Err(MetadataError::InvalidStateTransition { .. }) => {
            return Err(ApiError::NotFound(format!("cache entry {cache_entry_id}")));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(
        cache_entry_id = marked.id,
        upstream_id = upstream.id,
        relative_path = %entry.relative_path,
        "Cache entry marked for destruction"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_entry_id_is_url_safe() {
        let id = cache_entry_id("com/example/lib/1.0/lib-1.0.jar?");
        assert!(!id.contains('/'));
        assert!(!id.contains('+'));
        assert_eq!(
            decode_cache_entry_id(&id).as_deref(),
            Some("com/example/lib/1.0/lib-1.0.jar?")
        );
    }

    #[test]
    fn test_decode_accepts_missing_padding() {
        let padded = cache_entry_id("a.pom");
        assert!(padded.ends_with('='));
        let unpadded = padded.trim_end_matches('=');
        assert_eq!(decode_cache_entry_id(unpadded).as_deref(), Some("a.pom"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_cache_entry_id("not base64!").is_none());
    }
}
