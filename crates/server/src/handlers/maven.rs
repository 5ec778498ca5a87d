//! Maven virtual registry endpoints.

use crate::auth::{Action, AuthenticatedUser};
use crate::browser::{BROWSER_REJECTION_MESSAGE, is_browser};
use crate::dispatch::{DispatchContext, dispatch};
use crate::error::{ApiError, ApiResult, ErrorResponse, ResolveFailure};
use crate::handlers::cache_entries::CacheEntryResponse;
use crate::metrics::{BROWSER_REJECTIONS, POPULATE_RACE_LOSSES, record_upload_callback};
use crate::proxy::UPSTREAM_GLOBAL_ID_HEADER;
use crate::resolve::resolve;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use depot_core::upstream::{parse_global_id, upstream_key_prefix};
use depot_core::{Md5Hex, Sha1Hex};
use depot_metadata::models::{CacheEntryKey, CacheEntryUpdates, RegistryRow};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Deserialize;
use time::OffsetDateTime;

/// Route prefix of the Maven endpoints.
pub const MAVEN_PREFIX: &str = "/api/v1/virtual_registries/packages/maven";

/// Largest upload callback body accepted.
const MAX_CALLBACK_BODY: usize = 64 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// Characters escaped when a request path is echoed back as the callback URL.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Path parameters of a Maven request.
#[derive(Debug, Deserialize)]
pub struct MavenPath {
    pub registry_id: i64,
    pub path: String,
}

/// Object written by the proxy, reported on callback.
#[derive(Debug, Deserialize)]
pub struct UploadCallback {
    pub object_storage_key: String,
    pub size: u64,
    pub sha1: String,
    pub md5: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

fn reject_browser(req: &Request) -> Option<Response> {
    let user_agent = req.headers().get(USER_AGENT).and_then(|v| v.to_str().ok());
    if !is_browser(user_agent) {
        return None;
    }
    BROWSER_REJECTIONS.inc();
    let body = ErrorResponse {
        code: "browser_not_supported".to_string(),
        message: BROWSER_REJECTION_MESSAGE.to_string(),
    };
    Some((StatusCode::BAD_REQUEST, Json(body)).into_response())
}

async fn load_registry(state: &AppState, registry_id: i64) -> ApiResult<RegistryRow> {
    state
        .metadata
        .get_registry(registry_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("registry {registry_id}")))
}

/// Absolute URL of a Maven request, handed to the proxy as the callback.
pub fn callback_url(base_url: &str, registry_id: i64, path: &str) -> String {
    format!(
        "{base_url}{MAVEN_PREFIX}/{registry_id}/{}",
        utf8_percent_encode(path, PATH_ENCODE_SET)
    )
}

/// GET/HEAD /api/v1/virtual_registries/packages/maven/{registry_id}/{*path}
pub async fn get_file(
    State(state): State<AppState>,
    Path(MavenPath { registry_id, path }): Path<MavenPath>,
    req: Request,
) -> ApiResult<Response> {
    if let Some(rejection) = reject_browser(&req) {
        return Ok(rejection);
    }

    let registry = load_registry(&state, registry_id).await?;
    let user = req.extensions().get::<AuthenticatedUser>().cloned();

    let outcome = match resolve(&state, &registry, &path, user.as_ref()).await? {
        Ok(outcome) => outcome,
        Err(failure) => {
            crate::metrics::record_request(failure.code());
            tracing::debug!(
                registry_id,
                reason = failure.code(),
                "Maven request not resolved"
            );
            return Ok(failure.into_response());
        }
    };

    let ctx = DispatchContext {
        callback_url: callback_url(&state.config.server.base_url(), registry_id, &path),
        authorization: req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
        head: req.method() == Method::HEAD,
    };
    dispatch(&state, outcome, &ctx).await
}

/// PUT/POST /api/v1/virtual_registries/packages/maven/{registry_id}/{*path}
///
/// Called by the proxy after it wrote an upstream response to object storage.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(MavenPath { registry_id, path }): Path<MavenPath>,
    req: Request,
) -> ApiResult<Response> {
    let registry = load_registry(&state, registry_id).await?;

    let user = req.extensions().get::<AuthenticatedUser>().cloned();
    if !state
        .authorizer
        .allowed(user.as_ref(), registry.group_id, Action::Read)
    {
        record_upload_callback("unauthorized");
        return Ok(ResolveFailure::Unauthorized.into_response());
    }

    let global_id = req
        .headers()
        .get(UPSTREAM_GLOBAL_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("missing {UPSTREAM_GLOBAL_ID_HEADER} header"))
        })?;
    let upstream_id = parse_global_id(global_id)?;

    let upstream = state
        .metadata
        .get_upstream(upstream_id)
        .await?
        .filter(|u| u.registry_id == registry.id)
        .ok_or_else(|| ApiError::NotFound(format!("upstream {upstream_id}")))?;

    let body = axum::body::to_bytes(req.into_body(), MAX_CALLBACK_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let callback: UploadCallback = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid upload callback: {e}")))?;

    if let Err(e) = validate_callback(&state, &callback, registry.id, upstream.id).await {
        record_upload_callback("rejected");
        return Err(e);
    }

    let sha1 = Sha1Hex::parse(&callback.sha1)?;
    let md5 = callback.md5.as_deref().map(Md5Hex::parse).transpose()?;

    let key = CacheEntryKey {
        upstream_id: upstream.id,
        relative_path: path.clone(),
    };
    let updates = CacheEntryUpdates {
        group_id: upstream.group_id,
        object_storage_key: callback.object_storage_key.clone(),
        size: i64::try_from(callback.size)
            .map_err(|_| ApiError::BadRequest("size out of range".to_string()))?,
        content_type: callback
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        sha1: sha1.into(),
        md5: md5.map(Into::into),
        upstream_etag: callback.etag,
        upstream_checked_at: OffsetDateTime::now_utc(),
    };

    let entry = state.metadata.get_or_create(&key, &updates).await?;

    if entry.object_storage_key != callback.object_storage_key {
        // Another writer cached this path first; our object is orphaned.
        POPULATE_RACE_LOSSES.inc();
        tracing::info!(
            upstream_id = upstream.id,
            relative_path = %path,
            "Cache entry already existed with another object, deleting ours"
        );
        if let Err(e) = state.storage.delete(&callback.object_storage_key).await
            && !e.is_not_found()
        {
            tracing::warn!(error = %e, "Failed to delete orphaned object");
        }
    }

    record_upload_callback("stored");
    Ok((StatusCode::OK, Json(CacheEntryResponse::from(entry))).into_response())
}

async fn validate_callback(
    state: &AppState,
    callback: &UploadCallback,
    registry_id: i64,
    upstream_id: i64,
) -> ApiResult<()> {
    let prefix = format!("{}/", upstream_key_prefix(registry_id, upstream_id));
    if !callback.object_storage_key.starts_with(&prefix) {
        return Err(ApiError::BadRequest(
            "object storage key does not belong to this upstream".to_string(),
        ));
    }

    let max_size = state.config.proxy.max_upload_size;
    if callback.size > max_size {
        return Err(ApiError::PayloadTooLarge(format!(
            "object is {} bytes, maximum is {max_size}",
            callback.size
        )));
    }

    Sha1Hex::parse(&callback.sha1)?;
    if let Some(md5) = &callback.md5 {
        Md5Hex::parse(md5)?;
    }

    let meta = state
        .storage
        .head(&callback.object_storage_key)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ApiError::BadRequest("reported object does not exist".to_string())
            } else {
                ApiError::Storage(e)
            }
        })?;
    if meta.size != callback.size {
        return Err(ApiError::BadRequest(format!(
            "reported size {} does not match stored size {}",
            callback.size, meta.size
        )));
    }

    Ok(())
}
