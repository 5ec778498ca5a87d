//! Resolution of a Maven `GET`/`HEAD` request into an outcome.
//!
//! Resolution order:
//! 1. empty path
//! 2. read authorization on the registry's group
//! 3. an upstream must be configured (lowest position wins)
//! 4. digest requests answer from the live cache entry
//! 5. locally hosted package files in the registry's group
//! 6. fresh cache entry
//! 7. stale cache entry, revalidated against the upstream
//! 8. cache miss, probed on the upstream

use crate::auth::{Action, AuthenticatedUser};
use crate::error::{ApiResult, ResolveFailure};
use crate::proxy::{BlockedUrl, validate_upstream_url};
use crate::state::AppState;
use crate::upstream::FetchError;
use depot_core::{DigestFormat, RequestScope, Upstream, digest_request};
use depot_metadata::models::{CacheEntryRow, PackageFileRow, RegistryRow};
use time::OffsetDateTime;

/// Where a served file comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A package file hosted in the registry's group.
    Package,
    /// A response cached from an upstream.
    CacheEntry,
}

/// A stored object to hand back to the client.
#[derive(Clone, Debug)]
pub struct DownloadFile {
    pub source: FileSource,
    pub object_storage_key: String,
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
    pub sha1: String,
    pub md5: Option<String>,
}

impl DownloadFile {
    fn from_cache_entry(entry: CacheEntryRow) -> Self {
        let file_name = file_name_of(&entry.relative_path);
        Self {
            source: FileSource::CacheEntry,
            object_storage_key: entry.object_storage_key,
            file_name,
            size: u64::try_from(entry.size).unwrap_or(0),
            content_type: entry.content_type,
            sha1: entry.sha1,
            md5: entry.md5,
        }
    }

    fn from_package_file(file: PackageFileRow) -> Self {
        Self {
            source: FileSource::Package,
            object_storage_key: file.object_storage_key,
            file_name: file.file_name,
            size: u64::try_from(file.size).unwrap_or(0),
            content_type: file.content_type,
            sha1: file.sha1,
            md5: file.md5,
        }
    }
}

/// Instruct the proxy to fetch from the upstream and call back.
#[derive(Clone, Debug)]
pub struct UploadRedirect {
    pub upstream: Upstream,
    pub upstream_url: String,
    pub object_storage_key: String,
}

/// A checksum served as the body of a digest request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadDigest {
    pub format: DigestFormat,
    pub digest: String,
}

/// Successful resolution.
#[derive(Clone, Debug)]
pub enum Outcome {
    UploadRedirect(UploadRedirect),
    DownloadFile(DownloadFile),
    DownloadDigest(DownloadDigest),
}

impl Outcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UploadRedirect(_) => "upload_redirect",
            Self::DownloadFile(file) => match file.source {
                FileSource::Package => "download_package_file",
                FileSource::CacheEntry => "download_cache_entry",
            },
            Self::DownloadDigest(_) => "download_digest",
        }
    }
}

/// Result of resolving a request. Infrastructure errors are the outer
/// `ApiResult`; expected failures are the inner `Err`.
pub type Resolution = Result<Outcome, ResolveFailure>;

fn file_name_of(path: &str) -> String {
    depot_core::split(path)
        .map(|(_, file)| file.to_string())
        .unwrap_or_default()
}

fn blocked(err: BlockedUrl) -> ResolveFailure {
    ResolveFailure::other("upstream_blocked", err.to_string())
}

/// Resolve a request for `path` in `registry`.
pub async fn resolve(
    state: &AppState,
    registry: &RegistryRow,
    path: &str,
    user: Option<&AuthenticatedUser>,
) -> ApiResult<Resolution> {
    if path.is_empty() {
        return Ok(Err(ResolveFailure::other(
            "path_not_present",
            "path not present",
        )));
    }

    if !state
        .authorizer
        .allowed(user, registry.group_id, Action::Read)
    {
        return Ok(Err(ResolveFailure::Unauthorized));
    }

    let upstreams = state.metadata.list_upstreams(registry.id).await?;
    let Some(upstream) = upstreams.first().map(|row| row.to_upstream()) else {
        return Ok(Err(ResolveFailure::other("no_upstreams", "no upstreams set")));
    };

    if let Some((artifact_path, format)) = digest_request(path) {
        return resolve_digest(state, &upstream, artifact_path, format).await;
    }

    let hosted = state
        .metadata
        .find_package_files(&RequestScope::group(registry.group_id), path)
        .await?;
    if let Some(file) = hosted.into_iter().next() {
        return Ok(Ok(Outcome::DownloadFile(DownloadFile::from_package_file(
            file,
        ))));
    }

    let now = OffsetDateTime::now_utc();
    let entry = state.metadata.find_default_entry(upstream.id, path).await?;

    match entry {
        Some(entry) if !upstream.is_stale(entry.upstream_checked_at, now) => Ok(Ok(
            Outcome::DownloadFile(DownloadFile::from_cache_entry(entry)),
        )),
        Some(entry) => revalidate(state, upstream, entry, path, now).await,
        None => fetch_missing(state, upstream, path).await,
    }
}

async fn resolve_digest(
    state: &AppState,
    upstream: &Upstream,
    artifact_path: &str,
    format: DigestFormat,
) -> ApiResult<Resolution> {
    let entry = state
        .metadata
        .find_default_entry(upstream.id, artifact_path)
        .await?;

    let digest = entry.and_then(|entry| match format {
        DigestFormat::Sha1 => Some(entry.sha1),
        DigestFormat::Md5 => entry.md5,
    });

    Ok(match digest {
        Some(digest) => Ok(Outcome::DownloadDigest(DownloadDigest { format, digest })),
        None => Err(ResolveFailure::DigestNotFoundInCacheEntries),
    })
}

/// Stale entry: keep serving it when the upstream is unchanged or cannot
/// answer, refetch when it changed.
async fn revalidate(
    state: &AppState,
    upstream: Upstream,
    entry: CacheEntryRow,
    path: &str,
    now: OffsetDateTime,
) -> ApiResult<Resolution> {
    let url = upstream.url_for(path);
    if let Err(err) = validate_upstream_url(&url, &state.config.proxy) {
        return Ok(Err(blocked(err)));
    }

    match state.fetcher.probe(&url, &upstream.headers()).await {
        Ok(probe) if probe.etag.is_some() && probe.etag == entry.upstream_etag => {
            state
                .metadata
                .bump_upstream_checked_at(entry.id, now)
                .await?;
            Ok(Ok(Outcome::DownloadFile(DownloadFile::from_cache_entry(
                entry,
            ))))
        }
        Ok(_) => Ok(Ok(Outcome::UploadRedirect(UploadRedirect {
            upstream_url: url,
            object_storage_key: entry.object_storage_key,
            upstream,
        }))),
        Err(err) => {
            tracing::info!(
                upstream_id = upstream.id,
                error = %err,
                "Upstream could not revalidate, serving stale entry"
            );
            Ok(Ok(Outcome::DownloadFile(DownloadFile::from_cache_entry(
                entry,
            ))))
        }
    }
}

async fn fetch_missing(
    state: &AppState,
    upstream: Upstream,
    path: &str,
) -> ApiResult<Resolution> {
    let url = upstream.url_for(path);
    if let Err(err) = validate_upstream_url(&url, &state.config.proxy) {
        return Ok(Err(blocked(err)));
    }

    match state.fetcher.probe(&url, &upstream.headers()).await {
        Ok(_) => {
            let object_storage_key = state
                .metadata
                .object_storage_key_for(&upstream, path)
                .await?;
            Ok(Ok(Outcome::UploadRedirect(UploadRedirect {
                upstream_url: url,
                object_storage_key,
                upstream,
            })))
        }
        Err(FetchError::Timeout) => Ok(Err(ResolveFailure::other(
            "timeout",
            FetchError::Timeout.to_string(),
        ))),
        Err(err) => {
            tracing::debug!(upstream_id = upstream.id, error = %err, "Upstream miss");
            Ok(Err(ResolveFailure::FileNotFoundOnUpstreams))
        }
    }
}
