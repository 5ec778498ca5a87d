//! Translation of resolved outcomes into HTTP responses.

use crate::error::{ApiError, ApiResult};
use crate::proxy::{
    self, Command, DependencyRequest, NO_BROWSER_EXECUTION_HEADERS, SEND_DATA_HEADER,
    SendDependency, SendObject, UPSTREAM_GLOBAL_ID_HEADER,
};
use crate::resolve::{DownloadDigest, DownloadFile, Outcome, UploadRedirect};
use crate::state::AppState;
use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{StatusCode, response::Builder};
use axum::response::Response;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Checksum headers Maven clients read alongside the artifact.
pub const CHECKSUM_SHA1_HEADER: &str = "X-Checksum-Sha1";
pub const CHECKSUM_MD5_HEADER: &str = "X-Checksum-Md5";

const OCTET_STREAM: &str = "application/octet-stream";

// Bytes left unescaped in an RFC 5987 `filename*` value.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Request details needed to build a response.
#[derive(Clone, Debug)]
pub struct DispatchContext<'a> {
    /// Absolute URL of this request, used as the upload callback.
    pub callback_url: String,
    /// Authorization header of the request, forwarded on callback.
    pub authorization: Option<&'a str>,
    /// Whether the request was `HEAD`.
    pub head: bool,
}

/// Build the response for a resolved outcome.
pub async fn dispatch(
    state: &AppState,
    outcome: Outcome,
    ctx: &DispatchContext<'_>,
) -> ApiResult<Response> {
    crate::metrics::record_request(outcome.label());
    match outcome {
        Outcome::DownloadFile(file) => download_file(state, file, ctx).await,
        Outcome::UploadRedirect(redirect) => upload_redirect(state, &redirect, ctx),
        Outcome::DownloadDigest(digest) => download_digest(digest, ctx),
    }
}

fn finish(builder: Builder, body: Body) -> ApiResult<Response> {
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

fn send_data<T: serde::Serialize>(command: Command, params: &T) -> ApiResult<String> {
    proxy::encode(command, params)
        .map_err(|e| ApiError::Internal(format!("failed to encode proxy instruction: {e}")))
}

fn with_checksums(mut builder: Builder, file: &DownloadFile) -> Builder {
    builder = builder.header(CHECKSUM_SHA1_HEADER, &file.sha1);
    if let Some(md5) = &file.md5 {
        builder = builder.header(CHECKSUM_MD5_HEADER, md5);
    }
    builder
}

async fn download_file(
    state: &AppState,
    file: DownloadFile,
    ctx: &DispatchContext<'_>,
) -> ApiResult<Response> {
    let builder = with_checksums(Response::builder().status(StatusCode::OK), &file);

    if state.config.proxy.direct_download {
        let params = SendObject::new(&file.object_storage_key, file.size, &file.content_type);
        let builder = builder
            .header(CONTENT_TYPE, &file.content_type)
            .header(SEND_DATA_HEADER, send_data(Command::SendObject, &params)?);
        return finish(builder, Body::empty());
    }

    let mut builder = builder
        .header(CONTENT_TYPE, &file.content_type)
        .header(CONTENT_LENGTH, file.size)
        .header(
            CONTENT_DISPOSITION,
            format!(
                "inline; filename*=UTF-8''{}",
                utf8_percent_encode(&file.file_name, FILENAME_ENCODE_SET)
            ),
        );
    for (name, value) in NO_BROWSER_EXECUTION_HEADERS {
        builder = builder.header(name, value);
    }

    if ctx.head {
        return finish(builder, Body::empty());
    }

    let stream = state.storage.get_stream(&file.object_storage_key).await?;
    finish(builder, Body::from_stream(stream))
}

fn upload_redirect(
    state: &AppState,
    redirect: &UploadRedirect,
    ctx: &DispatchContext<'_>,
) -> ApiResult<Response> {
    let upstream_headers = redirect.upstream.headers();
    let global_id = redirect.upstream.global_id();
    let params = SendDependency::new(
        &DependencyRequest {
            upstream_url: &redirect.upstream_url,
            upstream_headers: &upstream_headers,
            callback_url: &ctx.callback_url,
            authorization: ctx.authorization,
            upstream_global_id: &global_id,
            object_storage_key: &redirect.object_storage_key,
        },
        &state.config.proxy,
    );

    tracing::debug!(
        upstream_id = redirect.upstream.id,
        header = UPSTREAM_GLOBAL_ID_HEADER,
        "Handing artifact fetch to the proxy"
    );

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, OCTET_STREAM)
        .header(SEND_DATA_HEADER, send_data(Command::SendDependency, &params)?);
    finish(builder, Body::empty())
}

fn download_digest(digest: DownloadDigest, ctx: &DispatchContext<'_>) -> ApiResult<Response> {
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain")
        .header(CONTENT_LENGTH, digest.digest.len());
    if ctx.head {
        return finish(builder, Body::empty());
    }
    finish(builder, Body::from(digest.digest))
}
