//! Authentication middleware and the authorization policy seam.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use depot_core::token::{Token, TokenId};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, truncated and limited
    /// to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The validated token.
    pub token: Token,
}

/// What a caller wants to do with a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Pull artifacts and report objects the proxy cached for them.
    Read,
    /// Inspect or destroy cache entries.
    Admin,
}

/// Authorization policy consulted by the resolver and handlers.
pub trait Authorizer: Send + Sync {
    /// Whether `user` may perform `action` on registries owned by `group_id`.
    fn allowed(&self, user: Option<&AuthenticatedUser>, group_id: i64, action: Action) -> bool;
}

/// Policy backed by token scopes and the token's group restriction.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenAuthorizer;

impl Authorizer for TokenAuthorizer {
    fn allowed(&self, user: Option<&AuthenticatedUser>, group_id: i64, action: Action) -> bool {
        let Some(user) = user else {
            return false;
        };
        let token = &user.token;
        if !token.covers_group(group_id) {
            return false;
        }
        match action {
            Action::Read => token.can_read(),
            Action::Admin => token.is_admin(),
        }
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(headers: &HeaderMap) -> TraceId {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Hash a token for storage lookup.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Authentication middleware that validates tokens and sets up trace context.
///
/// Requests without a token pass through unauthenticated; handlers decide
/// whether that is acceptable.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    if let Some(token_str) = extract_bearer_token(req.headers()) {
        let token_hash = hash_token(token_str);

        if let Some(token_row) = state.metadata.get_token_by_hash(&token_hash).await? {
            // Unknown scopes are dropped rather than rejected.
            let scopes = token_row.parsed_scopes().into_iter().collect();

            let token = Token {
                id: TokenId::from_uuid(token_row.token_id),
                group_id: token_row.group_id,
                scopes,
                expires_at: token_row.expires_at,
                revoked_at: token_row.revoked_at,
                created_at: token_row.created_at,
                description: token_row.description,
            };

            // Expired or revoked tokens continue as anonymous; each route
            // decides how a missing user is denied.
            if token.is_valid() {
                // Fire and forget
                let metadata = state.metadata.clone();
                let token_id = token_row.token_id;
                tokio::spawn(async move {
                    let _ = metadata
                        .touch_token(token_id, OffsetDateTime::now_utc())
                        .await;
                });

                req.extensions_mut().insert(AuthenticatedUser { token });
            } else {
                tracing::debug!(
                    token_id = %token_row.token_id,
                    "Ignoring expired or revoked token"
                );
            }
        }
    }

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await;

    Ok(response)
}

/// Require authentication (token must be present).
pub fn require_auth(user: Option<&AuthenticatedUser>) -> ApiResult<&AuthenticatedUser> {
    user.ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}
