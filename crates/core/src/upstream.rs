//! Upstream registrations and the cache-key rules derived from them.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Prefix of every object storage key minted for a cached response.
pub const OBJECT_KEY_PREFIX: &str = "virtual_registries/packages/maven";

/// Path segment inserted before the random suffix when an entry is marked
/// for destruction.
pub const DELETED_SEGMENT: &str = "/deleted/";

const GLOBAL_ID_PREFIX: &str = "gid://depot/VirtualRegistries::Packages::Maven::Upstream/";

/// A remote registry a virtual registry pulls artifacts from.
#[derive(Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub id: i64,
    pub registry_id: i64,
    pub group_id: i64,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Hours a cached response stays fresh. `0` means never stale.
    pub cache_validity_hours: i64,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("id", &self.id)
            .field("registry_id", &self.registry_id)
            .field("group_id", &self.group_id)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("cache_validity_hours", &self.cache_validity_hours)
            .finish()
    }
}

impl Upstream {
    /// Global identifier used to correlate upload callbacks.
    pub fn global_id(&self) -> String {
        global_id(self.id)
    }

    /// Full upstream URL for a relative path.
    pub fn url_for(&self, relative_path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            relative_path.trim_start_matches('/')
        )
    }

    /// Headers sent to the upstream. Credentials become a Basic auth header.
    pub fn headers(&self) -> Vec<(String, String)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                vec![("Authorization".to_string(), format!("Basic {encoded}"))]
            }
            _ => Vec::new(),
        }
    }

    /// Check whether a response last checked at `checked_at` is stale.
    pub fn is_stale(&self, checked_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        is_stale(checked_at, self.cache_validity_hours, now)
    }

    /// Mint a fresh object storage key for a relative path.
    pub fn new_object_storage_key(&self, relative_path: &str) -> String {
        object_storage_key(self.registry_id, self.id, relative_path)
    }
}

/// Render the global id of an upstream.
pub fn global_id(upstream_id: i64) -> String {
    format!("{GLOBAL_ID_PREFIX}{upstream_id}")
}

/// Parse an upstream id out of a global id.
pub fn parse_global_id(gid: &str) -> crate::Result<i64> {
    gid.strip_prefix(GLOBAL_ID_PREFIX)
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| crate::Error::InvalidUpstream(format!("invalid global id: {gid}")))
}

/// `false` when `validity_hours` is 0, otherwise `now > checked_at + hours`.
pub fn is_stale(checked_at: OffsetDateTime, validity_hours: i64, now: OffsetDateTime) -> bool {
    if validity_hours <= 0 {
        return false;
    }
    now > checked_at + Duration::hours(validity_hours)
}

/// Mint an object storage key.
///
/// Layout: `<prefix>/<registry>/upstream/<upstream>/cache_entry/<sha256(path)>/<uuid>`.
pub fn object_storage_key(registry_id: i64, upstream_id: i64, relative_path: &str) -> String {
    let digest = Sha256::digest(relative_path.as_bytes());
    let path_hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}/cache_entry/{path_hash}/{}",
        upstream_key_prefix(registry_id, upstream_id),
        Uuid::new_v4()
    )
}

/// Key prefix shared by all objects cached for one upstream.
pub fn upstream_key_prefix(registry_id: i64, upstream_id: i64) -> String {
    format!("{OBJECT_KEY_PREFIX}/{registry_id}/upstream/{upstream_id}")
}

/// Rewrite a relative path so it no longer collides with the live entry.
pub fn pending_destruction_path(relative_path: &str) -> String {
    format!("{relative_path}{DELETED_SEGMENT}{}", Uuid::new_v4())
}
