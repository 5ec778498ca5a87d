//! Test fixtures for generating test data.

use depot_metadata::MetadataStore;
use depot_metadata::models::{
    CacheEntryKey, CacheEntryUpdates, NamespaceRow, NewRegistry, NewUpstream, RegistryRow,
    TokenRow, UpstreamRow,
};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// Artifact body used throughout the tests, with its checksums.
#[allow(dead_code)]
pub const ARTIFACT_BYTES: &[u8] = b"abc";
#[allow(dead_code)]
pub const ARTIFACT_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
#[allow(dead_code)]
pub const ARTIFACT_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

/// Upstream URL registered by [`seed_registry`].
#[allow(dead_code)]
pub const UPSTREAM_URL: &str = "https://repo.example.com/maven2";

/// Relative path of a typical artifact.
#[allow(dead_code)]
pub const JAR_PATH: &str = "com/example/lib/1.0/lib-1.0.jar";

/// Counter for generating unique names.
static NAME_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique name with a prefix.
#[allow(dead_code)]
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", NAME_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A group with one registry and one upstream.
#[allow(dead_code)]
pub struct SeededRegistry {
    pub group: NamespaceRow,
    pub registry: RegistryRow,
    pub upstream: UpstreamRow,
}

/// Create a top-level group, a registry in it and an upstream.
#[allow(dead_code)]
pub async fn seed_registry(metadata: &dyn MetadataStore, validity_hours: i64) -> SeededRegistry {
    let group = metadata
        .create_namespace(&unique_name("group"), None)
        .await
        .expect("Failed to create group");
    let registry = metadata
        .create_registry(&NewRegistry {
            group_id: group.id,
            name: unique_name("registry"),
        })
        .await
        .expect("Failed to create registry");
    let upstream = metadata
        .create_upstream(&NewUpstream {
            registry_id: registry.id,
            url: UPSTREAM_URL.to_string(),
            username: None,
            password: None,
            cache_validity_hours: validity_hours,
            position: 1,
        })
        .await
        .expect("Failed to create upstream");

    SeededRegistry {
        group,
        registry,
        upstream,
    }
}

/// Key for a path cached from an upstream.
#[allow(dead_code)]
pub fn entry_key(upstream: &UpstreamRow, relative_path: &str) -> CacheEntryKey {
    CacheEntryKey {
        upstream_id: upstream.id,
        relative_path: relative_path.to_string(),
    }
}

/// Attributes of a freshly fetched artifact.
#[allow(dead_code)]
pub fn entry_updates(upstream: &UpstreamRow, relative_path: &str) -> CacheEntryUpdates {
    CacheEntryUpdates {
        group_id: upstream.group_id,
        object_storage_key: upstream.to_upstream().new_object_storage_key(relative_path),
        size: ARTIFACT_BYTES.len() as i64,
        content_type: "application/java-archive".to_string(),
        sha1: ARTIFACT_SHA1.to_string(),
        md5: Some(ARTIFACT_MD5.to_string()),
        upstream_etag: Some("\"v1\"".to_string()),
        upstream_checked_at: OffsetDateTime::now_utc(),
    }
}

/// Create a token row and return the raw bearer value.
#[allow(dead_code)]
pub async fn create_token(
    metadata: &dyn MetadataStore,
    scopes: &[&str],
    group_id: Option<i64>,
) -> String {
    let raw_token = format!("test-token-{}", Uuid::new_v4());
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        group_id,
        token_hash: sha256_hash(raw_token.as_bytes()),
        scopes: serde_json::to_string(scopes).expect("scopes serialize"),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: Some("Test Token".to_string()),
    };
    metadata
        .create_token(&token)
        .await
        .expect("Failed to create token");
    raw_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_differ() {
        assert_ne!(unique_name("a"), unique_name("a"));
    }

    #[test]
    fn test_sha256_hash_known_value() {
        assert_eq!(
            sha256_hash(b"test-admin-token"),
            "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
        );
    }
}
