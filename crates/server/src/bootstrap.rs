//! Admin token initialization.

use anyhow::{Result, bail};
use depot_core::config::AdminConfig;
use depot_core::token::TokenScope;
use depot_metadata::MetadataStore;
use depot_metadata::models::TokenRow;
use time::OffsetDateTime;
use uuid::Uuid;

const DEFAULT_ADMIN_SCOPE: TokenScope = TokenScope::RegistryAdmin;

/// Normalize a configured hash to the lowercase hex form produced by
/// [`crate::auth::hash_token`].
fn normalize_hash(raw: &str) -> Result<String> {
    let hash = raw.strip_prefix("sha256:").unwrap_or(raw).to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    Ok(hash)
}

/// Ensure the configured admin token exists, rotating the previous one if needed.
///
/// The bootstrapped token is global (no group restriction). When the hash
/// changes between restarts, the token created by the previous run is revoked.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let hash = normalize_hash(&config.token_hash)?;

    let scopes = config
        .token_scopes
        .clone()
        .unwrap_or_else(|| vec![DEFAULT_ADMIN_SCOPE.as_str().to_string()]);
    for scope in &scopes {
        TokenScope::parse(scope).map_err(|_| anyhow::anyhow!("invalid admin scope: {scope}"))?;
    }

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); \
                 use a new token hash",
                existing.token_id
            );
        }
        let now = OffsetDateTime::now_utc();
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={})",
                existing.token_id,
                expires_at
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!("Admin token already exists");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    if let Some(prev_id) = metadata.get_bootstrap_token_id().await? {
        metadata.revoke_token(prev_id, now).await?;
        tracing::info!(token_id = %prev_id, "Previous admin token revoked");
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        group_id: None,
        token_hash: hash,
        scopes: serde_json::to_string(&scopes)?,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, "Admin token created");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hash_accepts_prefix_and_uppercase() {
        let hash = "17D6BFE05D1B1FB7BC499F8E3F639C7B3EDA4C40F321EEF8887A0C04C89A99C5";
        assert_eq!(
            normalize_hash(&format!("sha256:{hash}")).unwrap(),
            hash.to_lowercase()
        );
    }

    #[test]
    fn test_normalize_hash_rejects_short_values() {
        assert!(normalize_hash("abc").is_err());
        assert!(normalize_hash(&"z".repeat(64)).is_err());
    }
}
