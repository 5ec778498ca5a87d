//! Application state shared across handlers.

use crate::auth::{Authorizer, TokenAuthorizer};
use crate::upstream::UpstreamFetcher;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upstream prober.
    pub fetcher: Arc<dyn UpstreamFetcher>,
    /// Authorization policy.
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    /// Create a new application state with the token-scope policy.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
    ) -> Self {
        if config.proxy.allow_local_requests {
            tracing::warn!(
                "proxy.allow_local_requests is enabled; upstreams on local networks are reachable"
            );
        }

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            fetcher,
            authorizer: Arc::new(TokenAuthorizer),
        }
    }

    /// Replace the authorization policy.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }
}
