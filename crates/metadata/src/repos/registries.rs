//! Registry and upstream repository.

use crate::error::MetadataResult;
use crate::models::{NewRegistry, NewUpstream, RegistryRow, UpstreamRow};
use async_trait::async_trait;

/// Repository for virtual registries and their upstreams.
///
/// Registries are created by administrative configuration; request handling
/// only reads them.
#[async_trait]
pub trait RegistryRepo: Send + Sync {
    /// Create a registry.
    async fn create_registry(&self, registry: &NewRegistry) -> MetadataResult<RegistryRow>;

    /// Get a registry by ID.
    async fn get_registry(&self, registry_id: i64) -> MetadataResult<Option<RegistryRow>>;

    /// Register an upstream. The upstream inherits the registry's group.
    async fn create_upstream(&self, upstream: &NewUpstream) -> MetadataResult<UpstreamRow>;

    /// Get an upstream by ID.
    async fn get_upstream(&self, upstream_id: i64) -> MetadataResult<Option<UpstreamRow>>;

    /// List a registry's upstreams, lowest position first.
    async fn list_upstreams(&self, registry_id: i64) -> MetadataResult<Vec<UpstreamRow>>;
}
