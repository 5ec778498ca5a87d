//! Catalog of locally hosted package files.
//!
//! Lookups run in two stages: candidate packages are selected in SQL, then
//! the matching files are reduced to the newest file per package here.

use crate::error::MetadataResult;
use crate::models::{
    NamespaceRow, NewPackage, NewPackageFile, PackageFileRow, PackageRow, ProjectRow,
};
use async_trait::async_trait;
use depot_core::RequestScope;
use std::collections::HashMap;

/// Repository for hosted namespaces, projects, packages and files.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Create a namespace below `parent_id` (or a top-level group).
    async fn create_namespace(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> MetadataResult<NamespaceRow>;

    /// Create a project in a namespace.
    async fn create_project(&self, namespace_id: i64, name: &str) -> MetadataResult<ProjectRow>;

    /// Create a package.
    async fn create_package(&self, package: &NewPackage) -> MetadataResult<PackageRow>;

    /// Add a file to a package.
    async fn create_package_file(&self, file: &NewPackageFile) -> MetadataResult<PackageFileRow>;

    /// Stage one: ids of packages at `folder_path` owned by a named project
    /// or by a project below a named group.
    async fn candidate_package_ids(
        &self,
        scope: &RequestScope,
        folder_path: &str,
    ) -> MetadataResult<Vec<i64>>;

    /// Stage two: files named `file_name` in the given packages.
    async fn package_files_named(
        &self,
        package_ids: &[i64],
        file_name: &str,
    ) -> MetadataResult<Vec<PackageFileRow>>;

    /// Find hosted files satisfying `path` within `scope`.
    ///
    /// Returns at most one file per package, newest first. Scopes that are
    /// empty or too large, and paths that do not split into a folder and a
    /// file name, yield an empty result instead of an error.
    async fn find_package_files(
        &self,
        scope: &RequestScope,
        path: &str,
    ) -> MetadataResult<Vec<PackageFileRow>> {
        if let Err(e) = scope.validate() {
            tracing::debug!(error = %e, "Skipping catalog lookup");
            return Ok(Vec::new());
        }
        let Ok((folder_path, file_name)) = depot_core::split(path) else {
            return Ok(Vec::new());
        };
        if folder_path.is_empty() || file_name.is_empty() {
            return Ok(Vec::new());
        }

        let package_ids = self.candidate_package_ids(scope, folder_path).await?;
        if package_ids.is_empty() {
            return Ok(Vec::new());
        }

        let files = self.package_files_named(&package_ids, file_name).await?;
        Ok(newest_per_package(files))
    }
}

/// Keep the highest-id file per package, ordered newest first with ties
/// broken by higher id.
pub fn newest_per_package(files: Vec<PackageFileRow>) -> Vec<PackageFileRow> {
    let mut latest: HashMap<i64, PackageFileRow> = HashMap::new();
    for file in files {
        match latest.get(&file.package_id) {
            Some(current) if current.id >= file.id => {}
            _ => {
                latest.insert(file.package_id, file);
            }
        }
    }

    let mut result: Vec<PackageFileRow> = latest.into_values().collect();
    result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    result
}
