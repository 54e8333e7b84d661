pub mod client;
pub mod models;

pub use client::GeoServerClient;
pub use models::{Coverage, CoverageFormat, CoverageStore, DataStore, FeatureType};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Operations the transfer handlers need from a map server.
///
/// Every `replace_*` call is last-write-wins: an existing object with the
/// same name is removed first and the new definition takes its place whole.
#[async_trait]
pub trait MapServer: Send + Sync {
    async fn workspace_exists(&self, workspace: &str) -> Result<bool>;

    async fn create_workspace(&self, workspace: &str) -> Result<()>;

    /// Put a file under the server data directory, replacing any existing one.
    async fn upload_file(&self, remote_path: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    async fn replace_coverage_store(&self, workspace: &str, store: &CoverageStore) -> Result<()>;

    async fn replace_coverage(&self, workspace: &str, store: &str, coverage: &Coverage) -> Result<()>;

    async fn replace_datastore(&self, workspace: &str, store: &DataStore) -> Result<()>;

    async fn replace_feature_type(
        &self,
        workspace: &str,
        store: &str,
        feature_type: &FeatureType,
    ) -> Result<()>;

    /// Layer names, restricted to one workspace when given.
    async fn list_layers(&self, workspace: Option<&str>) -> Result<Vec<String>>;

    async fn list_styles(&self) -> Result<Vec<String>>;

    async fn replace_style(&self, name: &str, body: Vec<u8>) -> Result<()>;

    async fn set_default_style(&self, workspace: &str, layer: &str, style: &str) -> Result<()>;

    /// Styles offered for a layer besides its default.
    async fn set_layer_styles(&self, workspace: &str, layer: &str, styles: &[String]) -> Result<()>;

    /// Fetch a file from the server data directory into `dest`, returning the byte count.
    async fn download_file(&self, remote_path: &str, dest: &Path) -> Result<u64>;

    /// Create the workspace if it does not exist yet.
    async fn ensure_workspace(&self, workspace: &str) -> Result<()> {
        if !self.workspace_exists(workspace).await? {
            tracing::info!("Creating workspace {} on the map server", workspace);
            self.create_workspace(workspace).await?;
        }
        Ok(())
    }
}
