use super::{display_name, file_name, file_stem, layer_name, TransferContext, TransferReport};
use crate::dispatch::TransferJob;
use crate::error::{AppError, Result};
use crate::geoserver::{DataStore, FeatureType};
use std::path::{Path, PathBuf};
use tracing::info;

/// Files that must sit next to the primary file.
pub const REQUIRED_COMPANIONS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

/// Uploaded along with the bundle when present.
pub const OPTIONAL_COMPANIONS: [&str; 2] = ["cpg", "qix"];

/// Every file of the bundle `primary` belongs to, or the list of missing
/// required extensions.
pub fn companion_files(primary: &Path) -> Result<Vec<PathBuf>> {
    let missing: Vec<String> = REQUIRED_COMPANIONS
        .iter()
        .filter(|ext| !primary.with_extension(ext).is_file())
        .map(|ext| format!(".{}", ext))
        .collect();

    if !missing.is_empty() {
        return Err(AppError::IncompleteShapefile {
            path: primary.display().to_string(),
            missing,
        });
    }

    Ok(REQUIRED_COMPANIONS
        .iter()
        .chain(OPTIONAL_COMPANIONS.iter())
        .map(|ext| primary.with_extension(ext))
        .filter(|p| p.is_file())
        .collect())
}

pub async fn upload(job: &TransferJob, ctx: &TransferContext<'_>) -> Result<TransferReport> {
    let basin = job.require_basin()?;
    let workspace = basin.workspace();

    let bundles = job
        .files
        .iter()
        .map(|primary| -> Result<(String, Vec<PathBuf>)> {
            Ok((file_stem(primary)?, companion_files(primary)?))
        })
        .collect::<Result<Vec<_>>>()?;

    ctx.server.ensure_workspace(workspace).await?;

    let mut report = TransferReport::default();
    for (stem, files) in &bundles {
        info!("Uploading shapefile {} ({} files)...", stem, files.len());
        for file in files {
            let remote_path = ctx
                .credentials
                .remote_path(basin.storage_path(), &format!("{}/{}", stem, file_name(file)?));
            let body = tokio::fs::read(file).await?;
            ctx.server
                .upload_file(&remote_path, body, "application/octet-stream")
                .await?;
            report.files.push(file.clone());
        }

        let store_name = layer_name(&format!("{}_{}", basin.id(), stem));
        let store = DataStore {
            name: store_name.clone(),
            shapefile: ctx
                .credentials
                .remote_path(basin.storage_path(), &format!("{}/{}.shp", stem, stem)),
            description: Some(format!("{} shapefile for the {} watershed.", stem, basin.title())),
        };
        ctx.server.replace_datastore(workspace, &store).await?;

        let feature_type = FeatureType {
            name: layer_name(stem),
            native_name: stem.clone(),
            title: format!("{} {}", basin.title(), display_name(stem)),
        };
        ctx.server
            .replace_feature_type(workspace, &store_name, &feature_type)
            .await?;
        report.layers.push(format!("{}:{}", workspace, feature_type.name));
    }

    Ok(report)
}
