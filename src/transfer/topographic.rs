//! Static topographic images (dem, basin masks, vegetation) for a basin.
//!
//! Topography never changes between model runs, so layers are named after the
//! variable alone and a new upload simply replaces the old one. No masking.

use super::styles::assign_layer_styles;
use super::{display_name, file_name, layer_name, TransferContext, TransferReport};
use crate::dispatch::TransferJob;
use crate::error::{AppError, Result};
use crate::geoserver::{Coverage, CoverageFormat, CoverageStore};
use tracing::info;

pub async fn upload(job: &TransferJob, ctx: &TransferContext<'_>) -> Result<TransferReport> {
    let basin = job.require_basin()?;
    let workspace = basin.workspace();

    let source = match job.files.as_slice() {
        [single] => single,
        files => {
            return Err(AppError::Config(format!(
                "topographic upload takes exactly one file, got {}",
                files.len()
            )))
        }
    };

    info!("Reading {}...", source.display());
    let dataset = ctx.datasets.read(source)?;
    let rasters = dataset.raster_names();
    if rasters.is_empty() {
        return Err(AppError::Dataset(format!(
            "{} contains no (y, x) raster images",
            source.display()
        )));
    }
    info!("Found {} images: {}", rasters.len(), rasters.join(", "));

    let remote_path = ctx
        .credentials
        .remote_path(basin.storage_path(), &file_name(source)?);
    let body = tokio::fs::read(source).await?;

    ctx.server.ensure_workspace(workspace).await?;
    ctx.server
        .upload_file(&remote_path, body, CoverageFormat::NetCdf.content_type())
        .await?;

    let store_name = format!("{}_topo", basin.id());
    let store = CoverageStore {
        name: store_name.clone(),
        format: CoverageFormat::NetCdf,
        file: remote_path,
        description: Some(format!(
            "Topographic images required for modeling the {} watershed.\nUploaded: {}",
            basin.title(),
            chrono::Local::now().date_naive()
        )),
    };
    ctx.server.replace_coverage_store(workspace, &store).await?;

    let mut report = TransferReport::default();
    for raster in &rasters {
        let coverage = Coverage {
            name: layer_name(raster),
            native_name: raster.clone(),
            title: format!("{} {}", basin.title(), display_name(raster)),
            range: dataset.variable(raster).and_then(|v| v.value_range()),
        };
        info!("Adding layer {}:{}...", workspace, coverage.name);
        ctx.server
            .replace_coverage(workspace, &store_name, &coverage)
            .await?;
        report.layers.push(format!("{}:{}", workspace, coverage.name));
    }

    let published = report.layers.clone();
    assign_layer_styles(workspace, &published, ctx, &mut report).await;

    report.files.push(source.clone());
    Ok(report)
}
