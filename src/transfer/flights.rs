//! Lidar snow depth flights. Experimental.
//!
//! GeoTIFF and netCDF rasters are published one store per flight. Anything
//! else is reported and skipped without touching the server.

use super::{file_name, file_stem, layer_name, TransferContext, TransferReport};
use crate::basin::Basin;
use crate::dataset::date_from_stem;
use crate::dispatch::TransferJob;
use crate::error::{AppError, Result};
use crate::geoserver::{Coverage, CoverageFormat, CoverageStore};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
struct Flight {
    source: PathBuf,
    format: CoverageFormat,
    stem: String,
    native_name: String,
}

/// Work out how a flight file would be published, without any network calls.
fn inspect(source: &Path, ctx: &TransferContext<'_>) -> Result<Flight> {
    let format = CoverageFormat::from_path(source).ok_or_else(|| {
        AppError::NotImplemented(format!(
            "flight format of {} is not supported yet (expected .tif, .tiff or .nc)",
            source.display()
        ))
    })?;

    let stem = file_stem(source)?;

    let native_name = match format {
        // GeoServer names a GeoTIFF coverage after its file
        CoverageFormat::GeoTiff => stem.clone(),
        CoverageFormat::NetCdf => {
            let dataset = ctx.datasets.read(source)?;
            dataset.raster_names().into_iter().next().ok_or_else(|| {
                AppError::NotImplemented(format!(
                    "{} has no (y, x) raster to publish",
                    source.display()
                ))
            })?
        }
    };

    Ok(Flight {
        source: source.to_path_buf(),
        format,
        stem,
        native_name,
    })
}

async fn publish(flight: &Flight, basin: Basin, ctx: &TransferContext<'_>) -> Result<String> {
    let workspace = basin.workspace();
    let remote_path = ctx
        .credentials
        .remote_path(basin.storage_path(), &format!("flights/{}", file_name(&flight.source)?));

    let body = tokio::fs::read(&flight.source).await?;
    ctx.server
        .upload_file(&remote_path, body, flight.format.content_type())
        .await?;

    let store_name = layer_name(&format!("{}_flight_{}", basin.id(), flight.stem));
    let store = CoverageStore {
        name: store_name.clone(),
        format: flight.format,
        file: remote_path,
        description: Some(format!(
            "Lidar snow depth flight over the {} watershed.",
            basin.title()
        )),
    };
    ctx.server.replace_coverage_store(workspace, &store).await?;

    let title = match date_from_stem(&flight.stem) {
        Some(date) => format!("{} {} Flight Depth", basin.title(), date),
        None => format!("{} Flight {}", basin.title(), flight.stem),
    };
    let coverage = Coverage {
        name: layer_name(&flight.stem),
        native_name: flight.native_name.clone(),
        title,
        range: None,
    };
    ctx.server
        .replace_coverage(workspace, &store_name, &coverage)
        .await?;

    Ok(format!("{}:{}", workspace, coverage.name))
}

pub async fn upload(job: &TransferJob, ctx: &TransferContext<'_>) -> Result<TransferReport> {
    let basin = job.require_basin()?;
    let mut report = TransferReport::default();
    report.warn("Flight uploads are experimental");

    let mut flights = Vec::new();
    for source in &job.files {
        match inspect(source, ctx) {
            Ok(flight) => flights.push(flight),
            Err(e @ (AppError::NotImplemented(_) | AppError::Dataset(_))) => {
                report.warn(format!("Skipping: {}", e))
            }
            Err(e) => return Err(e),
        }
    }

    if flights.is_empty() {
        return Err(AppError::NotImplemented(
            "none of the flight files are in a supported format".to_string(),
        ));
    }

    ctx.server.ensure_workspace(basin.workspace()).await?;

    let mut first_error = None;
    for flight in &flights {
        info!("Publishing flight {}...", flight.source.display());
        match publish(flight, basin, ctx).await {
            Ok(layer) => {
                report.layers.push(layer);
                report.files.push(flight.source.clone());
            }
            Err(e) if e.is_validation() => return Err(e),
            Err(e) => {
                report.warn(format!(
                    "Failed to publish flight {}: {}",
                    flight.source.display(),
                    e
                ));
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if report.layers.is_empty() => Err(e),
        _ => Ok(report),
    }
}
