//! Per-type transfer handlers.
//!
//! Every handler does all of its local work (reading, validating, masking,
//! staging) before the first request to the map server, so a job that fails
//! validation leaves no partial state behind.

pub mod flights;
pub mod modeled;
pub mod shapefile;
pub mod styles;
pub mod topographic;

use crate::config::Credentials;
use crate::dataset::DatasetIo;
use crate::dispatch::{dispatch, Handler, TransferJob, TransferMode};
use crate::error::{AppError, Result};
use crate::geoserver::MapServer;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Everything a handler needs besides the job itself.
pub struct TransferContext<'a> {
    pub credentials: &'a Credentials,
    pub server: &'a dyn MapServer,
    pub datasets: &'a dyn DatasetIo,
    /// Scratch space for rewritten netCDF files.
    pub staging_dir: &'a Path,
    /// Where downloads are written.
    pub output_dir: &'a Path,
}

#[derive(Debug, Default, Clone)]
pub struct TransferReport {
    pub files: Vec<PathBuf>,
    pub layers: Vec<String>,
    pub styles: Vec<String>,
    pub warnings: Vec<String>,
}

impl TransferReport {
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Validate, dispatch and execute one job.
pub async fn run(job: TransferJob, ctx: &TransferContext<'_>) -> Result<TransferReport> {
    let job = job.validate()?;
    let handler = dispatch(&job)?;

    info!(
        "Basin: {}, type: {}, files: {:?}, mask: {:?}",
        job.basin.map(|b| b.id()).unwrap_or("-"),
        job.data_type,
        job.files,
        job.mask
    );

    let start = Instant::now();

    let report = match handler {
        Handler::ModeledUpload => modeled::upload(&job, ctx).await?,
        Handler::ModeledDownload => match job.mode {
            TransferMode::Download { date } => modeled::download(job.require_basin()?, date, ctx).await?,
            TransferMode::Upload => {
                return Err(AppError::UnsupportedType(
                    "download handler selected for an upload job".to_string(),
                ))
            }
        },
        Handler::TopographicUpload => topographic::upload(&job, ctx).await?,
        Handler::FlightsUpload => flights::upload(&job, ctx).await?,
        Handler::StylesUpload => styles::upload(&job, ctx).await?,
        Handler::ShapefilesUpload => shapefile::upload(&job, ctx).await?,
    };

    info!(
        "Transfer took {:.1}s ({} layer(s), {} style(s), {} warning(s))",
        start.elapsed().as_secs_f64(),
        report.layers.len(),
        report.styles.len(),
        report.warnings.len()
    );

    Ok(report)
}

pub(crate) fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Config(format!("{} has no usable file name", path.display())))
}

pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Config(format!("{} has no usable file name", path.display())))
}

/// Layer and store names: spaces become underscores, dashes are dropped.
pub(crate) fn layer_name(raw: &str) -> String {
    raw.trim().replace(' ', "_").replace('-', "")
}

/// `Depth`, `Snow Density`; `swe` is an acronym and stays upper case.
pub(crate) fn display_name(alias: &str) -> String {
    if alias.eq_ignore_ascii_case("swe") {
        return "SWE".to_string();
    }
    alias
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
