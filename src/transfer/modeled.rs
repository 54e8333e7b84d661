//! Modeled snowpack results: upload with optional masking, and download.

use super::styles::assign_layer_styles;
use super::{display_name, file_stem, layer_name, TransferContext, TransferReport};
use crate::basin::Basin;
use crate::dataset::{date_from_stem, AttrValue, Dataset, Variable, COORDINATE_VARS};
use crate::dispatch::TransferJob;
use crate::error::{AppError, Result};
use crate::geoserver::{Coverage, CoverageFormat, CoverageStore};
use crate::mask::{self, Mask};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Variables every modeled file must carry.
pub const REQUIRED_VARIABLES: [&str; 3] = ["specific_mass", "thickness", "snow_density"];

/// Variable in a mask file marking cells to keep.
pub const MASK_VARIABLE: &str = "mask";

/// Published layer name for a model variable.
pub fn layer_alias(variable: &str) -> &str {
    match variable {
        "specific_mass" => "swe",
        "thickness" => "depth",
        "snow_density" => "density",
        other => other,
    }
}

/// Name of the layer always pointing at the newest upload of `variable`.
pub fn latest_layer_name(variable: &str) -> String {
    format!("{}_latest", layer_alias(variable))
}

/// Name a modeled file is stored under remotely. The model date is appended
/// unless the stem already carries it, and `masked_` is never doubled.
pub fn remote_file_name(stem: &str, date: NaiveDate, masked: bool) -> String {
    let prefix = if masked && !stem.starts_with("masked_") {
        "masked_"
    } else {
        ""
    };
    if date_from_stem(stem) == Some(date) {
        format!("{}{}.nc", prefix, stem)
    } else {
        format!("{}{}_{}.nc", prefix, stem, date.format("%Y%m%d"))
    }
}

#[derive(Debug)]
struct StagedModel {
    local_path: PathBuf,
    file_name: String,
    date: NaiveDate,
    ranges: Vec<(&'static str, Option<(f64, f64)>)>,
}

/// Model date from the `time` variable, then the file name, then today.
fn model_date(dataset: &Dataset, source: &Path) -> NaiveDate {
    if let Some(time) = dataset.model_time() {
        return time.date();
    }

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if let Some(date) = date_from_stem(stem) {
        warn!(
            "No decodable time variable in {}, using date {} from its name",
            source.display(),
            date
        );
        return date;
    }

    let today = chrono::Local::now().date_naive();
    warn!(
        "Could not determine a model date for {}, using today ({})",
        source.display(),
        today
    );
    today
}

fn projection_variable(epsg: u32, grid_vars: &[&str], dataset: &mut Dataset) {
    let code = format!("EPSG:{}", epsg);
    let mut projection = Variable::new(&[], &[], vec![0.0]);
    projection
        .attrs
        .insert("spatial_ref".to_string(), AttrValue::Text(code.clone()));
    projection
        .attrs
        .insert("epsg_code".to_string(), AttrValue::Text(code));
    dataset
        .variables
        .insert("projection".to_string(), projection);

    for name in grid_vars {
        if let Some(var) = dataset.variables.get_mut(*name) {
            var.attrs.insert(
                "grid_mapping".to_string(),
                AttrValue::Text("projection".to_string()),
            );
        }
    }
}

fn stage(
    source: &Path,
    mask: Option<&Mask>,
    epsg: Option<u32>,
    ctx: &TransferContext<'_>,
) -> Result<StagedModel> {
    info!("Reading {}...", source.display());
    let dataset = ctx.datasets.read(source)?;

    let missing = dataset.missing_variables(&REQUIRED_VARIABLES);
    if !missing.is_empty() {
        return Err(AppError::MissingVariable {
            file: source.display().to_string(),
            variables: missing,
        });
    }

    let date = model_date(&dataset, source);

    let keep: Vec<&str> = REQUIRED_VARIABLES
        .iter()
        .chain(COORDINATE_VARS.iter())
        .copied()
        .collect();
    let mut staged = dataset.subset(&keep);

    if let Some(mask) = mask {
        info!("Masking {}...", source.display());
        staged = mask::apply(&staged, mask)?;
    }

    if !staged.has_variable("projection") {
        match epsg {
            Some(code) => {
                info!("Adding projection information using EPSG code {}...", code);
                projection_variable(code, &REQUIRED_VARIABLES, &mut staged);
            }
            None => warn!(
                "{} has no projection information and no EPSG code was given (-e/--epsg)",
                source.display()
            ),
        }
    }

    let ranges = REQUIRED_VARIABLES
        .iter()
        .map(|name| (*name, staged.variable(name).and_then(Variable::value_range)))
        .collect();

    let file_name = remote_file_name(&file_stem(source)?, date, mask.is_some());
    let local_path = ctx.staging_dir.join(&file_name);
    ctx.datasets.write(&staged, &local_path)?;

    Ok(StagedModel {
        local_path,
        file_name,
        date,
        ranges,
    })
}

fn layer_title(basin: Basin, date: Option<NaiveDate>, alias: &str) -> String {
    match date {
        Some(date) => format!("{} {} {}", basin.title(), date, display_name(alias)),
        None => format!("{} Latest {}", basin.title(), display_name(alias)),
    }
}

pub async fn upload(job: &TransferJob, ctx: &TransferContext<'_>) -> Result<TransferReport> {
    let basin = job.require_basin()?;
    let workspace = basin.workspace();
    let mut report = TransferReport::default();

    let mask = match &job.mask {
        Some(path) => {
            info!("Loading mask from {}...", path.display());
            let mask = Mask::from_dataset(&ctx.datasets.read(path)?, MASK_VARIABLE)?;
            info!(
                "Mask keeps {} of {} cells",
                mask.included_cells(),
                mask.shape().0 * mask.shape().1
            );
            Some(mask)
        }
        None => None,
    };

    let mut staged = job
        .files
        .iter()
        .map(|source| stage(source, mask.as_ref(), job.epsg, ctx))
        .collect::<Result<Vec<_>>>()?;

    // oldest first so the latest aliases end on the newest model date
    staged.sort_by_key(|s| s.date);

    ctx.server.ensure_workspace(workspace).await?;

    for model in &staged {
        let remote_path = ctx
            .credentials
            .remote_path(basin.storage_path(), &model.file_name);
        let body = tokio::fs::read(&model.local_path).await?;
        ctx.server
            .upload_file(&remote_path, body, CoverageFormat::NetCdf.content_type())
            .await?;

        let stamp = model.date.format("%Y%m%d").to_string();
        let store_name = layer_name(&format!(
            "{}_{}",
            basin.id(),
            file_stem(Path::new(&model.file_name))?
        ));
        let store = CoverageStore {
            name: store_name.clone(),
            format: CoverageFormat::NetCdf,
            file: remote_path,
            description: Some(format!(
                "Modeled snowpack images for the {} watershed.\nModel date: {}\nUploaded: {}",
                basin.title(),
                model.date,
                chrono::Local::now().date_naive()
            )),
        };
        info!("Creating coverage store {}:{}...", workspace, store_name);
        ctx.server.replace_coverage_store(workspace, &store).await?;

        for (variable, range) in &model.ranges {
            let alias = layer_alias(variable);
            let coverage = Coverage {
                name: format!("{}_{}", alias, stamp),
                native_name: variable.to_string(),
                title: layer_title(basin, Some(model.date), alias),
                range: *range,
            };
            info!("Adding layer {}:{}...", workspace, coverage.name);
            ctx.server
                .replace_coverage(workspace, &store_name, &coverage)
                .await?;
            report.layers.push(format!("{}:{}", workspace, coverage.name));
        }

        for (variable, range) in &model.ranges {
            let alias = layer_alias(variable);
            let latest = Coverage {
                name: latest_layer_name(variable),
                native_name: variable.to_string(),
                title: layer_title(basin, None, alias),
                range: *range,
            };
            info!("Pointing {}:{} at {}...", workspace, latest.name, store_name);
            ctx.server
                .replace_coverage(workspace, &store_name, &latest)
                .await?;
            report.layers.push(format!("{}:{}", workspace, latest.name));
        }

        report.files.push(model.local_path.clone());
    }

    let published = report.layers.clone();
    assign_layer_styles(workspace, &published, ctx, &mut report).await;

    Ok(report)
}

/// Fetch the masked modeled netCDF for `date` into the output directory.
pub async fn download(
    basin: Basin,
    date: NaiveDate,
    ctx: &TransferContext<'_>,
) -> Result<TransferReport> {
    let file_name = remote_file_name("snow", date, true);
    let remote_path = ctx.credentials.remote_path(basin.storage_path(), &file_name);
    let dest = ctx.output_dir.join(&file_name);

    info!(
        "Download requested. Attempting to download {} from the {} basin...",
        file_name, basin
    );
    let bytes = ctx.server.download_file(&remote_path, &dest).await?;
    info!("Wrote {} bytes to {}", bytes, dest.display());

    let mut report = TransferReport::default();
    report.files.push(dest);
    Ok(report)
}
