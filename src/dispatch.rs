use crate::basin::Basin;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Modeled,
    Topographic,
    Flights,
    Styles,
    Shapefiles,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Modeled => "modeled",
            DataType::Topographic => "topographic",
            DataType::Flights => "flights",
            DataType::Styles => "styles",
            DataType::Shapefiles => "shapefiles",
        }
    }
}

impl FromStr for DataType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "modeled" | "modelled" => Ok(DataType::Modeled),
            "topographic" | "topo" => Ok(DataType::Topographic),
            "flights" | "flight" => Ok(DataType::Flights),
            "styles" | "style" => Ok(DataType::Styles),
            "shapefiles" | "shapefile" => Ok(DataType::Shapefiles),
            _ => Err(AppError::UnsupportedType(format!(
                "'{}' (expected one of: modeled, topographic, flights, styles, shapefiles)",
                s
            ))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    Upload,
    Download { date: NaiveDate },
}

#[derive(Debug, Clone)]
pub struct TransferJob {
    pub files: Vec<PathBuf>,
    pub data_type: DataType,
    pub basin: Option<Basin>,
    pub mask: Option<PathBuf>,
    /// EPSG code to attach when a netCDF carries no projection.
    pub epsg: Option<u32>,
    pub mode: TransferMode,
}

impl TransferJob {
    pub fn upload(data_type: DataType, basin: Option<Basin>, files: Vec<PathBuf>) -> Self {
        Self {
            files,
            data_type,
            basin,
            mask: None,
            epsg: None,
            mode: TransferMode::Upload,
        }
    }

    pub fn download(data_type: DataType, basin: Basin, date: NaiveDate) -> Self {
        Self {
            files: Vec::new(),
            data_type,
            basin: Some(basin),
            mask: None,
            epsg: None,
            mode: TransferMode::Download { date },
        }
    }

    pub fn with_mask(mut self, mask: PathBuf) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    /// Basin for jobs that require one.
    pub fn require_basin(&self) -> Result<Basin> {
        self.basin.ok_or_else(|| {
            AppError::Config(format!(
                "a basin (-b/--basin) is required for {} transfers",
                self.data_type
            ))
        })
    }

    /// Check everything that can be checked locally. Runs before any network call.
    ///
    /// A mask on anything but modeled data is dropped with a warning.
    pub fn validate(mut self) -> Result<Self> {
        if self.data_type != DataType::Styles {
            self.require_basin()?;
        }

        if self.mode == TransferMode::Upload {
            if self.files.is_empty() {
                return Err(AppError::Config(
                    "no input files given (-f/--file)".to_string(),
                ));
            }

            if let Some(missing) = self.files.iter().find(|f| !f.is_file()) {
                return Err(AppError::Config(format!(
                    "input file {} does not exist",
                    missing.display()
                )));
            }
        }

        if let Some(mask) = &self.mask {
            if self.data_type != DataType::Modeled {
                warn!(
                    "Masking only applies to modeled data, ignoring mask {} for {} upload",
                    mask.display(),
                    self.data_type
                );
                self.mask = None;
            } else if !mask.is_file() {
                return Err(AppError::Config(format!(
                    "mask file {} does not exist",
                    mask.display()
                )));
            }
        }

        Ok(self)
    }
}

/// Expand glob patterns in file arguments; plain paths pass through as given.
pub fn expand_paths(args: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for arg in args {
        if !arg.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(arg));
            continue;
        }

        let matches: Vec<PathBuf> = glob::glob(arg)
            .map_err(|e| AppError::Config(format!("Invalid file pattern '{}': {}", arg, e)))?
            .filter_map(|entry| entry.ok())
            .collect();

        if matches.is_empty() {
            return Err(AppError::Config(format!("No files match '{}'", arg)));
        }
        paths.extend(matches);
    }
    Ok(paths)
}

/// One strategy per supported (type, direction) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    ModeledUpload,
    ModeledDownload,
    TopographicUpload,
    FlightsUpload,
    StylesUpload,
    ShapefilesUpload,
}

pub fn dispatch(job: &TransferJob) -> Result<Handler> {
    match (&job.mode, job.data_type) {
        (TransferMode::Upload, DataType::Modeled) => Ok(Handler::ModeledUpload),
        (TransferMode::Upload, DataType::Topographic) => Ok(Handler::TopographicUpload),
        (TransferMode::Upload, DataType::Flights) => Ok(Handler::FlightsUpload),
        (TransferMode::Upload, DataType::Styles) => Ok(Handler::StylesUpload),
        (TransferMode::Upload, DataType::Shapefiles) => Ok(Handler::ShapefilesUpload),
        (TransferMode::Download { .. }, DataType::Modeled) => Ok(Handler::ModeledDownload),
        (TransferMode::Download { .. }, other) => Err(AppError::UnsupportedType(format!(
            "downloading {} data is not supported",
            other
        ))),
    }
}
