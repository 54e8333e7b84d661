//! In-memory raster datasets.
//!
//! A [`Dataset`] is a flattened view of a netCDF file: named dimensions and
//! variables with their values as `f64` plus their attributes. Readers and
//! writers for on-disk formats implement [`DatasetIo`].

use crate::error::{AppError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Value written into cells removed by a mask.
pub const NO_DATA: f64 = -9999.0;

/// Variables describing the grid rather than holding imagery.
pub const COORDINATE_VARS: [&str; 4] = ["x", "y", "time", "projection"];

pub trait DatasetIo: Send + Sync {
    fn read(&self, path: &Path) -> Result<Dataset>;
    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Number(f64),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Variable {
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Variable {
    pub fn new(dims: &[&str], shape: &[usize], values: Vec<f64>) -> Self {
        Self {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            values,
            attrs: BTreeMap::new(),
        }
    }

    /// Whether the two trailing dimensions are `(y, x)`.
    pub fn is_grid(&self) -> bool {
        let n = self.dims.len();
        n >= 2 && self.dims[n - 2] == "y" && self.dims[n - 1] == "x"
    }

    pub fn fill_value(&self) -> Option<f64> {
        self.attrs.get("_FillValue").and_then(AttrValue::as_number)
    }

    /// Min and max over valid cells, skipping NaN, fill and no-data values.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let fill = self.fill_value();
        self.values
            .iter()
            .copied()
            .filter(|v| !v.is_nan() && *v != NO_DATA && Some(*v) != fill)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub dims: BTreeMap<String, usize>,
    pub variables: BTreeMap<String, Variable>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Dataset {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Names from `required` that this dataset does not define, in order.
    pub fn missing_variables(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_variable(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// `(ny, nx)` taken from the `y` and `x` dimensions.
    pub fn grid_shape(&self) -> Option<(usize, usize)> {
        Some((*self.dims.get("y")?, *self.dims.get("x")?))
    }

    /// Grid variables that hold imagery, excluding coordinates and projection.
    pub fn raster_names(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter(|(name, var)| !COORDINATE_VARS.contains(&name.as_str()) && var.is_grid())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Copy with only the named variables (those present) and the dimensions they use.
    pub fn subset(&self, keep: &[&str]) -> Dataset {
        let variables: BTreeMap<String, Variable> = self
            .variables
            .iter()
            .filter(|(name, _)| keep.contains(&name.as_str()))
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();

        let dims = self
            .dims
            .iter()
            .filter(|(dim, _)| variables.values().any(|v| v.dims.contains(dim)))
            .map(|(dim, len)| (dim.clone(), *len))
            .collect();

        Dataset {
            dims,
            variables,
            attrs: self.attrs.clone(),
        }
    }

    /// First timestamp of the CF `time` variable, if it can be decoded.
    pub fn model_time(&self) -> Option<NaiveDateTime> {
        let time = self.variable("time")?;
        let units = time.attrs.get("units")?.as_text()?;
        let first = *time.values.first()?;
        parse_cf_time(units, first)
    }
}

/// Decode a CF-convention time value such as `hours since 2019-10-01 00:00:00`.
///
/// Only the standard (proleptic Gregorian) calendar is handled.
pub fn parse_cf_time(units: &str, value: f64) -> Option<NaiveDateTime> {
    let (unit, epoch) = units.trim().split_once(" since ")?;

    let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return None,
    };

    let epoch = parse_epoch(epoch)?;
    let offset = Duration::milliseconds((value * seconds_per_unit * 1000.0).round() as i64);
    epoch.checked_add_signed(offset)
}

fn parse_epoch(epoch: &str) -> Option<NaiveDateTime> {
    let epoch = epoch
        .trim()
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim();

    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(epoch, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Find a `YYYY-MM-DD` or `YYYYMMDD` date in a file stem.
pub fn date_from_stem(stem: &str) -> Option<NaiveDate> {
    let re = regex_lite::Regex::new(r"(\d{4})-?(\d{2})-?(\d{2})").unwrap();
    let found = re.captures_iter(stem).find_map(|cap| {
        let year = cap[1].parse().ok()?;
        let month = cap[2].parse().ok()?;
        let day = cap[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });
    found
}

/// Parse a user supplied date (`YYYY-MM-DD`, `YYYYMMDD` or RFC 3339).
pub fn parse_user_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%Y%m%d"))
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(input).map(|d| d.date_naive()))
        .map_err(|_| {
            AppError::Config(format!(
                "Could not parse date '{}', expected YYYY-MM-DD",
                input
            ))
        })
}
