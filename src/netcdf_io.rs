//! netCDF reading and writing through libnetcdf.
//!
//! Enabled by the default `netcdf` cargo feature. A build with
//! `--no-default-features` returns [`AppError::NotImplemented`] from every call
//! so styles and shapefiles still work on hosts without libnetcdf.

use crate::dataset::{Dataset, DatasetIo};
use crate::error::{AppError, Result};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct NetCdfIo;

#[cfg(not(feature = "netcdf"))]
impl DatasetIo for NetCdfIo {
    fn read(&self, path: &Path) -> Result<Dataset> {
        Err(AppError::NotImplemented(format!(
            "cannot read {}: netCDF support was not compiled in (rebuild with --features netcdf)",
            path.display()
        )))
    }

    fn write(&self, _dataset: &Dataset, path: &Path) -> Result<()> {
        Err(AppError::NotImplemented(format!(
            "cannot write {}: netCDF support was not compiled in (rebuild with --features netcdf)",
            path.display()
        )))
    }
}

#[cfg(feature = "netcdf")]
impl DatasetIo for NetCdfIo {
    fn read(&self, path: &Path) -> Result<Dataset> {
        native::read(path)
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()> {
        native::write(dataset, path)
    }
}

#[cfg(feature = "netcdf")]
mod native {
    use super::*;
    use crate::dataset::{AttrValue, Variable};
    use netcdf::types::NcVariableType;
    use netcdf::AttributeValue;
    use std::collections::BTreeMap;
    use tracing::debug;

    /// Coordinate variables keep double precision on write; imagery is stored as f32.
    const DOUBLE_VARS: [&str; 3] = ["x", "y", "time"];

    fn nc_err(path: &Path, e: netcdf::Error) -> AppError {
        AppError::Dataset(format!("{}: {}", path.display(), e))
    }

    pub(super) fn read(path: &Path) -> Result<Dataset> {
        let file = netcdf::open(path).map_err(|e| nc_err(path, e))?;
        let mut dataset = Dataset::default();

        for dim in file.dimensions() {
            dataset.dims.insert(dim.name().to_string(), dim.len());
        }

        for attr in file.attributes() {
            if let Some(value) = attr.value().ok().and_then(convert_attr) {
                dataset.attrs.insert(attr.name().to_string(), value);
            }
        }

        for var in file.variables() {
            let name = var.name().to_string();

            let mut attrs = BTreeMap::new();
            for attr in var.attributes() {
                if let Some(value) = attr.value().ok().and_then(convert_attr) {
                    attrs.insert(attr.name().to_string(), value);
                }
            }

            // char/string variables (grid mappings, metadata) keep only their attributes
            if !matches!(var.vartype(), NcVariableType::Int(_) | NcVariableType::Float(_)) {
                debug!("Keeping non-numeric {} from {} as attributes only", name, path.display());
                dataset.variables.insert(
                    name,
                    Variable {
                        attrs,
                        ..Variable::default()
                    },
                );
                continue;
            }

            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

            let values: Vec<f64> = var.get_values::<f64, _>(..).map_err(|e| {
                AppError::Dataset(format!("{}: failed to read {}: {}", path.display(), name, e))
            })?;

            debug!("Read {} {:?} from {}", name, shape, path.display());
            dataset.variables.insert(
                name,
                Variable {
                    dims,
                    shape,
                    values,
                    attrs,
                },
            );
        }

        Ok(dataset)
    }

    pub(super) fn write(dataset: &Dataset, path: &Path) -> Result<()> {
        let mut file = netcdf::create(path).map_err(|e| nc_err(path, e))?;

        for (name, len) in &dataset.dims {
            file.add_dimension(name, *len).map_err(|e| nc_err(path, e))?;
        }

        for (name, value) in &dataset.attrs {
            put_global_attr(&mut file, name, value).map_err(|e| nc_err(path, e))?;
        }

        for (name, var) in &dataset.variables {
            let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();

            if var.dims.is_empty() && var.values.is_empty() {
                let mut out = file
                    .add_variable::<f64>(name, &[])
                    .map_err(|e| nc_err(path, e))?;
                for (attr, value) in &var.attrs {
                    put_var_attr(&mut out, attr, value, false).map_err(|e| nc_err(path, e))?;
                }
            } else if DOUBLE_VARS.contains(&name.as_str()) {
                let mut out = file
                    .add_variable::<f64>(name, &dims)
                    .map_err(|e| nc_err(path, e))?;
                for (attr, value) in &var.attrs {
                    put_var_attr(&mut out, attr, value, false).map_err(|e| nc_err(path, e))?;
                }
                out.put_values(&var.values, ..).map_err(|e| nc_err(path, e))?;
            } else {
                let mut out = file
                    .add_variable::<f32>(name, &dims)
                    .map_err(|e| nc_err(path, e))?;
                for (attr, value) in &var.attrs {
                    put_var_attr(&mut out, attr, value, true).map_err(|e| nc_err(path, e))?;
                }
                let values: Vec<f32> = var.values.iter().map(|v| *v as f32).collect();
                out.put_values(&values, ..).map_err(|e| nc_err(path, e))?;
            }
        }

        debug!("Wrote {} variables to {}", dataset.variables.len(), path.display());
        Ok(())
    }

    fn put_global_attr(
        file: &mut netcdf::FileMut,
        name: &str,
        value: &AttrValue,
    ) -> std::result::Result<(), netcdf::Error> {
        match value {
            AttrValue::Text(s) => file.add_attribute(name, s.as_str()).map(|_| ()),
            AttrValue::Number(n) => file.add_attribute(name, *n).map(|_| ()),
        }
    }

    /// `_FillValue` must match the variable type, so it follows `as_f32`.
    fn put_var_attr(
        var: &mut netcdf::VariableMut<'_>,
        name: &str,
        value: &AttrValue,
        as_f32: bool,
    ) -> std::result::Result<(), netcdf::Error> {
        match value {
            AttrValue::Text(s) => var.put_attribute(name, s.as_str()).map(|_| ()),
            AttrValue::Number(n) if name == "_FillValue" && as_f32 => {
                var.put_attribute(name, *n as f32).map(|_| ())
            }
            AttrValue::Number(n) => var.put_attribute(name, *n).map(|_| ()),
        }
    }

    fn convert_attr(value: AttributeValue) -> Option<AttrValue> {
        match value {
            AttributeValue::Str(s) => Some(AttrValue::Text(s)),
            AttributeValue::Double(v) => Some(AttrValue::Number(v)),
            AttributeValue::Float(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Int(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Short(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Schar(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Uchar(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Ushort(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Uint(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Longlong(v) => Some(AttrValue::Number(v as f64)),
            AttributeValue::Ulonglong(v) => Some(AttrValue::Number(v as f64)),
            _ => None,
        }
    }
}
