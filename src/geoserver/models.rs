use serde_json::{json, Value};
use std::path::Path;

/// Raster formats a coverage store can be backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageFormat {
    NetCdf,
    GeoTiff,
}

impl CoverageFormat {
    /// Pick a format from a file extension, if it is one the server can host.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "nc" | "nc4" | "netcdf" => Some(CoverageFormat::NetCdf),
            "tif" | "tiff" | "geotiff" => Some(CoverageFormat::GeoTiff),
            _ => None,
        }
    }

    pub fn store_type(&self) -> &'static str {
        match self {
            CoverageFormat::NetCdf => "NetCDF",
            CoverageFormat::GeoTiff => "GeoTIFF",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            CoverageFormat::NetCdf => "application/x-netcdf",
            CoverageFormat::GeoTiff => "image/tiff",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageStore {
    pub name: String,
    pub format: CoverageFormat,
    /// Path of the backing file relative to the server data directory.
    pub file: String,
    pub description: Option<String>,
}

impl CoverageStore {
    pub fn to_payload(&self, workspace: &str) -> Value {
        let mut payload = json!({
            "coverageStore": {
                "name": self.name,
                "type": self.format.store_type(),
                "enabled": true,
                "_default": false,
                "workspace": { "name": workspace },
                "url": format!("file:{}", self.file),
            }
        });
        if let Some(description) = &self.description {
            payload["coverageStore"]["description"] = json!(description);
        }
        payload
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub name: String,
    /// Variable (or band) name inside the backing file.
    pub native_name: String,
    pub title: String,
    pub range: Option<(f64, f64)>,
}

impl Coverage {
    pub fn to_payload(&self, workspace: &str, store: &str) -> Value {
        let mut payload = json!({
            "coverage": {
                "name": self.name,
                "nativeName": self.native_name,
                "nativeCoverageName": self.native_name,
                "store": { "name": format!("{}:{}", workspace, store) },
                "enabled": true,
                "title": self.title,
            }
        });
        if let Some((min, max)) = self.range {
            payload["coverage"]["dimensions"] = json!({
                "coverageDimension": [{
                    "name": self.name,
                    "range": { "min": min.to_string(), "max": max.to_string() },
                }]
            });
        }
        payload
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataStore {
    pub name: String,
    /// Path of the `.shp` relative to the server data directory.
    pub shapefile: String,
    pub description: Option<String>,
}

impl DataStore {
    pub fn to_payload(&self, workspace: &str) -> Value {
        let mut payload = json!({
            "dataStore": {
                "name": self.name,
                "type": "Shapefile",
                "enabled": true,
                "workspace": { "name": workspace },
                "connectionParameters": {
                    "entry": [
                        { "@key": "url", "$": format!("file:{}", self.shapefile) },
                        { "@key": "charset", "$": "UTF-8" },
                    ]
                },
            }
        });
        if let Some(description) = &self.description {
            payload["dataStore"]["description"] = json!(description);
        }
        payload
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureType {
    pub name: String,
    pub native_name: String,
    pub title: String,
}

impl FeatureType {
    pub fn to_payload(&self) -> Value {
        json!({
            "featureType": {
                "name": self.name,
                "nativeName": self.native_name,
                "title": self.title,
                "enabled": true,
            }
        })
    }
}

/// Pull layer or style names out of a GeoServer listing such as
/// `{"layers": {"layer": [{"name": "brb:swe_latest"}]}}`.
///
/// GeoServer answers an empty listing with `{"layers": ""}`, which yields no names.
pub fn names_from_listing(listing: &Value, plural: &str, singular: &str) -> Vec<String> {
    listing
        .get(plural)
        .and_then(|v| v.get(singular))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
