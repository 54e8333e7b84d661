use crate::error::{AppError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

pub const DEFAULT_CREDENTIALS_PATH: &str = "./geoserver.json";

/// Keys a credentials file must define, in template order.
pub const REQUIRED_KEYS: [&str; 4] = ["url", "geoserver_username", "geoserver_password", "data"];

#[derive(Deserialize, Clone)]
pub struct Credentials {
    pub url: String,
    pub geoserver_username: String,
    pub geoserver_password: String,
    /// Remote data root that basin folders live under, e.g. `basins`.
    pub data: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    // SCP transport keys from older credential files
    #[serde(default)]
    remote_username: Option<String>,
    #[serde(default)]
    pem: Option<String>,
}

fn default_timeout_secs() -> u64 {
    120
}

/// Upper bound on `max_retries`; backoff doubles per attempt.
pub const MAX_RETRIES_LIMIT: u32 = 10;

fn default_max_retries() -> u32 {
    3
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("geoserver_username", &self.geoserver_username)
            .field("geoserver_password", &"********")
            .field("data", &self.data)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Credentials {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read credentials file {}: {}\n\n\
                 Run with --write_json to create a blank one.",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut document: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse credentials: {}", e)))?;

        // expanded values are never re-parsed, so quotes and backslashes survive
        expand_env_vars(&mut document)?;

        let creds: Credentials = serde_json::from_value(document)
            .map_err(|e| AppError::Config(format!("Failed to parse credentials: {}", e)))?;

        creds.validate()?;

        Ok(creds)
    }

    /// Validate credential values
    ///
    /// Every required key must be non-empty and `url` must be an http(s) URL.
    fn validate(&self) -> Result<()> {
        let fields_to_check = [
            ("url", &self.url),
            ("geoserver_username", &self.geoserver_username),
            ("geoserver_password", &self.geoserver_password),
            ("data", &self.data),
        ];

        for (field_name, value) in &fields_to_check {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "Credentials field '{}' cannot be empty",
                    field_name
                )));
            }
        }

        let parsed = url::Url::parse(&self.url)
            .map_err(|e| AppError::Config(format!("Invalid url '{}': {}", self.url, e)))?;

        match parsed.scheme() {
            "https" => {}
            "http" => tracing::warn!(
                "GeoServer url {} is not HTTPS, credentials will be sent in clear text",
                self.url
            ),
            other => {
                return Err(AppError::Config(format!(
                    "GeoServer url must use http or https, got: {}",
                    other
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(AppError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(AppError::Config(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }

        if self.remote_username.is_some() || self.pem.is_some() {
            tracing::warn!(
                "Credentials keys 'remote_username' and 'pem' are no longer used and will be ignored"
            );
        }

        Ok(())
    }

    /// Root of the GeoServer REST API, always ending in `rest/`.
    pub fn rest_root(&self) -> Result<url::Url> {
        let mut base = self.url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = url::Url::parse(&base)
            .map_err(|e| AppError::Config(format!("Invalid url '{}': {}", self.url, e)))?;

        if base.path().trim_end_matches('/').ends_with("/rest") {
            return Ok(base);
        }

        base.join("rest/")
            .map_err(|e| AppError::Config(format!("Invalid url '{}': {}", self.url, e)))
    }

    pub fn rest_url(&self, resource: &str) -> Result<url::Url> {
        self.rest_root()?
            .join(resource.trim_start_matches('/'))
            .map_err(|e| AppError::Config(format!("Invalid resource '{}': {}", resource, e)))
    }

    /// Remote path of a file that belongs to a basin, relative to the data root.
    pub fn remote_path(&self, basin_path: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.data.trim_matches('/'),
            basin_path.trim_matches('/'),
            file_name.trim_start_matches('/')
        )
    }
}

/// Write a blank credentials file with every required key set to "".
///
/// An existing file is left untouched and reported as an error unless
/// `overwrite` is set.
pub fn write_template<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<()> {
    let path = path.as_ref();

    if path.exists() && !overwrite {
        return Err(AppError::Config(format!(
            "{} already exists. Pass --yes to overwrite it.",
            path.display()
        )));
    }

    let template: serde_json::Map<String, serde_json::Value> = REQUIRED_KEYS
        .iter()
        .map(|k| (k.to_string(), serde_json::Value::String(String::new())))
        .collect();

    let mut content = serde_json::to_string_pretty(&template)
        .map_err(|e| AppError::Config(format!("Failed to render template: {}", e)))?;
    content.push('\n');

    std::fs::write(path, content)?;
    tracing::info!("Wrote blank credentials file to {}", path.display());

    Ok(())
}

/// Replace `${VAR}` references in every string value of the document.
fn expand_env_vars(document: &mut serde_json::Value) -> Result<()> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    let mut missing_vars = Vec::new();
    expand_value(document, &re, &mut missing_vars);

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             Set {} in your environment or in a .env file before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            missing_vars.join(", ")
        )));
    }

    Ok(())
}

fn expand_value(value: &mut serde_json::Value, re: &regex_lite::Regex, missing: &mut Vec<String>) {
    match value {
        serde_json::Value::String(text) => {
            let mut result = text.clone();
            for cap in re.captures_iter(text) {
                let var_name = &cap[1];
                match std::env::var(var_name) {
                    Ok(env_value) => {
                        result = result.replace(&cap[0], &env_value);
                    }
                    Err(_) => {
                        if !missing.iter().any(|m| m == var_name) {
                            missing.push(var_name.to_string());
                        }
                    }
                }
            }
            *text = result;
        }
        serde_json::Value::Array(items) => {
            for item in items {
                expand_value(item, re, missing);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                expand_value(item, re, missing);
            }
        }
        _ => {}
    }
}
