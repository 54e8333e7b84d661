use super::models::{names_from_listing, Coverage, CoverageStore, DataStore, FeatureType};
use super::MapServer;
use crate::config::Credentials;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const SLD_CONTENT_TYPE: &str = "application/vnd.ogc.sld+xml";

enum Payload<'a> {
    Empty,
    Json(&'a Value),
    Raw(&'a [u8], &'a str),
}

/// REST client for a GeoServer instance.
pub struct GeoServerClient {
    client: Client,
    credentials: Credentials,
    retry_base_delay: Duration,
}

impl GeoServerClient {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        // fail on a bad url before building anything
        credentials.rest_root()?;

        let client = Client::builder()
            .user_agent(concat!("basin-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(credentials.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            credentials: credentials.clone(),
            retry_base_delay: Duration::from_secs(1),
        })
    }

    /// First retry delay; later retries double it.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    fn build(&self, method: &Method, url: &url::Url, payload: &Payload<'_>) -> RequestBuilder {
        let request = self
            .client
            .request(method.clone(), url.clone())
            .basic_auth(
                &self.credentials.geoserver_username,
                Some(&self.credentials.geoserver_password),
            )
            .header(ACCEPT, "application/json");

        match payload {
            Payload::Empty => request,
            Payload::Json(value) => request.json(value),
            Payload::Raw(body, content_type) => request
                .header(CONTENT_TYPE, *content_type)
                .body(body.to_vec()),
        }
    }

    /// Send a request, retrying idempotent methods on transient failures.
    ///
    /// Any status other than a 5xx is handed back to the caller to interpret.
    async fn send(&self, method: Method, resource: &str, payload: Payload<'_>) -> Result<Response> {
        let url = self.credentials.rest_url(resource)?;
        debug!("{} request to {}", method, url);

        let max_retries = if method == Method::POST {
            0
        } else {
            self.credentials.max_retries
        };

        let result = retry_with_backoff(max_retries, self.retry_base_delay, || {
            let request = self.build(&method, &url, &payload);
            async move {
                let response = request.send().await?;
                if response.status().is_server_error() {
                    if let Err(e) = response.error_for_status_ref() {
                        return Err(AppError::Http(e));
                    }
                }
                Ok(response)
            }
        })
        .await;

        result.map_err(|e| match e {
            AppError::Http(err) if err.status().is_some() => AppError::RemoteTransfer(format!(
                "{} {} returned {}",
                method,
                resource,
                err.status().map(|s| s.to_string()).unwrap_or_default()
            )),
            other => other,
        })
    }

    async fn delete_if_exists(&self, resource: &str) -> Result<bool> {
        let response = self.send(Method::DELETE, resource, Payload::Empty).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{} did not exist, nothing to delete", resource);
            return Ok(false);
        }
        ensure_success(Method::DELETE, resource, response).await?;
        Ok(true)
    }

    async fn post_json(&self, resource: &str, payload: &Value) -> Result<()> {
        debug!("Payload: {}", payload);
        let response = self.send(Method::POST, resource, Payload::Json(payload)).await?;
        ensure_success(Method::POST, resource, response).await?;
        Ok(())
    }

    async fn get_json(&self, resource: &str) -> Result<Value> {
        let response = self.send(Method::GET, resource, Payload::Empty).await?;
        let response = ensure_success(Method::GET, resource, response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MapServer for GeoServerClient {
    async fn workspace_exists(&self, workspace: &str) -> Result<bool> {
        let resource = format!("workspaces/{}.json", workspace);
        let response = self.send(Method::GET, &resource, Payload::Empty).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(Method::GET, &resource, response).await?;
        Ok(true)
    }

    async fn create_workspace(&self, workspace: &str) -> Result<()> {
        let payload = json!({ "workspace": { "name": workspace } });
        self.post_json("workspaces", &payload).await
    }

    async fn upload_file(&self, remote_path: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let resource = format!("resource/{}", remote_path.trim_start_matches('/'));
        info!("Uploading {} bytes to {}", body.len(), remote_path);
        let response = self
            .send(Method::PUT, &resource, Payload::Raw(&body, content_type))
            .await?;
        ensure_success(Method::PUT, &resource, response).await?;
        Ok(())
    }

    async fn replace_coverage_store(&self, workspace: &str, store: &CoverageStore) -> Result<()> {
        let existing = format!(
            "workspaces/{}/coveragestores/{}?recurse=true",
            workspace, store.name
        );
        if self.delete_if_exists(&existing).await? {
            info!("Replaced existing coverage store {}:{}", workspace, store.name);
        }

        let resource = format!("workspaces/{}/coveragestores.json", workspace);
        self.post_json(&resource, &store.to_payload(workspace)).await
    }

    async fn replace_coverage(&self, workspace: &str, store: &str, coverage: &Coverage) -> Result<()> {
        let existing = format!("workspaces/{}/layers/{}?recurse=true", workspace, coverage.name);
        if self.delete_if_exists(&existing).await? {
            info!("Replaced existing layer {}:{}", workspace, coverage.name);
        }

        let resource = format!(
            "workspaces/{}/coveragestores/{}/coverages.json",
            workspace, store
        );
        self.post_json(&resource, &coverage.to_payload(workspace, store))
            .await
    }

    async fn replace_datastore(&self, workspace: &str, store: &DataStore) -> Result<()> {
        let existing = format!(
            "workspaces/{}/datastores/{}?recurse=true",
            workspace, store.name
        );
        if self.delete_if_exists(&existing).await? {
            info!("Replaced existing datastore {}:{}", workspace, store.name);
        }

        let resource = format!("workspaces/{}/datastores.json", workspace);
        self.post_json(&resource, &store.to_payload(workspace)).await
    }

    async fn replace_feature_type(
        &self,
        workspace: &str,
        store: &str,
        feature_type: &FeatureType,
    ) -> Result<()> {
        let existing = format!(
            "workspaces/{}/layers/{}?recurse=true",
            workspace, feature_type.name
        );
        self.delete_if_exists(&existing).await?;

        let resource = format!(
            "workspaces/{}/datastores/{}/featuretypes.json",
            workspace, store
        );
        self.post_json(&resource, &feature_type.to_payload()).await
    }

    async fn list_layers(&self, workspace: Option<&str>) -> Result<Vec<String>> {
        let resource = match workspace {
            Some(ws) => format!("workspaces/{}/layers.json", ws),
            None => "layers.json".to_string(),
        };
        let listing = self.get_json(&resource).await?;
        Ok(names_from_listing(&listing, "layers", "layer"))
    }

    async fn list_styles(&self) -> Result<Vec<String>> {
        let listing = self.get_json("styles.json").await?;
        Ok(names_from_listing(&listing, "styles", "style"))
    }

    async fn replace_style(&self, name: &str, body: Vec<u8>) -> Result<()> {
        let existing = format!("styles/{}?purge=true", name);
        if self.delete_if_exists(&existing).await? {
            info!("Replaced existing style {}", name);
        }

        let payload = json!({
            "style": { "name": name, "filename": format!("{}.sld", name) }
        });
        self.post_json("styles", &payload).await?;

        let resource = format!("styles/{}", name);
        let response = self
            .send(Method::PUT, &resource, Payload::Raw(&body, SLD_CONTENT_TYPE))
            .await?;
        ensure_success(Method::PUT, &resource, response).await?;
        Ok(())
    }

    async fn set_default_style(&self, workspace: &str, layer: &str, style: &str) -> Result<()> {
        let resource = format!("layers/{}:{}", workspace, layer);
        // the JSON form of this update is ignored by some GeoServer versions
        let body = format!(
            "<layer><defaultStyle><name>{}</name></defaultStyle></layer>",
            style
        );
        let response = self
            .send(Method::PUT, &resource, Payload::Raw(body.as_bytes(), "text/xml"))
            .await?;
        ensure_success(Method::PUT, &resource, response).await?;
        Ok(())
    }

    async fn set_layer_styles(&self, workspace: &str, layer: &str, styles: &[String]) -> Result<()> {
        let resource = format!("layers/{}:{}", workspace, layer);
        let entries: String = styles
            .iter()
            .map(|s| format!("<style><name>{}</name></style>", s))
            .collect();
        let body = format!("<layer><styles>{}</styles></layer>", entries);
        let response = self
            .send(Method::PUT, &resource, Payload::Raw(body.as_bytes(), "text/xml"))
            .await?;
        ensure_success(Method::PUT, &resource, response).await?;
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        let resource = format!("resource/{}", remote_path.trim_start_matches('/'));
        let response = self.send(Method::GET, &resource, Payload::Empty).await?;
        let mut response = ensure_success(Method::GET, &resource, response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        let copied: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                warn!("Failed to remove partial download {}: {}", dest.display(), rm);
            }
            return Err(e);
        }

        info!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

async fn ensure_success(method: Method, resource: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(AppError::RemoteNotFound(resource.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.trim().chars().take(200).collect();
    Err(AppError::RemoteTransfer(format!(
        "{} {} returned {}: {}",
        method, resource, status, body
    )))
}

/// Retry a future with exponential backoff
async fn retry_with_backoff<F, Fut, T>(max_retries: u32, base_delay: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                retries += 1;

                if retries > max_retries {
                    return Err(e);
                }

                // Check if error is transient (retryable)
                let should_retry = match &e {
                    AppError::Http(reqwest_err) => {
                        // Retry on connection errors, timeouts, server errors (5xx)
                        reqwest_err.is_timeout()
                            || reqwest_err.is_connect()
                            || reqwest_err
                                .status()
                                .map(|s| s.is_server_error())
                                .unwrap_or(false)
                    }
                    _ => false,
                };

                if !should_retry {
                    return Err(e);
                }

                let delay = base_delay.saturating_mul(2u32.saturating_pow(retries.saturating_sub(1)));
                warn!(
                    "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                    retries, max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
