#![allow(dead_code)]

use async_trait::async_trait;
use basin_sync::config::Credentials;
use basin_sync::dataset::{AttrValue, Dataset, DatasetIo, Variable};
use basin_sync::error::{AppError, Result};
use basin_sync::geoserver::{Coverage, CoverageStore, DataStore, FeatureType, MapServer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn credentials() -> Credentials {
    Credentials::from_json(
        r#"{
            "url": "https://maps.example.org/geoserver",
            "geoserver_username": "admin",
            "geoserver_password": "geoserver",
            "data": "basins"
        }"#,
    )
    .expect("test credentials are valid")
}

/// Remote catalog as the map server would hold it after a run.
#[derive(Debug, Default)]
pub struct RemoteState {
    pub workspaces: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
    /// (workspace, store) -> store
    pub coverage_stores: BTreeMap<(String, String), CoverageStore>,
    /// (workspace, layer) -> (store, coverage)
    pub coverages: BTreeMap<(String, String), (String, Coverage)>,
    pub datastores: BTreeMap<(String, String), DataStore>,
    pub feature_types: BTreeMap<(String, String), (String, FeatureType)>,
    pub styles: BTreeMap<String, Vec<u8>>,
    /// (workspace, layer) -> style
    pub default_styles: BTreeMap<(String, String), String>,
    /// (workspace, layer) -> extra styles
    pub layer_styles: BTreeMap<(String, String), Vec<String>>,
    /// Every call in order, as `operation target`.
    pub calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryServer {
    pub state: Mutex<RemoteState>,
    /// Style names whose upload fails with a transfer error.
    pub failing_styles: BTreeSet<String>,
}

impl InMemoryServer {
    pub fn with_layers(workspace: &str, layers: &[&str]) -> Self {
        let server = Self::default();
        {
            let mut state = server.state.lock().unwrap();
            state.workspaces.insert(workspace.to_string());
            for layer in layers {
                state.coverages.insert(
                    (workspace.to_string(), layer.to_string()),
                    (
                        "existing".to_string(),
                        Coverage {
                            name: layer.to_string(),
                            native_name: layer.to_string(),
                            title: layer.to_string(),
                            range: None,
                        },
                    ),
                );
            }
        }
        server
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn coverage(&self, workspace: &str, layer: &str) -> Option<(String, Coverage)> {
        self.state
            .lock()
            .unwrap()
            .coverages
            .get(&(workspace.to_string(), layer.to_string()))
            .cloned()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl MapServer for InMemoryServer {
    async fn workspace_exists(&self, workspace: &str) -> Result<bool> {
        self.record(format!("workspace_exists {}", workspace));
        Ok(self.state.lock().unwrap().workspaces.contains(workspace))
    }

    async fn create_workspace(&self, workspace: &str) -> Result<()> {
        self.record(format!("create_workspace {}", workspace));
        self.state
            .lock()
            .unwrap()
            .workspaces
            .insert(workspace.to_string());
        Ok(())
    }

    async fn upload_file(&self, remote_path: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.record(format!("upload_file {}", remote_path));
        self.state
            .lock()
            .unwrap()
            .files
            .insert(remote_path.to_string(), body);
        Ok(())
    }

    async fn replace_coverage_store(&self, workspace: &str, store: &CoverageStore) -> Result<()> {
        self.record(format!("replace_coverage_store {}:{}", workspace, store.name));
        let mut state = self.state.lock().unwrap();
        // recursive delete takes the store's layers with it
        state
            .coverages
            .retain(|(ws, _), (s, _)| !(ws == workspace && *s == store.name));
        state
            .coverage_stores
            .insert((workspace.to_string(), store.name.clone()), store.clone());
        Ok(())
    }

    async fn replace_coverage(&self, workspace: &str, store: &str, coverage: &Coverage) -> Result<()> {
        self.record(format!("replace_coverage {}:{}", workspace, coverage.name));
        let key = (workspace.to_string(), coverage.name.clone());
        let mut state = self.state.lock().unwrap();
        // recursive layer delete drops its style settings too
        state.default_styles.remove(&key);
        state.layer_styles.remove(&key);
        state
            .coverages
            .insert(key, (store.to_string(), coverage.clone()));
        Ok(())
    }

    async fn replace_datastore(&self, workspace: &str, store: &DataStore) -> Result<()> {
        self.record(format!("replace_datastore {}:{}", workspace, store.name));
        self.state
            .lock()
            .unwrap()
            .datastores
            .insert((workspace.to_string(), store.name.clone()), store.clone());
        Ok(())
    }

    async fn replace_feature_type(
        &self,
        workspace: &str,
        store: &str,
        feature_type: &FeatureType,
    ) -> Result<()> {
        self.record(format!(
            "replace_feature_type {}:{}",
            workspace, feature_type.name
        ));
        self.state.lock().unwrap().feature_types.insert(
            (workspace.to_string(), feature_type.name.clone()),
            (store.to_string(), feature_type.clone()),
        );
        Ok(())
    }

    async fn list_layers(&self, workspace: Option<&str>) -> Result<Vec<String>> {
        self.record(format!("list_layers {}", workspace.unwrap_or("*")));
        let state = self.state.lock().unwrap();
        Ok(state
            .coverages
            .keys()
            .chain(state.feature_types.keys())
            .filter(|(ws, _)| workspace.map_or(true, |w| w == ws))
            .map(|(ws, name)| format!("{}:{}", ws, name))
            .collect())
    }

    async fn list_styles(&self) -> Result<Vec<String>> {
        self.record("list_styles".to_string());
        Ok(self.state.lock().unwrap().styles.keys().cloned().collect())
    }

    async fn replace_style(&self, name: &str, body: Vec<u8>) -> Result<()> {
        self.record(format!("replace_style {}", name));
        if self.failing_styles.contains(name) {
            return Err(AppError::RemoteTransfer(format!(
                "POST styles returned 500 Internal Server Error: {}",
                name
            )));
        }
        self.state
            .lock()
            .unwrap()
            .styles
            .insert(name.to_string(), body);
        Ok(())
    }

    async fn set_default_style(&self, workspace: &str, layer: &str, style: &str) -> Result<()> {
        self.record(format!("set_default_style {}:{} {}", workspace, layer, style));
        self.state
            .lock()
            .unwrap()
            .default_styles
            .insert((workspace.to_string(), layer.to_string()), style.to_string());
        Ok(())
    }

    async fn set_layer_styles(&self, workspace: &str, layer: &str, styles: &[String]) -> Result<()> {
        self.record(format!("set_layer_styles {}:{}", workspace, layer));
        self.state
            .lock()
            .unwrap()
            .layer_styles
            .insert((workspace.to_string(), layer.to_string()), styles.to_vec());
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        self.record(format!("download_file {}", remote_path));
        let body = self
            .state
            .lock()
            .unwrap()
            .files
            .get(remote_path)
            .cloned()
            .ok_or_else(|| AppError::RemoteNotFound(format!("resource/{}", remote_path)))?;
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

/// Datasets keyed by path. Writes also put the dataset as JSON on disk so
/// handlers can read the staged bytes back.
#[derive(Debug, Default)]
pub struct MemoryDatasets {
    datasets: Mutex<HashMap<PathBuf, Dataset>>,
}

impl MemoryDatasets {
    /// Register `dataset` under `dir/name` and create a placeholder file there.
    pub fn fixture(&self, dir: &Path, name: &str, dataset: Dataset) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("placeholder for {}", name)).unwrap();
        self.datasets.lock().unwrap().insert(path.clone(), dataset);
        path
    }

    pub fn written(&self, path: &Path) -> Option<Dataset> {
        self.datasets.lock().unwrap().get(path).cloned()
    }
}

impl DatasetIo for MemoryDatasets {
    fn read(&self, path: &Path) -> Result<Dataset> {
        self.datasets
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::Dataset(format!("no fixture for {}", path.display())))
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(dataset).map_err(|e| AppError::Dataset(e.to_string()))?;
        std::fs::write(path, json)?;
        self.datasets
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), dataset.clone());
        Ok(())
    }
}

/// 2x3 grid with coordinates; `variables` are filled with `value` over `[time, y, x]`.
pub fn grid_dataset(variables: &[&str], value: f64, time_units: Option<&str>) -> Dataset {
    let mut ds = Dataset::default();
    ds.dims.insert("x".into(), 3);
    ds.dims.insert("y".into(), 2);
    ds.dims.insert("time".into(), 1);
    ds.variables
        .insert("x".into(), Variable::new(&["x"], &[3], vec![0.0, 50.0, 100.0]));
    ds.variables
        .insert("y".into(), Variable::new(&["y"], &[2], vec![500.0, 450.0]));

    if let Some(units) = time_units {
        let mut time = Variable::new(&["time"], &[1], vec![0.0]);
        time.attrs
            .insert("units".into(), AttrValue::Text(units.to_string()));
        ds.variables.insert("time".into(), time);
    }

    for (i, name) in variables.iter().enumerate() {
        let values = (0..6).map(|c| value + (i * 6 + c) as f64).collect();
        ds.variables.insert(
            name.to_string(),
            Variable::new(&["time", "y", "x"], &[1, 2, 3], values),
        );
    }
    ds
}

/// Mask file dataset over the same grid as [`grid_dataset`].
pub fn mask_dataset(include: [f64; 6]) -> Dataset {
    let mut ds = grid_dataset(&[], 0.0, None);
    ds.dims.remove("time");
    ds.variables.insert(
        "mask".into(),
        Variable::new(&["y", "x"], &[2, 3], include.to_vec()),
    );
    ds
}
