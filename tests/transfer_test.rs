mod common;

use basin_sync::basin::Basin;
use basin_sync::dataset::{Dataset, Variable};
use basin_sync::dispatch::{DataType, TransferJob};
use basin_sync::error::AppError;
use basin_sync::transfer::{self, TransferContext, TransferReport};
use chrono::NaiveDate;
use common::{credentials, grid_dataset, mask_dataset, InMemoryServer, MemoryDatasets};
use std::path::Path;
use tempfile::TempDir;

const MODEL_VARS: [&str; 3] = ["specific_mass", "thickness", "snow_density"];

struct Harness {
    dir: TempDir,
    staging: TempDir,
    output: TempDir,
    server: InMemoryServer,
    datasets: MemoryDatasets,
}

impl Harness {
    fn new() -> Self {
        Self::with_server(InMemoryServer::default())
    }

    fn with_server(server: InMemoryServer) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            staging: tempfile::tempdir().unwrap(),
            output: tempfile::tempdir().unwrap(),
            server,
            datasets: MemoryDatasets::default(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn touch(&self, name: &str, body: &[u8]) -> std::path::PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    async fn run(&self, job: TransferJob) -> basin_sync::error::Result<TransferReport> {
        let credentials = credentials();
        let ctx = TransferContext {
            credentials: &credentials,
            server: &self.server,
            datasets: &self.datasets,
            staging_dir: self.staging.path(),
            output_dir: self.output.path(),
        };
        transfer::run(job, &ctx).await
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_modeled_upload_publishes_dated_and_latest_layers() {
    let h = Harness::new();
    let file = h
        .datasets
        .fixture(h.path(), "2020-01-01.nc", grid_dataset(&MODEL_VARS, 1.0, None));

    let job = TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![file]);
    let report = h.run(job).await.unwrap();

    let coverage_calls: Vec<String> = h
        .server
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("replace_coverage "))
        .collect();
    assert_eq!(
        coverage_calls,
        vec![
            "replace_coverage brb:swe_20200101",
            "replace_coverage brb:depth_20200101",
            "replace_coverage brb:density_20200101",
            "replace_coverage brb:swe_latest",
            "replace_coverage brb:depth_latest",
            "replace_coverage brb:density_latest",
        ]
    );
    assert_eq!(report.layers.len(), 6);

    let state = h.server.state.lock().unwrap();
    assert!(state.workspaces.contains("brb"));
    assert!(state.files.contains_key("basins/brb/2020-01-01.nc"));

    let (store, swe) = state
        .coverages
        .get(&("brb".to_string(), "swe_latest".to_string()))
        .cloned()
        .unwrap();
    assert_eq!(store, "brb_20200101");
    assert_eq!(swe.native_name, "specific_mass");
    assert_eq!(swe.range, Some((1.0, 6.0)));
}

#[tokio::test]
async fn test_modeled_date_from_time_variable() {
    let h = Harness::new();
    let file = h.datasets.fixture(
        h.path(),
        "snow.nc",
        grid_dataset(&MODEL_VARS, 1.0, Some("hours since 2019-12-31 00:00:00")),
    );

    let job = TransferJob::upload(DataType::Modeled, Some(Basin::Kaweah), vec![file]);
    h.run(job).await.unwrap();

    assert!(h.server.coverage("kaweah", "depth_20191231").is_some());
    assert!(h
        .server
        .state
        .lock()
        .unwrap()
        .files
        .contains_key("basins/kaweah/snow_20191231.nc"));
}

#[tokio::test]
async fn test_modeled_missing_variable_makes_no_calls() {
    let h = Harness::new();
    let file = h.datasets.fixture(
        h.path(),
        "snow.nc",
        grid_dataset(&["specific_mass", "thickness"], 1.0, None),
    );

    let job = TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![file]);
    match h.run(job).await {
        Err(AppError::MissingVariable { variables, .. }) => {
            assert_eq!(variables, vec!["snow_density".to_string()]);
        }
        other => panic!("Expected MissingVariable, got {:?}", other),
    }
    assert!(h.server.calls().is_empty());
}

#[tokio::test]
async fn test_latest_layers_follow_newest_upload() {
    let h = Harness::new();
    let first = h
        .datasets
        .fixture(h.path(), "2020-01-01.nc", grid_dataset(&MODEL_VARS, 1.0, None));
    let second = h
        .datasets
        .fixture(h.path(), "2020-01-02.nc", grid_dataset(&MODEL_VARS, 100.0, None));

    h.run(TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![first]))
        .await
        .unwrap();
    h.run(TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![second]))
        .await
        .unwrap();

    let (store, swe) = h.server.coverage("brb", "swe_latest").unwrap();
    assert_eq!(store, "brb_20200102");
    assert_eq!(swe.range, Some((100.0, 105.0)));
    assert!(h.server.coverage("brb", "swe_20200101").is_some());
    assert!(h.server.coverage("brb", "swe_20200102").is_some());
}

#[tokio::test]
async fn test_latest_layers_use_newest_date_regardless_of_argument_order() {
    let h = Harness::new();
    let newer = h
        .datasets
        .fixture(h.path(), "2020-03-02.nc", grid_dataset(&MODEL_VARS, 50.0, None));
    let older = h
        .datasets
        .fixture(h.path(), "2020-03-01.nc", grid_dataset(&MODEL_VARS, 1.0, None));

    let job = TransferJob::upload(DataType::Modeled, Some(Basin::Lakes), vec![newer, older]);
    h.run(job).await.unwrap();

    let (store, _) = h.server.coverage("lakes", "density_latest").unwrap();
    assert_eq!(store, "lakes_20200302");
}

#[tokio::test]
async fn test_latest_layer_keeps_its_style_across_uploads() {
    let h = Harness::new();
    let first = h
        .datasets
        .fixture(h.path(), "2020-01-01.nc", grid_dataset(&MODEL_VARS, 1.0, None));
    let second = h
        .datasets
        .fixture(h.path(), "2020-01-02.nc", grid_dataset(&MODEL_VARS, 2.0, None));
    let style = h.touch("swe.sld", b"<StyledLayerDescriptor/>");

    h.run(TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![first]))
        .await
        .unwrap();
    h.run(TransferJob::upload(DataType::Styles, Some(Basin::Brb), vec![style]))
        .await
        .unwrap();
    h.run(TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![second]))
        .await
        .unwrap();

    let state = h.server.state.lock().unwrap();
    let style_of = |layer: &str| {
        state
            .default_styles
            .get(&("brb".to_string(), layer.to_string()))
            .cloned()
    };
    assert_eq!(style_of("swe_latest").as_deref(), Some("swe"));
    assert_eq!(style_of("swe_20200102").as_deref(), Some("swe"));
    assert_eq!(style_of("depth_latest").as_deref(), Some("raster"));
    assert_eq!(
        state
            .layer_styles
            .get(&("brb".to_string(), "swe_latest".to_string())),
        Some(&vec!["swe".to_string()])
    );
}

#[tokio::test]
async fn test_masked_upload_blanks_excluded_cells() {
    let h = Harness::new();
    let file = h
        .datasets
        .fixture(h.path(), "snow.nc", grid_dataset(&MODEL_VARS, 1.0, Some("days since 2020-02-01")));
    let mask = h.datasets.fixture(
        h.path(),
        "mask.nc",
        mask_dataset([1.0, 1.0, 0.0, 0.0, 1.0, 1.0]),
    );

    let job = TransferJob::upload(DataType::Modeled, Some(Basin::Merced), vec![file])
        .with_mask(mask);
    let report = h.run(job).await.unwrap();

    let staged = h.staging.path().join("masked_snow_20200201.nc");
    assert_eq!(report.files, vec![staged.clone()]);
    assert!(h
        .server
        .state
        .lock()
        .unwrap()
        .files
        .contains_key("basins/merced/masked_snow_20200201.nc"));

    let written: Dataset = h.datasets.written(&staged).unwrap();
    let swe = written.variable("specific_mass").unwrap();
    assert_eq!(swe.values[0], 1.0);
    assert!(swe.values[2].is_nan() || swe.values[2] == basin_sync::dataset::NO_DATA);
    assert!(swe.values[3].is_nan() || swe.values[3] == basin_sync::dataset::NO_DATA);
    assert_eq!(swe.values[5], 6.0);
}

#[tokio::test]
async fn test_mask_with_other_bounds_makes_no_calls() {
    let h = Harness::new();
    let file = h
        .datasets
        .fixture(h.path(), "2020-01-01.nc", grid_dataset(&MODEL_VARS, 1.0, None));

    let mut shifted = mask_dataset([1.0; 6]);
    shifted
        .variables
        .insert("x".into(), Variable::new(&["x"], &[3], vec![1000.0, 1050.0, 1100.0]));
    let mask = h.datasets.fixture(h.path(), "mask.nc", shifted);

    let job = TransferJob::upload(DataType::Modeled, Some(Basin::Brb), vec![file]).with_mask(mask);
    assert!(matches!(h.run(job).await, Err(AppError::ShapeMismatch(_))));
    assert!(h.server.calls().is_empty());
}

#[tokio::test]
async fn test_download_writes_masked_file() {
    let h = Harness::new();
    h.server
        .state
        .lock()
        .unwrap()
        .files
        .insert("basins/tuolumne/masked_snow_20200401.nc".into(), b"CDF\x01".to_vec());

    let job = TransferJob::download(DataType::Modeled, Basin::Tuolumne, date(2020, 4, 1));
    let report = h.run(job).await.unwrap();

    let dest = h.output.path().join("masked_snow_20200401.nc");
    assert_eq!(report.files, vec![dest.clone()]);
    assert_eq!(std::fs::read(dest).unwrap(), b"CDF\x01");
}

#[tokio::test]
async fn test_download_missing_leaves_no_file() {
    let h = Harness::new();
    let job = TransferJob::download(DataType::Modeled, Basin::Brb, date(1999, 1, 1));

    assert!(matches!(h.run(job).await, Err(AppError::RemoteNotFound(_))));
    assert!(!h.output.path().join("masked_snow_19990101.nc").exists());
}

#[tokio::test]
async fn test_topographic_publishes_each_raster() {
    let h = Harness::new();
    let mut topo = grid_dataset(&[], 0.0, None);
    topo.dims.remove("time");
    topo.variables.insert(
        "dem".into(),
        Variable::new(&["y", "x"], &[2, 3], vec![1200.0, 1300.0, 1250.0, 1400.0, 1500.0, 1350.0]),
    );
    topo.variables.insert(
        "veg_height".into(),
        Variable::new(&["y", "x"], &[2, 3], vec![0.0, 2.0, 5.0, 10.0, 3.0, 1.0]),
    );
    let file = h.datasets.fixture(h.path(), "topo.nc", topo);

    let job = TransferJob::upload(DataType::Topographic, Some(Basin::SanJoaquin), vec![file]);
    let report = h.run(job).await.unwrap();

    assert_eq!(
        report.layers,
        vec!["sanjoaquin:dem", "sanjoaquin:veg_height"]
    );
    let (store, dem) = h.server.coverage("sanjoaquin", "dem").unwrap();
    assert_eq!(store, "sanjoaquin_topo");
    assert_eq!(dem.range, Some((1200.0, 1500.0)));
}

#[tokio::test]
async fn test_topographic_rejects_multiple_files() {
    let h = Harness::new();
    let a = h.datasets.fixture(h.path(), "a.nc", grid_dataset(&[], 0.0, None));
    let b = h.datasets.fixture(h.path(), "b.nc", grid_dataset(&[], 0.0, None));

    let job = TransferJob::upload(DataType::Topographic, Some(Basin::Brb), vec![a, b]);
    assert!(matches!(h.run(job).await, Err(AppError::Config(_))));
    assert!(h.server.calls().is_empty());
}

#[tokio::test]
async fn test_flights_skip_unsupported_formats() {
    let h = Harness::new();
    let tif = h.touch("flight_20200415.tif", b"II*\0");
    let las = h.touch("flight_20200415.las", b"LASF");

    let job = TransferJob::upload(DataType::Flights, Some(Basin::Brb), vec![tif, las]);
    let report = h.run(job).await.unwrap();

    assert_eq!(report.layers, vec!["brb:flight_20200415"]);
    assert!(report.warnings.iter().any(|w| w.contains("experimental")));
    assert!(report.warnings.iter().any(|w| w.contains(".las")));

    let state = h.server.state.lock().unwrap();
    assert!(state
        .files
        .contains_key("basins/brb/flights/flight_20200415.tif"));
    assert!(state
        .coverage_stores
        .contains_key(&("brb".to_string(), "brb_flight_flight_20200415".to_string())));
}

#[tokio::test]
async fn test_flights_all_unsupported_is_an_error() {
    let h = Harness::new();
    let las = h.touch("flight.las", b"LASF");

    let job = TransferJob::upload(DataType::Flights, Some(Basin::Brb), vec![las]);
    assert!(matches!(h.run(job).await, Err(AppError::NotImplemented(_))));
    assert!(h.server.calls().is_empty());
}

#[tokio::test]
async fn test_styles_associate_and_continue_past_failures() {
    let mut server = InMemoryServer::with_layers("brb", &["swe_20200101", "swe_latest", "depth_latest"]);
    server.failing_styles.insert("depth".to_string());
    let h = Harness::with_server(server);

    let swe = h.touch("swe.sld", b"<StyledLayerDescriptor/>");
    let depth = h.touch("depth.sld", b"<StyledLayerDescriptor/>");
    let rainbow = h.touch("rainbow.sld", b"<StyledLayerDescriptor/>");

    let job = TransferJob::upload(DataType::Styles, Some(Basin::Brb), vec![swe, depth, rainbow]);
    let report = h.run(job).await.unwrap();

    assert_eq!(report.styles, vec!["swe", "rainbow"]);
    assert!(report.warnings.iter().any(|w| w.contains("depth.sld")));
    assert!(report.warnings.iter().any(|w| w.contains("rainbow")));

    let state = h.server.state.lock().unwrap();
    assert_eq!(state.default_styles.len(), 1);
    assert_eq!(
        state
            .default_styles
            .get(&("brb".to_string(), "swe_latest".to_string())),
        Some(&"swe".to_string())
    );
}

#[tokio::test]
async fn test_shapefile_incomplete_makes_no_calls() {
    let h = Harness::new();
    let shp = h.touch("outline.shp", b"x");
    h.touch("outline.dbf", b"x");

    let job = TransferJob::upload(DataType::Shapefiles, Some(Basin::Brb), vec![shp]);
    match h.run(job).await {
        Err(AppError::IncompleteShapefile { missing, .. }) => {
            assert_eq!(missing, vec![".shx".to_string(), ".prj".to_string()]);
        }
        other => panic!("Expected IncompleteShapefile, got {:?}", other),
    }
    assert!(h.server.calls().is_empty());
}

#[tokio::test]
async fn test_shapefile_bundle_uploaded() {
    let h = Harness::new();
    for ext in ["shp", "shx", "dbf", "prj"] {
        h.touch(&format!("outline.{}", ext), b"x");
    }

    let job = TransferJob::upload(
        DataType::Shapefiles,
        Some(Basin::Kaweah),
        vec![h.path().join("outline.shp")],
    );
    let report = h.run(job).await.unwrap();

    assert_eq!(report.layers, vec!["kaweah:outline"]);
    assert_eq!(report.files.len(), 4);

    let state = h.server.state.lock().unwrap();
    assert!(state.files.contains_key("basins/kaweah/outline/outline.prj"));
    let store = state
        .datastores
        .get(&("kaweah".to_string(), "kaweah_outline".to_string()))
        .unwrap();
    assert_eq!(store.shapefile, "basins/kaweah/outline/outline.shp");
}

#[tokio::test]
async fn test_missing_basin_rejected_before_any_call() {
    let h = Harness::new();
    let file = h
        .datasets
        .fixture(h.path(), "2020-01-01.nc", grid_dataset(&MODEL_VARS, 1.0, None));

    let job = TransferJob::upload(DataType::Modeled, None, vec![file]);
    let err = h.run(job).await.unwrap_err();
    assert!(err.is_validation());
    assert!(h.server.calls().is_empty());
}
