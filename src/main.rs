use basin_sync::basin::Basin;
use basin_sync::config::{self, Credentials, DEFAULT_CREDENTIALS_PATH};
use basin_sync::dataset::parse_user_date;
use basin_sync::dispatch::{expand_paths, DataType, TransferJob};
use basin_sync::geoserver::GeoServerClient;
use basin_sync::netcdf_io::NetCdfIo;
use basin_sync::transfer::{self, TransferContext};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "basin-sync", version)]
#[command(
    about = "Moves modeled snowpack, topographic, lidar flight, style and shapefile data between disk and a GeoServer, organized by basin"
)]
struct Args {
    /// File(s) to upload: a modeled snow.nc, a topo.nc, flight rasters, shapefiles or styles
    #[arg(short = 'f', long = "file", num_args = 1..)]
    files: Vec<String>,

    /// Data type: modeled, topographic, flights, styles or shapefiles
    #[arg(short = 't', long = "type", default_value = "modeled")]
    data_type: String,

    /// Basin name, which is also the GeoServer workspace
    #[arg(short, long)]
    basin: Option<String>,

    /// JSON file with GeoServer credentials
    #[arg(
        short,
        long,
        default_value = DEFAULT_CREDENTIALS_PATH,
        env = "BASIN_SYNC_CREDENTIALS"
    )]
    credentials: PathBuf,

    /// netCDF with a `mask` variable applied to modeled data before upload
    #[arg(short, long)]
    mask: Option<PathBuf>,

    /// EPSG code to attach when a netCDF has no projection information
    #[arg(short, long)]
    epsg: Option<u32>,

    /// Download the modeled file for this date instead of uploading
    #[arg(short, long, value_name = "DATE")]
    download: Option<String>,

    /// Directory downloads are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Write a blank credentials file to fill out
    #[arg(long = "write_json", alias = "write-json")]
    write_json: bool,

    /// Answer yes to overwrite prompts (currently: replacing an existing credentials file)
    #[arg(short = 'y', long)]
    yes: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Keep the staging directory of rewritten files for inspection
    #[arg(long)]
    keep_temp: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_filter = if args.debug {
        "info,basin_sync=debug"
    } else {
        "info,basin_sync=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("basin-sync v{}", env!("CARGO_PKG_VERSION"));

    if args.write_json {
        config::write_template(&args.credentials, args.yes)?;
        return Ok(());
    }

    let credentials = Credentials::load(&args.credentials).map_err(|e| {
        anyhow::anyhow!(
            "{}\n\n\
             Make sure:\n\
             1. {} exists (create one with --write_json)\n\
             2. url, geoserver_username, geoserver_password and data are all filled in",
            e,
            args.credentials.display()
        )
    })?;
    info!("GeoServer: {}", credentials.rest_root()?);

    let data_type: DataType = args.data_type.parse()?;
    let basin = args.basin.as_deref().map(str::parse::<Basin>).transpose()?;

    let mut job = match &args.download {
        Some(date) => {
            let basin = basin.ok_or_else(|| anyhow::anyhow!("--download requires -b/--basin"))?;
            TransferJob::download(data_type, basin, parse_user_date(date)?)
        }
        None => TransferJob::upload(data_type, basin, expand_paths(&args.files)?),
    };
    if let Some(mask) = args.mask {
        job = job.with_mask(mask);
    }
    if let Some(epsg) = args.epsg {
        job = job.with_epsg(epsg);
    }

    let client = GeoServerClient::new(&credentials)?;
    let datasets = NetCdfIo;
    let staging = tempfile::Builder::new().prefix("basin-sync-").tempdir()?;

    let ctx = TransferContext {
        credentials: &credentials,
        server: &client,
        datasets: &datasets,
        staging_dir: staging.path(),
        output_dir: &args.output,
    };

    let result = transfer::run(job, &ctx).await;

    if args.keep_temp {
        let kept = staging.keep();
        info!("Kept staging files in {}", kept.display());
    }

    let report = result?;
    if !report.warnings.is_empty() {
        warn!("Completed with {} warning(s)", report.warnings.len());
    }
    for layer in &report.layers {
        info!("Published layer {}", layer);
    }
    for style in &report.styles {
        info!("Published style {}", style);
    }
    info!("Complete!");

    Ok(())
}
