//! Argument sets and runners shared by the subcommands and the
//! interactive menu.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use urban_batch_banding::{BandingConfig, DEFAULT_PAIR_BATCH_SIZE};
use urban_batch_cli_utils::{IndicatifProgress, MultiProgress};
use urban_batch_footprint::source::{DEFAULT_PAGE_SIZE, DEFAULT_SRID, DEFAULT_TABLE};
use urban_batch_footprint::{FitConfig, GeoJsonSeqSource, PostgisOptions, PostgisSource};
use urban_batch_pool::{DEFAULT_QUEUE_CAPACITY, PoolConfig, default_workers};
use urban_batch_spatial::corridor::DEFAULT_SUBSEGMENT_LENGTH_M;
use urban_batch_spatial::{TractIndex, TractLoadOptions};

pub const DEFAULT_TRACTS: &str = "tract_centroids_density.json";
pub const DEFAULT_ALONG_ROUTE: &str = "along_route.csv";
pub const DEFAULT_ALONG_ROUTE_WIDE: &str = "along_route_wide.csv";
pub const DEFAULT_DIM_FIT: &str = "dim_fit.csv";

#[derive(Args, Debug, Clone)]
pub struct AlongRouteArgs {
    /// Tract centroid `GeoJSON` (projected, meters)
    #[arg(long, default_value = DEFAULT_TRACTS)]
    pub tracts: PathBuf,
    /// Output CSV
    #[arg(long, default_value = DEFAULT_ALONG_ROUTE)]
    pub output: PathBuf,
    /// Worker threads (default: available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Tract pairs per task
    #[arg(long, default_value_t = DEFAULT_PAIR_BATCH_SIZE)]
    pub chunk_size: usize,
    /// Bound on queued tasks and on queued results
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Route piece length for index queries, in meters
    #[arg(long, default_value_t = DEFAULT_SUBSEGMENT_LENGTH_M)]
    pub subsegment_length: f64,
    /// Zero both densities of tracts whose `aland` is below this value
    #[arg(long)]
    pub min_land_area: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct WidenArgs {
    /// Tract centroid `GeoJSON`; fixes the output pair order
    #[arg(long, default_value = DEFAULT_TRACTS)]
    pub tracts: PathBuf,
    /// Along-route CSV to reshape
    #[arg(long, default_value = DEFAULT_ALONG_ROUTE)]
    pub input: PathBuf,
    /// Output CSV, one row per ordered tract pair
    #[arg(long, default_value = DEFAULT_ALONG_ROUTE_WIDE)]
    pub output: PathBuf,
    /// Zero both densities of tracts whose `aland` is below this value
    #[arg(long)]
    pub min_land_area: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct DimFitArgs {
    /// Newline-delimited `GeoJSON` features with `gid` and `apn`
    #[arg(long, conflicts_with = "postgis", required_unless_present = "postgis")]
    pub geojsonseq: Option<PathBuf>,
    /// Read polygons from `PostGIS` (connection from `DATABASE_URL`)
    #[arg(long)]
    pub postgis: bool,
    /// Output CSV
    #[arg(long, default_value = DEFAULT_DIM_FIT)]
    pub output: PathBuf,
    /// `PostGIS` table with `gid`, `apn`, and `geog` columns
    #[arg(long, default_value = DEFAULT_TABLE)]
    pub table: String,
    /// SRID geometries are projected into (must be in meters)
    #[arg(long, default_value_t = DEFAULT_SRID)]
    pub srid: i32,
    /// Rows per portal fetch
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: i32,
    /// Worker threads (default: available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Bound on queued polygons and on queued results
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

/// Loads tracts and writes the along-route CSV.
///
/// # Errors
///
/// Returns an error if tracts cannot be loaded, the output cannot be
/// created, or the run fails.
pub fn along_route(
    args: &AlongRouteArgs,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let index = TractIndex::load(
        &args.tracts,
        TractLoadOptions {
            min_land_area: args.min_land_area,
        },
    )?;
    log::info!(
        "Loaded {} tracts from {}",
        index.len(),
        args.tracts.display()
    );

    let config = BandingConfig {
        subsegment_length_m: args.subsegment_length,
        ..BandingConfig::default()
    };
    let pool = PoolConfig {
        workers: args.workers.unwrap_or_else(default_workers),
        batch_size: args.chunk_size,
        queue_capacity: args.queue_capacity,
    };

    let writer = BufWriter::new(File::create(&args.output)?);
    let progress = IndicatifProgress::items_bar(multi, "Tract pairs");
    let summary =
        urban_batch_banding::run_along_route(&index, &config, &pool, writer, progress.as_ref())?;

    log::info!(
        "Wrote {} band rows for {} pairs to {} in {:.1}s",
        summary.rows,
        summary.pairs,
        args.output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Reshapes along-route output into one row per ordered tract pair.
///
/// # Errors
///
/// Returns an error if either input cannot be read or the output cannot
/// be written.
pub fn widen(args: &WidenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let index = TractIndex::load(
        &args.tracts,
        TractLoadOptions {
            min_land_area: args.min_land_area,
        },
    )?;
    let reader = BufReader::new(File::open(&args.input)?);
    let writer = BufWriter::new(File::create(&args.output)?);

    let summary = urban_batch_banding::widen(
        index.tracts(),
        &BandingConfig::default().bands,
        reader,
        writer,
    )?;

    log::info!(
        "Wrote {} wide rows ({} pairs with data) to {} in {:.1}s",
        summary.rows_written,
        summary.pairs_with_data,
        args.output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Runs the rectangle-fit test over every polygon from the chosen source.
///
/// # Errors
///
/// Returns an error if the source cannot be opened, the output cannot be
/// created, or the run fails.
pub fn dim_fit(args: &DimFitArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let pool = PoolConfig {
        workers: args.workers.unwrap_or_else(default_workers),
        batch_size: 1,
        queue_capacity: args.queue_capacity,
    };
    let config = FitConfig::default();
    let writer = BufWriter::new(File::create(&args.output)?);
    let progress = IndicatifProgress::items_bar(multi, "Parcels");

    let summary = match &args.geojsonseq {
        Some(path) if !args.postgis => {
            let source = GeoJsonSeqSource::open(path)?;
            urban_batch_footprint::run_dim_fit(source, &config, &pool, writer, progress.as_ref())?
        }
        _ => {
            let source = PostgisSource::new(PostgisOptions {
                table: args.table.clone(),
                srid: args.srid,
                page_size: args.page_size,
                ..PostgisOptions::from_env()
            })?;
            urban_batch_footprint::run_dim_fit(source, &config, &pool, writer, progress.as_ref())?
        }
    };

    log::info!(
        "Fit {} polygons to {} in {:.1}s",
        summary.polygons,
        args.output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
