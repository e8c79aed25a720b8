#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tests whether candidate building rectangles fit inside parcel
//! buildable-area polygons.
//!
//! Each polygon is rasterized onto a 1-meter grid ([`raster`]) at a
//! series of rotations and scanned for an all-set block of each target
//! size ([`fit`]). Polygons come from a [`source::PolygonSource`] and are
//! fanned out over a [`urban_batch_pool`] worker pool; one CSV row per
//! polygon is written in completion order.

pub mod fit;
pub mod raster;
pub mod source;

use std::io::Write;

use urban_batch_models::{
    DEFAULT_DIMENSIONS, DEFAULT_ROTATIONS_DEG, FitDimension, FitRow, PolygonRecord,
};
use urban_batch_pool::progress::ProgressCallback;
use urban_batch_pool::{Feeder, PoolConfig, PoolError};

pub use fit::{FitTester, fits, rect_fit, rot_fit};
pub use raster::Mask;
pub use source::{GeoJsonSeqSource, PolygonSource, PostgisOptions, PostgisSource};

/// Errors from polygon sources and rectangle-fit runs.
#[derive(Debug, thiserror::Error)]
pub enum FootprintError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// GeoJSON parse or conversion error.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Database error.
    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// Worker pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// A source record could not be turned into a polygon record.
    #[error("Invalid record {position}: {message}")]
    InvalidRecord {
        /// 1-based line or row number within the source.
        position: u64,
        message: String,
    },

    /// A geometry type other than `Polygon` or `MultiPolygon`.
    #[error("Unsupported geometry type '{0}'")]
    UnsupportedGeometry(String),

    /// A table name that is not a plain identifier.
    #[error("Invalid table name '{0}'")]
    InvalidTable(String),

    /// A non-positive portal page size.
    #[error("Invalid page size {0}")]
    InvalidPageSize(i32),

    /// No target dimensions were configured.
    #[error("At least one fit dimension is required")]
    NoDimensions,
}

/// Target rectangles and the rotations tried for each polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub dimensions: Vec<FitDimension>,
    /// Counter-clockwise degrees.
    pub rotations_deg: Vec<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS.to_vec(),
            rotations_deg: DEFAULT_ROTATIONS_DEG.to_vec(),
        }
    }
}

/// Counts from a finished rectangle-fit run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimFitSummary {
    /// Polygons processed.
    pub polygons: u64,
    /// Polygons that fit each dimension, in [`FitConfig::dimensions`] order.
    pub fitted: Vec<u64>,
}

/// Per-worker context: the fit tables plus a reusable rasterizer.
pub struct FitWorker<'a> {
    config: &'a FitConfig,
    tester: FitTester,
}

impl<'a> FitWorker<'a> {
    #[must_use]
    pub fn new(config: &'a FitConfig) -> Self {
        Self {
            config,
            tester: FitTester::default(),
        }
    }

    /// Fit vector for one polygon record.
    ///
    /// # Errors
    ///
    /// Never fails; fitting has no error path.
    pub fn fit_record(&mut self, record: PolygonRecord) -> Result<FitRow, FootprintError> {
        let fits = self.tester.rot_fit(
            record.geometry.as_ref(),
            &self.config.dimensions,
            &self.config.rotations_deg,
        );
        Ok(FitRow {
            gid: record.gid,
            apn: record.apn,
            fits,
        })
    }
}

/// Runs the rectangle-fit test over every polygon from `source` and
/// streams `gid,apn,<dimension...>` rows to `writer`.
///
/// The header is written first. Rows arrive in completion order and the
/// writer is flushed after each one.
///
/// # Errors
///
/// Returns the first error from the source, the pool, or the writer.
/// Rows written before the error stay in the output.
pub fn run_dim_fit<S: PolygonSource, W: Write>(
    mut source: S,
    config: &FitConfig,
    pool_config: &PoolConfig,
    writer: W,
    progress: &dyn ProgressCallback,
) -> Result<DimFitSummary, FootprintError> {
    if config.dimensions.is_empty() {
        return Err(FootprintError::NoDimensions);
    }

    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(FitRow::header(&config.dimensions))?;
    csv.flush()?;

    if let Some(total) = source.total()? {
        progress.set_total(total);
        log::info!(
            "Fitting {total} polygons over {} workers",
            pool_config.workers
        );
    }

    let mut summary = DimFitSummary {
        fitted: vec![0; config.dimensions.len()],
        ..DimFitSummary::default()
    };

    let stats = urban_batch_pool::run(
        pool_config,
        move |feeder: &mut Feeder<PolygonRecord>| {
            source.stream(&mut |record| {
                feeder.push(record)?;
                Ok(())
            })
        },
        |_| Ok(FitWorker::new(config)),
        FitWorker::fit_record,
        |row: FitRow| {
            csv.write_record(row.to_record())?;
            csv.flush()?;
            for (count, fit) in summary.fitted.iter_mut().zip(&row.fits) {
                *count += u64::from(*fit);
            }
            Ok(())
        },
        progress,
    )?;

    csv.flush()?;
    summary.polygons = stats.completed;

    progress.finish(format!("{} polygons", stats.completed));
    for (dim, count) in config.dimensions.iter().zip(&summary.fitted) {
        log::info!("{}: {count} of {} polygons fit", dim.name, stats.completed);
    }

    Ok(summary)
}
