#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Density percentiles along every straight tract-to-tract route.
//!
//! For every unordered pair of tract centroids, the tracts within 8 km of
//! the straight line between them are bucketed by lateral distance into
//! 2 km bands, and the 25th/50th/75th/95th percentiles of population and
//! job density are written per non-empty band.
//!
//! Pairs are enumerated lazily and fanned out over a
//! [`urban_batch_pool`] worker pool; rows are written in completion order,
//! so consumers must treat the output as an unordered set keyed by
//! `(fromidx, toidx, band)`. [`widen`] reshapes that sparse output into
//! one dense row per ordered pair.

pub mod pairs;
pub mod percentile;
pub mod widen;
pub mod worker;

use std::io::Write;

use urban_batch_models::{Band, BandRow, DEFAULT_BANDS};
use urban_batch_pool::progress::ProgressCallback;
use urban_batch_pool::{Feeder, PoolConfig, PoolError};
use urban_batch_spatial::corridor::DEFAULT_SUBSEGMENT_LENGTH_M;
use urban_batch_spatial::{CorridorOptions, SpatialError, TractIndex};

pub use pairs::TractPairs;
pub use widen::widen;
pub use worker::BandingWorker;

/// Pairs per task batch.
pub const DEFAULT_PAIR_BATCH_SIZE: usize = 100;

/// Errors from banding runs and the wide reshape.
#[derive(Debug, thiserror::Error)]
pub enum BandingError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Tract loading error.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// Worker pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// A pair referenced a tract position outside the index.
    #[error("Unknown tract index {index}")]
    UnknownTract {
        /// The out-of-range position.
        index: usize,
    },

    /// An input row referenced a GEOID that is not in the tract file.
    #[error("Unknown tract GEOID '{0}'")]
    UnknownGeoid(String),

    /// An input row carried a band label that is not configured.
    #[error("Unknown band label '{0}'")]
    UnknownBand(String),

    /// No bands were configured.
    #[error("At least one band is required")]
    NoBands,
}

/// Band edges and index query sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct BandingConfig {
    /// Distance bands, in output order.
    pub bands: Vec<Band>,
    /// Length of each route piece used for index queries, in meters.
    pub subsegment_length_m: f64,
}

impl BandingConfig {
    /// Maximum lateral distance any band reaches, in meters.
    #[must_use]
    pub fn max_distance_m(&self) -> f64 {
        self.bands.iter().map(Band::high_m).fold(0.0, f64::max)
    }

    /// Corridor query sizing derived from the bands.
    #[must_use]
    pub fn corridor_options(&self) -> CorridorOptions {
        CorridorOptions {
            subsegment_length_m: self.subsegment_length_m,
            max_distance_m: self.max_distance_m(),
        }
    }
}

impl Default for BandingConfig {
    fn default() -> Self {
        Self {
            bands: DEFAULT_BANDS.to_vec(),
            subsegment_length_m: DEFAULT_SUBSEGMENT_LENGTH_M,
        }
    }
}

/// Counts from a finished along-route run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlongRouteSummary {
    /// Tract pairs processed.
    pub pairs: u64,
    /// Band rows written.
    pub rows: u64,
}

/// Bands every unordered tract pair and streams the rows to `writer` as
/// CSV.
///
/// The header is written first, even when no pair produces a row. Rows
/// arrive in completion order and the writer is flushed after each pair.
///
/// # Errors
///
/// Returns the first error from the pool, a worker, or the writer. Rows
/// written before the error stay in the output.
pub fn run_along_route<W: Write>(
    index: &TractIndex,
    config: &BandingConfig,
    pool_config: &PoolConfig,
    writer: W,
    progress: &dyn ProgressCallback,
) -> Result<AlongRouteSummary, BandingError> {
    if config.bands.is_empty() {
        return Err(BandingError::NoBands);
    }

    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(BandRow::HEADER)?;
    csv.flush()?;

    let total = TractPairs::new(index.len()).remaining();
    progress.set_total(total);
    log::info!(
        "Banding {total} tract pairs over {} workers",
        pool_config.workers
    );

    let tract_count = index.len();
    let mut rows_written = 0_u64;

    let stats = urban_batch_pool::run(
        pool_config,
        |feeder: &mut Feeder<(usize, usize)>| {
            for pair in TractPairs::new(tract_count) {
                feeder.push(pair)?;
            }
            Ok(())
        },
        |_| Ok(BandingWorker::new(index, config)),
        BandingWorker::band_item,
        |rows: Vec<BandRow>| {
            for row in &rows {
                csv.serialize(row)?;
            }
            csv.flush()?;
            rows_written += rows.len() as u64;
            Ok(())
        },
        progress,
    )?;

    csv.flush()?;
    progress.finish(format!(
        "{} pairs, {rows_written} band rows",
        stats.completed
    ));
    log::info!(
        "Along-route banding complete: {} pairs, {rows_written} rows",
        stats.completed
    );

    Ok(AlongRouteSummary {
        pairs: stats.completed,
        rows: rows_written,
    })
}
