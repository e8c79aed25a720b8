//! Reshapes sparse along-route rows into one dense row per ordered pair.
//!
//! The banding run writes each unordered pair once, and only for bands
//! that hold at least one tract. Models that consume it want a value in
//! every column for every ordered pair, so this step:
//!
//! 1. adds the reversed copy of every row (routes are symmetric),
//! 2. pivots the band rows into `<stat>_<low>_<high>` columns,
//! 3. emits every `(from, to)` of the full tract Cartesian product,
//!    self-pairs included, filling absent values with `-1`.

use std::collections::HashMap;
use std::io::{Read, Write};

use urban_batch_models::{Band, BandRow, DENSITY_MEASURES, PERCENTILES, Tract};

use crate::BandingError;

/// Value written where a band held no tracts.
pub const MISSING_VALUE: f64 = -1.0;

/// Statistics carried per band, in column order.
const STATS_PER_BAND: usize = DENSITY_MEASURES.len() * PERCENTILES.len();

/// Counts from a finished reshape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WidenSummary {
    /// Sparse rows read.
    pub rows_read: u64,
    /// Ordered pairs with at least one non-empty band.
    pub pairs_with_data: usize,
    /// Dense rows written.
    pub rows_written: u64,
}

/// Column names for the wide output, stat-major then band.
#[must_use]
pub fn wide_header(bands: &[Band]) -> Vec<String> {
    let mut header = vec!["from_geoid".to_string(), "to_geoid".to_string()];
    for measure in DENSITY_MEASURES {
        for q in PERCENTILES {
            for band in bands {
                header.push(format!("{measure}_{q}_{}", band.column_suffix()));
            }
        }
    }
    header
}

/// Reads along-route CSV from `reader` and writes the dense wide table to
/// `writer`.
///
/// # Errors
///
/// Returns an error on malformed CSV, on a GEOID missing from `tracts`,
/// or on a band label not in `bands`.
pub fn widen<R: Read, W: Write>(
    tracts: &[Tract],
    bands: &[Band],
    reader: R,
    writer: W,
) -> Result<WidenSummary, BandingError> {
    if bands.is_empty() {
        return Err(BandingError::NoBands);
    }

    let positions: HashMap<&str, usize> = tracts
        .iter()
        .enumerate()
        .map(|(i, t)| (t.geoid.as_str(), i))
        .collect();
    let position = |geoid: &str| {
        positions
            .get(geoid)
            .copied()
            .ok_or_else(|| BandingError::UnknownGeoid(geoid.to_string()))
    };

    let width = STATS_PER_BAND * bands.len();
    let mut table: HashMap<(usize, usize), Vec<f64>> = HashMap::new();
    let mut rows_read = 0_u64;

    let mut csv_reader = csv::Reader::from_reader(reader);
    for record in csv_reader.deserialize::<BandRow>() {
        let row = record?;
        rows_read += 1;

        let band = Band::parse_label(&row.band)
            .and_then(|parsed| bands.iter().position(|b| *b == parsed))
            .ok_or_else(|| BandingError::UnknownBand(row.band.clone()))?;
        let from = position(&row.from_geoid)?;
        let to = position(&row.to_geoid)?;

        let stats = row.pop_percentiles().into_iter().chain(row.job_percentiles());
        for key in [(from, to), (to, from)] {
            let values = table
                .entry(key)
                .or_insert_with(|| vec![MISSING_VALUE; width]);
            for (stat, value) in stats.clone().enumerate() {
                values[stat * bands.len() + band] = value;
            }
        }
    }

    log::info!(
        "Read {rows_read} along-route rows covering {} ordered pairs",
        table.len()
    );

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(wide_header(bands))?;

    let missing = vec![MISSING_VALUE; width];
    let mut record: Vec<String> = Vec::with_capacity(width + 2);
    let mut rows_written = 0_u64;

    for (i, from) in tracts.iter().enumerate() {
        for (j, to) in tracts.iter().enumerate() {
            let values = table.get(&(i, j)).unwrap_or(&missing);
            record.clear();
            record.push(from.geoid.clone());
            record.push(to.geoid.clone());
            record.extend(values.iter().map(ToString::to_string));
            csv_writer.write_record(&record)?;
            rows_written += 1;
        }
    }
    csv_writer.flush()?;

    log::info!("Wrote {rows_written} wide rows");

    Ok(WidenSummary {
        rows_read,
        pairs_with_data: table.len(),
        rows_written,
    })
}
