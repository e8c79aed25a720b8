//! Per-pair banding computation.

use urban_batch_models::{Band, BandRow, PERCENTILES};
use urban_batch_spatial::{TractIndex, distance_to_segment};

use crate::percentile::percentiles;
use crate::{BandingConfig, BandingError};

/// Per-worker context: a handle to the shared tract index plus scratch
/// buffers reused across pairs.
pub struct BandingWorker<'a> {
    index: &'a TractIndex,
    config: &'a BandingConfig,
    candidates: Vec<usize>,
    pop: Vec<Vec<f64>>,
    job: Vec<Vec<f64>>,
}

impl<'a> BandingWorker<'a> {
    #[must_use]
    pub fn new(index: &'a TractIndex, config: &'a BandingConfig) -> Self {
        let bands = config.bands.len();
        Self {
            index,
            config,
            candidates: Vec::new(),
            pop: vec![Vec::new(); bands],
            job: vec![Vec::new(); bands],
        }
    }

    /// Summarizes the tracts along the straight route between two tracts.
    ///
    /// Returns one row per band that holds at least one tract; a pair
    /// with nothing in range yields no rows. Each candidate lands in the
    /// first band containing its distance to the route, or in none.
    ///
    /// # Errors
    ///
    /// Returns [`BandingError::UnknownTract`] if either position is out
    /// of range for the index.
    pub fn band_pair(&mut self, from: usize, to: usize) -> Result<Vec<BandRow>, BandingError> {
        let index = self.index;
        let from_tract = index
            .get(from)
            .ok_or(BandingError::UnknownTract { index: from })?;
        let to_tract = index
            .get(to)
            .ok_or(BandingError::UnknownTract { index: to })?;
        let (a, b) = (from_tract.coords(), to_tract.coords());

        index.corridor_candidates(
            a,
            b,
            &self.config.corridor_options(),
            &mut self.candidates,
        );
        if self.candidates.is_empty() {
            return Ok(Vec::new());
        }

        for values in self.pop.iter_mut().chain(self.job.iter_mut()) {
            values.clear();
        }

        for &candidate in &self.candidates {
            let Some(tract) = index.get(candidate) else {
                continue;
            };
            let distance = distance_to_segment(tract.coords(), a, b);
            if let Some(slot) = band_slot(&self.config.bands, distance) {
                self.pop[slot].push(tract.pop_dens_sqkm);
                self.job[slot].push(tract.job_dens_sqkm);
            }
        }

        let mut rows = Vec::new();
        for (slot, band) in self.config.bands.iter().enumerate() {
            let (Some(pop), Some(job)) = (
                percentiles(&mut self.pop[slot], &PERCENTILES),
                percentiles(&mut self.job[slot], &PERCENTILES),
            ) else {
                continue;
            };
            rows.push(BandRow::new(from_tract, to_tract, *band, pop, job));
        }

        Ok(rows)
    }

    /// Pool entry point for one `(from, to)` work item.
    ///
    /// # Errors
    ///
    /// See [`Self::band_pair`].
    pub fn band_item(&mut self, (from, to): (usize, usize)) -> Result<Vec<BandRow>, BandingError> {
        self.band_pair(from, to)
    }
}

fn band_slot(bands: &[Band], distance_m: f64) -> Option<usize> {
    bands.iter().position(|band| band.contains(distance_m))
}
