#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the `urban_batch` tools.
//!
//! This crate contains only data types, constant tables, and simple
//! conversions. It has no I/O and no heavyweight dependencies beyond the
//! `geo` geometry types carried by [`PolygonRecord`].

use std::fmt;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Percentiles summarized for every non-empty band, in column order.
pub const PERCENTILES: [f64; 4] = [25.0, 50.0, 75.0, 95.0];

/// Density measures summarized per band, in column order.
pub const DENSITY_MEASURES: [&str; 2] = ["pop_dens_sqkm", "job_dens_sqkm"];

/// Distance bands around a route, in kilometers.
pub const DEFAULT_BANDS: [Band; 4] = [
    Band::new(0, 2),
    Band::new(2, 4),
    Band::new(4, 6),
    Band::new(6, 8),
];

/// Target building rectangles tested against each parcel footprint.
pub const DEFAULT_DIMENSIONS: [FitDimension; 3] = [
    FitDimension::new("fit_sfh_duplex", 12, 10),
    FitDimension::new("fit_fourplex", 16, 11),
    FitDimension::new("fit_sixplex", 21, 10),
];

/// Rotations tried by the rectangle-fit test. Only a quarter turn is
/// needed because both orientations of each rectangle are checked.
pub const DEFAULT_ROTATIONS_DEG: [f64; 6] = [0.0, 15.0, 30.0, 45.0, 60.0, 75.0];

/// A census tract centroid with its density attributes.
///
/// Coordinates are projected and in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct Tract {
    /// 0-based position in the input file. `fromidx`/`toidx` refer to it.
    pub index: usize,
    /// Census GEOID (e.g. "06037101110").
    pub geoid: String,
    /// Centroid easting.
    pub x: f64,
    /// Centroid northing.
    pub y: f64,
    /// Residents per square kilometer.
    pub pop_dens_sqkm: f64,
    /// Jobs per square kilometer.
    pub job_dens_sqkm: f64,
    /// Land area, when the input carries it.
    pub land_area: Option<f64>,
}

impl Tract {
    /// Returns the centroid as an `[x, y]` pair.
    #[must_use]
    pub const fn coords(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// A half-open distance interval `(low, high]` in kilometers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Band {
    /// Exclusive lower edge in kilometers.
    pub low_km: u32,
    /// Inclusive upper edge in kilometers.
    pub high_km: u32,
}

impl Band {
    #[must_use]
    pub const fn new(low_km: u32, high_km: u32) -> Self {
        Self { low_km, high_km }
    }

    /// Whether a distance in meters falls inside this band.
    ///
    /// The lower edge is exclusive, so a point lying exactly on the route
    /// (distance 0) is in no band.
    #[must_use]
    pub fn contains(&self, distance_m: f64) -> bool {
        distance_m > f64::from(self.low_km) * 1000.0
            && distance_m <= f64::from(self.high_km) * 1000.0
    }

    /// Upper edge in meters.
    #[must_use]
    pub fn high_m(&self) -> f64 {
        f64::from(self.high_km) * 1000.0
    }

    /// Label written to the `band` column, e.g. `"(0, 2]"`.
    #[must_use]
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Suffix used for wide-format columns, e.g. `"0_2"`.
    #[must_use]
    pub fn column_suffix(&self) -> String {
        format!("{}_{}", self.low_km, self.high_km)
    }

    /// Parses a label produced by [`Self::label`].
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        let inner = label.trim().strip_prefix('(')?.strip_suffix(']')?;
        let (low, high) = inner.split_once(',')?;
        Some(Self::new(low.trim().parse().ok()?, high.trim().parse().ok()?))
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.low_km, self.high_km)
    }
}

/// One row of the along-route output: density percentiles of the tracts
/// within one distance band of the straight line between two tracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRow {
    #[serde(rename = "fromidx")]
    pub from_idx: usize,
    #[serde(rename = "toidx")]
    pub to_idx: usize,
    pub band: String,
    pub pop_dens_sqkm_25: f64,
    pub pop_dens_sqkm_50: f64,
    pub pop_dens_sqkm_75: f64,
    pub pop_dens_sqkm_95: f64,
    pub job_dens_sqkm_25: f64,
    pub job_dens_sqkm_50: f64,
    pub job_dens_sqkm_75: f64,
    pub job_dens_sqkm_95: f64,
    pub from_geoid: String,
    pub to_geoid: String,
}

impl BandRow {
    /// CSV header, in field order.
    pub const HEADER: [&'static str; 13] = [
        "fromidx",
        "toidx",
        "band",
        "pop_dens_sqkm_25",
        "pop_dens_sqkm_50",
        "pop_dens_sqkm_75",
        "pop_dens_sqkm_95",
        "job_dens_sqkm_25",
        "job_dens_sqkm_50",
        "job_dens_sqkm_75",
        "job_dens_sqkm_95",
        "from_geoid",
        "to_geoid",
    ];

    /// Builds a row from the two route endpoints and per-measure
    /// percentiles ordered as [`PERCENTILES`].
    #[must_use]
    pub fn new(from: &Tract, to: &Tract, band: Band, pop: [f64; 4], job: [f64; 4]) -> Self {
        Self {
            from_idx: from.index,
            to_idx: to.index,
            band: band.label(),
            pop_dens_sqkm_25: pop[0],
            pop_dens_sqkm_50: pop[1],
            pop_dens_sqkm_75: pop[2],
            pop_dens_sqkm_95: pop[3],
            job_dens_sqkm_25: job[0],
            job_dens_sqkm_50: job[1],
            job_dens_sqkm_75: job[2],
            job_dens_sqkm_95: job[3],
            from_geoid: from.geoid.clone(),
            to_geoid: to.geoid.clone(),
        }
    }

    /// Population density percentiles, ordered as [`PERCENTILES`].
    #[must_use]
    pub const fn pop_percentiles(&self) -> [f64; 4] {
        [
            self.pop_dens_sqkm_25,
            self.pop_dens_sqkm_50,
            self.pop_dens_sqkm_75,
            self.pop_dens_sqkm_95,
        ]
    }

    /// Job density percentiles, ordered as [`PERCENTILES`].
    #[must_use]
    pub const fn job_percentiles(&self) -> [f64; 4] {
        [
            self.job_dens_sqkm_25,
            self.job_dens_sqkm_50,
            self.job_dens_sqkm_75,
            self.job_dens_sqkm_95,
        ]
    }
}

/// A target building rectangle, in whole meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitDimension {
    /// Output column name.
    pub name: &'static str,
    pub width: usize,
    pub height: usize,
}

impl FitDimension {
    #[must_use]
    pub const fn new(name: &'static str, width: usize, height: usize) -> Self {
        Self {
            name,
            width,
            height,
        }
    }
}

/// A parcel's buildable-area polygon.
///
/// `geometry` is `None` when the source row has a null geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    pub gid: i64,
    pub apn: String,
    pub geometry: Option<MultiPolygon<f64>>,
}

/// Rectangle-fit outcome for one parcel, one flag per [`FitDimension`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitRow {
    pub gid: i64,
    pub apn: String,
    pub fits: Vec<bool>,
}

impl FitRow {
    /// CSV header for a dimension table: `gid,apn,<names...>`.
    #[must_use]
    pub fn header(dims: &[FitDimension]) -> Vec<String> {
        ["gid", "apn"]
            .into_iter()
            .map(str::to_string)
            .chain(dims.iter().map(|d| d.name.to_string()))
            .collect()
    }

    /// CSV record matching [`Self::header`].
    #[must_use]
    pub fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(self.fits.len() + 2);
        record.push(self.gid.to_string());
        record.push(self.apn.clone());
        record.extend(self.fits.iter().map(ToString::to_string));
        record
    }
}
