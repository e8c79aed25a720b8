#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index of census tract centroids.
//!
//! Loads tract centroids and their density attributes from a `GeoJSON`
//! `FeatureCollection`, builds an R-tree over the centroids, and answers
//! "which tracts could lie within `d` meters of this route" queries.
//! The index is immutable once built and is shared read-only by every
//! worker of a batch run.
//!
//! Coordinates must be projected and in meters; all distance thresholds
//! are in meters.

pub mod corridor;

use std::path::Path;

use geojson::{Feature, GeoJson};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use urban_batch_models::Tract;

pub use corridor::{CorridorOptions, distance_to_segment, subsegment_envelopes};

/// Land area below which the downstream congestion model zeroes both
/// densities, to avoid divide-by-zero artifacts.
pub const DEFAULT_MIN_LAND_AREA: f64 = 1e-5;

/// Errors from loading or querying the tract index.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// I/O error reading the input file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The input parsed, but is not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// A feature lacks a required property or it has the wrong type.
    #[error("Feature {feature}: missing or invalid property '{property}'")]
    InvalidProperty {
        /// 0-based feature position.
        feature: usize,
        /// Property name.
        property: &'static str,
    },

    /// A feature's geometry is missing or not a point.
    #[error("Feature {feature}: geometry must be a Point")]
    InvalidGeometry {
        /// 0-based feature position.
        feature: usize,
    },
}

/// Options applied while loading tracts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TractLoadOptions {
    /// When set, tracts with a land area below this value get both
    /// densities forced to 0.
    pub min_land_area: Option<f64>,
}

type CentroidEntry = GeomWithData<[f64; 2], usize>;

/// Pre-built R-tree over tract centroids plus the tract table itself.
#[derive(Debug)]
pub struct TractIndex {
    tracts: Vec<Tract>,
    tree: RTree<CentroidEntry>,
}

impl TractIndex {
    /// Reads a `GeoJSON` file of tract centroids and builds the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any feature is
    /// malformed.
    pub fn load(path: &Path, options: TractLoadOptions) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path)?;
        let index = Self::from_geojson_str(&text, options)?;
        log::info!(
            "Loaded {} tract centroids from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Parses a `GeoJSON` `FeatureCollection` of tract centroids.
    ///
    /// Each feature needs a `Point` geometry and the properties `GEOID`,
    /// `pop_dens_sqkm`, and `job_dens_sqkm`; `aland` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a `FeatureCollection` or any
    /// feature is malformed.
    pub fn from_geojson_str(text: &str, options: TractLoadOptions) -> Result<Self, SpatialError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(SpatialError::NotFeatureCollection);
        };

        let tracts = collection
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| parse_tract(index, feature, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_tracts(tracts))
    }

    /// Builds the index from already-loaded tracts.
    ///
    /// Each tract's `index` is reset to its position in `tracts`.
    #[must_use]
    pub fn from_tracts(mut tracts: Vec<Tract>) -> Self {
        for (i, tract) in tracts.iter_mut().enumerate() {
            tract.index = i;
        }

        warn_if_geographic(&tracts);

        let entries = tracts
            .iter()
            .map(|t| CentroidEntry::new(t.coords(), t.index))
            .collect();

        Self {
            tracts,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of tracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    /// Whether the index holds no tracts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    /// Tract at a position, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Tract> {
        self.tracts.get(index)
    }

    /// All tracts in file order.
    #[must_use]
    pub fn tracts(&self) -> &[Tract] {
        &self.tracts
    }

    /// Collects into `out` the positions of every tract whose centroid
    /// falls in any expanded piece box of the route `a`-`b`.
    ///
    /// `out` is cleared first, and comes back sorted without duplicates.
    /// No tract within `options.max_distance_m` of the segment is missed;
    /// some farther tracts may be included.
    pub fn corridor_candidates(
        &self,
        a: [f64; 2],
        b: [f64; 2],
        options: &CorridorOptions,
        out: &mut Vec<usize>,
    ) {
        out.clear();
        for envelope in subsegment_envelopes(
            a,
            b,
            options.subsegment_length_m,
            options.max_distance_m,
        ) {
            out.extend(
                self.tree
                    .locate_in_envelope(&envelope)
                    .map(|entry| entry.data),
            );
        }
        out.sort_unstable();
        out.dedup();
    }
}

fn parse_tract(
    index: usize,
    feature: &Feature,
    options: TractLoadOptions,
) -> Result<Tract, SpatialError> {
    let [x, y] = point_coords(feature).ok_or(SpatialError::InvalidGeometry { feature: index })?;

    let geoid = match feature.property("GEOID") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => {
            return Err(SpatialError::InvalidProperty {
                feature: index,
                property: "GEOID",
            });
        }
    };

    let number = |property: &'static str| {
        feature
            .property(property)
            .and_then(serde_json::Value::as_f64)
            .ok_or(SpatialError::InvalidProperty {
                feature: index,
                property,
            })
    };

    let mut pop_dens_sqkm = number("pop_dens_sqkm")?;
    let mut job_dens_sqkm = number("job_dens_sqkm")?;
    let land_area = feature
        .property("aland")
        .and_then(serde_json::Value::as_f64);

    match (options.min_land_area, land_area) {
        (Some(min), Some(area)) if area < min => {
            log::debug!("Zeroing densities for tract {geoid} (land area {area})");
            pop_dens_sqkm = 0.0;
            job_dens_sqkm = 0.0;
        }
        _ => {}
    }

    Ok(Tract {
        index,
        geoid,
        x,
        y,
        pop_dens_sqkm,
        job_dens_sqkm,
        land_area,
    })
}

fn point_coords(feature: &Feature) -> Option<[f64; 2]> {
    let geometry = feature.geometry.as_ref()?;
    match &geometry.value {
        geojson::Value::Point(coords) if coords.len() >= 2 => {
            let (x, y) = (coords[0], coords[1]);
            (x.is_finite() && y.is_finite()).then_some([x, y])
        }
        _ => None,
    }
}

/// Logs a warning when every centroid looks like a longitude/latitude
/// pair. Band edges are meters, so degrees would silently put every
/// tract in the first band.
fn warn_if_geographic(tracts: &[Tract]) {
    if tracts.len() < 2 {
        return;
    }
    let looks_geographic = tracts
        .iter()
        .all(|t| (-180.0..=180.0).contains(&t.x) && (-90.0..=90.0).contains(&t.y));
    if looks_geographic {
        log::warn!(
            "All {} tract coordinates fall within longitude/latitude ranges; \
             distances are interpreted as meters, so input should be projected",
            tracts.len()
        );
    }
}
