//! Rectangle-fit tests over rasterized footprints.

use geo::{MultiPolygon, Rotate};
use urban_batch_models::FitDimension;

use crate::raster::{Mask, Rasterizer};

/// Whether a `width x height` block of set cells (in either orientation)
/// exists anywhere in `mask`.
///
/// `width` runs along rows and `height` along columns. The far edge of a
/// candidate block must stay strictly inside the grid, so a block ending
/// on the last row or column is never tried. A fully set mask of exactly
/// the rectangle's size therefore does not fit.
#[must_use]
pub fn fits(mask: &Mask, width: usize, height: usize) -> bool {
    let (rows, cols) = (mask.rows(), mask.cols());
    for x in 0..rows {
        for y in 0..cols {
            if !mask.get(x, y) {
                continue;
            }
            if x + width < rows && y + height < cols && mask.is_block_full(x, y, width, height) {
                return true;
            }
            if x + height < rows && y + width < cols && mask.is_block_full(x, y, height, width) {
                return true;
            }
        }
    }
    false
}

/// Rectangle-fit tester holding a reusable rasterizer.
#[derive(Debug, Default)]
pub struct FitTester {
    rasterizer: Rasterizer,
}

impl FitTester {
    /// Fit vector for the geometry as-is, one flag per dimension.
    ///
    /// Null, empty, or zero-area geometry fits nothing.
    pub fn rect_fit(
        &mut self,
        geometry: Option<&MultiPolygon<f64>>,
        dims: &[FitDimension],
    ) -> Vec<bool> {
        let mask = geometry
            .filter(|g| !g.0.is_empty())
            .and_then(|g| self.rasterizer.rasterize(g));
        match mask {
            Some(mask) => dims.iter().map(|d| fits(&mask, d.width, d.height)).collect(),
            None => vec![false; dims.len()],
        }
    }

    /// Fit vector OR-ed across rotations (counter-clockwise degrees about
    /// the bounding-box centre).
    ///
    /// Dimensions that already fit are not retested, and rotation stops
    /// once every dimension fits.
    pub fn rot_fit(
        &mut self,
        geometry: Option<&MultiPolygon<f64>>,
        dims: &[FitDimension],
        rotations_deg: &[f64],
    ) -> Vec<bool> {
        let mut fitted = vec![false; dims.len()];
        let Some(geometry) = geometry.filter(|g| !g.0.is_empty()) else {
            return fitted;
        };

        for &angle in rotations_deg {
            if fitted.iter().all(|&f| f) {
                break;
            }

            let rotated;
            let shape = if angle == 0.0 {
                geometry
            } else {
                rotated = geometry.rotate_around_center(angle);
                &rotated
            };
            let Some(mask) = self.rasterizer.rasterize(shape) else {
                continue;
            };

            for (done, dim) in fitted.iter_mut().zip(dims) {
                if !*done {
                    *done = fits(&mask, dim.width, dim.height);
                }
            }
        }

        fitted
    }
}

/// See [`FitTester::rect_fit`].
#[must_use]
pub fn rect_fit(geometry: Option<&MultiPolygon<f64>>, dims: &[FitDimension]) -> Vec<bool> {
    FitTester::default().rect_fit(geometry, dims)
}

/// See [`FitTester::rot_fit`].
#[must_use]
pub fn rot_fit(
    geometry: Option<&MultiPolygon<f64>>,
    dims: &[FitDimension],
    rotations_deg: &[f64],
) -> Vec<bool> {
    FitTester::default().rot_fit(geometry, dims, rotations_deg)
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use urban_batch_models::{DEFAULT_DIMENSIONS, DEFAULT_ROTATIONS_DEG};

    use super::*;

    fn rect(width: f64, height: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 500.0, y: 300.0),
            (x: 500.0 + width, y: 300.0),
            (x: 500.0 + width, y: 300.0 + height),
            (x: 500.0, y: 300.0 + height),
        ]])
    }

    #[test]
    fn full_mask_fits_smaller_rectangles() {
        let mask = Mask::from_fn(13, 11, |_, _| true);
        assert!(fits(&mask, 12, 10));
        assert!(fits(&mask, 10, 12));
        assert!(!fits(&mask, 13, 10));
    }

    #[test]
    fn far_edge_bound_is_strict() {
        let mask = Mask::from_fn(12, 10, |_, _| true);
        assert!(!fits(&mask, 12, 10));
        assert!(fits(&mask, 11, 9));
    }

    #[test]
    fn checks_transposed_orientation() {
        let mask = Mask::from_fn(11, 13, |_, _| true);
        assert!(fits(&mask, 12, 10));
    }

    #[test]
    fn gap_blocks_fit() {
        let mask = Mask::from_fn(20, 20, |r, c| r != 10 && c != 10);
        assert!(fits(&mask, 5, 5));
        assert!(!fits(&mask, 12, 3));
    }

    #[test]
    fn empty_and_null_geometry_fit_nothing() {
        let empty = MultiPolygon::<f64>(Vec::new());
        assert_eq!(rect_fit(None, &DEFAULT_DIMENSIONS), [false; 3]);
        assert_eq!(rect_fit(Some(&empty), &DEFAULT_DIMENSIONS), [false; 3]);
        assert_eq!(
            rot_fit(None, &DEFAULT_DIMENSIONS, &DEFAULT_ROTATIONS_DEG),
            [false; 3]
        );
        assert_eq!(
            rot_fit(Some(&empty), &DEFAULT_DIMENSIONS, &DEFAULT_ROTATIONS_DEG),
            [false; 3]
        );
    }

    #[test]
    fn axis_aligned_lot_fits_by_size() {
        let lot = rect(18.0, 12.0);
        assert_eq!(
            rect_fit(Some(&lot), &DEFAULT_DIMENSIONS),
            [true, true, false]
        );
    }

    #[test]
    fn rotation_recovers_diagonal_lot() {
        let diagonal = rect(40.0, 14.0).rotate_around_center(-45.0);

        assert_eq!(rot_fit(Some(&diagonal), &DEFAULT_DIMENSIONS, &[0.0]), [false; 3]);
        assert_eq!(
            rot_fit(Some(&diagonal), &DEFAULT_DIMENSIONS, &[0.0, 45.0]),
            [true; 3]
        );
    }

    #[test]
    fn rotation_order_does_not_matter() {
        let lots = [
            rect(40.0, 14.0).rotate_around_center(-45.0),
            rect(25.0, 12.5).rotate_around_center(20.0),
            rect(14.0, 30.0).rotate_around_center(-60.0),
            rect(13.0, 11.0),
        ];
        let mut reversed = DEFAULT_ROTATIONS_DEG;
        reversed.reverse();
        let shuffled = [45.0, 0.0, 75.0, 15.0, 60.0, 30.0];

        for lot in &lots {
            let forward = rot_fit(Some(lot), &DEFAULT_DIMENSIONS, &DEFAULT_ROTATIONS_DEG);
            assert_eq!(rot_fit(Some(lot), &DEFAULT_DIMENSIONS, &reversed), forward);
            assert_eq!(rot_fit(Some(lot), &DEFAULT_DIMENSIONS, &shuffled), forward);
        }
    }

    #[test]
    fn rotation_only_widens_the_result() {
        let lot = rect(18.0, 12.0);
        let plain = rect_fit(Some(&lot), &DEFAULT_DIMENSIONS);
        let rotated = rot_fit(Some(&lot), &DEFAULT_DIMENSIONS, &DEFAULT_ROTATIONS_DEG);
        for (p, r) in plain.iter().zip(&rotated) {
            assert!(!p || *r);
        }
    }
}
