//! Polygon rasterization onto a 1-meter occupancy grid.
//!
//! The grid covers the polygon's bounds rounded outward to whole meters.
//! Row 0 is the northern edge and column 0 the western edge. A cell is
//! set when its centre lies inside the polygon under the even-odd rule,
//! so holes stay empty. A centre lying exactly on an edge counts as
//! inside, hole edges included.
//!
//! Polygons whose grid would exceed [`MAX_MASK_CELLS`] are not rasterized.

use geo::{BoundingRect, MultiPolygon};

/// Largest grid, in cells, a single polygon may rasterize to.
pub const MAX_MASK_CELLS: usize = 25_000_000;

/// Boolean occupancy grid with a summed-area table for block queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
    /// `(rows + 1) x (cols + 1)` prefix sums of set cells.
    sums: Vec<u32>,
}

impl Mask {
    /// Builds a mask from a cell predicate.
    #[must_use]
    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut cells = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                cells.push(f(r, c));
            }
        }
        Self::from_cells(rows, cols, cells)
    }

    fn from_cells(rows: usize, cols: usize, cells: Vec<bool>) -> Self {
        let stride = cols + 1;
        let mut sums = vec![0_u32; (rows + 1) * stride];
        for r in 0..rows {
            let mut row_sum = 0_u32;
            for c in 0..cols {
                row_sum += u32::from(cells[r * cols + c]);
                sums[(r + 1) * stride + c + 1] = sums[r * stride + c + 1] + row_sum;
            }
        }
        Self {
            rows,
            cols,
            cells,
            sums,
        }
    }

    /// Rasterizes a polygon. Returns `None` for empty geometry, bounds
    /// with no area once rounded to whole meters, or a grid larger than
    /// [`MAX_MASK_CELLS`].
    #[must_use]
    pub fn rasterize(geometry: &MultiPolygon<f64>) -> Option<Self> {
        Rasterizer::default().rasterize(geometry)
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the cell at `(row, col)` is set. Out-of-range cells are not.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.cells[row * self.cols + col]
    }

    /// Number of set cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Whether every cell of the `height x width` block whose top-left
    /// corner is `(row, col)` is set. Blocks reaching past the grid are
    /// not full.
    #[must_use]
    pub fn is_block_full(&self, row: usize, col: usize, height: usize, width: usize) -> bool {
        let (bottom, right) = (row + height, col + width);
        if bottom > self.rows || right > self.cols {
            return false;
        }
        let stride = self.cols + 1;
        let total = self.sums[bottom * stride + right] + self.sums[row * stride + col]
            - self.sums[row * stride + right]
            - self.sums[bottom * stride + col];
        total as usize == height * width
    }
}

/// Rasterizer with reusable scratch buffers.
#[derive(Debug, Default)]
pub struct Rasterizer {
    edges: Vec<[f64; 4]>,
    crossings: Vec<f64>,
}

impl Rasterizer {
    /// See [`Mask::rasterize`].
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn rasterize(&mut self, geometry: &MultiPolygon<f64>) -> Option<Mask> {
        let bounds = geometry.bounding_rect()?;
        let west = bounds.min().x.floor();
        let south = bounds.min().y.floor();
        let east = bounds.max().x.ceil();
        let north = bounds.max().y.ceil();

        if !(west.is_finite() && south.is_finite() && east.is_finite() && north.is_finite()) {
            return None;
        }
        let cols = (east - west) as usize;
        let rows = (north - south) as usize;
        if rows == 0 || cols == 0 {
            return None;
        }
        let cells = match rows.checked_mul(cols) {
            Some(cells) if cells <= MAX_MASK_CELLS => cells,
            _ => {
                log::warn!(
                    "Skipping polygon with a {rows}x{cols} m grid (limit {MAX_MASK_CELLS} cells)"
                );
                return None;
            }
        };

        self.edges.clear();
        for polygon in geometry {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                self.edges.extend(
                    ring.lines()
                        .map(|l| [l.start.x, l.start.y, l.end.x, l.end.y]),
                );
            }
        }

        let mut cells = vec![false; cells];
        for r in 0..rows {
            let yc = north - r as f64 - 0.5;

            self.crossings.clear();
            for &[x0, y0, x1, y1] in &self.edges {
                if (y0 > yc) != (y1 > yc) {
                    self.crossings.push((yc - y0).mul_add((x1 - x0) / (y1 - y0), x0));
                }
            }
            self.crossings.sort_unstable_by(f64::total_cmp);

            for span in self.crossings.chunks_exact(2) {
                // Cells whose centre x = west + c + 0.5 lies in [span[0], span[1]].
                let first = (span[0] - west - 0.5).ceil().max(0.0);
                let end = ((span[1] - west - 0.5).floor() + 1.0).min(cols as f64);
                if end > first {
                    let row = &mut cells[r * cols..(r + 1) * cols];
                    row[first as usize..end as usize].fill(true);
                }
            }
        }

        Some(Mask::from_cells(rows, cols, cells))
    }
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
        ]])
    }

    #[test]
    fn axis_aligned_square_fills_grid() {
        let mask = Mask::rasterize(&square(100.0, 200.0, 10.0)).unwrap();
        assert_eq!((mask.rows(), mask.cols()), (10, 10));
        assert_eq!(mask.count(), 100);
    }

    #[test]
    fn bounds_round_outward() {
        let mask = Mask::rasterize(&square(0.4, 0.4, 5.2)).unwrap();
        assert_eq!((mask.rows(), mask.cols()), (6, 6));
        // Centres at 0.5 and 5.5 fall inside [0.4, 5.6].
        assert_eq!(mask.count(), 36);
    }

    #[test]
    fn triangle_fills_lower_left_half() {
        let triangle = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
        ]]);
        let mask = Mask::rasterize(&triangle).unwrap();
        assert_eq!((mask.rows(), mask.cols()), (4, 4));
        // Row 0 is the northern edge.
        assert!(mask.get(3, 0));
        assert!(mask.get(3, 3));
        assert!(mask.get(0, 0));
        assert!(!mask.get(0, 1));
        assert!(!mask.get(0, 3));
        assert_eq!(mask.count(), 10);
    }

    fn row_pattern(mask: &Mask, row: usize) -> String {
        (0..mask.cols())
            .map(|c| if mask.get(row, c) { '#' } else { '.' })
            .collect()
    }

    #[test]
    fn centres_on_an_edge_are_inside() {
        let triangle = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
        ]]);
        let mask = Mask::rasterize(&triangle).unwrap();
        let rows: Vec<String> = (0..mask.rows()).map(|r| row_pattern(&mask, r)).collect();
        assert_eq!(rows, ["#...", "##..", "###.", "####"]);

        // Mirrored so the hypotenuse opens each span instead.
        let mirrored = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
        ]]);
        let mask = Mask::rasterize(&mirrored).unwrap();
        let rows: Vec<String> = (0..mask.rows()).map(|r| row_pattern(&mask, r)).collect();
        assert_eq!(rows, ["...#", "..##", ".###", "####"]);
    }

    #[test]
    fn oversized_grid_is_skipped() {
        assert!(10_000 * 10_000 > MAX_MASK_CELLS);
        assert!(Mask::rasterize(&square(0.0, 0.0, 10_000.0)).is_none());
        assert!(Mask::rasterize(&square(0.0, 0.0, 1000.0)).is_some());
    }

    #[test]
    fn holes_stay_empty() {
        let outer = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let hole = LineString::from(vec![(3.0, 3.0), (7.0, 3.0), (7.0, 7.0), (3.0, 7.0)]);
        let donut = MultiPolygon(vec![Polygon::new(outer, vec![hole])]);
        let mask = Mask::rasterize(&donut).unwrap();
        assert_eq!(mask.count(), 100 - 16);
        assert!(!mask.get(5, 5));
        assert!(mask.get(1, 1));
    }

    #[test]
    fn empty_geometry_has_no_mask() {
        assert!(Mask::rasterize(&MultiPolygon::<f64>(Vec::new())).is_none());
    }

    #[test]
    fn block_queries_use_prefix_sums() {
        let mask = Mask::from_fn(5, 6, |r, c| !(r == 2 && c == 4));
        assert!(mask.is_block_full(0, 0, 2, 6));
        assert!(mask.is_block_full(0, 0, 5, 4));
        assert!(!mask.is_block_full(1, 3, 2, 2));
        assert!(mask.is_block_full(3, 0, 2, 6));
        assert!(!mask.is_block_full(4, 0, 2, 1));
    }
}
