//! Geometry helpers for querying the tracts along a straight route.
//!
//! A long segment has a huge, mostly empty bounding box, so the segment is
//! split into pieces and each piece gets its own box expanded by the
//! maximum lateral distance. The union of the boxes covers every point
//! within that distance of the segment. It may also cover a few points
//! that are farther away; exact distances are computed afterwards.

use rstar::AABB;

/// Default length of one route piece, in meters.
pub const DEFAULT_SUBSEGMENT_LENGTH_M: f64 = 4000.0;

/// Sizing for a corridor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorOptions {
    /// Target length of each route piece, in meters.
    pub subsegment_length_m: f64,
    /// Lateral distance every piece's box is expanded by, in meters.
    pub max_distance_m: f64,
}

/// Splits the segment `a`-`b` into `max(1, floor(len / target_length))`
/// equal pieces and returns each piece's bounding box grown by `expand` on
/// every side. A segment shorter than `target_length` is a single piece.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn subsegment_envelopes(
    a: [f64; 2],
    b: [f64; 2],
    target_length: f64,
    expand: f64,
) -> Vec<AABB<[f64; 2]>> {
    let length = (b[0] - a[0]).hypot(b[1] - a[1]);
    let pieces = if target_length > 0.0 && length.is_finite() {
        ((length / target_length).floor() as usize).max(1)
    } else {
        1
    };

    (0..pieces)
        .map(|k| {
            let t0 = k as f64 / pieces as f64;
            let t1 = (k + 1) as f64 / pieces as f64;
            let x0 = (b[0] - a[0]).mul_add(t0, a[0]);
            let y0 = (b[1] - a[1]).mul_add(t0, a[1]);
            let x1 = (b[0] - a[0]).mul_add(t1, a[0]);
            let y1 = (b[1] - a[1]).mul_add(t1, a[1]);
            AABB::from_corners(
                [x0.min(x1) - expand, y0.min(y1) - expand],
                [x0.max(x1) + expand, y0.max(y1) + expand],
            )
        })
        .collect()
}

/// Euclidean distance from `p` to the closed segment `a`-`b`.
///
/// A zero-length segment degrades to the distance between two points.
#[must_use]
pub fn distance_to_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let len_sq = dx.mul_add(dx, dy * dy);

    let t = if len_sq > 0.0 {
        ((p[0] - a[0]).mul_add(dx, (p[1] - a[1]) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let cx = dx.mul_add(t, a[0]);
    let cy = dy.mul_add(t, a[1]);
    (p[0] - cx).hypot(p[1] - cy)
}

#[cfg(test)]
mod tests {
    use rstar::Envelope as _;

    use super::*;

    #[test]
    fn short_segment_gets_one_piece() {
        let boxes = subsegment_envelopes([0.0, 0.0], [1000.0, 0.0], 4000.0, 8000.0);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].lower(), [-8000.0, -8000.0]);
        assert_eq!(boxes[0].upper(), [9000.0, 8000.0]);
    }

    #[test]
    fn long_segment_is_split() {
        let boxes = subsegment_envelopes([0.0, 0.0], [0.0, 10_000.0], 4000.0, 0.0);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].lower(), [0.0, 0.0]);
        assert_eq!(boxes[0].upper(), [0.0, 5000.0]);
        assert_eq!(boxes[1].lower(), [0.0, 5000.0]);
        assert_eq!(boxes[1].upper(), [0.0, 10_000.0]);
    }

    #[test]
    fn boxes_cover_points_within_expansion() {
        let a = [0.0, 0.0];
        let b = [30_000.0, 17_000.0];
        let boxes = subsegment_envelopes(a, b, 4000.0, 8000.0);
        for p in [
            [15_000.0, 8_500.0 + 7_900.0],
            [-7_000.0, -3_000.0],
            [30_000.0 + 5_000.0, 17_000.0 + 5_000.0],
        ] {
            assert!(distance_to_segment(p, a, b) <= 8000.0);
            assert!(boxes.iter().any(|env| env.contains_point(&p)), "{p:?}");
        }
    }

    #[test]
    fn distance_is_perpendicular_inside_segment() {
        let d = distance_to_segment([1000.0, 5000.0], [0.0, 0.0], [0.0, 10_000.0]);
        assert!((d - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn distance_clamps_to_endpoints() {
        let d = distance_to_segment([3.0, -4.0], [0.0, 0.0], [0.0, 10.0]);
        assert!((d - 5.0).abs() < 1e-12);
        let d = distance_to_segment([0.0, 13.0], [0.0, 0.0], [0.0, 10.0]);
        assert!((d - 3.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_segment_is_point_distance() {
        let d = distance_to_segment([3.0, 4.0], [0.0, 0.0], [0.0, 0.0]);
        assert!((d - 5.0).abs() < 1e-12);
    }
}
