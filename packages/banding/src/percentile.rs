//! Percentiles by linear interpolation between closest ranks.
//!
//! For `n` sorted values the `q`th percentile sits at fractional rank
//! `q / 100 * (n - 1)`; the result interpolates between the values at the
//! floor and ceiling of that rank. This is the "linear" method of most
//! array libraries.

/// Percentile `q` (0-100) of already sorted `sorted`.
///
/// Returns `None` for empty input. The result is clamped to the two
/// neighbouring values so that increasing `q` never decreases it.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (q.clamp(0.0, 100.0) / 100.0) * last as f64;
    let lo = (rank.floor() as usize).min(last);
    let hi = (rank.ceil() as usize).min(last);
    let (a, b) = (sorted[lo], sorted[hi]);
    let frac = rank - lo as f64;
    let value = (b - a).mul_add(frac, a);
    // NaN inputs fail the comparison and pass through unclamped.
    Some(if a <= b { value.clamp(a, b) } else { value })
}

/// Sorts `values` in place and returns the percentiles `qs`, in order.
///
/// Returns `None` for empty input.
pub fn percentiles<const N: usize>(values: &mut [f64], qs: &[f64; N]) -> Option<[f64; N]> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mut out = [0.0; N];
    for (slot, &q) in out.iter_mut().zip(qs) {
        *slot = percentile(values, q)?;
    }
    Some(out)
}
