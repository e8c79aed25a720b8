//! Lazy enumeration of unordered tract pairs.

use std::iter::FusedIterator;

/// Yields every `(i, j)` with `i < j < n`, row by row, without
/// materializing the pair list.
#[derive(Debug, Clone)]
pub struct TractPairs {
    n: usize,
    i: usize,
    j: usize,
    remaining: u64,
}

impl TractPairs {
    #[must_use]
    pub const fn new(n: usize) -> Self {
        Self {
            n,
            i: 0,
            j: 1,
            remaining: pair_count(n),
        }
    }

    /// Pairs not yet yielded.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// Number of unordered pairs among `n` items.
#[must_use]
pub const fn pair_count(n: usize) -> u64 {
    let n = n as u64;
    if n < 2 { 0 } else { n * (n - 1) / 2 }
}

impl Iterator for TractPairs {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pair = (self.i, self.j);
        self.remaining -= 1;
        self.j += 1;
        if self.j >= self.n {
            self.i += 1;
            self.j = self.i + 1;
        }
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).ok();
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}

impl FusedIterator for TractPairs {}
