//! Processing-order policy for equal-valued pixels.
//!
//! Seed 0 is fully deterministic: equal values keep ascending index order
//! and every neighbor scan starts with the "up" direction. Any other seed
//! drives a single [`StdRng`] owned by one construction call, so two
//! sessions never share generator state.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Number of 4-connected neighbor directions.
pub const DIRECTION_COUNT: usize = 4;

/// Seeded tie-break generator for one flooding or sweep pass.
#[derive(Debug, Clone)]
pub struct TieBreaker {
    rng: Option<StdRng>,
}

impl TieBreaker {
    /// Create a tie-breaker for `seed` (0 = deterministic index order).
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: (seed != 0).then(|| StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns `true` when no randomization is applied.
    #[must_use]
    pub const fn is_deterministic(&self) -> bool {
        self.rng.is_none()
    }

    /// Shuffle every run of equal values in an ascending `order`.
    ///
    /// `order` must already be sorted by `values`; the relative order of
    /// distinct values is preserved.
    pub fn shuffle_ties(&mut self, order: &mut [usize], values: &[f64]) {
        let Some(rng) = self.rng.as_mut() else {
            return;
        };

        let mut start = 0;
        while start < order.len() {
            let value = values[order[start]];
            let mut end = start + 1;
            while end < order.len() && values[order[end]].total_cmp(&value).is_eq() {
                end += 1;
            }
            if end - start > 1 {
                order[start..end].shuffle(rng);
            }
            start = end;
        }
    }

    /// Direction index at which the next neighbor scan begins.
    pub fn start_direction(&mut self) -> usize {
        self.rng
            .as_mut()
            .map_or(0, |rng| rng.random_range(0..DIRECTION_COUNT))
    }
}
