//! Multi-threshold cluster sweeps.
//!
//! A sweep visits the grid's pixels once, from the brightest down, growing
//! an uncapped forest as it goes. A descending threshold list is walked in
//! lock-step: whenever the next pixel falls below the current threshold,
//! the state is snapshot for that threshold before moving on. The cost is
//! one pass over pixels plus one over thresholds instead of a full
//! extraction per threshold.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::forest::DisjointSetForest;
use crate::grid::PixelGrid;
use crate::tie_break::TieBreaker;
use crate::types::SegmentError;

/// Levels in the default threshold ladder.
pub const DEFAULT_LEVELS: usize = 255;

/// A descending sequence of thresholds.
///
/// Built from a single value, a slice, an array or a `Vec`; NaN entries
/// are dropped and the rest sorted descending. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds(Vec<f64>);

impl Thresholds {
    /// Normalize `values` into descending order.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        values.sort_by(|a, b| b.total_cmp(a));
        Self(values)
    }

    /// Evenly spaced levels `(0.5 + k) / (levels + 1)` for
    /// `k in 0..levels`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ladder(levels: usize) -> Self {
        let denom = (levels + 1) as f64;
        Self::new((0..levels).map(|k| (0.5 + k as f64) / denom))
    }

    /// Thresholds, descending.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of thresholds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no thresholds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Thresholds {
    /// 255 levels `(0.5 + k) / 256`, one per 8-bit intensity step.
    fn default() -> Self {
        Self::ladder(DEFAULT_LEVELS)
    }
}

impl From<f64> for Thresholds {
    fn from(value: f64) -> Self {
        Self::new([value])
    }
}

impl From<&[f64]> for Thresholds {
    fn from(values: &[f64]) -> Self {
        Self::new(values.iter().copied())
    }
}

impl From<Vec<f64>> for Thresholds {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl<const N: usize> From<[f64; N]> for Thresholds {
    fn from(values: [f64; N]) -> Self {
        Self::new(values)
    }
}

/// Cluster counts per threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCounts {
    /// Thresholds, descending.
    pub thresholds: Vec<f64>,
    /// Components of at least `size_threshold` pixels at each threshold.
    pub counts: Vec<usize>,
    /// Largest component size at each threshold (non-decreasing).
    pub largest: Vec<usize>,
}

impl ClusterCounts {
    /// Largest count over all thresholds.
    #[must_use]
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// `(threshold, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, usize)> + '_ {
        self.thresholds
            .iter()
            .copied()
            .zip(self.counts.iter().copied())
    }
}

/// Count clusters of at least `size_threshold` pixels at every threshold.
///
/// The count at threshold `t` covers the pixels with value `>= t`.
#[must_use]
pub fn count_clusters(
    grid: &PixelGrid,
    thresholds: impl Into<Thresholds>,
    size_threshold: usize,
    tie_break_seed: u64,
) -> ClusterCounts {
    let thresholds = thresholds.into();
    let levels = thresholds.as_slice();
    let large = |size: usize| usize::from(size >= size_threshold);

    let mut tie = TieBreaker::new(tie_break_seed);
    let order = grid.ascending_order(&mut tie);
    let mut forest = DisjointSetForest::new(grid.len(), None);

    let mut counts = Vec::with_capacity(levels.len());
    let mut largest = Vec::with_capacity(levels.len());
    let mut count = 0;
    let mut biggest = 0;
    let mut level = 0;

    for &index in order.iter().rev() {
        let value = grid.value(index);
        while level < levels.len() && value < levels[level] {
            counts.push(count);
            largest.push(biggest);
            level += 1;
        }
        if level == levels.len() {
            break;
        }

        forest.insert(index);
        count += large(1);
        biggest = biggest.max(1);
        for neighbor in grid.neighbors(index, tie.start_direction()) {
            let (Some(a), Some(b)) = (forest.find(index), forest.find(neighbor)) else {
                continue;
            };
            let (sa, sb) = (forest.size(a), forest.size(b));
            if forest.union(a, b) {
                count = count + large(sa + sb) - large(sa) - large(sb);
                biggest = biggest.max(sa + sb);
            }
        }
    }
    counts.resize(levels.len(), count);
    largest.resize(levels.len(), biggest);

    debug!(
        "swept {} thresholds over {} pixels, max count {}",
        levels.len(),
        grid.len(),
        counts.iter().max().copied().unwrap_or(0),
    );

    ClusterCounts {
        thresholds: thresholds.0,
        counts,
        largest,
    }
}

/// Mark pixels that belong, at some threshold, to a component whose size
/// lies in `[size_min, size_max]`.
///
/// After each threshold step, every component that grew during the step
/// is checked and, if its size is in the band, all its pixels are marked.
/// The mask is row-major like the grid.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidConfig`] if `size_min > size_max`.
pub fn membership_sweep(
    grid: &PixelGrid,
    thresholds: impl Into<Thresholds>,
    size_min: usize,
    size_max: usize,
) -> Result<Vec<bool>, SegmentError> {
    if size_min > size_max {
        return Err(SegmentError::InvalidConfig(format!(
            "size band is empty: min {size_min} > max {size_max}"
        )));
    }
    let thresholds = thresholds.into();
    let levels = thresholds.as_slice();
    let n = grid.len();

    let order = grid.ascending_order(&mut TieBreaker::new(0));
    let mut forest = DisjointSetForest::new(n, None);
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut touched: Vec<usize> = Vec::new();
    let mut mask = vec![false; n];

    let mut flush =
        |forest: &mut DisjointSetForest, members: &[Vec<usize>], touched: &mut Vec<usize>| {
            for root in touched.drain(..) {
                if forest.find(root) != Some(root) {
                    continue;
                }
                if (size_min..=size_max).contains(&forest.size(root)) {
                    for &pixel in &members[root] {
                        mask[pixel] = true;
                    }
                }
            }
        };

    let mut level = 0;
    for &index in order.iter().rev() {
        let value = grid.value(index);
        while level < levels.len() && value < levels[level] {
            flush(&mut forest, &members, &mut touched);
            level += 1;
        }
        if level == levels.len() {
            break;
        }

        forest.insert(index);
        members[index].push(index);
        touched.push(index);
        for neighbor in grid.neighbors(index, 0) {
            let (Some(a), Some(b)) = (forest.find(index), forest.find(neighbor)) else {
                continue;
            };
            if !forest.union(a, b) {
                continue;
            }
            let (kept, absorbed) = if forest.find(a) == Some(a) { (a, b) } else { (b, a) };
            let moved = std::mem::take(&mut members[absorbed]);
            members[kept].extend(moved);
            touched.push(kept);
        }
    }
    if level < levels.len() {
        flush(&mut forest, &members, &mut touched);
    }

    debug!(
        "membership sweep [{size_min}, {size_max}]: {} of {n} pixels marked",
        mask.iter().filter(|&&m| m).count(),
    );
    Ok(mask)
}
