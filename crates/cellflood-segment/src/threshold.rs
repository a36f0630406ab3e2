//! Automatic threshold estimation from the cluster-count curve.
//!
//! Both estimators run the default 255-level sweep, counting clusters of at
//! least [`ESTIMATE_SIZE_THRESHOLD`] pixels, and summarize where the count
//! curve carries its weight.

use log::debug;

use crate::grid::PixelGrid;
use crate::sweep::{self, ClusterCounts, Thresholds};
use crate::types::SegmentError;

/// Minimum cluster size counted by the estimators.
pub const ESTIMATE_SIZE_THRESHOLD: usize = 5;

/// Default number of refinement rounds for [`iterative_mean`].
pub const DEFAULT_MEAN_ITERATIONS: usize = 5;

fn default_counts(grid: &PixelGrid) -> ClusterCounts {
    sweep::count_clusters(grid, Thresholds::default(), ESTIMATE_SIZE_THRESHOLD, 0)
}

/// Median of the thresholds whose cluster count exceeds a quarter of the
/// maximum count.
///
/// # Errors
///
/// Returns [`SegmentError::EmptyResult`] if no cluster exists at any
/// threshold.
pub fn median_quarter_maximum(grid: &PixelGrid) -> Result<f64, SegmentError> {
    let counts = default_counts(grid);
    let max = counts.max_count();
    if max == 0 {
        return Err(SegmentError::EmptyResult(
            "no cluster at any threshold".to_string(),
        ));
    }

    // count > max / 4, kept in integers.
    let mut kept: Vec<f64> = counts
        .iter()
        .filter(|&(_, count)| 4 * count > max)
        .map(|(threshold, _)| threshold)
        .collect();
    kept.sort_by(f64::total_cmp);

    let mid = kept.len() / 2;
    let median = if kept.len() % 2 == 1 {
        kept[mid]
    } else {
        f64::midpoint(kept[mid - 1], kept[mid])
    };
    debug!(
        "median quarter maximum: {median} from {} thresholds (max count {max})",
        kept.len()
    );
    Ok(median)
}

/// Count-weighted mean of `(threshold, count)` pairs passing `keep`.
#[allow(clippy::cast_precision_loss)]
fn weighted_mean(counts: &ClusterCounts, keep: impl Fn(f64) -> bool) -> Option<f64> {
    let (sum, weight) = counts
        .iter()
        .filter(|&(t, _)| keep(t))
        .fold((0.0, 0.0), |(sum, weight), (t, c)| {
            let c = c as f64;
            (t.mul_add(c, sum), weight + c)
        });
    (weight > 0.0).then(|| sum / weight)
}

/// Count-weighted mean threshold, refined by averaging the weighted means
/// below and above the current estimate.
///
/// `iterations` counts the initial mean as the first round. Refinement
/// stops early once either side carries no weight.
///
/// # Errors
///
/// Returns [`SegmentError::EmptyResult`] if no cluster exists at any
/// threshold.
pub fn iterative_mean(grid: &PixelGrid, iterations: usize) -> Result<f64, SegmentError> {
    let counts = default_counts(grid);
    let mut mean = weighted_mean(&counts, |_| true).ok_or_else(|| {
        SegmentError::EmptyResult("no cluster at any threshold".to_string())
    })?;

    for _ in 1..iterations {
        let below = weighted_mean(&counts, |t| t < mean);
        let above = weighted_mean(&counts, |t| t >= mean);
        let (Some(below), Some(above)) = (below, above) else {
            break;
        };
        mean = f64::midpoint(below, above);
    }
    debug!("iterative mean threshold: {mean}");
    Ok(mean)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Six 3x3 spots of intensity 0.5 on an 18x18 dark field.
    fn spots() -> PixelGrid {
        let n = 18;
        let mut values = vec![0.0; n * n];
        for cx in [1, 7, 13] {
            for cy in [1, 10] {
                for x in cx..cx + 3 {
                    for y in cy..cy + 3 {
                        values[x * n + y] = 0.5;
                    }
                }
            }
        }
        PixelGrid::new(n, n, values).unwrap()
    }

    #[test]
    fn dark_field_has_no_estimate() {
        let grid = PixelGrid::new(4, 4, vec![0.0; 16]).unwrap();
        assert!(matches!(
            median_quarter_maximum(&grid),
            Err(SegmentError::EmptyResult(_))
        ));
        assert!(matches!(
            iterative_mean(&grid, DEFAULT_MEAN_ITERATIONS),
            Err(SegmentError::EmptyResult(_))
        ));
    }

    #[test]
    fn median_lies_where_spots_are_separate() {
        // Spots are counted for every threshold in (0, 0.5].
        let t = median_quarter_maximum(&spots()).unwrap();
        assert!(t > 0.0 && t <= 0.5, "got {t}");
        let at = sweep::count_clusters(&spots(), t, ESTIMATE_SIZE_THRESHOLD, 0);
        assert_eq!(at.counts, vec![6]);
    }

    #[test]
    fn median_of_flat_plateau_is_its_centre() {
        // Counts are 6 for the 128 thresholds below 0.5 and 0 above.
        let t = median_quarter_maximum(&spots()).unwrap();
        let kept: Vec<f64> = Thresholds::default()
            .as_slice()
            .iter()
            .copied()
            .filter(|&x| x <= 0.5)
            .collect();
        assert_eq!(kept.len(), 128);
        let expected = f64::midpoint(kept[63], kept[64]);
        assert!((t - expected).abs() < 1e-12);
    }

    #[test]
    fn iterative_mean_stays_inside_plateau() {
        let m = iterative_mean(&spots(), DEFAULT_MEAN_ITERATIONS).unwrap();
        assert!(m > 0.0 && m < 0.5, "got {m}");
        let single = iterative_mean(&spots(), 1).unwrap();
        assert!((single - 0.25).abs() < 1e-9, "got {single}");
    }
}
