//! Nucleus location in a nuclear-stain channel.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::ellipse::{self, Ellipse};
use crate::grid::PixelGrid;
use crate::sweep::{self, Thresholds};
use crate::threshold;
use crate::types::SegmentError;

/// Parameters for [`locate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NucleusConfig {
    /// Fixed threshold; `None` estimates one with
    /// [`threshold::median_quarter_maximum`].
    pub threshold: Option<f64>,
    /// Minimum nucleus size in pixels.
    pub size_threshold: usize,
}

impl NucleusConfig {
    /// Default minimum nucleus size.
    pub const DEFAULT_SIZE_THRESHOLD: usize = 5;
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            size_threshold: Self::DEFAULT_SIZE_THRESHOLD,
        }
    }
}

/// Nuclei found at one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nuclei {
    /// Threshold the nuclei were extracted at.
    pub threshold: f64,
    /// One ellipse per nucleus, in cluster order.
    pub ellipses: Vec<Ellipse>,
}

/// Fit an ellipse to every nucleus-sized cluster.
///
/// # Errors
///
/// Returns [`SegmentError::EmptyResult`] if no threshold can be estimated
/// or no cluster reaches `size_threshold`.
pub fn locate(grid: &PixelGrid, config: &NucleusConfig) -> Result<Nuclei, SegmentError> {
    let threshold = match config.threshold {
        Some(t) => t,
        None => threshold::median_quarter_maximum(grid)?,
    };
    let ellipses = ellipse::ellipses(grid, threshold, config.size_threshold)?;
    if ellipses.is_empty() {
        return Err(SegmentError::EmptyResult(format!(
            "no cluster of at least {} pixels at threshold {threshold}",
            config.size_threshold
        )));
    }
    debug!("located {} nuclei at threshold {threshold}", ellipses.len());
    Ok(Nuclei {
        threshold,
        ellipses,
    })
}

/// Row-major mask of pixels that belong to a component of
/// `[size_min, size_max]` pixels at some threshold.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidConfig`] if `size_min > size_max`.
pub fn nucleus_mask(
    grid: &PixelGrid,
    thresholds: impl Into<Thresholds>,
    size_min: usize,
    size_max: usize,
) -> Result<Vec<bool>, SegmentError> {
    sweep::membership_sweep(grid, thresholds, size_min, size_max)
}
