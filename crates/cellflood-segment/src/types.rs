//! Shared types for the cellflood segmentation core.

use serde::{Deserialize, Serialize};

/// Grid dimensions.
///
/// `nx` is the extent of the first (row) axis and `ny` the extent of the
/// second (column) axis. Pixel indices are row-major:
/// `index = x * ny + y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of rows.
    pub nx: usize,
    /// Number of columns.
    pub ny: usize,
}

impl Dimensions {
    /// Create dimensions from row and column counts.
    #[must_use]
    pub const fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny }
    }

    /// Total number of pixels (`nx * ny`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.nx * self.ny
    }

    /// Decode a pixel index into `(x, y)`.
    #[must_use]
    pub const fn coords(self, index: usize) -> (usize, usize) {
        (index / self.ny, index % self.ny)
    }

    /// Encode `(x, y)` into a pixel index.
    #[must_use]
    pub const fn index(self, x: usize, y: usize) -> usize {
        x * self.ny + y
    }

    /// Returns `true` if `index` addresses a pixel of this grid.
    #[must_use]
    pub const fn contains(self, index: usize) -> bool {
        index < self.pixel_count()
    }
}

/// Parameters for one segmentation session.
///
/// A session floods the grid once with `pixel_threshold`,
/// `merge_threshold` and `tie_break_seed`, then extracts clusters with
/// `pixel_threshold`, `edge_threshold` and `size_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Pixels with a value below this are never flooded and never admitted
    /// to a cluster.
    pub pixel_threshold: f64,

    /// Graph edges with a value below this do not connect pixels during
    /// cluster extraction. `None` reuses `pixel_threshold`.
    pub edge_threshold: Option<f64>,

    /// Clusters with fewer pixels than this are discarded.
    pub size_threshold: usize,

    /// Two components that both reached this size are never merged while
    /// flooding. `None` means unlimited merging.
    pub merge_threshold: Option<usize>,

    /// Zero processes equal-valued pixels in index order; any other value
    /// selects a reproducible randomized order.
    pub tie_break_seed: u64,
}

impl SegmentConfig {
    /// Default pixel threshold.
    pub const DEFAULT_PIXEL_THRESHOLD: f64 = 0.0;

    /// Default cluster size threshold.
    pub const DEFAULT_SIZE_THRESHOLD: usize = 0;

    /// Default tie-break seed (deterministic index order).
    pub const DEFAULT_TIE_BREAK_SEED: u64 = 0;

    /// The edge threshold in effect: `edge_threshold` when set,
    /// otherwise `pixel_threshold`.
    #[must_use]
    pub fn effective_edge_threshold(&self) -> f64 {
        self.edge_threshold.unwrap_or(self.pixel_threshold)
    }

    /// Check that the thresholds are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidConfig`] if a threshold is NaN or
    /// `merge_threshold` is zero.
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.pixel_threshold.is_nan() {
            return Err(SegmentError::InvalidConfig(
                "pixel_threshold must not be NaN".to_string(),
            ));
        }
        if self.edge_threshold.is_some_and(f64::is_nan) {
            return Err(SegmentError::InvalidConfig(
                "edge_threshold must not be NaN".to_string(),
            ));
        }
        if self.merge_threshold == Some(0) {
            return Err(SegmentError::InvalidConfig(
                "merge_threshold must be at least 1 (omit it for unlimited merging)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: Self::DEFAULT_PIXEL_THRESHOLD,
            edge_threshold: None,
            size_threshold: Self::DEFAULT_SIZE_THRESHOLD,
            merge_threshold: None,
            tie_break_seed: Self::DEFAULT_TIE_BREAK_SEED,
        }
    }
}

/// Errors raised by the segmentation core.
///
/// Every error is detected synchronously at the call that caused it;
/// nothing is retried and no partial result is returned.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Input grid or array does not have the required shape.
    #[error("invalid shape: {0}")]
    Shape(String),

    /// A pixel value is NaN or infinite.
    #[error("pixel {index} is not a finite value")]
    NonFiniteValue {
        /// Row-major index of the offending pixel.
        index: usize,
    },

    /// No qualifying cluster was found.
    #[error("no clusters found: {0}")]
    EmptyResult(String),

    /// Index outside the valid range of a collection or grid.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index (negative values count from the end).
        index: isize,
        /// Length of the indexed collection.
        len: usize,
    },

    /// Parameters that cannot be satisfied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
}
