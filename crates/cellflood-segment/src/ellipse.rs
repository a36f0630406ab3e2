//! Ellipse fitting from pixel coordinates.
//!
//! The ellipse of a pixel set is described by its centroid and by the
//! eigen-decomposition of the population covariance of its `(x, y)`
//! coordinates: the semi-axes are the square roots of the eigenvalues and
//! the orientation is that of the major-axis eigenvector.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Matrix2, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::clusters;
use crate::grid::PixelGrid;
use crate::types::{Dimensions, SegmentError};

/// Relative eigenvalue gap below which the covariance counts as isotropic.
const ISOTROPIC_TOLERANCE: f64 = 1e-12;

/// Shape summary of one pixel set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    /// Number of pixels.
    pub size: usize,
    /// Centroid row coordinate.
    pub x: f64,
    /// Centroid column coordinate.
    pub y: f64,
    /// Semi-major axis (standard deviation along the major axis).
    pub a: f64,
    /// Semi-minor axis, `0 <= b <= a`.
    pub b: f64,
    /// Angle of the major axis to the x axis, in `(-pi/2, pi/2]`.
    /// Zero when the pixel cloud is isotropic.
    pub theta: f64,
}

impl Ellipse {
    /// Chi-squared value for the 95% contour of a 2D Gaussian.
    pub const CHI2_95: f64 = 5.991;

    /// Fit an ellipse to `pixels` on a grid of `dims`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::EmptyResult`] if `pixels` is empty and
    /// [`SegmentError::IndexOutOfRange`] if an index lies outside the grid.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(pixels: &[usize], dims: Dimensions) -> Result<Self, SegmentError> {
        if pixels.is_empty() {
            return Err(SegmentError::EmptyResult(
                "cannot fit an ellipse to zero pixels".to_string(),
            ));
        }
        if let Some(&index) = pixels.iter().find(|&&i| !dims.contains(i)) {
            return Err(SegmentError::IndexOutOfRange {
                index: isize::try_from(index).unwrap_or(isize::MAX),
                len: dims.pixel_count(),
            });
        }

        let n = pixels.len() as f64;
        let coords = || {
            pixels.iter().map(move |&i| {
                let (x, y) = dims.coords(i);
                (x as f64, y as f64)
            })
        };

        let (sum_x, sum_y) = coords().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        let (mx, my) = (sum_x / n, sum_y / n);

        let (sxx, syy, sxy) = coords().fold((0.0, 0.0, 0.0), |(xx, yy, xy), (x, y)| {
            let (dx, dy) = (x - mx, y - my);
            (dx.mul_add(dx, xx), dy.mul_add(dy, yy), dx.mul_add(dy, xy))
        });
        let cov = Matrix2::new(sxx / n, sxy / n, sxy / n, syy / n);

        let eigen = SymmetricEigen::new(cov);
        let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
            (0, 1)
        } else {
            (1, 0)
        };
        let lambda_max = eigen.eigenvalues[major].max(0.0);
        let lambda_min = eigen.eigenvalues[minor].max(0.0);

        let theta = if lambda_max - lambda_min <= ISOTROPIC_TOLERANCE * lambda_max {
            0.0
        } else {
            let v = eigen.eigenvectors.column(major);
            let (ex, ey) = if v[0] < 0.0 {
                (-v[0], -v[1])
            } else {
                (v[0], v[1])
            };
            // atan2 with ex >= 0 lands in [-pi/2, pi/2]; fold the lower end.
            let angle = ey.atan2(ex);
            if angle <= -FRAC_PI_2 { FRAC_PI_2 } else { angle }
        };

        Ok(Self {
            size: pixels.len(),
            x: mx,
            y: my,
            a: lambda_max.sqrt(),
            b: lambda_min.sqrt(),
            theta,
        })
    }

    /// Same ellipse with both axes scaled by `sqrt(chi2)`.
    ///
    /// `scaled(Ellipse::CHI2_95)` gives the contour enclosing 95% of a
    /// Gaussian with this covariance.
    #[must_use]
    pub fn scaled(&self, chi2: f64) -> Self {
        let k = chi2.sqrt();
        Self {
            a: self.a * k,
            b: self.b * k,
            ..*self
        }
    }

    /// Orientation in degrees.
    #[must_use]
    pub fn theta_degrees(&self) -> f64 {
        self.theta.to_degrees()
    }
}

/// Ellipses of every grid-connected cluster at `pixel_threshold` with at
/// least `size_threshold` pixels.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidConfig`] if `pixel_threshold` is NaN.
pub fn ellipses(
    grid: &PixelGrid,
    pixel_threshold: f64,
    size_threshold: usize,
) -> Result<Vec<Ellipse>, SegmentError> {
    clusters::extract_from_grid(grid, pixel_threshold, size_threshold)?.ellipses()
}
