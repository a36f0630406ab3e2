//! Immutable 2D intensity grid.
//!
//! Values are stored row-major with `index = x * ny + y`, where `x` is the
//! row and `y` the column. The grid is never mutated after construction.
//! Connectivity is 4-neighbor (no diagonals).

use image::{GrayImage, ImageBuffer, Luma};

use crate::tie_break::{DIRECTION_COUNT, TieBreaker};
use crate::types::{Dimensions, SegmentError};

/// Neighbor offsets `(dx, dy)` in scan order: up, right, down, left.
const DIRECTIONS: [(isize, isize); DIRECTION_COUNT] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// Dense 2D grid of 64-bit intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    dims: Dimensions,
    values: Vec<f64>,
}

impl PixelGrid {
    /// Build a grid from row-major `values`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Shape`] if either dimension is zero or
    /// `values.len() != nx * ny`, and [`SegmentError::NonFiniteValue`] if
    /// any value is NaN or infinite.
    pub fn new(nx: usize, ny: usize, values: Vec<f64>) -> Result<Self, SegmentError> {
        if nx == 0 || ny == 0 {
            return Err(SegmentError::Shape(format!(
                "grid must be two-dimensional with non-zero extents, got {nx}x{ny}"
            )));
        }
        let expected = nx.checked_mul(ny).ok_or_else(|| {
            SegmentError::Shape(format!("grid {nx}x{ny} overflows the index space"))
        })?;
        if values.len() != expected {
            return Err(SegmentError::Shape(format!(
                "expected {expected} values for a {nx}x{ny} grid, got {}",
                values.len()
            )));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(SegmentError::NonFiniteValue { index });
        }

        Ok(Self {
            dims: Dimensions::new(nx, ny),
            values,
        })
    }

    /// Build a grid from a slice of rows.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Shape`] if there are no rows, the rows are
    /// empty, or the rows have different lengths.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, SegmentError> {
        let nx = rows.len();
        let ny = rows.first().map_or(0, Vec::len);
        if let Some(x) = rows.iter().position(|row| row.len() != ny) {
            return Err(SegmentError::Shape(format!(
                "row {x} has {} columns, expected {ny}",
                rows[x].len()
            )));
        }
        Self::new(nx, ny, rows.concat())
    }

    /// Build a grid from an 8-bit grayscale image, scaled into `[0, 1]`.
    ///
    /// Image rows map to `x`, image columns to `y`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Shape`] for an image with zero width or
    /// height.
    pub fn from_gray(img: &GrayImage) -> Result<Self, SegmentError> {
        let values = img.as_raw().iter().map(|&v| f64::from(v) / 255.0).collect();
        Self::new(img.height() as usize, img.width() as usize, values)
    }

    /// Build a grid from a 16-bit grayscale image, scaled into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Shape`] for an image with zero width or
    /// height.
    pub fn from_luma16(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Result<Self, SegmentError> {
        let values = img
            .as_raw()
            .iter()
            .map(|&v| f64::from(v) / f64::from(u16::MAX))
            .collect();
        Self::new(img.height() as usize, img.width() as usize, values)
    }

    /// Decode raw image bytes (PNG or TIFF) into a grid.
    ///
    /// Colour images are reduced to luminance. Precision is kept at
    /// 16 bits so 16-bit microscope images are not truncated.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::EmptyInput`] if `bytes` is empty and
    /// [`SegmentError::ImageDecode`] if the data cannot be decoded.
    pub fn decode(bytes: &[u8]) -> Result<Self, SegmentError> {
        if bytes.is_empty() {
            return Err(SegmentError::EmptyInput);
        }
        let img = image::load_from_memory(bytes)?;
        Self::from_luma16(&img.to_luma16())
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Number of rows.
    #[must_use]
    pub const fn nx(&self) -> usize {
        self.dims.nx
    }

    /// Number of columns.
    #[must_use]
    pub const fn ny(&self) -> usize {
        self.dims.ny
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`: a grid has at least one pixel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Row-major pixel values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of pixel `index`.
    ///
    /// `index` must be in `[0, nx * ny)`.
    #[must_use]
    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// 4-connected neighbors of `index`, scanning up, right, down, left
    /// starting at direction `start`.
    pub fn neighbors(&self, index: usize, start: usize) -> impl Iterator<Item = usize> + use<> {
        let dims = self.dims;
        let (x, y) = dims.coords(index);
        (0..DIRECTION_COUNT).filter_map(move |k| {
            let (dx, dy) = DIRECTIONS[(start + k) % DIRECTION_COUNT];
            let nx = x.checked_add_signed(dx)?;
            let ny = y.checked_add_signed(dy)?;
            (nx < dims.nx && ny < dims.ny).then(|| dims.index(nx, ny))
        })
    }

    /// Neighbors with a larger index (up, then right).
    ///
    /// Iterating this over every pixel yields each adjacent pair once.
    pub fn forward_neighbors(&self, index: usize) -> impl Iterator<Item = usize> + use<> {
        let dims = self.dims;
        let (x, y) = dims.coords(index);
        let up = (y + 1 < dims.ny).then_some(index + 1);
        let right = (x + 1 < dims.nx).then_some(index + dims.ny);
        up.into_iter().chain(right)
    }

    /// Permutation of pixel indices in ascending value order.
    ///
    /// Equal values keep index order unless `tie` randomizes them.
    #[must_use]
    pub fn ascending_order(&self, tie: &mut TieBreaker) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[a].total_cmp(&self.values[b]));
        tie.shuffle_ties(&mut order, &self.values);
        order
    }
}
