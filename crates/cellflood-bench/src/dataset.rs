//! Microscopy dataset layout.
//!
//! Images live under an explicit data directory as
//! `<data_dir>/<set>/<batch>/Plate<plate>/<well>_s<site>_w<channel>.png`,
//! addressed by an id code `<batch>_<plate>_<well>` such as
//! `U2OS-03_4_O19`.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Valid site numbers.
pub const SITES: RangeInclusive<u8> = 1..=2;

/// Valid channel numbers (channel 1 is the nuclear stain).
pub const CHANNELS: RangeInclusive<u8> = 1..=6;

/// Well columns per plate row.
pub const PLATE_COLUMNS: usize = 22;

/// Errors from parsing dataset identifiers.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Id code is not `<batch>_<plate>_<well>`.
    #[error("invalid id code {0:?}: expected <batch>_<plate>_<well>, e.g. U2OS-03_4_O19")]
    IdCode(String),

    /// Well name is not a row letter followed by two column digits.
    #[error("invalid well {0:?}: expected a row letter and two digits, e.g. B02")]
    Well(String),

    /// Site outside [`SITES`].
    #[error("site must be 1 or 2, got {0}")]
    Site(u8),

    /// Channel outside [`CHANNELS`].
    #[error("channel must be in 1..=6, got {0}")]
    Channel(u8),
}

/// One channel image of one site of one well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteImage {
    /// Experiment batch, e.g. `U2OS-03`.
    pub batch: String,
    /// Plate number within the batch.
    pub plate: u32,
    /// Well name, e.g. `O19`.
    pub well: String,
    /// Site within the well.
    pub site: u8,
    /// Imaging channel.
    pub channel: u8,
}

impl SiteImage {
    /// Parse an id code and validate site and channel.
    ///
    /// # Errors
    ///
    /// Returns a [`DatasetError`] describing the first invalid part.
    pub fn parse(id_code: &str, site: u8, channel: u8) -> Result<Self, DatasetError> {
        let mut parts = id_code.split('_');
        let (Some(batch), Some(plate), Some(well), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DatasetError::IdCode(id_code.to_string()));
        };
        if batch.is_empty() {
            return Err(DatasetError::IdCode(id_code.to_string()));
        }
        let plate = plate
            .parse()
            .map_err(|_| DatasetError::IdCode(id_code.to_string()))?;
        well_coordinate(well)?;
        if !SITES.contains(&site) {
            return Err(DatasetError::Site(site));
        }
        if !CHANNELS.contains(&channel) {
            return Err(DatasetError::Channel(channel));
        }

        Ok(Self {
            batch: batch.to_string(),
            plate,
            well: well.to_string(),
            site,
            channel,
        })
    }

    /// Cell type prefix of the batch (`HEPG2-01` -> `HEPG2`).
    #[must_use]
    pub fn cell_type(&self) -> &str {
        self.batch.split('-').next().unwrap_or(&self.batch)
    }

    /// Image path under `data_dir` for the `set` split (e.g. `train`).
    #[must_use]
    pub fn path(&self, data_dir: &Path, set: &str) -> PathBuf {
        data_dir
            .join(set)
            .join(&self.batch)
            .join(format!("Plate{}", self.plate))
            .join(format!("{}_s{}_w{}.png", self.well, self.site, self.channel))
    }
}

/// `(row, column)` of a well: the row letter counts from `a = 1`
/// (`B -> 2`), the column is the two-digit number.
///
/// # Errors
///
/// Returns [`DatasetError::Well`] for anything but one ASCII letter
/// followed by two digits.
pub fn well_coordinate(well: &str) -> Result<(usize, usize), DatasetError> {
    let invalid = || DatasetError::Well(well.to_string());
    let bytes = well.as_bytes();
    let [letter, tens, ones] = *bytes else {
        return Err(invalid());
    };
    if !letter.is_ascii_alphabetic() || !tens.is_ascii_digit() || !ones.is_ascii_digit() {
        return Err(invalid());
    }
    let row = usize::from(letter.to_ascii_lowercase() - b'a') + 1;
    let col = usize::from(tens - b'0') * 10 + usize::from(ones - b'0');
    Ok((row, col))
}

/// Linear well index `row * 22 + column`.
///
/// # Errors
///
/// Returns [`DatasetError::Well`] for a malformed well name.
pub fn well_index(well: &str) -> Result<usize, DatasetError> {
    let (row, col) = well_coordinate(well)?;
    Ok(row * PLATE_COLUMNS + col)
}
