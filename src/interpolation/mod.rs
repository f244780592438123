//! Spatial interpolation of scattered samples onto a raster
//!
//! - reading samples from CSV
//! - IDW: Inverse Distance Weighting, with leave-one-out cross validation
//! - ESRI ASCII grid output

mod grid;
mod idw;

use std::path::Path;

use tracing::{info, warn};

pub use grid::{AsciiGrid, DEFAULT_MAX_CELLS, GridSpec};
pub use idw::{CrossValidation, IdwParams, cross_validate, idw};

use crate::table::{Table, find_column};
use crate::{GeoKitError, Result};

/// A sample point with x, y coordinates and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    #[must_use]
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    #[must_use]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }
}

/// Read samples from the named CSV columns (case-insensitive)
///
/// Rows whose cells are not finite numbers are skipped with a warning.
pub fn read_samples<P: AsRef<Path>>(
    path: P,
    x_column: &str,
    y_column: &str,
    value_column: &str,
) -> Result<Vec<SamplePoint>> {
    let table = Table::read(path.as_ref())?;

    let column = |name: &str| {
        find_column(&table.headers, name).ok_or_else(|| {
            GeoKitError::validation(format!(
                "column '{}' not found (available: {})",
                name,
                table.headers.join(", ")
            ))
        })
    };
    let x_idx = column(x_column)?;
    let y_idx = column(y_column)?;
    let value_idx = column(value_column)?;

    let mut samples = Vec::with_capacity(table.rows.len());
    let mut skipped = 0;
    for row in 0..table.rows.len() {
        let parsed = (
            table.number(row, x_idx),
            table.number(row, y_idx),
            table.number(row, value_idx),
        );
        match parsed {
            (Ok(x), Ok(y), Ok(value)) if x.is_finite() && y.is_finite() && value.is_finite() => {
                samples.push(SamplePoint::new(x, y, value));
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} rows without numeric x/y/value", skipped);
    }
    info!("Read {} samples from {:?}", samples.len(), path.as_ref());
    Ok(samples)
}
