//! Raster geometry and ESRI ASCII grid output

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::SamplePoint;

/// Default upper bound on raster size (about 400 MB of `f64` values)
pub const DEFAULT_MAX_CELLS: usize = 50_000_000;
use crate::table::create_parent;
use crate::{GeoKitError, Result};

/// Regular grid anchored at its lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_size: f64,
    pub cols: usize,
    pub rows: usize,
}

impl GridSpec {
    /// Smallest grid of whole cells covering all samples plus `padding`
    ///
    /// Fails when the grid would hold more than `max_cells` cells.
    pub fn covering(
        samples: &[SamplePoint],
        cell_size: f64,
        padding: f64,
        max_cells: usize,
    ) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(GeoKitError::validation("cell size must be a positive number"));
        }
        if !(padding.is_finite() && padding >= 0.0) {
            return Err(GeoKitError::validation("padding must not be negative"));
        }
        let first = samples
            .first()
            .ok_or_else(|| GeoKitError::validation("No sample points provided"))?;

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for s in samples {
            min_x = min_x.min(s.x);
            min_y = min_y.min(s.y);
            max_x = max_x.max(s.x);
            max_y = max_y.max(s.y);
        }

        let origin_x = ((min_x - padding) / cell_size).floor() * cell_size;
        let origin_y = ((min_y - padding) / cell_size).floor() * cell_size;
        let too_large = || {
            GeoKitError::validation(format!(
                "grid at cell size {cell_size} exceeds {max_cells} cells; use a larger cell size"
            ))
        };
        let cells = |extent: f64| {
            let n = (extent / cell_size).ceil().max(1.0);
            if n.is_finite() && n <= max_cells as f64 {
                Ok(n as usize)
            } else {
                Err(too_large())
            }
        };
        let cols = cells(max_x + padding - origin_x)?;
        let rows = cells(max_y + padding - origin_y)?;
        cols.checked_mul(rows)
            .filter(|&total| total <= max_cells)
            .ok_or_else(too_large)?;

        Ok(Self {
            origin_x,
            origin_y,
            cell_size,
            cols,
            rows,
        })
    }

    /// Centre of a cell; row 0 is the northernmost row
    #[must_use]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.cell_size;
        let y = self.origin_y + ((self.rows - row) as f64 - 0.5) * self.cell_size;
        (x, y)
    }
}

/// Raster values, row-major with the north row first; NaN marks no data
#[derive(Debug, Clone)]
pub struct AsciiGrid {
    pub spec: GridSpec,
    pub nodata: f64,
    pub values: Vec<f64>,
}

impl AsciiGrid {
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.spec.rows || col >= self.spec.cols {
            return None;
        }
        self.values.get(row * self.spec.cols + col).copied()
    }

    /// Number of cells holding a value
    #[must_use]
    pub fn valid_cells(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// Render as ESRI ASCII grid text
    #[must_use]
    pub fn to_ascii(&self) -> String {
        let spec = &self.spec;
        let mut out = String::with_capacity(128 + self.values.len() * 8);
        out.push_str(&format!(
            "ncols {}\nnrows {}\nxllcorner {}\nyllcorner {}\ncellsize {}\nNODATA_value {}\n",
            spec.cols, spec.rows, spec.origin_x, spec.origin_y, spec.cell_size, self.nodata
        ));

        for row in self.values.chunks(spec.cols.max(1)) {
            let line = row
                .iter()
                .map(|v| {
                    if v.is_nan() {
                        self.nodata.to_string()
                    } else {
                        format!("{v:.4}")
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        create_parent(path)?;
        fs::write(path, self.to_ascii())?;
        info!(
            "Wrote {}x{} grid ({} valid cells) to {:?}",
            self.spec.cols,
            self.spec.rows,
            self.valid_cells(),
            path
        );
        Ok(())
    }

    /// Write a `.prj` with `wkt` next to the grid at `path`
    pub fn write_prj<P: AsRef<Path>>(path: P, wkt: &str) -> Result<PathBuf> {
        let prj = path.as_ref().with_extension("prj");
        create_parent(&prj)?;
        fs::write(&prj, wkt.trim())?;
        Ok(prj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(1.0, 0.0, 0.0, 0.0, 10, 5)]
    #[case(2.0, 0.0, 0.0, 0.0, 5, 3)]
    #[case(1.0, 1.0, -1.0, -1.0, 12, 7)]
    fn test_covering(
        #[case] cell_size: f64,
        #[case] padding: f64,
        #[case] origin_x: f64,
        #[case] origin_y: f64,
        #[case] cols: usize,
        #[case] rows: usize,
    ) {
        let samples = [SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(10.0, 4.5, 2.0)];
        let spec = GridSpec::covering(&samples, cell_size, padding, DEFAULT_MAX_CELLS).unwrap();
        assert_eq!(spec.origin_x, origin_x);
        assert_eq!(spec.origin_y, origin_y);
        assert_eq!(spec.cols, cols);
        assert_eq!(spec.rows, rows);
    }

    #[test]
    fn test_covering_rejects_bad_input() {
        let samples = [SamplePoint::new(0.0, 0.0, 1.0)];
        assert!(GridSpec::covering(&samples, 0.0, 0.0, DEFAULT_MAX_CELLS).is_err());
        assert!(GridSpec::covering(&samples, 1.0, -1.0, DEFAULT_MAX_CELLS).is_err());
        assert!(GridSpec::covering(&[], 1.0, 0.0, DEFAULT_MAX_CELLS).is_err());
        assert_eq!(GridSpec::covering(&samples, 1.0, 0.0, DEFAULT_MAX_CELLS).unwrap().cols, 1);
    }

    #[test]
    fn test_covering_rejects_oversized_grid() {
        let samples = [SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(100_000.0, 100_000.0, 2.0)];

        let err = GridSpec::covering(&samples, 0.001, 0.0, DEFAULT_MAX_CELLS).unwrap_err();
        assert!(matches!(err, GeoKitError::Validation(_)));
        assert!(err.to_string().contains("use a larger cell size"));

        // 10 x 10 cells against limits just below and at the total
        assert!(GridSpec::covering(&samples, 10_000.0, 0.0, 99).is_err());
        let spec = GridSpec::covering(&samples, 10_000.0, 0.0, 100).unwrap();
        assert_eq!((spec.cols, spec.rows), (10, 10));

        // each axis fits a usize but the product does not
        assert!(GridSpec::covering(&samples, 1e-12, 0.0, usize::MAX).is_err());
    }

    #[test]
    fn test_cell_center_north_first() {
        let spec = GridSpec {
            origin_x: 100.0,
            origin_y: 200.0,
            cell_size: 10.0,
            cols: 3,
            rows: 2,
        };
        assert_eq!(spec.cell_center(0, 0), (105.0, 215.0));
        assert_eq!(spec.cell_center(1, 2), (125.0, 205.0));
    }

    #[test]
    fn test_write_ascii_grid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("grid.asc");
        let grid = AsciiGrid {
            spec: GridSpec {
                origin_x: 0.0,
                origin_y: 0.0,
                cell_size: 1.0,
                cols: 2,
                rows: 1,
            },
            nodata: -9999.0,
            values: vec![1.5, f64::NAN],
        };

        grid.write(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ncols 2\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\nNODATA_value -9999\n1.5000 -9999\n"
        );

        let prj = AsciiGrid::write_prj(&path, "PROJCS[...]\n").unwrap();
        assert_eq!(prj, dir.path().join("out").join("grid.prj"));
        assert_eq!(fs::read_to_string(prj).unwrap(), "PROJCS[...]");
    }
}
