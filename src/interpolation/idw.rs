//! Inverse Distance Weighting (IDW) interpolation
//!
//! Estimates values at unknown locations as a weighted average of nearby
//! sample points, where weights are inversely proportional to distance
//! raised to a power parameter.

use rayon::prelude::*;
use tracing::{debug, info};

use super::{AsciiGrid, GridSpec, SamplePoint};
use crate::{GeoKitError, Result};

/// Parameters for IDW interpolation
#[derive(Debug, Clone)]
pub struct IdwParams {
    /// Power parameter (default: 2.0).
    /// Higher values give more weight to nearby points.
    pub power: f64,
    /// Maximum search radius. Points beyond this distance are ignored.
    /// `None` means all points are used (global IDW).
    pub max_radius: Option<f64>,
    /// Maximum number of nearest points to use.
    /// `None` means use all points within radius.
    pub max_points: Option<usize>,
    /// A sample closer than this to the target is used directly
    pub snap_distance: f64,
    /// Value written for cells without an estimate
    pub nodata: f64,
    pub grid: GridSpec,
}

impl IdwParams {
    #[must_use]
    pub fn new(grid: GridSpec) -> Self {
        Self {
            power: 2.0,
            max_radius: None,
            max_points: None,
            snap_distance: 1e-10,
            nodata: -9999.0,
            grid,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(GeoKitError::validation("power must be a positive number"));
        }
        if !(self.grid.cell_size.is_finite() && self.grid.cell_size > 0.0) {
            return Err(GeoKitError::validation("cell size must be a positive number"));
        }
        if self.max_radius.is_some_and(|r| !(r > 0.0)) {
            return Err(GeoKitError::validation("search radius must be positive"));
        }
        if self.max_points == Some(0) {
            return Err(GeoKitError::validation("max points must be at least 1"));
        }
        Ok(())
    }
}

/// Weighted estimate at `(x, y)`; `None` when no sample is in range
fn estimate<'a>(
    samples: impl Iterator<Item = &'a SamplePoint>,
    x: f64,
    y: f64,
    params: &IdwParams,
) -> Option<f64> {
    let snap_sq = params.snap_distance * params.snap_distance;
    let max_radius_sq = params.max_radius.map(|r| r * r);

    let mut candidates: Vec<(f64, f64)> = Vec::new();
    for pt in samples {
        let dsq = pt.dist_sq(x, y);
        if dsq < snap_sq {
            return Some(pt.value);
        }
        if max_radius_sq.is_some_and(|max_sq| dsq > max_sq) {
            continue;
        }
        candidates.push((dsq, pt.value));
    }

    if let Some(max_points) = params.max_points
        && candidates.len() > max_points
    {
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.truncate(max_points);
    }

    let mut sum_w = 0.0;
    let mut sum_wz = 0.0;
    for &(dsq, value) in &candidates {
        // d^p == (d^2)^(p/2)
        let w = 1.0 / dsq.powf(params.power / 2.0);
        sum_w += w;
        sum_wz += w * value;
    }

    (sum_w > 0.0).then(|| sum_wz / sum_w)
}

/// Interpolate scattered samples onto `params.grid`
///
/// ```text
/// z(x,y) = Σ(wi * zi) / Σ(wi)
/// where wi = 1 / d(x,y, xi,yi)^p
/// ```
///
/// Cells without a sample in range are NaN (written as `params.nodata`).
pub fn idw(samples: &[SamplePoint], params: &IdwParams) -> Result<AsciiGrid> {
    if samples.is_empty() {
        return Err(GeoKitError::validation("No sample points provided"));
    }
    params.validate()?;

    let grid = params.grid;
    info!(
        "Interpolating {} samples onto a {}x{} grid (power {})",
        samples.len(),
        grid.cols,
        grid.rows,
        params.power
    );

    let values: Vec<f64> = (0..grid.rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..grid.cols).map(move |col| {
                let (x, y) = grid.cell_center(row, col);
                estimate(samples.iter(), x, y, params).unwrap_or(f64::NAN)
            })
        })
        .collect();

    let output = AsciiGrid {
        spec: grid,
        nodata: params.nodata,
        values,
    };
    debug!("{} of {} cells interpolated", output.valid_cells(), output.values.len());
    Ok(output)
}

/// Leave-one-out error statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossValidation {
    pub rmse: f64,
    pub mae: f64,
    /// Samples that received an estimate
    pub n: usize,
}

/// Estimate every sample from all the others and compare
pub fn cross_validate(samples: &[SamplePoint], params: &IdwParams) -> Result<CrossValidation> {
    if samples.len() < 2 {
        return Err(GeoKitError::validation(
            "cross validation needs at least two samples",
        ));
    }
    params.validate()?;

    let errors: Vec<f64> = samples
        .par_iter()
        .enumerate()
        .filter_map(|(i, target)| {
            let others = samples
                .iter()
                .enumerate()
                .filter(move |(j, _)| *j != i)
                .map(|(_, s)| s);
            estimate(others, target.x, target.y, params).map(|z| z - target.value)
        })
        .collect();

    if errors.is_empty() {
        return Err(GeoKitError::validation(
            "no sample could be estimated from its neighbours",
        ));
    }

    let n = errors.len();
    let count = n as f64;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / count).sqrt();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / count;

    info!("Cross validation over {} samples: RMSE {:.4}, MAE {:.4}", n, rmse, mae);
    Ok(CrossValidation { rmse, mae, n })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new(0.5, 9.5, 10.0),  // top-left
            SamplePoint::new(9.5, 9.5, 20.0),  // top-right
            SamplePoint::new(0.5, 0.5, 30.0),  // bottom-left
            SamplePoint::new(9.5, 0.5, 40.0),  // bottom-right
        ]
    }

    fn default_params() -> IdwParams {
        IdwParams::new(GridSpec {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_size: 1.0,
            cols: 10,
            rows: 10,
        })
    }

    #[test]
    fn test_idw_snaps_to_samples() {
        let result = idw(&sample_points(), &default_params()).unwrap();

        // cell centres coincide with the samples
        assert_eq!(result.get(0, 0), Some(10.0));
        assert_eq!(result.get(0, 9), Some(20.0));
        assert_eq!(result.get(9, 0), Some(30.0));
        assert_eq!(result.get(9, 9), Some(40.0));
        assert_eq!(result.valid_cells(), 100);
    }

    #[test]
    fn test_idw_symmetric_point_is_average() {
        let params = IdwParams::new(GridSpec {
            origin_x: 4.5,
            origin_y: 4.5,
            cell_size: 1.0,
            cols: 1,
            rows: 1,
        });
        let result = idw(&sample_points(), &params).unwrap();
        let center = result.get(0, 0).unwrap();
        assert!((center - 25.0).abs() < 1e-9, "got {center}");
    }

    #[test]
    fn test_idw_with_radius() {
        let params = IdwParams {
            max_radius: Some(2.0),
            ..default_params()
        };
        let result = idw(&sample_points(), &params).unwrap();
        assert!(result.get(5, 5).unwrap().is_nan());
        assert!(!result.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_idw_with_max_points() {
        let params = IdwParams {
            max_points: Some(1),
            ..default_params()
        };
        let result = idw(&sample_points(), &params).unwrap();
        // nearest sample only
        assert_eq!(result.get(1, 1), Some(10.0));
    }

    #[test]
    fn test_idw_power_effect() {
        let low = idw(&sample_points(), &IdwParams { power: 1.0, ..default_params() }).unwrap();
        let high = idw(&sample_points(), &IdwParams { power: 4.0, ..default_params() }).unwrap();

        let near_low = low.get(1, 1).unwrap();
        let near_high = high.get(1, 1).unwrap();
        assert!((near_high - 10.0).abs() < (near_low - 10.0).abs());
    }

    #[test]
    fn test_idw_invalid_input() {
        assert!(idw(&[], &default_params()).is_err());
        assert!(idw(&sample_points(), &IdwParams { power: 0.0, ..default_params() }).is_err());
        assert!(idw(&sample_points(), &IdwParams { max_points: Some(0), ..default_params() }).is_err());
    }

    #[test]
    fn test_cross_validate_constant_field() {
        let samples: Vec<_> = sample_points()
            .into_iter()
            .map(|s| SamplePoint::new(s.x, s.y, 7.0))
            .collect();
        let cv = cross_validate(&samples, &default_params()).unwrap();
        assert_eq!(cv.n, 4);
        assert!(cv.rmse.abs() < 1e-12);
        assert!(cv.mae.abs() < 1e-12);
    }

    #[test]
    fn test_cross_validate_errors() {
        let cv = cross_validate(&sample_points(), &default_params()).unwrap();
        assert_eq!(cv.n, 4);
        assert!(cv.rmse >= cv.mae);
        assert!(cv.mae > 0.0);

        assert!(cross_validate(&sample_points()[..1], &default_params()).is_err());
    }
}
