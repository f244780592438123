//! Consecutive leg distances along a table of positions

use std::path::Path;

use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::table::{Table, find_column};
use crate::{GeoKitError, Result};

/// How the rows of a distance table are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// `Latitude`/`Longitude` in decimal degrees, great-circle distance
    #[default]
    Geographic,
    /// `Easting`/`Northing` in metres, planar distance
    #[value(name = "utm", alias = "projected")]
    Projected,
}

impl DistanceMode {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            DistanceMode::Geographic => ("latitude", "longitude"),
            DistanceMode::Projected => ("easting", "northing"),
        }
    }
}

/// Great-circle distance in metres between two `(lat, lon)` positions
#[must_use]
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let from = HaversineLocation {
        latitude: a.0,
        longitude: a.1,
    };
    let to = HaversineLocation {
        latitude: b.0,
        longitude: b.1,
    };
    distance(from, to, Units::Kilometers) * 1000.0
}

/// Planar distance between two `(easting, northing)` positions
#[must_use]
pub fn euclidean_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    (b.0 - a.0).hypot(b.1 - a.1)
}

/// Distance of every position from the previous one; the first leg is 0
#[must_use]
pub fn leg_distances(points: &[(f64, f64)], mode: DistanceMode) -> Vec<f64> {
    let measure: fn((f64, f64), (f64, f64)) -> f64 = match mode {
        DistanceMode::Geographic => haversine_m,
        DistanceMode::Projected => euclidean_m,
    };

    let mut legs = Vec::with_capacity(points.len());
    if !points.is_empty() {
        legs.push(0.0);
    }
    legs.extend(points.windows(2).map(|pair| measure(pair[0], pair[1])));
    legs
}

/// Append `Distance_m` and `Cumulative_m` to a CSV of positions
///
/// Returns the total distance in metres.
pub fn add_distance_columns<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    mode: DistanceMode,
) -> Result<f64> {
    let mut table = Table::read(input.as_ref())?;
    let (first, second) = mode.columns();

    let missing = || {
        GeoKitError::validation(format!(
            "CSV must have '{first}' and '{second}' columns for {mode:?} distances"
        ))
    };
    let first_idx = find_column(&table.headers, first).ok_or_else(missing)?;
    let second_idx = find_column(&table.headers, second).ok_or_else(missing)?;

    let mut points = Vec::with_capacity(table.rows.len());
    for row in 0..table.rows.len() {
        points.push((table.number(row, first_idx)?, table.number(row, second_idx)?));
    }

    let legs = leg_distances(&points, mode);
    let mut total = 0.0;
    let cumulative: Vec<String> = legs
        .iter()
        .map(|leg| {
            total += leg;
            format!("{total:.3}")
        })
        .collect();

    table.append_column("Distance_m", legs.iter().map(|d| format!("{d:.3}")).collect());
    table.append_column("Cumulative_m", cumulative);
    table.write(output.as_ref())?;

    info!("Total distance over {} points: {:.3} m", points.len(), total);
    Ok(total)
}
