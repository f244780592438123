//! CSV tables: column lookup, appended columns, and the points output

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::models::PointRecord;
use crate::utm;
use crate::{GeoKitError, Result};

/// Header of the points CSV
pub const POINTS_HEADER: [&str; 7] = [
    "Name",
    "Latitude",
    "Longitude",
    "Elevation",
    "UTM_Zone",
    "UTM_Easting",
    "UTM_Northing",
];

/// Case-insensitive, whitespace-tolerant column lookup
#[must_use]
pub fn find_column(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// A whole CSV file held as strings, so unknown columns pass through untouched
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GeoKitError::FileNotFound(path.display().to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() > headers.len() {
                warn!(
                    "Row {} has {} cells but the header has {}; extra cells dropped",
                    index + 2,
                    row.len(),
                    headers.len()
                );
            }
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        debug!("Read {} rows from {:?}", rows.len(), path);
        Ok(Self { headers, rows })
    }

    /// Parse a cell as a number; `row` is the 0-based data row
    pub fn number(&self, row: usize, column: usize) -> Result<f64> {
        let cell = self
            .rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.trim())
            .unwrap_or_default();

        cell.parse::<f64>().map_err(|_| {
            GeoKitError::validation(format!(
                "row {}: invalid number '{}' in column '{}'",
                row + 1,
                cell,
                self.headers.get(column).map(String::as_str).unwrap_or("?")
            ))
        })
    }

    pub fn append_column(&mut self, name: &str, values: Vec<String>) {
        self.headers.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub(crate) fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write point records with their UTM projection
///
/// Points outside the UTM latitude band keep empty UTM cells.
pub fn write_points_csv<P: AsRef<Path>>(path: P, records: &[PointRecord]) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(POINTS_HEADER)?;

    let mut outside = 0;
    for record in records {
        let (zone, easting, northing) = match utm::from_latlon(record.latitude, record.longitude) {
            Ok(projected) => (
                projected.zone_label(),
                format!("{:.2}", projected.easting),
                format!("{:.2}", projected.northing),
            ),
            Err(_) => {
                outside += 1;
                (String::new(), String::new(), String::new())
            }
        };

        writer.write_record([
            record.name.clone(),
            record.latitude.to_string(),
            record.longitude.to_string(),
            record.elevation.to_string(),
            zone,
            easting,
            northing,
        ])?;
    }
    writer.flush()?;

    if outside > 0 {
        debug!("{} points outside the UTM band written without projection", outside);
    }
    info!("Wrote {} points to {:?}", records.len(), path);
    Ok(())
}
