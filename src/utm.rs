//! WGS84 decimal degrees <-> UTM conversion
//!
//! Transverse Mercator with the Krüger series expansion used by the common
//! `utm` libraries, including the Norway (32V) and Svalbard zone exceptions.

use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::table::{Table, find_column};
use crate::{GeoKitError, Result};

const K0: f64 = 0.9996;
const E: f64 = 0.006_694_38;
const E2: f64 = E * E;
const E3: f64 = E2 * E;
const E_P2: f64 = E / (1.0 - E);

const M1: f64 = 1.0 - E / 4.0 - 3.0 * E2 / 64.0 - 5.0 * E3 / 256.0;
const M2: f64 = 3.0 * E / 8.0 + 3.0 * E2 / 32.0 + 45.0 * E3 / 1024.0;
const M3: f64 = 15.0 * E2 / 256.0 + 45.0 * E3 / 1024.0;
const M4: f64 = 35.0 * E3 / 3072.0;

const R: f64 = 6_378_137.0;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

const ZONE_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWXX";

/// A projected UTM position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtmCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone_number: u8,
    pub zone_letter: char,
}

impl UtmCoordinate {
    /// `N` or `S`, derived from the latitude band letter
    #[must_use]
    pub fn hemisphere(&self) -> char {
        if self.zone_letter >= 'N' { 'N' } else { 'S' }
    }

    /// Zone label as used in the points CSV, e.g. `45N`
    #[must_use]
    pub fn zone_label(&self) -> String {
        format!("{}{}", self.zone_number, self.hemisphere())
    }
}

fn mod_angle(value: f64) -> f64 {
    (value + PI).rem_euclid(2.0 * PI) - PI
}

/// UTM zone number for a position, with the Norway/Svalbard exceptions
#[must_use]
pub fn zone_number(latitude: f64, longitude: f64) -> u8 {
    let longitude = if longitude >= 180.0 { longitude - 360.0 } else { longitude };

    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
        return 32;
    }

    if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 {
        if longitude < 9.0 {
            return 31;
        } else if longitude < 21.0 {
            return 33;
        } else if longitude < 33.0 {
            return 35;
        } else if longitude < 42.0 {
            return 37;
        }
    }

    // longitude in -180..180, so this stays within 1..=60
    (((longitude + 180.0) / 6.0).floor() as u8 % 60) + 1
}

/// Latitude band letter, `None` outside -80..=84
#[must_use]
pub fn zone_letter(latitude: f64) -> Option<char> {
    if !(-80.0..=84.0).contains(&latitude) {
        return None;
    }
    let index = ((latitude + 80.0) as usize) >> 3;
    ZONE_LETTERS.get(index).map(|&b| char::from(b))
}

fn central_longitude(zone_number: u8) -> f64 {
    f64::from(zone_number - 1) * 6.0 - 180.0 + 3.0
}

/// Project a WGS84 position to UTM
pub fn from_latlon(latitude: f64, longitude: f64) -> Result<UtmCoordinate> {
    if !(-80.0..=84.0).contains(&latitude) {
        return Err(GeoKitError::validation(format!(
            "latitude {latitude} out of range (must be between 80 deg S and 84 deg N)"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(GeoKitError::validation(format!(
            "longitude {longitude} out of range (must be between 180 deg W and 180 deg E)"
        )));
    }

    let lat_rad = latitude.to_radians();
    let lat_sin = lat_rad.sin();
    let lat_cos = lat_rad.cos();
    let lat_tan = lat_sin / lat_cos;
    let lat_tan2 = lat_tan * lat_tan;
    let lat_tan4 = lat_tan2 * lat_tan2;

    let zone_number = zone_number(latitude, longitude);
    let zone_letter = zone_letter(latitude)
        .ok_or_else(|| GeoKitError::validation(format!("no UTM band for latitude {latitude}")))?;

    let lon_rad = longitude.to_radians();
    let central_lon_rad = central_longitude(zone_number).to_radians();

    let n = R / (1.0 - E * lat_sin * lat_sin).sqrt();
    let c = E_P2 * lat_cos * lat_cos;

    let a = lat_cos * mod_angle(lon_rad - central_lon_rad);
    let m = R
        * (M1 * lat_rad - M2 * (2.0 * lat_rad).sin() + M3 * (4.0 * lat_rad).sin()
            - M4 * (6.0 * lat_rad).sin());

    let easting = K0
        * n
        * (a + a.powi(3) / 6.0 * (1.0 - lat_tan2 + c)
            + a.powi(5) / 120.0 * (5.0 - 18.0 * lat_tan2 + lat_tan4 + 72.0 * c - 58.0 * E_P2))
        + FALSE_EASTING;

    let mut northing = K0
        * (m + n
            * lat_tan
            * (a * a / 2.0
                + a.powi(4) / 24.0 * (5.0 - lat_tan2 + 9.0 * c + 4.0 * c * c)
                + a.powi(6) / 720.0 * (61.0 - 58.0 * lat_tan2 + lat_tan4 + 600.0 * c - 330.0 * E_P2)));

    if latitude < 0.0 {
        northing += FALSE_NORTHING_SOUTH;
    }

    Ok(UtmCoordinate {
        easting,
        northing,
        zone_number,
        zone_letter,
    })
}

/// Inverse projection, returns `(latitude, longitude)` in decimal degrees
pub fn to_latlon(easting: f64, northing: f64, zone_number: u8, northern: bool) -> Result<(f64, f64)> {
    if !(100_000.0..1_000_000.0).contains(&easting) {
        return Err(GeoKitError::validation(format!(
            "easting {easting} out of range (must be between 100,000 m and 999,999 m)"
        )));
    }
    if !(0.0..=10_000_000.0).contains(&northing) {
        return Err(GeoKitError::validation(format!(
            "northing {northing} out of range (must be between 0 m and 10,000,000 m)"
        )));
    }
    if !(1..=60).contains(&zone_number) {
        return Err(GeoKitError::validation(format!(
            "zone number {zone_number} out of range (must be between 1 and 60)"
        )));
    }

    let sqrt_e = (1.0 - E).sqrt();
    let e1 = (1.0 - sqrt_e) / (1.0 + sqrt_e);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;
    let e1_5 = e1_4 * e1;

    let p2 = 3.0 / 2.0 * e1 - 27.0 / 32.0 * e1_3 + 269.0 / 512.0 * e1_5;
    let p3 = 21.0 / 16.0 * e1_2 - 55.0 / 32.0 * e1_4;
    let p4 = 151.0 / 96.0 * e1_3 - 417.0 / 128.0 * e1_5;
    let p5 = 1097.0 / 512.0 * e1_4;

    let x = easting - FALSE_EASTING;
    let y = if northern { northing } else { northing - FALSE_NORTHING_SOUTH };

    let m = y / K0;
    let mu = m / (R * M1);

    let p_rad = mu
        + p2 * (2.0 * mu).sin()
        + p3 * (4.0 * mu).sin()
        + p4 * (6.0 * mu).sin()
        + p5 * (8.0 * mu).sin();

    let p_sin = p_rad.sin();
    let p_sin2 = p_sin * p_sin;
    let p_cos = p_rad.cos();
    let p_tan = p_sin / p_cos;
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1.0 - E * p_sin2;
    let ep_sin_sqrt = ep_sin.sqrt();

    let n = R / ep_sin_sqrt;
    let r = (1.0 - E) / ep_sin;

    let c = E_P2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * K0);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let latitude = p_rad
        - (p_tan / r)
            * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * E_P2))
        + d6 / 720.0 * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4 - 252.0 * E_P2 - 3.0 * c2);

    let longitude = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
        + d5 / 120.0 * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * E_P2 + 24.0 * p_tan4))
        / p_cos;
    let longitude = mod_angle(longitude + central_longitude(zone_number).to_radians());

    Ok((latitude.to_degrees(), longitude.to_degrees()))
}

/// Append UTM columns to a CSV with `latitude`/`longitude` columns
///
/// Every original column is kept; `Easting`, `Northing`, `Zone Number` and
/// `Zone Letter` are appended. Returns the number of converted rows.
pub fn convert_csv<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<usize> {
    let mut table = Table::read(input.as_ref())?;

    let lat_idx = find_column(&table.headers, "latitude")
        .ok_or_else(|| GeoKitError::validation("CSV must have 'latitude' and 'longitude' columns"))?;
    let lon_idx = find_column(&table.headers, "longitude")
        .ok_or_else(|| GeoKitError::validation("CSV must have 'latitude' and 'longitude' columns"))?;

    let mut columns: [Vec<String>; 4] = Default::default();
    for row in 0..table.rows.len() {
        let latitude = table.number(row, lat_idx)?;
        let longitude = table.number(row, lon_idx)?;
        let utm = from_latlon(latitude, longitude).map_err(|e| match e {
            GeoKitError::Validation(message) => {
                GeoKitError::validation(format!("row {}: {message}", row + 1))
            }
            other => other,
        })?;

        columns[0].push(utm.easting.to_string());
        columns[1].push(utm.northing.to_string());
        columns[2].push(utm.zone_number.to_string());
        columns[3].push(utm.zone_letter.to_string());
    }

    let [easting, northing, number, letter] = columns;
    table.append_column("Easting", easting);
    table.append_column("Northing", northing);
    table.append_column("Zone Number", number);
    table.append_column("Zone Letter", letter);
    table.write(output.as_ref())?;

    info!("Converted {} rows to UTM", table.rows.len());
    Ok(table.rows.len())
}
