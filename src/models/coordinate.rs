//! Coordinate and point models shared by the KML readers and writers

use serde::{Deserialize, Serialize};

/// One KML coordinate tuple (`lon,lat[,alt]`)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Altitude in metres, when the tuple carries one
    pub altitude: Option<f64>,
}

impl Coordinate {
    #[must_use]
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: None,
        }
    }

    #[must_use]
    pub fn with_altitude(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: Some(altitude),
        }
    }

    /// Whether the coordinate lies within the WGS84 geographic range
    #[must_use]
    pub fn is_valid_wgs84(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// A named point as written by the points exporter
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PointRecord {
    pub name: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Elevation in metres (0.0 when unknown)
    pub elevation: f64,
}

impl PointRecord {
    #[must_use]
    pub fn new(name: String, coordinate: &Coordinate) -> Self {
        Self {
            name,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            elevation: coordinate.altitude.unwrap_or(0.0),
        }
    }

    /// Round coordinates for cache key generation
    #[must_use]
    pub fn rounded_coordinates(&self, precision: u32) -> (f64, f64) {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(5));
        let lat = (self.latitude * multiplier).round() / multiplier;
        let lon = (self.longitude * multiplier).round() / multiplier;
        (lat, lon)
    }

    /// Cache key for the elevation of this point (about one metre of precision)
    #[must_use]
    pub fn cache_key(&self) -> String {
        let (lat, lon) = self.rounded_coordinates(5);
        format!("elevation:{lat:.5}:{lon:.5}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_record_cache_key() {
        let point = PointRecord::new(
            "Gauge".to_string(),
            &Coordinate::new(85.324_123_9, 27.717_245_1),
        );
        assert_eq!(point.cache_key(), "elevation:27.71725:85.32412");
    }

    #[test]
    fn test_point_record_defaults_elevation() {
        let point = PointRecord::new("A".to_string(), &Coordinate::new(1.0, 2.0));
        assert_eq!(point.elevation, 0.0);
        assert_eq!(point.latitude, 2.0);

        let point = PointRecord::new("B".to_string(), &Coordinate::with_altitude(1.0, 2.0, 1340.5));
        assert_eq!(point.elevation, 1340.5);
    }

    #[test]
    fn test_wgs84_range() {
        assert!(Coordinate::new(180.0, -90.0).is_valid_wgs84());
        assert!(!Coordinate::new(181.0, 0.0).is_valid_wgs84());
        assert!(!Coordinate::new(0.0, 91.0).is_valid_wgs84());
    }
}
