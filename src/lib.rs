//! `geokit` - small geospatial conversions for field survey data
//!
//! This library reads KML/KMZ placemarks and turns them into point tables,
//! shapefiles and merged documents, converts coordinates between WGS84 and
//! UTM, measures distances and interpolates scattered samples with IDW.

pub mod cache;
pub mod config;
pub mod distance;
pub mod elevation;
pub mod error;
pub mod interpolation;
pub mod kml;
pub mod logging;
pub mod models;
pub mod shapefile;
pub mod table;
pub mod utm;

// Re-export core types for public API
pub use config::GeoKitConfig;
pub use distance::DistanceMode;
pub use elevation::{ElevationCache, ElevationProvider, OpenElevationClient, enrich_elevations};
pub use error::GeoKitError;
pub use interpolation::{AsciiGrid, GridSpec, IdwParams, SamplePoint};
pub use models::{Coordinate, Geometry, Placemark, PointRecord};
pub use shapefile::{GeometryKind, ShapefileWriter};
pub use utm::UtmCoordinate;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, GeoKitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
