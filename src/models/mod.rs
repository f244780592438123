//! Data models for `geokit`

pub mod coordinate;
pub mod placemark;

pub use coordinate::{Coordinate, PointRecord};
pub use placemark::{Geometry, Placemark};
