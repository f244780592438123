//! KML and KMZ support
//!
//! - reading `.kml` files and `.kmz` archives
//! - streaming placemark parsing
//! - flattening placemarks into named points and exporting them
//! - merging several documents into one

pub mod merge;
pub mod parser;
pub mod points;
pub mod source;

use std::path::Path;

pub use merge::{KML_NAMESPACE, MergedDocument, merge_documents, merge_files};
pub use parser::{parse_coordinates, parse_placemarks};
pub use points::{PointsOptions, PointsSummary, extract_points, run_points};
pub use source::{SourceKind, read_kml, read_kml_bytes};

use crate::Result;
use crate::models::Placemark;

/// Read and parse all placemarks of a `.kml` or `.kmz` file
pub fn load_placemarks<P: AsRef<Path>>(path: P) -> Result<Vec<Placemark>> {
    let xml = read_kml(path)?;
    parse_placemarks(&xml)
}
