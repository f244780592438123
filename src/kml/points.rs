//! Flattening placemarks into named points, and the KML/KMZ to points job

use std::path::{Path, PathBuf};

use tracing::info;

use super::load_placemarks;
use crate::elevation::{ElevationCache, ElevationProvider, EnrichmentSummary, enrich_elevations};
use crate::models::{Coordinate, Geometry, Placemark, PointRecord};
use crate::shapefile::write_point_records;
use crate::table::write_points_csv;
use crate::{GeoKitError, Result};

/// Flatten every placemark geometry into point records
///
/// Points keep the placemark name. Line and polygon vertices are numbered
/// from 1 as `{name}_Point_{i}`, or `{Kind}_Point_{i}` for unnamed
/// placemarks. Only the outer ring of a polygon contributes vertices.
#[must_use]
pub fn extract_points(placemarks: &[Placemark]) -> Vec<PointRecord> {
    let mut records = Vec::new();

    for placemark in placemarks {
        let name = placemark.display_name();
        for geometry in &placemark.geometries {
            match geometry {
                Geometry::Point(coordinate) => {
                    records.push(PointRecord::new(name.unwrap_or_default().to_string(), coordinate));
                }
                Geometry::LineString(coords) => {
                    push_vertices(&mut records, name, geometry.kind_name(), coords);
                }
                Geometry::Polygon { outer, .. } => {
                    push_vertices(&mut records, name, geometry.kind_name(), outer);
                }
            }
        }
    }

    records
}

fn push_vertices(
    records: &mut Vec<PointRecord>,
    name: Option<&str>,
    kind: &str,
    coords: &[Coordinate],
) {
    let prefix = name.unwrap_or(kind);
    records.extend(
        coords
            .iter()
            .enumerate()
            .map(|(i, c)| PointRecord::new(format!("{prefix}_Point_{}", i + 1), c)),
    );
}

/// `{input_dir}/{stem}_coordinates.csv`
#[must_use]
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_coordinates.csv"))
}

/// Options of a points export
pub struct PointsOptions<'a> {
    /// Elevation source; `None` keeps the KML altitudes
    pub provider: Option<&'a dyn ElevationProvider>,
    pub cache: Option<&'a ElevationCache>,
    pub batch_size: usize,
    /// Also write the points as a point shapefile here
    pub shapefile: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PointsSummary {
    pub points: usize,
    pub elevation: Option<EnrichmentSummary>,
    pub shapefile: Option<Vec<PathBuf>>,
}

/// Read, flatten, optionally enrich with DEM elevations, and write the CSV
pub async fn run_points(input: &Path, output: &Path, options: &PointsOptions<'_>) -> Result<PointsSummary> {
    let placemarks = load_placemarks(input)?;
    let mut records = extract_points(&placemarks);
    if records.is_empty() {
        return Err(GeoKitError::no_features("No points found in KML file"));
    }
    info!("Extracted {} points from {:?}", records.len(), input);

    let elevation = match options.provider {
        Some(provider) => Some(
            enrich_elevations(provider, &mut records, options.batch_size, options.cache).await,
        ),
        None => None,
    };

    // shapefile first, so a failure there does not leave a lone CSV behind
    let shapefile = match &options.shapefile {
        Some(path) => Some(write_point_records(&records, path)?),
        None => None,
    };

    write_points_csv(output, &records)?;

    Ok(PointsSummary {
        points: records.len(),
        elevation,
        shapefile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct FixedElevation(f64);

    #[async_trait]
    impl ElevationProvider for FixedElevation {
        async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<Option<f64>>> {
            Ok(vec![Some(self.0); locations.len()])
        }
    }

    fn placemark(name: Option<&str>, geometry: Geometry) -> Placemark {
        Placemark {
            name: name.map(str::to_string),
            description: None,
            geometries: vec![geometry],
        }
    }

    #[test]
    fn test_point_keeps_placemark_name() {
        let records = extract_points(&[placemark(
            Some("Gauge 4"),
            Geometry::Point(Coordinate::with_altitude(80.9, 28.6, 151.0)),
        )]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Gauge 4");
        assert_eq!(records[0].latitude, 28.6);
        assert_eq!(records[0].longitude, 80.9);
        assert_eq!(records[0].elevation, 151.0);
    }

    #[test]
    fn test_vertex_naming() {
        let line = vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)];
        let records = extract_points(&[
            placemark(Some("Canal"), Geometry::LineString(line.clone())),
            placemark(None, Geometry::LineString(line.clone())),
            placemark(
                None,
                Geometry::Polygon {
                    outer: line,
                    inner: vec![vec![Coordinate::new(5.0, 5.0)]],
                },
            ),
        ]);

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Canal_Point_1",
                "Canal_Point_2",
                "LineString_Point_1",
                "LineString_Point_2",
                "Polygon_Point_1",
                "Polygon_Point_2",
            ]
        );
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/data/survey.kmz")),
            PathBuf::from("/data/survey_coordinates.csv")
        );
    }

    #[tokio::test]
    async fn test_run_points_with_elevation_and_shapefile() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("survey.kml");
        fs::write(
            &input,
            "<kml><Placemark><name>P</name><LineString><coordinates>85.3,27.7 85.4,27.8</coordinates></LineString></Placemark></kml>",
        )
        .unwrap();
        let output = dir.path().join("out.csv");
        let provider = FixedElevation(1234.5);
        let options = PointsOptions {
            provider: Some(&provider),
            cache: None,
            batch_size: 50,
            shapefile: Some(dir.path().join("points.shp")),
        };

        let summary = run_points(&input, &output, &options).await.unwrap();

        assert_eq!(summary.points, 2);
        assert_eq!(summary.elevation.unwrap().fetched, 2);
        assert!(dir.path().join("points.dbf").exists());
        let csv = fs::read_to_string(&output).unwrap();
        assert!(csv.contains("P_Point_1,27.7,85.3,1234.5,45N,"));
    }

    #[tokio::test]
    async fn test_run_points_without_points() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.kml");
        fs::write(&input, "<kml><Document/></kml>").unwrap();
        let options = PointsOptions {
            provider: None,
            cache: None,
            batch_size: 50,
            shapefile: None,
        };

        let err = run_points(&input, &dir.path().join("o.csv"), &options).await.unwrap_err();
        assert!(matches!(err, GeoKitError::NoFeatures(_)));
    }

    #[tokio::test]
    async fn test_run_points_with_out_of_range_altitude() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("deep.kml");
        fs::write(
            &input,
            "<kml><Placemark><name>Shaft</name><Point><coordinates>85.3,27.7,-1000000000</coordinates></Point></Placemark></kml>",
        )
        .unwrap();
        let output = dir.path().join("out.csv");
        let options = PointsOptions {
            provider: None,
            cache: None,
            batch_size: 50,
            shapefile: Some(dir.path().join("points.shp")),
        };

        let summary = run_points(&input, &output, &options).await.unwrap();

        assert_eq!(summary.points, 1);
        assert!(summary.elevation.is_none());
        assert!(output.exists());
        let dbf = fs::read(dir.path().join("points.dbf")).unwrap();
        let elev = std::str::from_utf8(&dbf[dbf.len() - 13..dbf.len() - 1]).unwrap();
        assert_eq!(elev.trim().parse::<f64>().unwrap(), -1.0e9);
    }
}
