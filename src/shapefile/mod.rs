//! ESRI Shapefile export
//!
//! A layer is written as `.shp`, `.shx`, `.dbf`, `.prj` and `.cpg` files
//! sharing one base path. Coordinates are WGS84 longitude/latitude.

pub mod dbf;
pub mod shp;

use std::fs;
use std::path::{Path, PathBuf};

use geo::{LineString, MultiLineString, Point, Winding};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use dbf::{FieldDef, FieldKind, FieldValue};
pub use shp::{BoundingBox, Shape, ShapeType};

use crate::kml::load_placemarks;
use crate::models::{Coordinate, Placemark, PointRecord};
use crate::table::create_parent;
use crate::{GeoKitError, Result};

/// WKT of the WGS84 geographic coordinate system
pub const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["Degree",0.017453292519943295]]"#;

const NAME_WIDTH: u8 = 50;
const DESC_WIDTH: u8 = 100;

/// Which geometries of a KML document become the layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[default]
    Polygon,
    Line,
    Point,
}

impl GeometryKind {
    #[must_use]
    pub fn shape_type(self) -> ShapeType {
        match self {
            GeometryKind::Polygon => ShapeType::Polygon,
            GeometryKind::Line => ShapeType::PolyLine,
            GeometryKind::Point => ShapeType::Point,
        }
    }

    fn label(self) -> &'static str {
        match self {
            GeometryKind::Polygon => "Polygon",
            GeometryKind::Line => "Line",
            GeometryKind::Point => "Point",
        }
    }

    fn fields(self) -> Vec<FieldDef> {
        let mut fields = vec![
            FieldDef::character("NAME", NAME_WIDTH),
            FieldDef::character("DESC", DESC_WIDTH),
        ];
        if self == GeometryKind::Point {
            fields.push(FieldDef::numeric("ELEV", 12, 3));
        }
        fields
    }
}

/// Accumulates shapes and attribute rows for one layer
#[derive(Debug, Clone)]
pub struct ShapefileWriter {
    shape_type: ShapeType,
    fields: Vec<FieldDef>,
    shapes: Vec<Shape>,
    records: Vec<Vec<FieldValue>>,
}

impl ShapefileWriter {
    #[must_use]
    pub fn new(shape_type: ShapeType, fields: Vec<FieldDef>) -> Self {
        Self {
            shape_type,
            fields,
            shapes: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn add(&mut self, shape: Shape, values: Vec<FieldValue>) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(GeoKitError::validation(format!(
                "expected {} attribute values, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        self.shapes.push(shape);
        self.records.push(values);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Write all component files; any extension on `path` is replaced
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<Vec<PathBuf>> {
        let base = path.as_ref().with_extension("");
        create_parent(&base)?;

        let (shp, shx) = shp::encode(self.shape_type, &self.shapes)?;
        let today = chrono::Local::now().date_naive();
        let dbf = dbf::encode(&self.fields, &self.records, today)?;

        let files = [
            ("shp", shp),
            ("shx", shx),
            ("dbf", dbf),
            ("prj", WGS84_PRJ.as_bytes().to_vec()),
            ("cpg", b"UTF-8".to_vec()),
        ];

        let mut written = Vec::with_capacity(files.len());
        for (extension, bytes) in files {
            let file = base.with_extension(extension);
            fs::write(&file, bytes)?;
            debug!("Wrote {:?}", file);
            written.push(file);
        }
        Ok(written)
    }
}

/// Closed ring with the requested winding, or `None` with fewer than three valid vertices
fn prepare_ring(coords: &[Coordinate], clockwise: bool) -> Option<LineString<f64>> {
    let mut ring: LineString<f64> = coords
        .iter()
        .filter(|c| c.is_valid_wgs84())
        .map(|c| (c.longitude, c.latitude))
        .collect();
    if ring.0.len() < 3 {
        return None;
    }
    ring.close();
    if clockwise {
        ring.make_cw_winding();
    } else {
        ring.make_ccw_winding();
    }
    Some(ring)
}

fn attributes(placemark: &Placemark, fallback: String) -> Vec<FieldValue> {
    vec![
        FieldValue::Text(placemark.display_name().map_or(fallback, str::to_string)),
        FieldValue::Text(placemark.description.clone().unwrap_or_default()),
    ]
}

/// Build a layer of the requested geometry kind from placemarks
pub fn build_layer(placemarks: &[Placemark], kind: GeometryKind) -> Result<ShapefileWriter> {
    let mut writer = ShapefileWriter::new(kind.shape_type(), kind.fields());
    let mut skipped = 0;

    for placemark in placemarks {
        match kind {
            GeometryKind::Polygon => {
                for (outer, inner) in placemark.polygons() {
                    let Some(outer) = prepare_ring(outer, true) else {
                        skipped += 1;
                        continue;
                    };
                    let mut rings = vec![outer];
                    rings.extend(inner.iter().filter_map(|hole| prepare_ring(hole, false)));

                    let fallback = format!("{}_{}", kind.label(), writer.len() + 1);
                    writer.add(Shape::Parts(MultiLineString(rings)), attributes(placemark, fallback))?;
                }
            }
            GeometryKind::Line => {
                for line in placemark.line_strings() {
                    let part: LineString<f64> = line
                        .iter()
                        .filter(|c| c.is_valid_wgs84())
                        .map(|c| (c.longitude, c.latitude))
                        .collect();
                    if part.0.len() < 2 {
                        skipped += 1;
                        continue;
                    }
                    let fallback = format!("{}_{}", kind.label(), writer.len() + 1);
                    writer.add(Shape::Parts(MultiLineString(vec![part])), attributes(placemark, fallback))?;
                }
            }
            GeometryKind::Point => {
                for point in placemark.points() {
                    if !point.is_valid_wgs84() {
                        skipped += 1;
                        continue;
                    }
                    let fallback = format!("{}_{}", kind.label(), writer.len() + 1);
                    let mut values = attributes(placemark, fallback);
                    values.push(FieldValue::Number(point.altitude.unwrap_or(0.0)));
                    writer.add(Shape::Point(Point::new(point.longitude, point.latitude)), values)?;
                }
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} {} geometries with too few valid vertices", skipped, kind.label().to_lowercase());
    }
    Ok(writer)
}

/// Write point records as a point layer (`NAME`, `DESC`, `ELEV`)
pub fn write_point_records<P: AsRef<Path>>(records: &[PointRecord], path: P) -> Result<Vec<PathBuf>> {
    let kind = GeometryKind::Point;
    let mut writer = ShapefileWriter::new(kind.shape_type(), kind.fields());
    for (i, record) in records.iter().enumerate() {
        let name = if record.name.trim().is_empty() {
            format!("{}_{}", kind.label(), i + 1)
        } else {
            record.name.clone()
        };
        writer.add(
            Shape::Point(Point::new(record.longitude, record.latitude)),
            vec![
                FieldValue::Text(name),
                FieldValue::Text(String::new()),
                FieldValue::Number(record.elevation),
            ],
        )?;
    }
    writer.write(path)
}

/// Summary of a KML to shapefile conversion
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub features: usize,
    pub files: Vec<PathBuf>,
}

/// Convert the placemarks of a `.kml`/`.kmz` file into a shapefile layer
pub fn convert_to_shapefile<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    kind: GeometryKind,
) -> Result<ConversionSummary> {
    let input = input.as_ref();
    info!("Converting {:?} to a {} shapefile", input, kind.label().to_lowercase());

    let placemarks = load_placemarks(input)?;
    let writer = build_layer(&placemarks, kind)?;
    if writer.is_empty() {
        let plural = match kind {
            GeometryKind::Polygon => "polygons",
            GeometryKind::Line => "lines",
            GeometryKind::Point => "points",
        };
        return Err(GeoKitError::no_features(format!("No {plural} found in KML file")));
    }

    let files = writer.write(output)?;
    info!("Wrote {} features to {:?}", writer.len(), files.first());

    Ok(ConversionSummary {
        features: writer.len(),
        files,
    })
}

/// `{input_dir}/{stem}_converted.shp`
#[must_use]
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    input.with_file_name(format!("{stem}_converted.shp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kml::parse_placemarks;
    use tempfile::TempDir;

    const KML: &str = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
        <Placemark><name>Field</name><description>north plot</description>
          <Polygon>
            <outerBoundaryIs><LinearRing><coordinates>0,0 1,0 1,1 0,1</coordinates></LinearRing></outerBoundaryIs>
            <innerBoundaryIs><LinearRing><coordinates>0.2,0.2 0.2,0.4 0.4,0.4 0.2,0.2</coordinates></LinearRing></innerBoundaryIs>
          </Polygon>
        </Placemark>
        <Placemark><Polygon><outerBoundaryIs><LinearRing><coordinates>5,5 6,5 6,6 5,5</coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>
        <Placemark><Polygon><outerBoundaryIs><LinearRing><coordinates>5,5 200,5</coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>
        <Placemark><name>Well</name><Point><coordinates>2,3,44.5</coordinates></Point></Placemark>
      </Document></kml>"#;

    fn text(value: &FieldValue) -> &str {
        match value {
            FieldValue::Text(t) => t,
            FieldValue::Number(_) => panic!("expected text"),
        }
    }

    #[test]
    fn test_prepare_ring_orients_and_closes() {
        let ccw = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
        ];
        let outer = prepare_ring(&ccw, true).unwrap();
        assert_eq!(outer.0.len(), 4);
        assert!(outer.is_closed());
        assert!(outer.is_cw());

        let hole = prepare_ring(&ccw, false).unwrap();
        assert!(hole.is_ccw());
        assert_eq!(hole.0.first(), Some(&geo::coord! { x: 0.0, y: 0.0 }));

        let invalid = [Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0), Coordinate::new(190.0, 1.0)];
        assert!(prepare_ring(&invalid, true).is_none());

        assert!(prepare_ring(&ccw[..2], true).is_none());
    }

    #[test]
    fn test_polygon_layer() {
        let placemarks = parse_placemarks(KML).unwrap();
        let layer = build_layer(&placemarks, GeometryKind::Polygon).unwrap();

        assert_eq!(layer.len(), 2);
        assert_eq!(text(&layer.records[0][0]), "Field");
        assert_eq!(text(&layer.records[0][1]), "north plot");
        assert_eq!(text(&layer.records[1][0]), "Polygon_2");
        match &layer.shapes[0] {
            Shape::Parts(rings) => {
                assert_eq!(rings.0.len(), 2);
                assert!(rings.0[0].is_cw());
                assert!(rings.0[1].is_ccw());
            }
            Shape::Point(..) => panic!("expected rings"),
        }
    }

    #[test]
    fn test_point_layer_has_elevation() {
        let placemarks = parse_placemarks(KML).unwrap();
        let layer = build_layer(&placemarks, GeometryKind::Point).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.records[0][2], FieldValue::Number(44.5));
        assert_eq!(layer.shapes[0], Shape::Point(Point::new(2.0, 3.0)));
    }

    #[test]
    fn test_convert_writes_all_components() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("parcels.kml");
        fs::write(&input, KML).unwrap();

        let output = default_output(&input);
        assert_eq!(output, dir.path().join("parcels_converted.shp"));

        let summary = convert_to_shapefile(&input, &output, GeometryKind::Polygon).unwrap();
        assert_eq!(summary.features, 2);
        for extension in ["shp", "shx", "dbf", "prj", "cpg"] {
            assert!(output.with_extension(extension).exists(), "missing .{extension}");
        }
        assert_eq!(fs::read_to_string(output.with_extension("prj")).unwrap(), WGS84_PRJ);
    }

    #[test]
    fn test_write_point_records() {
        let dir = TempDir::new().unwrap();
        let records = vec![
            PointRecord::new("A".to_string(), &Coordinate::with_altitude(1.0, 2.0, 3.0)),
            PointRecord::new(String::new(), &Coordinate::new(4.0, 5.0)),
        ];

        let files = write_point_records(&records, dir.path().join("points.csv")).unwrap();
        assert_eq!(files[0], dir.path().join("points.shp"));

        let dbf = fs::read(dir.path().join("points.dbf")).unwrap();
        assert_eq!(u32::from_le_bytes(dbf[4..8].try_into().unwrap()), 2);
        // second record starts after the header and one record of 1 + 50 + 100 + 12 bytes
        let second = 32 + 32 * 3 + 1 + 163;
        assert_eq!(&dbf[second + 1..second + 8], b"Point_2");
    }

    #[test]
    fn test_convert_without_lines_fails() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("parcels.kml");
        fs::write(&input, KML).unwrap();

        let err = convert_to_shapefile(&input, dir.path().join("out.shp"), GeometryKind::Line).unwrap_err();
        assert_eq!(err.to_string(), "No lines found in KML file");
    }
}
