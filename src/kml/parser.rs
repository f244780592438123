//! Streaming KML placemark parser
//!
//! Elements are matched by local name, so documents with a default KML
//! namespace, a `kml:` prefix, or no namespace at all parse the same way.
//! `MultiGeometry` needs no special handling: every geometry found inside a
//! placemark is appended to its geometry list.

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use tracing::{debug, info};

use crate::models::{Coordinate, Geometry, Placemark};
use crate::{GeoKitError, Result};

/// Parse a KML `coordinates` text block
///
/// Tuples are separated by any whitespace and their components by commas.
/// Tuples without at least two numeric components are skipped.
#[must_use]
pub fn parse_coordinates(text: &str) -> Vec<Coordinate> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',').map(str::trim);
            let longitude = parts.next()?.parse::<f64>().ok().filter(|v| v.is_finite())?;
            let latitude = parts.next()?.parse::<f64>().ok().filter(|v| v.is_finite())?;
            let altitude = parts
                .next()
                .filter(|p| !p.is_empty())
                .and_then(|p| p.parse::<f64>().ok())
                .filter(|v| v.is_finite());
            Some(Coordinate {
                longitude,
                latitude,
                altitude,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Outer,
    Inner,
}

#[derive(Debug)]
enum PendingGeometry {
    Point(Option<Coordinate>),
    Line(Vec<Coordinate>),
    Polygon {
        outer: Vec<Coordinate>,
        inner: Vec<Vec<Coordinate>>,
    },
}

impl PendingGeometry {
    fn finish(self) -> Option<Geometry> {
        match self {
            PendingGeometry::Point(coordinate) => coordinate.map(Geometry::Point),
            PendingGeometry::Line(coords) if !coords.is_empty() => {
                Some(Geometry::LineString(coords))
            }
            PendingGeometry::Polygon { outer, inner } if !outer.is_empty() => {
                Some(Geometry::Polygon { outer, inner })
            }
            _ => None,
        }
    }
}

/// Collects one placemark while its subtree is being read
struct PlacemarkBuilder {
    /// Stack depth of the `Placemark` element itself
    depth: usize,
    placemark: Placemark,
    pending: Option<PendingGeometry>,
    boundary: Option<Boundary>,
    in_polygon_ring: bool,
}

impl PlacemarkBuilder {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            placemark: Placemark::default(),
            pending: None,
            boundary: None,
            in_polygon_ring: false,
        }
    }

    fn open(&mut self, name: &str) {
        match name {
            "Point" => self.begin(PendingGeometry::Point(None)),
            "LineString" => self.begin(PendingGeometry::Line(Vec::new())),
            "Polygon" => self.begin(PendingGeometry::Polygon {
                outer: Vec::new(),
                inner: Vec::new(),
            }),
            "LinearRing" => {
                if matches!(self.pending, Some(PendingGeometry::Polygon { .. })) {
                    self.in_polygon_ring = true;
                } else {
                    self.begin(PendingGeometry::Line(Vec::new()));
                }
            }
            "outerBoundaryIs" => self.boundary = Some(Boundary::Outer),
            "innerBoundaryIs" => self.boundary = Some(Boundary::Inner),
            _ => {}
        }
    }

    /// `parent_depth` is the stack depth after the element was popped
    fn close(&mut self, name: &str, text: &str, parent_depth: usize) {
        let direct_child = parent_depth == self.depth;
        match name {
            "name" if direct_child && self.placemark.name.is_none() => {
                self.placemark.name = Some(text.trim().to_string());
            }
            "description" if direct_child && self.placemark.description.is_none() => {
                self.placemark.description = Some(text.trim().to_string());
            }
            "coordinates" => self.assign_coordinates(parse_coordinates(text)),
            "Point" | "LineString" | "Polygon" => self.finish(),
            "LinearRing" => {
                if self.in_polygon_ring {
                    self.in_polygon_ring = false;
                } else {
                    self.finish();
                }
            }
            "outerBoundaryIs" | "innerBoundaryIs" => self.boundary = None,
            _ => {}
        }
    }

    fn begin(&mut self, geometry: PendingGeometry) {
        // an unterminated sibling geometry is kept rather than dropped
        self.finish();
        self.pending = Some(geometry);
    }

    fn finish(&mut self) {
        if let Some(geometry) = self.pending.take().and_then(PendingGeometry::finish) {
            self.placemark.geometries.push(geometry);
        }
        self.boundary = None;
        self.in_polygon_ring = false;
    }

    fn assign_coordinates(&mut self, coords: Vec<Coordinate>) {
        match self.pending.as_mut() {
            Some(PendingGeometry::Point(slot)) => *slot = coords.first().copied(),
            Some(PendingGeometry::Line(line)) => line.extend(coords),
            Some(PendingGeometry::Polygon { outer, inner }) => match self.boundary {
                Some(Boundary::Inner) => inner.push(coords),
                _ if outer.is_empty() => *outer = coords,
                _ => {}
            },
            None => {}
        }
    }

    fn build(mut self) -> Placemark {
        self.finish();
        self.placemark
    }
}

/// Parse every `Placemark` of a KML document
pub fn parse_placemarks(xml: &str) -> Result<Vec<Placemark>> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut placemarks = Vec::new();
    let mut current: Option<PlacemarkBuilder> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| GeoKitError::Xml {
            position: reader.error_position(),
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(name);
                let name = &stack[stack.len() - 1];

                if name == "Placemark" && current.is_none() {
                    current = Some(PlacemarkBuilder::new(stack.len()));
                } else if let Some(builder) = current.as_mut() {
                    builder.open(name);
                }
                text.clear();
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    continue;
                };

                if let Some(builder) = current.as_mut() {
                    if name == "Placemark" && stack.len() + 1 == builder.depth {
                        if let Some(done) = current.take() {
                            placemarks.push(done.build());
                        }
                    } else {
                        builder.close(&name, &text, stack.len());
                    }
                }
                text.clear();
            }
            Event::Text(e) if current.is_some() => {
                let content = e
                    .xml10_content()
                    .map_err(|err| GeoKitError::parse(err.to_string()))?;
                text.push_str(&content);
            }
            Event::CData(e) if current.is_some() => {
                let content = e
                    .decode()
                    .map_err(|err| GeoKitError::parse(err.to_string()))?;
                text.push_str(&content);
            }
            Event::GeneralRef(e) if current.is_some() => {
                push_reference(&mut text, &e)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!("Parsed {} placemarks", placemarks.len());
    info!(
        "Found {} placemarks with {} geometries",
        placemarks.len(),
        placemarks.iter().map(|p| p.geometries.len()).sum::<usize>()
    );
    Ok(placemarks)
}

fn push_reference(text: &mut String, reference: &BytesRef<'_>) -> Result<()> {
    if let Some(ch) = reference.resolve_char_ref()? {
        text.push(ch);
        return Ok(());
    }

    let name = reference
        .decode()
        .map_err(|err| GeoKitError::parse(err.to_string()))?;
    match resolve_predefined_entity(&name) {
        Some(value) => text.push_str(value),
        None => {
            text.push('&');
            text.push_str(&name);
            text.push(';');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
  <Document>
    <name>Survey</name>
    <Folder>
      <name>Chambers</name>
      <Placemark>
        <name>Chamber A &amp; B</name>
        <description><![CDATA[<b>inspected</b>]]></description>
        <Point><coordinates>85.3240,27.7172,1340</coordinates></Point>
      </Placemark>
      <Placemark>
        <name>Canal</name>
        <LineString>
          <coordinates>
            80.1,28.5,0 80.2,28.6,0
            80.3,28.7,0
          </coordinates>
        </LineString>
      </Placemark>
      <Placemark>
        <name>Parcel</name>
        <Polygon>
          <outerBoundaryIs><LinearRing><coordinates>0,0 0,1 1,1 1,0 0,0</coordinates></LinearRing></outerBoundaryIs>
          <innerBoundaryIs><LinearRing><coordinates>0.2,0.2 0.4,0.2 0.4,0.4 0.2,0.2</coordinates></LinearRing></innerBoundaryIs>
        </Polygon>
      </Placemark>
    </Folder>
  </Document>
</kml>"#;

    #[test]
    fn test_parse_coordinates_mixed_whitespace() {
        let coords = parse_coordinates("  1.5,2.5,10\n\t3,4  junk 5,x 6,7, ");
        assert_eq!(
            coords,
            vec![
                Coordinate::with_altitude(1.5, 2.5, 10.0),
                Coordinate::new(3.0, 4.0),
                Coordinate::new(6.0, 7.0),
            ]
        );
    }

    #[test]
    fn test_parse_coordinates_skips_non_finite() {
        let coords = parse_coordinates("NaN,1 2,inf -infinity,3 1,2,NaN 4,5,6");
        assert_eq!(
            coords,
            vec![Coordinate::new(1.0, 2.0), Coordinate::with_altitude(4.0, 5.0, 6.0)]
        );
    }

    #[test]
    fn test_parse_placemarks() {
        let placemarks = parse_placemarks(SAMPLE).unwrap();
        assert_eq!(placemarks.len(), 3);

        let chamber = &placemarks[0];
        assert_eq!(chamber.name.as_deref(), Some("Chamber A & B"));
        assert_eq!(chamber.description.as_deref(), Some("<b>inspected</b>"));
        assert_eq!(
            chamber.geometries,
            vec![Geometry::Point(Coordinate::with_altitude(85.324, 27.7172, 1340.0))]
        );

        let canal = &placemarks[1];
        assert_eq!(canal.line_strings().next().map(<[_]>::len), Some(3));

        let (outer, inner) = placemarks[2].polygons().next().unwrap();
        assert_eq!(outer.len(), 5);
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].len(), 4);
    }

    #[test]
    fn test_container_names_are_not_placemark_names() {
        let xml = r#"<kml><Placemark><ExtendedData><Data name="x"><name>inner</name></Data></ExtendedData>
            <Point><coordinates>1,2</coordinates></Point></Placemark></kml>"#;
        let placemarks = parse_placemarks(xml).unwrap();
        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].name, None);
    }

    #[test]
    fn test_prefixed_namespace_and_multigeometry() {
        let xml = r#"<kml:kml xmlns:kml="http://www.opengis.net/kml/2.2">
            <kml:Placemark><kml:name>multi</kml:name>
              <kml:MultiGeometry>
                <kml:Point><kml:coordinates>1,2</kml:coordinates></kml:Point>
                <kml:Point><kml:coordinates>3,4</kml:coordinates></kml:Point>
              </kml:MultiGeometry>
            </kml:Placemark></kml:kml>"#;
        let placemarks = parse_placemarks(xml).unwrap();
        assert_eq!(placemarks[0].name.as_deref(), Some("multi"));
        assert_eq!(placemarks[0].points().count(), 2);
    }

    #[test]
    fn test_malformed_xml() {
        let result = parse_placemarks("<kml><Placemark></kml>");
        assert!(matches!(result, Err(GeoKitError::Xml { .. })));
    }
}
